//! The load balancer surface driven by the Service controller

use async_trait::async_trait;
use cfccm_common::Result;
use k8s_openapi::api::core::v1::{LoadBalancerStatus, Node, Service};

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use crate::reconciler::LoadBalancers;

/// Load balancer operations for Services of type `LoadBalancer`
///
/// Services and Nodes are passed by shared reference and never modified.
/// Services without the hostname annotation are not managed: lookups report
/// nothing and mutations succeed without touching Cloudflare.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait LoadBalancerProvider: Send + Sync {
    /// Status of the Service's load balancer, `None` if it does not exist
    async fn get_load_balancer(&self, service: &Service) -> Result<Option<LoadBalancerStatus>>;

    /// Name of the Service's load balancer, empty when not managed
    fn get_load_balancer_name(&self, service: &Service) -> String;

    /// Create or converge the load balancer and return its status
    async fn ensure_load_balancer(
        &self,
        service: &Service,
        nodes: &[Node],
    ) -> Result<LoadBalancerStatus>;

    /// Refresh the backends of an existing load balancer
    async fn update_load_balancer(&self, service: &Service, nodes: &[Node]) -> Result<()>;

    /// Delete the load balancer and everything it depends on
    async fn ensure_load_balancer_deleted(&self, service: &Service) -> Result<()>;
}

#[async_trait]
impl LoadBalancerProvider for LoadBalancers {
    async fn get_load_balancer(&self, service: &Service) -> Result<Option<LoadBalancerStatus>> {
        self.status(service).await
    }

    fn get_load_balancer_name(&self, service: &Service) -> String {
        self.name(service)
    }

    async fn ensure_load_balancer(
        &self,
        service: &Service,
        nodes: &[Node],
    ) -> Result<LoadBalancerStatus> {
        self.ensure(service, nodes).await
    }

    async fn update_load_balancer(&self, service: &Service, nodes: &[Node]) -> Result<()> {
        self.update(service, nodes).await
    }

    async fn ensure_load_balancer_deleted(&self, service: &Service) -> Result<()> {
        self.delete(service).await
    }
}

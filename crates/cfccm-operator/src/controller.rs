//! Service controller
//!
//! Drives the load balancer surface from Service and Node events. Managed
//! Services get a finalizer so the Cloudflare resources are removed before the
//! Service disappears, and their `status.loadBalancer` is published once the
//! load balancer exists.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cfccm_common::annotations::{host_name, load_balancer_class};
use cfccm_common::naming::ResourceNames;
use cfccm_common::node::external_ip;
use cfccm_common::{AnnotationKeys, Error, FIELD_MANAGER};
use cfccm_load_balancer::{service_ref, CallLimits, HostLocks, LoadBalancerProvider};
use dashmap::DashMap;
use k8s_openapi::api::core::v1::{LoadBalancerStatus, Node, Service};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Event;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument};

#[cfg(test)]
use mockall::automock;

/// Service type handled by this controller
pub const LOAD_BALANCER_TYPE: &str = "LoadBalancer";

/// Requeue delay after a retryable failure
pub const RETRY_DELAY: Duration = Duration::from_secs(30);

/// Default periodic resync of managed Services
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Default bound on one reconciliation's Cloudflare calls
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// Traits for dependency injection and testability
// =============================================================================

/// Kubernetes operations needed by the Service controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceKubeClient: Send + Sync {
    /// List every Node in the cluster
    async fn list_nodes(&self) -> Result<Vec<Node>, Error>;

    /// Add a finalizer to a Service if missing
    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;

    /// Remove a finalizer from a Service
    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;

    /// Replace `status.loadBalancer` of a Service
    async fn patch_load_balancer_status(
        &self,
        namespace: &str,
        name: &str,
        status: &LoadBalancerStatus,
    ) -> Result<(), Error>;

    /// Drop every ingress entry from `status.loadBalancer`
    async fn clear_load_balancer_status(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct ServiceKubeClientImpl {
    client: Client,
}

impl ServiceKubeClientImpl {
    /// Create a new ServiceKubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl ServiceKubeClient for ServiceKubeClientImpl {
    async fn list_nodes(&self) -> Result<Vec<Node>, Error> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        Ok(nodes.list(&ListParams::default()).await?.items)
    }

    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.services(namespace);

        let service = api.get(name).await?;
        let mut finalizers = service.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(name, &patch_params(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.services(namespace);

        let service = match api.get_opt(name).await? {
            Some(service) => service,
            None => return Ok(()),
        };
        let finalizers: Vec<String> = service
            .metadata
            .finalizers
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != finalizer)
            .collect();

        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(name, &patch_params(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_load_balancer_status(
        &self,
        namespace: &str,
        name: &str,
        status: &LoadBalancerStatus,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({
            "status": {
                "loadBalancer": status
            }
        });
        self.services(namespace)
            .patch_status(name, &patch_params(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn clear_load_balancer_status(&self, namespace: &str, name: &str) -> Result<(), Error> {
        // A null removes the field under merge patch semantics
        let patch = serde_json::json!({
            "status": {
                "loadBalancer": {
                    "ingress": null
                }
            }
        });
        self.services(namespace)
            .patch_status(name, &patch_params(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Controller context
// =============================================================================

/// Shared state for Service reconciliation
pub struct Context {
    /// Kubernetes access
    pub kube: Arc<dyn ServiceKubeClient>,
    /// Cloudflare load balancer operations
    pub provider: Arc<dyn LoadBalancerProvider>,
    /// Annotation and finalizer keys
    pub keys: AnnotationKeys,
    /// Serializes reconciliations sharing a hostname
    pub locks: HostLocks,
    /// Deadline and shutdown signal for provider calls
    pub limits: CallLimits,
    /// Periodic requeue of managed Services
    pub resync_interval: Duration,
}

impl Context {
    /// Create a context backed by a real Kubernetes client
    pub fn new(
        client: Client,
        provider: Arc<dyn LoadBalancerProvider>,
        keys: AnnotationKeys,
        limits: CallLimits,
        resync_interval: Duration,
    ) -> Self {
        Self {
            kube: Arc::new(ServiceKubeClientImpl::new(client)),
            provider,
            keys,
            locks: HostLocks::new(),
            limits,
            resync_interval,
        }
    }

    /// Create a context for testing with mock clients
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn ServiceKubeClient>,
        provider: Arc<dyn LoadBalancerProvider>,
    ) -> Self {
        Self {
            kube,
            provider,
            keys: AnnotationKeys::default(),
            locks: HostLocks::new(),
            limits: CallLimits::new(
                DEFAULT_RECONCILE_TIMEOUT,
                tokio_util::sync::CancellationToken::new(),
            ),
            resync_interval: DEFAULT_RESYNC_INTERVAL,
        }
    }
}

// =============================================================================
// Service helpers
// =============================================================================

/// True for `type: LoadBalancer` Services without a `loadBalancerClass`
pub fn is_load_balancer_service(service: &Service) -> bool {
    let is_lb_type = service
        .spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        == Some(LOAD_BALANCER_TYPE);
    is_lb_type && load_balancer_class(service).is_none()
}

/// True when the Service carries `finalizer`
pub fn has_finalizer(service: &Service, finalizer: &str) -> bool {
    service.finalizers().iter().any(|f| f == finalizer)
}

/// Current `status.loadBalancer`, if any
pub fn current_status(service: &Service) -> Option<&LoadBalancerStatus> {
    service.status.as_ref()?.load_balancer.as_ref()
}

/// Hostname of the first published ingress entry
pub fn published_hostname(service: &Service) -> Option<&str> {
    current_status(service)?
        .ingress
        .as_ref()?
        .first()?
        .hostname
        .as_deref()
}

/// References to every Service this controller manages
pub fn managed_service_refs(
    services: &[Arc<Service>],
    keys: &AnnotationKeys,
) -> Vec<ObjectRef<Service>> {
    services
        .iter()
        .filter(|svc| is_load_balancer_service(svc) && host_name(svc, keys).is_ok())
        .map(|svc| ObjectRef::from_obj(svc.as_ref()))
        .collect()
}

/// Lock key for a hostname, shared by every spelling that maps to the same
/// remote resources
pub fn lock_key(host: &str) -> String {
    ResourceNames::for_host(host).load_balancer
}

/// Tracks each Node's external address so only membership changes fan out
#[derive(Clone, Default)]
pub struct NodeAddressCache {
    addresses: Arc<DashMap<String, Option<String>>>,
}

impl NodeAddressCache {
    /// Record a watch event and report whether Services need to see it
    ///
    /// Deletes always count. Init markers never do; the objects replayed
    /// during a relist go through [`NodeAddressCache::changed`].
    pub fn observe(&self, event: &Event<Node>) -> bool {
        match event {
            Event::Apply(node) | Event::InitApply(node) => self.changed(node),
            Event::Delete(node) => {
                self.addresses.remove(&node.name_any());
                true
            }
            Event::Init | Event::InitDone => false,
        }
    }

    /// Record `node` and report whether Services need to see it
    ///
    /// True for unseen Nodes, Nodes being deleted and Nodes whose external
    /// address changed.
    pub fn changed(&self, node: &Node) -> bool {
        let name = node.name_any();
        if node.metadata.deletion_timestamp.is_some() {
            self.addresses.remove(&name);
            return true;
        }

        let address = external_ip(node).map(str::to_string);
        match self.addresses.insert(name, address.clone()) {
            Some(previous) => previous != address,
            None => true,
        }
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Remove the Cloudflare resources of a Service
async fn cleanup(service: &Service, ctx: &Context) -> Result<(), Error> {
    let host = ctx.provider.get_load_balancer_name(service);
    let _guard = if host.is_empty() {
        None
    } else {
        Some(ctx.locks.lock(&lock_key(&host)).await)
    };

    ctx.limits
        .run("delete", ctx.provider.ensure_load_balancer_deleted(service))
        .await
}

/// Reconcile a Service
///
/// Services that are not ours (wrong type, a `loadBalancerClass`, no hostname
/// annotation) only get a leftover finalizer cleaned up, along with a status
/// this controller published. Managed Services are
/// ensured on first sight and updated once their status is published.
#[instrument(skip(service, ctx), fields(service = %service_ref(&service)))]
pub async fn reconcile(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action, Error> {
    let Some(namespace) = service.namespace() else {
        return Ok(Action::await_change());
    };
    let name = service.name_any();
    let finalizer = ctx.keys.finalizer();
    let finalized = has_finalizer(&service, &finalizer);

    let host = ctx.provider.get_load_balancer_name(&service);
    let managed = is_load_balancer_service(&service) && !host.is_empty();

    let deleting = service.metadata.deletion_timestamp.is_some();
    if deleting || !managed {
        if finalized {
            info!("removing load balancer");
            cleanup(&service, &ctx).await?;
            if !deleting && published_hostname(&service).is_some() {
                ctx.kube.clear_load_balancer_status(&namespace, &name).await?;
            }
            ctx.kube
                .remove_finalizer(&namespace, &name, &finalizer)
                .await?;
        } else {
            debug!("not managed, ignoring");
        }
        return Ok(Action::await_change());
    }

    if !finalized {
        ctx.kube.add_finalizer(&namespace, &name, &finalizer).await?;
    }

    let _guard = ctx.locks.lock(&lock_key(&host)).await;
    let nodes = ctx.kube.list_nodes().await?;
    let published = published_hostname(&service) == Some(host.as_str());
    let provider = Arc::clone(&ctx.provider);

    let status = ctx
        .limits
        .run("reconcile", async {
            if published && provider.get_load_balancer(&service).await?.is_some() {
                match provider.update_load_balancer(&service, &nodes).await {
                    Ok(()) => return Ok(None),
                    Err(e) if e.is_not_found() => {
                        debug!(error = %e, "update found resources missing, ensuring");
                    }
                    Err(e) => return Err(e),
                }
            }
            provider.ensure_load_balancer(&service, &nodes).await.map(Some)
        })
        .await?;

    if let Some(status) = status {
        if current_status(&service) != Some(&status) {
            ctx.kube
                .patch_load_balancer_status(&namespace, &name, &status)
                .await?;
            info!(%host, "published load balancer status");
        }
    }

    Ok(Action::requeue(ctx.resync_interval))
}

/// Error policy for the Service controller
pub fn error_policy(service: Arc<Service>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        service = %service_ref(&service),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(RETRY_DELAY)
    } else {
        Action::await_change()
    }
}

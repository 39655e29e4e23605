//! Converges one Service onto a Cloudflare monitor, pool and load balancer
//!
//! Resources depend on each other as `monitor <- pool <- load balancer`:
//! creation walks that chain forward, deletion walks it backward. Every step
//! checks remote state before acting, so a call interrupted halfway is
//! finished by the next one. Nothing is rolled back on failure.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use cfccm_cloudflare::types::{
    EXPECTED_CODES, HTTP_METHOD, LOAD_BALANCER_TTL, MONITOR_INTERVAL_SECS, MONITOR_RETRIES,
    MONITOR_TIMEOUT_SECS, TCP_METHOD,
};
use cfccm_cloudflare::{CloudflareApi, LoadBalancer, Monitor, Origin, Pool, ResourceClient};
use cfccm_common::annotations::{self, load_balancer_class};
use cfccm_common::naming::{origin_name, ResourceNames};
use cfccm_common::node::external_ip;
use cfccm_common::{AnnotationKeys, MonitorSpec, ResourceKind, Result};
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, Node, Service};
use tracing::{debug, info, instrument, warn};

/// Header carrying the virtual host for HTTP probes
const HOST_HEADER: &str = "Host";

/// `namespace/name` of a Service for logs
pub fn service_ref(service: &Service) -> String {
    format!(
        "{}/{}",
        service.metadata.namespace.as_deref().unwrap_or("default"),
        service.metadata.name.as_deref().unwrap_or("<unnamed>")
    )
}

/// Status advertising `host_name` as the ingress hostname
pub fn ingress_status(host_name: &str) -> LoadBalancerStatus {
    LoadBalancerStatus {
        ingress: Some(vec![LoadBalancerIngress {
            hostname: Some(host_name.to_string()),
            ..Default::default()
        }]),
    }
}

/// Monitor definition for a description and annotation-derived parameters
pub fn build_monitor(description: &str, spec: &MonitorSpec) -> Monitor {
    let http = spec.kind.is_http();

    let header = spec
        .host_header
        .as_ref()
        .filter(|_| http)
        .map(|host| BTreeMap::from([(HOST_HEADER.to_string(), vec![host.clone()])]));

    Monitor {
        id: String::new(),
        type_: spec.kind.as_str().to_string(),
        description: description.to_string(),
        method: Some(if http { HTTP_METHOD } else { TCP_METHOD }.to_string()),
        path: http.then(|| spec.path.clone()),
        header,
        port: spec.port,
        expected_codes: http.then(|| EXPECTED_CODES.to_string()),
        interval: MONITOR_INTERVAL_SECS,
        timeout: MONITOR_TIMEOUT_SECS,
        retries: MONITOR_RETRIES,
        follow_redirects: true,
        allow_insecure: spec.allow_insecure,
        probe_zone: spec.probe_zone.clone().filter(|_| http),
    }
}

/// Origins for every node with an external IP, in node order
///
/// Nodes without one are skipped with a warning. Addresses that map to an
/// origin name already used are dropped, the first node wins.
pub fn build_origins(nodes: &[Node]) -> Vec<Origin> {
    let mut seen = HashSet::new();
    let mut origins = Vec::with_capacity(nodes.len());

    for node in nodes {
        let node_name = node.metadata.name.as_deref().unwrap_or("<unnamed>");
        let Some(address) = external_ip(node) else {
            warn!(node = %node_name, "node has no external IP, skipping");
            continue;
        };

        let name = origin_name(address);
        if !seen.insert(name.clone()) {
            debug!(node = %node_name, %address, "duplicate origin address, skipping");
            continue;
        }

        origins.push(Origin {
            name,
            address: address.to_string(),
            enabled: true,
            weight: 1.0,
        });
    }

    origins
}

/// Load balancer reconciler bound to one Cloudflare account and zone
#[derive(Clone)]
pub struct LoadBalancers {
    resources: ResourceClient,
    keys: AnnotationKeys,
}

impl LoadBalancers {
    /// Create a reconciler over a Cloudflare transport
    pub fn new(api: Arc<dyn CloudflareApi>, keys: AnnotationKeys) -> Self {
        Self {
            resources: ResourceClient::new(api),
            keys,
        }
    }

    /// Hostname of a managed Service, `None` when it is not ours
    fn managed_host(&self, service: &Service) -> Result<Option<String>> {
        match annotations::host_name(service, &self.keys) {
            Ok(host) => Ok(Some(host)),
            Err(e) if e.is_not_managed() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Public name of the Service's load balancer, empty when not managed
    pub fn name(&self, service: &Service) -> String {
        annotations::host_name(service, &self.keys).unwrap_or_default()
    }

    /// Current status if the load balancer exists
    #[instrument(skip_all, fields(service = %service_ref(service)))]
    pub async fn status(&self, service: &Service) -> Result<Option<LoadBalancerStatus>> {
        let Some(host) = self.managed_host(service)? else {
            return Ok(None);
        };
        let names = ResourceNames::for_host(&host);

        match self.resources.get_load_balancer(&names.load_balancer).await {
            Ok(_) => Ok(Some(ingress_status(&host))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create whatever is missing and bring the pool's origins up to date
    #[instrument(skip_all, fields(service = %service_ref(service), nodes = nodes.len()))]
    pub async fn ensure(&self, service: &Service, nodes: &[Node]) -> Result<LoadBalancerStatus> {
        let desired = match annotations::desired_state(service, &self.keys) {
            Ok(desired) => desired,
            Err(e) if e.is_not_managed() => return Ok(LoadBalancerStatus::default()),
            Err(e) => return Err(e),
        };
        let names = ResourceNames::for_host(&desired.host_name);

        let monitor = self.ensure_monitor(&names, &desired.monitor).await?;
        debug!(monitor = %names.monitor, id = %monitor.id, "monitor present");

        let pool = self.ensure_pool(&names, &monitor, nodes).await?;
        debug!(pool = %names.pool, id = %pool.id, "pool present");

        let lb = self.ensure_load_balancer(&names, &pool).await?;
        info!(load_balancer = %lb.name, host = %desired.host_name, "load balancer ensured");

        Ok(ingress_status(&desired.host_name))
    }

    /// Refresh the pool's origins; never creates a pool or load balancer
    #[instrument(skip_all, fields(service = %service_ref(service), nodes = nodes.len()))]
    pub async fn update(&self, service: &Service, nodes: &[Node]) -> Result<()> {
        let desired = match annotations::desired_state(service, &self.keys) {
            Ok(desired) => desired,
            Err(e) if e.is_not_managed() => return Ok(()),
            Err(e) => return Err(e),
        };
        let names = ResourceNames::for_host(&desired.host_name);

        let monitor = self.ensure_monitor(&names, &desired.monitor).await?;
        self.update_pool(&names, &monitor, nodes).await?;
        Ok(())
    }

    /// Remove load balancer, pool and monitor, in that order
    ///
    /// Resources already gone count as deleted. The first other failure stops
    /// the sequence so nothing is left referencing a deleted resource.
    #[instrument(skip_all, fields(service = %service_ref(service)))]
    pub async fn delete(&self, service: &Service) -> Result<()> {
        if load_balancer_class(service).is_some() {
            return Ok(());
        }
        let Some(host) = self.managed_host(service)? else {
            return Ok(());
        };
        let names = ResourceNames::for_host(&host);

        let lb = self.resources.delete_load_balancer(&names.load_balancer).await;
        removal(ResourceKind::LoadBalancer, &names.load_balancer, lb)?;

        let pool = self.resources.delete_pool(&names.pool).await;
        removal(ResourceKind::Pool, &names.pool, pool)?;

        let monitor = self.resources.delete_monitor(&names.monitor).await;
        removal(ResourceKind::Monitor, &names.monitor, monitor)?;

        Ok(())
    }

    async fn ensure_monitor(&self, names: &ResourceNames, spec: &MonitorSpec) -> Result<Monitor> {
        match self.resources.get_monitor(&names.monitor).await {
            Ok(monitor) => Ok(monitor),
            Err(e) if e.is_not_found() => {
                info!(monitor = %names.monitor, kind = %spec.kind, "creating monitor");
                self.resources
                    .create_monitor(&build_monitor(&names.monitor, spec))
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_pool(
        &self,
        names: &ResourceNames,
        monitor: &Monitor,
        nodes: &[Node],
    ) -> Result<Pool> {
        match self.resources.get_pool(&names.pool).await {
            Ok(_) => self.update_pool(names, monitor, nodes).await,
            Err(e) if e.is_not_found() => {
                let pool = Pool {
                    id: String::new(),
                    name: names.pool.clone(),
                    monitor: Some(monitor.id.clone()),
                    origins: build_origins(nodes),
                    enabled: true,
                };
                info!(pool = %names.pool, origins = pool.origins.len(), "creating pool");
                self.resources.create_pool(&pool).await
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the pool's origin list with one built from `nodes`
    async fn update_pool(
        &self,
        names: &ResourceNames,
        monitor: &Monitor,
        nodes: &[Node],
    ) -> Result<Pool> {
        let existing = self.resources.get_pool(&names.pool).await?;

        let pool = Pool {
            id: existing.id,
            name: existing.name,
            monitor: Some(monitor.id.clone()),
            origins: build_origins(nodes),
            enabled: true,
        };
        info!(pool = %pool.name, origins = pool.origins.len(), "updating pool origins");
        self.resources.update_pool(&pool).await
    }

    async fn ensure_load_balancer(
        &self,
        names: &ResourceNames,
        pool: &Pool,
    ) -> Result<LoadBalancer> {
        match self.resources.get_load_balancer(&names.load_balancer).await {
            Ok(existing) => {
                let points_at_pool = existing.fallback_pool == pool.id
                    && existing.default_pools == [pool.id.as_str()];
                if !points_at_pool {
                    debug!(
                        load_balancer = %existing.name,
                        fallback_pool = %existing.fallback_pool,
                        default_pools = ?existing.default_pools,
                        pool = %pool.id,
                        "existing load balancer does not point at the pool, leaving it unchanged"
                    );
                }
                Ok(existing)
            }
            Err(e) if e.is_not_found() => {
                let lb = LoadBalancer {
                    id: String::new(),
                    name: names.load_balancer.clone(),
                    fallback_pool: pool.id.clone(),
                    default_pools: vec![pool.id.clone()],
                    ttl: Some(LOAD_BALANCER_TTL),
                    proxied: true,
                };
                info!(load_balancer = %lb.name, pool = %pool.id, "creating load balancer");
                self.resources.create_load_balancer(&lb).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Outcome of one delete step
#[derive(Debug, PartialEq, Eq)]
enum Removal {
    Deleted,
    AlreadyAbsent,
}

/// Log a delete step, counting a missing resource as done
fn removal(kind: ResourceKind, name: &str, result: Result<()>) -> Result<Removal> {
    match result {
        Ok(()) => {
            info!(%name, "deleted {kind}");
            Ok(Removal::Deleted)
        }
        Err(e) if e.is_not_found() => {
            debug!(%name, "{kind} already absent");
            Ok(Removal::AlreadyAbsent)
        }
        Err(e) => Err(e),
    }
}

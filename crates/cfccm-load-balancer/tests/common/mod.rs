//! In-memory Cloudflare account for reconciliation tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cfccm_cloudflare::types::Account;
use cfccm_cloudflare::{ApiError, CloudflareApi, LoadBalancer, Monitor, Pool};
use cfccm_common::AnnotationKeys;
use k8s_openapi::api::core::v1::{Node, NodeAddress, NodeStatus, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub const ACCOUNT_ID: &str = "acct-test";

#[derive(Default)]
struct State {
    next_id: u64,
    monitors: BTreeMap<String, Monitor>,
    pools: BTreeMap<String, Pool>,
    load_balancers: BTreeMap<String, LoadBalancer>,
    calls: Vec<String>,
    fail_on: Option<String>,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn record(&mut self, call: &str) -> Result<(), ApiError> {
        self.calls.push(call.to_string());
        if self.fail_on.as_deref() == Some(call) {
            return Err(ApiError::Api {
                status: 500,
                message: format!("injected failure on {call}"),
            });
        }
        Ok(())
    }
}

/// Account-and-zone store that records every call
#[derive(Clone, Default)]
pub struct FakeCloudflare {
    state: Arc<Mutex<State>>,
}

impl FakeCloudflare {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api(&self) -> Arc<dyn CloudflareApi> {
        Arc::new(self.clone())
    }

    /// Make every later call with this name fail
    pub fn fail_on(&self, call: &str) {
        self.state.lock().unwrap().fail_on = Some(call.to_string());
    }

    pub fn clear_failure(&self) {
        self.state.lock().unwrap().fail_on = None;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that changed remote state
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("list_") && !c.starts_with("get_"))
            .collect()
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn monitors(&self) -> Vec<Monitor> {
        self.state.lock().unwrap().monitors.values().cloned().collect()
    }

    pub fn pools(&self) -> Vec<Pool> {
        self.state.lock().unwrap().pools.values().cloned().collect()
    }

    pub fn load_balancers(&self) -> Vec<LoadBalancer> {
        self.state
            .lock()
            .unwrap()
            .load_balancers
            .values()
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.monitors.is_empty() && state.pools.is_empty() && state.load_balancers.is_empty()
    }
}

fn not_found(what: &str, id: &str) -> ApiError {
    ApiError::Api {
        status: 404,
        message: format!("{what} {id} not found"),
    }
}

#[async_trait]
impl CloudflareApi for FakeCloudflare {
    async fn get_account(&self) -> Result<Account, ApiError> {
        self.state.lock().unwrap().record("get_account")?;
        Ok(Account {
            id: ACCOUNT_ID.to_string(),
            name: "Test".to_string(),
        })
    }

    async fn list_monitors(&self) -> Result<Vec<Monitor>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record("list_monitors")?;
        Ok(state.monitors.values().cloned().collect())
    }

    async fn create_monitor(&self, monitor: &Monitor) -> Result<Monitor, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record("create_monitor")?;
        let created = Monitor {
            id: state.id("mon-"),
            ..monitor.clone()
        };
        state.monitors.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<Monitor, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record("update_monitor")?;
        if !state.monitors.contains_key(&monitor.id) {
            return Err(not_found("monitor", &monitor.id));
        }
        state.monitors.insert(monitor.id.clone(), monitor.clone());
        Ok(monitor.clone())
    }

    async fn delete_monitor(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record("delete_monitor")?;
        if state.pools.values().any(|p| p.monitor.as_deref() == Some(id)) {
            return Err(ApiError::Api {
                status: 400,
                message: "monitor is referenced by a pool".to_string(),
            });
        }
        state
            .monitors
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("monitor", id))
    }

    async fn list_pools(&self) -> Result<Vec<Pool>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record("list_pools")?;
        Ok(state.pools.values().cloned().collect())
    }

    async fn create_pool(&self, pool: &Pool) -> Result<Pool, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record("create_pool")?;
        if let Some(monitor) = pool.monitor.as_deref() {
            if !state.monitors.contains_key(monitor) {
                return Err(not_found("monitor", monitor));
            }
        }
        let created = Pool {
            id: state.id("pool-"),
            ..pool.clone()
        };
        state.pools.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_pool(&self, pool: &Pool) -> Result<Pool, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record("update_pool")?;
        if !state.pools.contains_key(&pool.id) {
            return Err(not_found("pool", &pool.id));
        }
        state.pools.insert(pool.id.clone(), pool.clone());
        Ok(pool.clone())
    }

    async fn delete_pool(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record("delete_pool")?;
        let referenced = state
            .load_balancers
            .values()
            .any(|lb| lb.fallback_pool == id || lb.default_pools.iter().any(|p| p == id));
        if referenced {
            return Err(ApiError::Api {
                status: 400,
                message: "pool is referenced by a load balancer".to_string(),
            });
        }
        state
            .pools
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("pool", id))
    }

    async fn list_load_balancers(&self) -> Result<Vec<LoadBalancer>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record("list_load_balancers")?;
        Ok(state.load_balancers.values().cloned().collect())
    }

    async fn create_load_balancer(&self, lb: &LoadBalancer) -> Result<LoadBalancer, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record("create_load_balancer")?;
        if !state.pools.contains_key(&lb.fallback_pool) {
            return Err(not_found("pool", &lb.fallback_pool));
        }
        let created = LoadBalancer {
            id: state.id("lb-"),
            ..lb.clone()
        };
        state.load_balancers.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_load_balancer(&self, lb: &LoadBalancer) -> Result<LoadBalancer, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record("update_load_balancer")?;
        if !state.load_balancers.contains_key(&lb.id) {
            return Err(not_found("load balancer", &lb.id));
        }
        state.load_balancers.insert(lb.id.clone(), lb.clone());
        Ok(lb.clone())
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.record("delete_load_balancer")?;
        state
            .load_balancers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("load balancer", id))
    }
}

// =============================================================================
// Kubernetes fixtures
// =============================================================================

pub fn service(host: Option<&str>, extra: &[(String, String)]) -> Service {
    let keys = AnnotationKeys::default();
    let mut annotations: BTreeMap<String, String> = extra.iter().cloned().collect();
    if let Some(host) = host {
        annotations.insert(keys.hostname(), host.to_string());
    }

    Service {
        metadata: ObjectMeta {
            name: Some("web".to_string()),
            namespace: Some("default".to_string()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            ports: Some(vec![ServicePort {
                port: 80,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn node(name: &str, external_ip: Option<&str>) -> Node {
    let mut addresses = vec![NodeAddress {
        type_: "InternalIP".to_string(),
        address: "10.0.0.1".to_string(),
    }];
    if let Some(ip) = external_ip {
        addresses.push(NodeAddress {
            type_: "ExternalIP".to_string(),
            address: ip.to_string(),
        });
    }

    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        status: Some(NodeStatus {
            addresses: Some(addresses),
            ..Default::default()
        }),
        ..Default::default()
    }
}

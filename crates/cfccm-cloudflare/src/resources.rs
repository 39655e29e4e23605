//! Name-keyed CRUD over monitors, pools and load balancers
//!
//! Cloudflare addresses resources by id, the controller by logical name.
//! Lookups list the whole scope and scan for an exact match; nothing is cached
//! between calls, so every reconciliation sees current remote state.

use std::sync::Arc;

use cfccm_common::{Error, ResourceKind, Result};
use tracing::debug;

use crate::api::{ApiError, CloudflareApi};
use crate::types::{Account, LoadBalancer, Monitor, Pool};

fn remote_error(kind: ResourceKind, name: &str, err: ApiError) -> Error {
    Error::remote(kind, name, err.to_string())
}

fn delete_error(kind: ResourceKind, name: &str, err: ApiError) -> Error {
    if err.is_not_found() {
        Error::not_found(kind, name)
    } else {
        remote_error(kind, name, err)
    }
}

fn require_id(kind: ResourceKind, name: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::remote(kind, name, "update requires the resource id"));
    }
    Ok(())
}

/// Name-keyed client over a [`CloudflareApi`]
#[derive(Clone)]
pub struct ResourceClient {
    api: Arc<dyn CloudflareApi>,
}

impl ResourceClient {
    /// Wrap a transport
    pub fn new(api: Arc<dyn CloudflareApi>) -> Self {
        Self { api }
    }

    /// Confirm the credentials reach the expected account
    pub async fn verify_account(&self, account_id: &str) -> Result<Account> {
        if account_id.is_empty() {
            return Err(Error::config("account id not provided"));
        }

        let account = self
            .api
            .get_account()
            .await
            .map_err(|e| remote_error(ResourceKind::Account, account_id, e))?;

        if account.id != account_id {
            return Err(Error::config(format!(
                "credentials resolve to account {:?}, expected {account_id:?}",
                account.id
            )));
        }
        Ok(account)
    }

    // =========================================================================
    // Monitors
    // =========================================================================

    /// Find a monitor by description
    pub async fn get_monitor(&self, description: &str) -> Result<Monitor> {
        let monitors = self
            .api
            .list_monitors()
            .await
            .map_err(|e| remote_error(ResourceKind::Monitor, description, e))?;

        monitors
            .into_iter()
            .find(|m| m.description == description)
            .ok_or_else(|| Error::not_found(ResourceKind::Monitor, description))
    }

    /// Create a monitor
    pub async fn create_monitor(&self, monitor: &Monitor) -> Result<Monitor> {
        debug!(monitor = %monitor.description, "creating monitor");
        self.api
            .create_monitor(monitor)
            .await
            .map_err(|e| remote_error(ResourceKind::Monitor, &monitor.description, e))
    }

    /// Replace a monitor, `monitor.id` must be set
    pub async fn update_monitor(&self, monitor: &Monitor) -> Result<Monitor> {
        require_id(ResourceKind::Monitor, &monitor.description, &monitor.id)?;
        self.api
            .update_monitor(monitor)
            .await
            .map_err(|e| remote_error(ResourceKind::Monitor, &monitor.description, e))
    }

    /// Delete the monitor with this description
    pub async fn delete_monitor(&self, description: &str) -> Result<()> {
        let monitor = self.get_monitor(description).await?;
        debug!(monitor = %description, id = %monitor.id, "deleting monitor");
        self.api
            .delete_monitor(&monitor.id)
            .await
            .map_err(|e| delete_error(ResourceKind::Monitor, description, e))
    }

    // =========================================================================
    // Pools
    // =========================================================================

    /// Find a pool by name
    pub async fn get_pool(&self, name: &str) -> Result<Pool> {
        let pools = self
            .api
            .list_pools()
            .await
            .map_err(|e| remote_error(ResourceKind::Pool, name, e))?;

        pools
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::not_found(ResourceKind::Pool, name))
    }

    /// Create a pool
    pub async fn create_pool(&self, pool: &Pool) -> Result<Pool> {
        debug!(pool = %pool.name, origins = pool.origins.len(), "creating pool");
        self.api
            .create_pool(pool)
            .await
            .map_err(|e| remote_error(ResourceKind::Pool, &pool.name, e))
    }

    /// Replace a pool (including its whole origin list), `pool.id` must be set
    pub async fn update_pool(&self, pool: &Pool) -> Result<Pool> {
        require_id(ResourceKind::Pool, &pool.name, &pool.id)?;
        debug!(pool = %pool.name, origins = pool.origins.len(), "updating pool");
        self.api
            .update_pool(pool)
            .await
            .map_err(|e| remote_error(ResourceKind::Pool, &pool.name, e))
    }

    /// Delete the pool with this name
    pub async fn delete_pool(&self, name: &str) -> Result<()> {
        let pool = self.get_pool(name).await?;
        debug!(pool = %name, id = %pool.id, "deleting pool");
        self.api
            .delete_pool(&pool.id)
            .await
            .map_err(|e| delete_error(ResourceKind::Pool, name, e))
    }

    // =========================================================================
    // Load balancers
    // =========================================================================

    /// Find a load balancer by name
    pub async fn get_load_balancer(&self, name: &str) -> Result<LoadBalancer> {
        let lbs = self
            .api
            .list_load_balancers()
            .await
            .map_err(|e| remote_error(ResourceKind::LoadBalancer, name, e))?;

        lbs.into_iter()
            .find(|lb| lb.name == name)
            .ok_or_else(|| Error::not_found(ResourceKind::LoadBalancer, name))
    }

    /// Create a load balancer
    pub async fn create_load_balancer(&self, lb: &LoadBalancer) -> Result<LoadBalancer> {
        debug!(load_balancer = %lb.name, "creating load balancer");
        self.api
            .create_load_balancer(lb)
            .await
            .map_err(|e| remote_error(ResourceKind::LoadBalancer, &lb.name, e))
    }

    /// Replace a load balancer, `lb.id` must be set
    pub async fn update_load_balancer(&self, lb: &LoadBalancer) -> Result<LoadBalancer> {
        require_id(ResourceKind::LoadBalancer, &lb.name, &lb.id)?;
        self.api
            .update_load_balancer(lb)
            .await
            .map_err(|e| remote_error(ResourceKind::LoadBalancer, &lb.name, e))
    }

    /// Delete the load balancer with this name
    pub async fn delete_load_balancer(&self, name: &str) -> Result<()> {
        let lb = self.get_load_balancer(name).await?;
        debug!(load_balancer = %name, id = %lb.id, "deleting load balancer");
        self.api
            .delete_load_balancer(&lb.id)
            .await
            .map_err(|e| delete_error(ResourceKind::LoadBalancer, name, e))
    }
}

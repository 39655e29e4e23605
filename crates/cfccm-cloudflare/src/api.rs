//! Transport-level seam over the Cloudflare load balancing endpoints
//!
//! `CloudflareApi` speaks in provider ids. Name-keyed lookups live one layer
//! up in [`crate::resources::ResourceClient`].

use async_trait::async_trait;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use thiserror::Error;

use crate::types::{Account, LoadBalancer, Monitor, Pool};

/// Errors returned by the HTTP transport
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request never produced a response (DNS, TLS, timeout, ...)
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx response without a usable envelope
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Envelope reported `success: false`
    #[error("api error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Joined envelope errors
        message: String,
    },
}

impl ApiError {
    /// HTTP status of the failure, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } | ApiError::Api { status, .. } => Some(*status),
            ApiError::Transport(_) | ApiError::Decode(_) => None,
        }
    }

    /// True when the provider answered 404
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ApiError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => ApiError::Decode(err.to_string()),
            None => ApiError::Transport(err.to_string()),
        }
    }
}

/// Cloudflare load balancing API, scoped to one account and zone
///
/// Monitors and pools are account scoped, load balancers zone scoped.
/// List calls return every page.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait CloudflareApi: Send + Sync {
    /// Fetch the configured account
    async fn get_account(&self) -> Result<Account, ApiError>;

    /// List all monitors in the account
    async fn list_monitors(&self) -> Result<Vec<Monitor>, ApiError>;

    /// Create a monitor
    async fn create_monitor(&self, monitor: &Monitor) -> Result<Monitor, ApiError>;

    /// Replace the monitor with `monitor.id`
    async fn update_monitor(&self, monitor: &Monitor) -> Result<Monitor, ApiError>;

    /// Delete a monitor by id
    async fn delete_monitor(&self, id: &str) -> Result<(), ApiError>;

    /// List all pools in the account
    async fn list_pools(&self) -> Result<Vec<Pool>, ApiError>;

    /// Create a pool
    async fn create_pool(&self, pool: &Pool) -> Result<Pool, ApiError>;

    /// Replace the pool with `pool.id`
    async fn update_pool(&self, pool: &Pool) -> Result<Pool, ApiError>;

    /// Delete a pool by id
    async fn delete_pool(&self, id: &str) -> Result<(), ApiError>;

    /// List all load balancers in the zone
    async fn list_load_balancers(&self) -> Result<Vec<LoadBalancer>, ApiError>;

    /// Create a load balancer
    async fn create_load_balancer(&self, lb: &LoadBalancer) -> Result<LoadBalancer, ApiError>;

    /// Replace the load balancer with `lb.id`
    async fn update_load_balancer(&self, lb: &LoadBalancer) -> Result<LoadBalancer, ApiError>;

    /// Delete a load balancer by id
    async fn delete_load_balancer(&self, id: &str) -> Result<(), ApiError>;
}

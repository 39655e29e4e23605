//! Cloudflare v4 wire types for load balancing resources
//!
//! Only the fields the controller reads or writes are modelled. Unknown fields
//! in responses (timestamps, steering settings, ...) are ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Expected status codes for HTTP monitors
pub const EXPECTED_CODES: &str = "2xx";

/// Seconds between health checks
pub const MONITOR_INTERVAL_SECS: u32 = 60;

/// Seconds before a health check times out
pub const MONITOR_TIMEOUT_SECS: u32 = 5;

/// Retries before an origin is marked unhealthy
pub const MONITOR_RETRIES: u32 = 2;

/// HTTP method for HTTP(S) monitors
pub const HTTP_METHOD: &str = "GET";

/// Method value Cloudflare requires for TCP monitors
pub const TCP_METHOD: &str = "connection_established";

/// DNS TTL of created load balancers
pub const LOAD_BALANCER_TTL: u32 = 30;

/// Health monitor definition
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    /// Provider assigned id, empty before creation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Protocol (`http`, `https`, `tcp`)
    #[serde(rename = "type", default)]
    pub type_: String,
    /// Used as the monitor's logical name
    #[serde(default)]
    pub description: String,
    /// Probe method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Probe path (HTTP kinds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Request headers (HTTP kinds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<BTreeMap<String, Vec<String>>>,
    /// Port to probe; provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Accepted status codes (HTTP kinds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_codes: Option<String>,
    /// Seconds between probes
    #[serde(default)]
    pub interval: u32,
    /// Probe timeout in seconds
    #[serde(default)]
    pub timeout: u32,
    /// Retries before marking unhealthy
    #[serde(default)]
    pub retries: u32,
    /// Follow 3xx responses
    #[serde(default)]
    pub follow_redirects: bool,
    /// Skip certificate verification
    #[serde(default)]
    pub allow_insecure: bool,
    /// Zone to emulate while probing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_zone: Option<String>,
}

/// One backend inside a pool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    /// Unique within the pool
    pub name: String,
    /// IP address or hostname
    pub address: String,
    /// Whether traffic is sent to this origin
    #[serde(default)]
    pub enabled: bool,
    /// Relative weight (0.0 - 1.0)
    #[serde(default)]
    pub weight: f64,
}

/// Named group of origins bound to a monitor
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    /// Provider assigned id, empty before creation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Logical name
    pub name: String,
    /// Monitor id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,
    /// Backends, replaced wholesale on update
    #[serde(default)]
    pub origins: Vec<Origin>,
    /// Whether the pool serves traffic
    #[serde(default)]
    pub enabled: bool,
}

/// Zone level load balancer
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    /// Provider assigned id, empty before creation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// DNS name of the load balancer
    pub name: String,
    /// Pool used when every default pool is unhealthy
    #[serde(default)]
    pub fallback_pool: String,
    /// Pools in failover order
    #[serde(default)]
    pub default_pools: Vec<String>,
    /// DNS TTL (ignored by Cloudflare when proxied)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    /// Orange-cloud proxying
    #[serde(default)]
    pub proxied: bool,
}

/// Account details returned by the startup probe
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Account {
    /// Account id
    pub id: String,
    /// Account display name
    #[serde(default)]
    pub name: String,
}

/// Error or informational message in a response envelope
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ApiMessage {
    /// Cloudflare error code
    #[serde(default)]
    pub code: i64,
    /// Message text
    #[serde(default)]
    pub message: String,
}

/// Pagination block of list responses
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ResultInfo {
    /// Current page (1-based)
    #[serde(default)]
    pub page: u32,
    /// Page size
    #[serde(default)]
    pub per_page: u32,
    /// Items on this page
    #[serde(default)]
    pub count: u32,
    /// Items across all pages
    #[serde(default)]
    pub total_count: u32,
    /// Page count, absent on some endpoints
    #[serde(default)]
    pub total_pages: Option<u32>,
}

impl ResultInfo {
    /// Whether a page after this one exists
    pub fn has_next_page(&self) -> bool {
        match self.total_pages {
            Some(total) => self.page < total,
            None => self.per_page > 0 && self.page.saturating_mul(self.per_page) < self.total_count,
        }
    }
}

/// Standard v4 response envelope
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded
    #[serde(default)]
    pub success: bool,
    /// Errors reported by the API
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    /// Informational messages
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
    /// Payload
    pub result: Option<T>,
    /// Pagination, list endpoints only
    #[serde(default)]
    pub result_info: Option<ResultInfo>,
}

impl<T> ApiResponse<T> {
    /// Join all error messages as `code: message`
    pub fn error_text(&self) -> String {
        if self.errors.is_empty() {
            return "unknown error".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

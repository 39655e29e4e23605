//! Deterministic names for the remote resources backing one hostname
//!
//! Cloudflare rejects names outside `[A-Za-z0-9_.-]`. Every name derived here
//! goes through [`format_resource_name`] so repeated reconciliations of the same
//! hostname always address the same monitor, pool and load balancer.

/// Suffix appended to the hostname to name its origin pool
pub const POOL_SUFFIX: &str = "-pool";

/// Suffix appended to the hostname to name its health monitor
pub const MONITOR_SUFFIX: &str = "-monitor";

/// Replace every character outside `[A-Za-z0-9_.-]` with `_`
pub fn format_resource_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The set of remote names derived from one hostname
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceNames {
    /// Load balancer name (the sanitized hostname)
    pub load_balancer: String,
    /// Origin pool name
    pub pool: String,
    /// Monitor description (monitors have no name field)
    pub monitor: String,
}

impl ResourceNames {
    /// Derive all resource names for a hostname
    pub fn for_host(host_name: &str) -> Self {
        Self {
            load_balancer: format_resource_name(host_name),
            pool: format_resource_name(&format!("{host_name}{POOL_SUFFIX}")),
            monitor: format_resource_name(&format!("{host_name}{MONITOR_SUFFIX}")),
        }
    }
}

/// Origin name for a backend address
pub fn origin_name(address: &str) -> String {
    format_resource_name(address)
}

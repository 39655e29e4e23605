//! Load balancer reconciliation for Services annotated with a Cloudflare
//! hostname
//!
//! [`LoadBalancers`] maps one Service onto a monitor, an origin pool and a load
//! balancer and keeps the pool's origins in step with the cluster's nodes.
//! [`HostLocks`] and [`CallLimits`] bound how reconciliations run.

#![deny(missing_docs)]

pub mod deadline;
pub mod lock;
pub mod provider;
pub mod reconciler;

pub use deadline::CallLimits;
pub use lock::{HostGuard, HostLocks};
pub use provider::LoadBalancerProvider;
pub use reconciler::{build_monitor, build_origins, ingress_status, service_ref, LoadBalancers};

#[cfg(any(test, feature = "mock"))]
pub use provider::MockLoadBalancerProvider;

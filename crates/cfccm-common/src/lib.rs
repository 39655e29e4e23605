//! Common types for the Cloudflare load balancer controller: errors, resource
//! naming, annotation parsing and logging setup

#![deny(missing_docs)]

pub mod annotations;
pub mod error;
pub mod naming;
pub mod node;
pub mod telemetry;

pub use annotations::{AnnotationKeys, DesiredState, MonitorKind, MonitorSpec};
pub use error::{Error, ResourceKind};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Provider name reported in logs and events
pub const PROVIDER_NAME: &str = "cloudflare";

/// Field manager recorded on finalizer and status merge patches
pub const FIELD_MANAGER: &str = "cloudflare-load-balancer-controller";

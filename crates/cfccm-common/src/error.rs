//! Error types for the Cloudflare load balancer controller
//!
//! Errors carry the resource kind and logical name they relate to, so a
//! failure surfaced on a Service event reads on its own without the logs.

use std::fmt;

use thiserror::Error;

/// The remote resource kinds managed by the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Health monitor (account scoped)
    Monitor,
    /// Origin pool (account scoped)
    Pool,
    /// Load balancer (zone scoped)
    LoadBalancer,
    /// Account, only used by the startup probe
    Account,
}

impl ResourceKind {
    /// Human readable name used in errors and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Monitor => "monitor",
            ResourceKind::Pool => "pool",
            ResourceKind::LoadBalancer => "load balancer",
            ResourceKind::Account => "account",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for load balancer reconciliation
#[derive(Debug, Error)]
pub enum Error {
    /// The Service carries no hostname annotation and is not ours to manage
    #[error("service is not managed by this controller (no hostname annotation)")]
    NotManaged,

    /// A remote resource looked up by its logical name does not exist
    #[error("{kind} {name:?} not found")]
    NotFound {
        /// Kind of the missing resource
        kind: ResourceKind,
        /// Logical name (or monitor description) used for the lookup
        name: String,
    },

    /// An annotation value could not be parsed
    #[error("invalid value {value:?} for {key}: {message}")]
    InvalidConfigValue {
        /// Full annotation key
        key: String,
        /// The offending raw value
        value: String,
        /// What was expected
        message: String,
    },

    /// Transport or provider side failure
    #[error("cloudflare error [{kind} {name:?}]: {message}")]
    Remote {
        /// Kind of the resource being operated on
        kind: ResourceKind,
        /// Logical name of the resource being operated on
        name: String,
        /// Provider or transport error text
        message: String,
    },

    /// Process configuration error (startup only)
    #[error("configuration error: {message}")]
    Config {
        /// Description of every problem found
        message: String,
    },

    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The call deadline fired before the operation finished
    #[error("deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// Operation that was aborted
        operation: String,
    },

    /// The call was cancelled (e.g. controller shutdown)
    #[error("cancelled during {operation}")]
    Cancelled {
        /// Operation that was aborted
        operation: String,
    },
}

impl Error {
    /// Create a not-found error for a resource kind and logical name
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create an invalid-annotation error
    pub fn invalid_config_value(
        key: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidConfigValue {
            key: key.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create a remote error annotated with resource kind and name
    pub fn remote(kind: ResourceKind, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            kind,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a deadline error for the named operation
    pub fn deadline_exceeded(operation: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
        }
    }

    /// Create a cancellation error for the named operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// True for the "hostname annotation absent" signal
    pub fn is_not_managed(&self) -> bool {
        matches!(self, Error::NotManaged)
    }

    /// True when a remote resource was absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if this error is retryable
    ///
    /// Annotation and configuration errors need a human to change something.
    /// Everything remote may clear up on the next resync.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NotManaged => false,
            Error::NotFound { .. } => true,
            Error::InvalidConfigValue { .. } => false,
            Error::Remote { .. } => true,
            Error::Config { .. } => false,
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    !(400..500).contains(&ae.code) || ae.code == 409 || ae.code == 429
                }
                _ => true,
            },
            Error::DeadlineExceeded { .. } => true,
            Error::Cancelled { .. } => false,
        }
    }

    /// The resource kind this error is about, if any
    pub fn kind(&self) -> Option<ResourceKind> {
        match self {
            Error::NotFound { kind, .. } | Error::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

//! Command line flags
//!
//! Credentials come from the environment (see [`cfccm_cloudflare::config`]);
//! flags only tune how the controller runs.

use std::time::Duration;

use cfccm_cloudflare::client::DEFAULT_REQUEST_TIMEOUT;
use cfccm_cloudflare::{ClientOptions, DEFAULT_API_BASE_URL};
use cfccm_common::annotations::DEFAULT_ANNOTATION_DOMAIN;
use cfccm_common::telemetry::LogFormat;
use clap::{Parser, ValueEnum};

use crate::controller::{DEFAULT_RECONCILE_TIMEOUT, DEFAULT_RESYNC_INTERVAL};

/// Cloudflare load balancer controller for Kubernetes Services
#[derive(Parser, Debug)]
#[command(name = "cfccm-operator", version, about, long_about = None)]
pub struct Cli {
    /// Domain of the `cloudflare-load-balancer.<domain>/` annotations
    #[arg(long, env = "CFCCM_ANNOTATION_DOMAIN", default_value = DEFAULT_ANNOTATION_DOMAIN)]
    pub annotation_domain: String,

    /// Cloudflare API root
    #[arg(long, env = "CFCCM_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Timeout of a single Cloudflare request
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    pub request_timeout_secs: u64,

    /// Upper bound on the Cloudflare calls of one reconciliation
    #[arg(long, default_value_t = DEFAULT_RECONCILE_TIMEOUT.as_secs())]
    pub reconcile_timeout_secs: u64,

    /// Periodic resync of every managed Service
    #[arg(long, default_value_t = DEFAULT_RESYNC_INTERVAL.as_secs())]
    pub resync_interval_secs: u64,

    /// Log output format
    #[arg(long, env = "CFCCM_LOG_FORMAT", value_enum, default_value_t = Format::Json)]
    pub log_format: Format,
}

/// Log format flag values
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One JSON object per line
    Json,
    /// Human readable
    Text,
}

impl From<Format> for LogFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => LogFormat::Json,
            Format::Text => LogFormat::Text,
        }
    }
}

impl Cli {
    /// Transport settings for the Cloudflare client
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.api_base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Bound on one reconciliation
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Requeue delay for healthy Services
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}

//! Desired state extraction from Service annotations
//!
//! All keys live under `cloudflare-load-balancer.<domain>/`. Only `hostname`
//! is required; its absence means the Service belongs to someone else and is
//! reported as [`Error::NotManaged`]. Everything else falls back to a default,
//! except values that are present but malformed, which fail loudly.

use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::Service;

use crate::error::Error;
use crate::Result;

/// Annotation group shared by every key
pub const ANNOTATION_GROUP: &str = "cloudflare-load-balancer";

/// Domain used when none is configured
pub const DEFAULT_ANNOTATION_DOMAIN: &str = "clyent.dev";

/// Default monitor path
pub const DEFAULT_MONITOR_PATH: &str = "/";

const HOSTNAME: &str = "hostname";
const MONITOR_PATH: &str = "monitor-path";
const MONITOR_ALLOW_INSECURE: &str = "monitor-allow-insecure";
const MONITOR_TYPE: &str = "monitor-type";
const MONITOR_PROBE_ZONE: &str = "monitor-probe-zone";
const MONITOR_HEADER: &str = "monitor-header";
const FINALIZER: &str = "cleanup";

/// Fully qualified annotation keys for one annotation domain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationKeys {
    prefix: String,
}

impl Default for AnnotationKeys {
    fn default() -> Self {
        Self::new(DEFAULT_ANNOTATION_DOMAIN)
    }
}

impl AnnotationKeys {
    /// Keys under `cloudflare-load-balancer.<domain>/`
    pub fn new(domain: &str) -> Self {
        Self {
            prefix: format!("{ANNOTATION_GROUP}.{domain}/"),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    /// `.../hostname`
    pub fn hostname(&self) -> String {
        self.key(HOSTNAME)
    }

    /// `.../monitor-path`
    pub fn monitor_path(&self) -> String {
        self.key(MONITOR_PATH)
    }

    /// `.../monitor-allow-insecure`
    pub fn monitor_allow_insecure(&self) -> String {
        self.key(MONITOR_ALLOW_INSECURE)
    }

    /// `.../monitor-type`
    pub fn monitor_type(&self) -> String {
        self.key(MONITOR_TYPE)
    }

    /// `.../monitor-probe-zone`
    pub fn monitor_probe_zone(&self) -> String {
        self.key(MONITOR_PROBE_ZONE)
    }

    /// `.../monitor-header`
    pub fn monitor_header(&self) -> String {
        self.key(MONITOR_HEADER)
    }

    /// Finalizer placed on managed Services
    pub fn finalizer(&self) -> String {
        self.key(FINALIZER)
    }
}

/// Health check protocol
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MonitorKind {
    /// HTTP GET probe
    #[default]
    Http,
    /// HTTPS GET probe
    Https,
    /// TCP connect probe
    Tcp,
}

impl MonitorKind {
    /// Wire value used by Cloudflare
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorKind::Http => "http",
            MonitorKind::Https => "https",
            MonitorKind::Tcp => "tcp",
        }
    }

    /// Whether path, method and headers apply to this kind
    pub fn is_http(&self) -> bool {
        matches!(self, MonitorKind::Http | MonitorKind::Https)
    }
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(MonitorKind::Http),
            "https" => Ok(MonitorKind::Https),
            "tcp" => Ok(MonitorKind::Tcp),
            other => Err(format!("unknown monitor type {other:?}, expected http, https or tcp")),
        }
    }
}

/// Health monitor parameters derived from annotations
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorSpec {
    /// Probe protocol
    pub kind: MonitorKind,
    /// Probe path (HTTP kinds only)
    pub path: String,
    /// Skip TLS verification
    pub allow_insecure: bool,
    /// Port to probe, taken from the first Service port
    pub port: Option<u16>,
    /// Zone to emulate while probing
    pub probe_zone: Option<String>,
    /// `Host` header sent with HTTP probes
    pub host_header: Option<String>,
}

impl Default for MonitorSpec {
    fn default() -> Self {
        Self {
            kind: MonitorKind::default(),
            path: DEFAULT_MONITOR_PATH.to_string(),
            allow_insecure: false,
            port: None,
            probe_zone: None,
            host_header: None,
        }
    }
}

/// Fully defaulted desired configuration for one Service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredState {
    /// Public hostname of the load balancer
    pub host_name: String,
    /// Monitor parameters
    pub monitor: MonitorSpec,
}

fn annotation<'a>(service: &'a Service, key: &str) -> Option<&'a str> {
    service
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

/// Hostname annotation, or [`Error::NotManaged`] when absent or blank
pub fn host_name(service: &Service, keys: &AnnotationKeys) -> Result<String> {
    match annotation(service, &keys.hostname()).map(str::trim) {
        Some(host) if !host.is_empty() => Ok(host.to_string()),
        _ => Err(Error::NotManaged),
    }
}

/// Parse a boolean the way Go's `strconv.ParseBool` does
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// The `loadBalancerClass` of the Service, if one is set
pub fn load_balancer_class(service: &Service) -> Option<&str> {
    service
        .spec
        .as_ref()
        .and_then(|s| s.load_balancer_class.as_deref())
}

fn first_port(service: &Service) -> Option<u16> {
    service
        .spec
        .as_ref()?
        .ports
        .as_ref()?
        .first()
        .and_then(|p| u16::try_from(p.port).ok())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Extract the desired state from a Service
pub fn desired_state(service: &Service, keys: &AnnotationKeys) -> Result<DesiredState> {
    let host_name = host_name(service, keys)?;

    let path = non_empty(annotation(service, &keys.monitor_path()))
        .unwrap_or_else(|| DEFAULT_MONITOR_PATH.to_string());

    let allow_insecure = match annotation(service, &keys.monitor_allow_insecure()) {
        None => false,
        Some(raw) => parse_bool(raw.trim()).ok_or_else(|| {
            Error::invalid_config_value(keys.monitor_allow_insecure(), raw, "expected a boolean")
        })?,
    };

    let kind = match annotation(service, &keys.monitor_type()) {
        None => MonitorKind::default(),
        Some(raw) => raw
            .parse::<MonitorKind>()
            .map_err(|msg: String| Error::invalid_config_value(keys.monitor_type(), raw, msg))?,
    };

    Ok(DesiredState {
        host_name,
        monitor: MonitorSpec {
            kind,
            path,
            allow_insecure,
            port: first_port(service),
            probe_zone: non_empty(annotation(service, &keys.monitor_probe_zone())),
            host_header: non_empty(annotation(service, &keys.monitor_header())),
        },
    })
}

//! Cloudflare load balancing API access: configuration, wire types, the
//! reqwest transport and the name-keyed resource client used by the reconciler

#![deny(missing_docs)]

pub mod api;
pub mod client;
pub mod config;
pub mod resources;
pub mod types;

pub use api::{ApiError, CloudflareApi};
pub use client::{ClientOptions, CloudflareClient, DEFAULT_API_BASE_URL};
pub use config::{Credentials, ProviderConfig};
pub use resources::ResourceClient;
pub use types::{Account, LoadBalancer, Monitor, Origin, Pool};

#[cfg(any(test, feature = "mock"))]
pub use api::MockCloudflareApi;

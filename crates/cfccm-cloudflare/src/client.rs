//! reqwest implementation of [`CloudflareApi`] against the v4 REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::api::{ApiError, CloudflareApi};
use crate::config::Credentials;
use crate::types::{Account, ApiResponse, LoadBalancer, Monitor, Pool};

/// Production API endpoint
pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for list calls
const PER_PAGE: u32 = 50;

/// Upper bound on pages fetched by one list call
const MAX_PAGES: u32 = 1000;

/// Longest response body kept in an error message
const MAX_ERROR_BODY: usize = 512;

/// Transport settings
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// API root, overridable for tests and proxies
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Cloudflare client scoped to one account and one zone
#[derive(Clone)]
pub struct CloudflareClient {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
    zone_id: String,
}

impl CloudflareClient {
    /// Build a client with bearer authentication
    pub fn new(credentials: &Credentials, options: &ClientOptions) -> Result<Self, ApiError> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", credentials.api_token))
            .map_err(|e| ApiError::Transport(format!("invalid API token: {e}")))?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.request_timeout)
            .user_agent(concat!("cfccm/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            account_id: credentials.account_id.clone(),
            zone_id: credentials.zone_id.clone(),
        })
    }

    fn account_url(&self, path: &str) -> String {
        format!("{}/accounts/{}{}", self.base_url, self.account_id, path)
    }

    fn zone_url(&self, path: &str) -> String {
        format!("{}/zones/{}{}", self.base_url, self.zone_id, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!(%method, url, "cloudflare request");
        self.http.request(method, url)
    }

    /// Send a request and unwrap the envelope
    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<ApiResponse<T>, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(ApiError::Decode(e.to_string())),
            Err(_) => {
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    message: truncate(&body),
                })
            }
        };

        if !status.is_success() || !envelope.success {
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: envelope.error_text(),
            });
        }

        Ok(envelope)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        self.execute::<T>(request)
            .await?
            .result
            .ok_or_else(|| ApiError::Decode("response carried no result".to_string()))
    }

    async fn send_json<B, T>(&self, method: Method, url: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.fetch(self.request(method, url).json(body)).await
    }

    async fn delete(&self, url: &str) -> Result<(), ApiError> {
        self.execute::<serde_json::Value>(self.request(Method::DELETE, url))
            .await
            .map(|_| ())
    }

    /// Fetch every page of a list endpoint
    async fn list_all<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();

        for page in 1..=MAX_PAGES {
            let request = self
                .request(Method::GET, url)
                .query(&[("page", page), ("per_page", PER_PAGE)]);
            let envelope = self.execute::<Vec<T>>(request).await?;

            let has_next = envelope
                .result_info
                .as_ref()
                .is_some_and(|info| info.has_next_page());
            items.extend(envelope.result.unwrap_or_default());

            if !has_next {
                break;
            }
        }

        Ok(items)
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[async_trait]
impl CloudflareApi for CloudflareClient {
    async fn get_account(&self) -> Result<Account, ApiError> {
        self.fetch(self.request(Method::GET, &self.account_url(""))).await
    }

    async fn list_monitors(&self) -> Result<Vec<Monitor>, ApiError> {
        self.list_all(&self.account_url("/load_balancers/monitors")).await
    }

    async fn create_monitor(&self, monitor: &Monitor) -> Result<Monitor, ApiError> {
        let url = self.account_url("/load_balancers/monitors");
        self.send_json(Method::POST, &url, monitor).await
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<Monitor, ApiError> {
        let url = self.account_url(&format!("/load_balancers/monitors/{}", monitor.id));
        self.send_json(Method::PUT, &url, monitor).await
    }

    async fn delete_monitor(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&self.account_url(&format!("/load_balancers/monitors/{id}"))).await
    }

    async fn list_pools(&self) -> Result<Vec<Pool>, ApiError> {
        self.list_all(&self.account_url("/load_balancers/pools")).await
    }

    async fn create_pool(&self, pool: &Pool) -> Result<Pool, ApiError> {
        let url = self.account_url("/load_balancers/pools");
        self.send_json(Method::POST, &url, pool).await
    }

    async fn update_pool(&self, pool: &Pool) -> Result<Pool, ApiError> {
        let url = self.account_url(&format!("/load_balancers/pools/{}", pool.id));
        self.send_json(Method::PUT, &url, pool).await
    }

    async fn delete_pool(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&self.account_url(&format!("/load_balancers/pools/{id}"))).await
    }

    async fn list_load_balancers(&self) -> Result<Vec<LoadBalancer>, ApiError> {
        self.list_all(&self.zone_url("/load_balancers")).await
    }

    async fn create_load_balancer(&self, lb: &LoadBalancer) -> Result<LoadBalancer, ApiError> {
        let url = self.zone_url("/load_balancers");
        self.send_json(Method::POST, &url, lb).await
    }

    async fn update_load_balancer(&self, lb: &LoadBalancer) -> Result<LoadBalancer, ApiError> {
        let url = self.zone_url(&format!("/load_balancers/{}", lb.id));
        self.send_json(Method::PUT, &url, lb).await
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&self.zone_url(&format!("/load_balancers/{id}"))).await
    }
}

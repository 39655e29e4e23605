//! Startup checks run before any controller is started

use std::sync::Arc;

use cfccm_cloudflare::{
    ClientOptions, CloudflareApi, CloudflareClient, ProviderConfig, ResourceClient,
};
use cfccm_common::{Error, Result};
use tracing::info;

/// Validate credentials, build the Cloudflare client and probe the account
///
/// Fails when a credential is missing or undecodable, or when the token
/// cannot read the configured account.
pub async fn connect(
    config: &ProviderConfig,
    options: &ClientOptions,
) -> Result<Arc<dyn CloudflareApi>> {
    config.validate()?;
    let credentials = config.decode()?;

    let client = CloudflareClient::new(&credentials, options)
        .map_err(|e| Error::config(format!("failed to build Cloudflare client: {e}")))?;
    let api: Arc<dyn CloudflareApi> = Arc::new(client);

    let account = ResourceClient::new(api.clone())
        .verify_account(&credentials.account_id)
        .await?;
    info!(
        account_id = %account.id,
        account_name = %account.name,
        zone_id = %credentials.zone_id,
        "connected to Cloudflare"
    );

    Ok(api)
}

//! Cloudflare load balancer controller - binary entry point

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;

use cfccm_cloudflare::ProviderConfig;
use cfccm_common::telemetry::{init_telemetry, TelemetryConfig};
use cfccm_common::{AnnotationKeys, PROVIDER_NAME};
use cfccm_load_balancer::{CallLimits, LoadBalancers};
use cfccm_operator::cli::Cli;
use cfccm_operator::controller::Context;
use cfccm_operator::runner::{build_service_controller, cancel_on_signal};
use cfccm_operator::startup::connect;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Read before logging starts so DEBUG can raise the level
    let config = ProviderConfig::from_env()?;

    init_telemetry(&TelemetryConfig {
        format: cli.log_format.into(),
        debug: config.debug,
    })?;

    tracing::info!(
        provider = PROVIDER_NAME,
        version = env!("CARGO_PKG_VERSION"),
        annotation_domain = %cli.annotation_domain,
        "starting load balancer controller"
    );

    let client = Client::try_default().await?;
    let api = connect(&config, &cli.client_options()).await?;

    let keys = AnnotationKeys::new(&cli.annotation_domain);
    let provider = Arc::new(LoadBalancers::new(api, keys.clone()));

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let ctx = Arc::new(Context::new(
        client.clone(),
        provider,
        keys,
        CallLimits::new(cli.reconcile_timeout(), shutdown),
        cli.resync_interval(),
    ));

    build_service_controller(client, ctx).await;

    tracing::info!("controller stopped");
    Ok(())
}

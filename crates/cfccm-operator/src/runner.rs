//! Controller runner - builds the Service controller future
//!
//! Services are watched directly. A separate Node watcher re-reconciles every
//! Service when a Node appears, goes away or changes its external address, so
//! origin pools follow the cluster's membership.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::channel::mpsc;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Node, Service};
use kube::runtime::reflector::Store;
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::{Controller, WatchStreamExt};
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;

use cfccm_common::AnnotationKeys;

use crate::controller::{error_policy, managed_service_refs, reconcile, Context, NodeAddressCache};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the Service controller future
pub fn build_service_controller(
    client: Client,
    ctx: Arc<Context>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let services: Api<Service> = Api::all(client.clone());
    let nodes: Api<Node> = Api::all(client);

    let controller = Controller::new(
        services,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    );
    let (trigger_tx, trigger_rx) = mpsc::unbounded();
    tokio::spawn(watch_nodes(
        nodes,
        controller.store(),
        ctx.keys.clone(),
        trigger_tx,
    ));

    tracing::info!("- Service controller");

    Box::pin(
        controller
            .reconcile_all_on(trigger_rx)
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("Service")),
    )
}

/// Trigger a Service resync whenever Node membership changes
async fn watch_nodes(
    nodes: Api<Node>,
    services: Store<Service>,
    keys: AnnotationKeys,
    trigger: mpsc::UnboundedSender<()>,
) {
    let cache = NodeAddressCache::default();
    let mut events = watcher::watcher(nodes, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .default_backoff()
        .boxed();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Node watch failed, retrying");
                continue;
            }
        };
        if !cache.observe(&event) {
            continue;
        }

        let affected = managed_service_refs(&services.state(), &keys);
        if affected.is_empty() {
            continue;
        }
        tracing::debug!(
            affected_count = affected.len(),
            "Node membership changed, re-reconciling load balancer services"
        );
        if trigger.unbounded_send(()).is_err() {
            break;
        }
    }

    tracing::info!("Node watcher stopped");
}

/// Cancel `token` on SIGINT or SIGTERM so in-flight Cloudflare calls stop
pub async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, cancelling in-flight calls");
    token.cancel();
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

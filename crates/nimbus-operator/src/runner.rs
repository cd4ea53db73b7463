//! Controller runner: builds controller futures for each watched type
//!
//! Each `build_*` function returns boxed futures the caller composes, keeping
//! controller construction pure and testable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use nimbus_common::crd::{control, tenant};
use nimbus_iprange::{IpRangeConfig, IpRangeReconciler};
use nimbus_iprange::providers::ProviderClients;
use nimbus_skr::SkrIpRangeReconciler;

/// Watcher timeout (seconds), kept below the client read timeout so the API
/// server closes idle watches before the client times out
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the control-plane IpRange controller future
pub fn build_kcp_controllers(
    client: Client,
    kcp_namespace: &str,
    providers: ProviderClients,
    config: IpRangeConfig,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let reconciler = Arc::new(IpRangeReconciler::new(client.clone(), providers, config));
    let ipranges: Api<control::IpRange> = Api::namespaced(client, kcp_namespace);

    tracing::info!("- IpRange controller (cloud-control)");

    vec![Box::pin(
        Controller::new(
            ipranges,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .shutdown_on_signal()
        .run(
            |obj, ctx: Arc<IpRangeReconciler>| async move { ctx.reconcile(obj).await },
            |obj, err, ctx| ctx.error_policy(obj, err),
            reconciler,
        )
        .for_each(log_reconcile_result("IpRange")),
    )]
}

/// Build the tenant-side IpRange mirror controller future
pub fn build_skr_controllers(
    skr_client: Client,
    kcp_client: Client,
    tenant: &str,
    kcp_namespace: &str,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let reconciler = Arc::new(SkrIpRangeReconciler::new(
        skr_client.clone(),
        kcp_client,
        tenant,
        kcp_namespace,
    ));
    let ipranges: Api<tenant::IpRange> = Api::all(skr_client);

    tracing::info!("- IpRange controller (cloud-resources)");

    vec![Box::pin(
        Controller::new(
            ipranges,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .shutdown_on_signal()
        .run(
            |obj, ctx: Arc<SkrIpRangeReconciler>| async move { ctx.reconcile(obj).await },
            |obj, err, ctx| ctx.error_policy(obj, err),
            reconciler,
        )
        .for_each(log_reconcile_result("SkrIpRange")),
    )]
}

/// Creates a closure for logging reconciliation results
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => {
                tracing::debug!(?action, "{} reconciliation completed", controller_name)
            }
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

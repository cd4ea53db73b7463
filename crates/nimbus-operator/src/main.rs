//! Nimbus operator: multi-cloud provisioning controllers

use clap::{Parser, Subcommand};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, CustomResourceExt};

use nimbus_common::crd::{control, tenant};
use nimbus_iprange::providers::ProviderClients;
use nimbus_iprange::IpRangeConfig;

mod runner;

/// Nimbus - CRD-driven operator provisioning cloud resources for tenant
/// clusters across AWS, Azure, GCP, and OpenStack
#[derive(Parser, Debug)]
#[command(name = "nimbus", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Namespace the control-plane resources live in
    #[arg(long, env = "NIMBUS_KCP_NAMESPACE", default_value = "kcp-system")]
    kcp_namespace: String,

    /// Tenant identity to run the cloud-resources controller for; when unset
    /// only the control-plane controllers run
    #[arg(long, env = "NIMBUS_TENANT")]
    tenant: Option<String>,

    /// Treat an empty spec.cidr as an error instead of allocating a block
    #[arg(long)]
    disable_auto_cidr_allocation: bool,

    /// Prefix length of automatically allocated CIDR blocks
    #[arg(long, default_value_t = 24)]
    default_prefix: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controllers (default mode)
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        print_crds()?;
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controllers(cli).await,
    }
}

fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        control::Scope::crd(),
        control::Network::crd(),
        control::IpRange::crd(),
        control::VpcPeering::crd(),
        control::NfsInstance::crd(),
        control::RedisInstance::crd(),
        control::RedisCluster::crd(),
        tenant::IpRange::crd(),
    ]
}

fn print_crds() -> anyhow::Result<()> {
    let docs: Vec<String> = all_crds()
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<_, _>>()
        .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {e}"))?;
    println!("{}", docs.join("---\n"));
    Ok(())
}

/// Install or update all Nimbus CRDs with server-side apply, so the CRD
/// versions always match the operator version
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("nimbus-operator").force();

    for crd in all_crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install CRD {name}: {e}"))?;
    }

    tracing::info!("all CRDs installed");
    Ok(())
}

async fn run_controllers(cli: Cli) -> anyhow::Result<()> {
    nimbus_common::telemetry::init_telemetry()?;

    let client = Client::try_default().await?;
    ensure_crds_installed(&client).await?;

    let config = IpRangeConfig {
        auto_cidr_allocation: !cli.disable_auto_cidr_allocation,
        default_prefix: cli.default_prefix,
    };

    // Real provider SDKs slot in behind the same client traits; this build
    // runs against the in-memory cloud.
    let (providers, _cloud) = ProviderClients::in_memory();

    let mut controllers =
        runner::build_kcp_controllers(client.clone(), &cli.kcp_namespace, providers, config);
    if let Some(tenant) = &cli.tenant {
        controllers.extend(runner::build_skr_controllers(
            client.clone(),
            client.clone(),
            tenant,
            &cli.kcp_namespace,
        ));
    }

    tracing::info!("starting controllers");
    futures::future::join_all(controllers).await;
    Ok(())
}

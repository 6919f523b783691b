//! Console Operator - keeps the web console converged on its Console resource

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use console_operator::controller::{error_policy, reconcile, Context, PipelineConfig};
use console_operator::crd::Console;
use console_operator::openshift::Route;
use console_operator::retry::{retry_with_backoff_if, RetryConfig};
use console_operator::{
    Error, DEFAULT_CONSOLE_IMAGE, DEFAULT_NAMESPACE, DEFAULT_RESYNC_SECS, FIELD_MANAGER,
};

/// Console Operator - keeps the web console converged on its Console resource
#[derive(Parser, Debug)]
#[command(name = "console-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    Controller(ControllerArgs),
}

/// Controller mode arguments
#[derive(Parser, Debug)]
struct ControllerArgs {
    /// Namespace the console workload runs in
    #[arg(long, env = "CONSOLE_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Console image used when a Console does not set spec.image
    #[arg(long, env = "CONSOLE_IMAGE", default_value = DEFAULT_CONSOLE_IMAGE)]
    image: String,

    /// Seconds between passes once everything has converged
    #[arg(long, env = "CONSOLE_RESYNC_SECS", default_value_t = DEFAULT_RESYNC_SECS)]
    resync_secs: u64,
}

impl Default for ControllerArgs {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            image: DEFAULT_CONSOLE_IMAGE.to_string(),
            resync_secs: DEFAULT_RESYNC_SECS,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&Console::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller(args)) => run_controller(args).await,
        None => run_controller(ControllerArgs::default()).await,
    }
}

/// Install or update the Console CRD
///
/// Uses server-side apply so the installed schema always matches this build.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let crd = Console::crd();
    let (crds, params, crd) = (&crds, &params, &crd);

    tracing::info!("Installing Console CRD...");
    retry_with_backoff_if(
        &RetryConfig::with_max_attempts(10),
        "install_console_crd",
        Error::is_retryable,
        move || async move {
            crds.patch("consoles.console.operator.dev", params, &Patch::Apply(crd))
                .await
                .map_err(Error::from)
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install Console CRD: {}", e))?;

    tracing::info!("Console CRD installed/updated");
    Ok(())
}

/// Run the console controller until a shutdown signal arrives
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crd_installed(&client).await?;

    let config = PipelineConfig {
        namespace: args.namespace.clone(),
        default_image: args.image,
    };
    let ctx = Arc::new(Context::new(
        client.clone(),
        config,
        Duration::from_secs(args.resync_secs),
    ));

    let namespace = args.namespace.as_str();
    let consoles: Api<Console> = Api::all(client.clone());

    tracing::info!(namespace, "Starting Console controller...");

    Controller::new(consoles, WatcherConfig::default())
        .owns(
            Api::<Route>::namespaced(client.clone(), namespace),
            WatcherConfig::default(),
        )
        .owns(
            Api::<Service>::namespaced(client.clone(), namespace),
            WatcherConfig::default(),
        )
        .owns(
            Api::<ConfigMap>::namespaced(client.clone(), namespace),
            WatcherConfig::default(),
        )
        .owns(
            Api::<Secret>::namespaced(client.clone(), namespace),
            WatcherConfig::default(),
        )
        .owns(
            Api::<Deployment>::namespaced(client, namespace),
            WatcherConfig::default(),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Console reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Console reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Console controller stopped");
    Ok(())
}

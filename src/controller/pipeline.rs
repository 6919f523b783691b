//! Reconciliation pipeline
//!
//! One pass walks the managed resources in dependency order:
//!
//! ```text
//! Route -> Service -> ConfigMap -> Secret -> OAuthClient -> Deployment
//! ```
//!
//! Each step consumes only what earlier steps handed on. The first step that
//! fails or halts ends the pass; nothing after it runs. A later pass starts
//! from the top again and, because every step is idempotent, walks through
//! the already converged resources without writing until it reaches the
//! point where the previous pass stopped.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::{Client, ResourceExt};
use tracing::{debug, info, instrument, warn};

use super::status::project_status;
use crate::adapter::{Adapters, OsSecretGenerator, SecretGenerator};
use crate::crd::{Console, ConsoleStatus};
use crate::openshift::{OAuthClient, Route};
use crate::sync::config_map::sync_config_map;
use crate::sync::deployment::sync_deployment;
use crate::sync::oauth_client::sync_oauth_client;
use crate::sync::route::sync_route;
use crate::sync::secret::{client_secret, sync_secret};
use crate::sync::service::sync_service;
use crate::sync::{Halt, ResourceKind, StepOutcome, SyncContext};
use crate::{Error, DEFAULT_CONSOLE_IMAGE, DEFAULT_NAMESPACE};

/// Settings shared by every pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Namespace holding the namespaced managed resources
    pub namespace: String,
    /// Console image used when the spec does not override it
    pub default_image: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_image: DEFAULT_CONSOLE_IMAGE.to_string(),
        }
    }
}

/// How a pass ended
#[derive(Debug)]
pub enum PassOutcome {
    /// Every step ran and nothing was written
    Converged,
    /// Every step ran and at least one resource was written
    Progressed,
    /// A step halted the pass; a later pass continues from there
    NotReady(Halt),
    /// A step failed
    Failed(Error),
}

impl PassOutcome {
    /// Whether every step ran
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Converged | Self::Progressed)
    }

    /// The failure, if the pass failed
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Latest value of each resource a pass got to see
#[derive(Clone, Debug, Default)]
pub struct Observed {
    /// Route, once it has a host
    pub route: Option<Route>,
    /// Service
    pub service: Option<Service>,
    /// Config map
    pub config_map: Option<ConfigMap>,
    /// Credential, once it is non-empty
    pub secret: Option<Secret>,
    /// OAuth client after registration
    pub oauth_client: Option<OAuthClient>,
    /// Deployment
    pub deployment: Option<Deployment>,
}

/// Everything a pass produced
#[derive(Debug)]
pub struct PassReport {
    /// The console with the projected status applied
    pub console: Console,
    /// Projected status
    pub status: ConsoleStatus,
    /// Whether any step created or updated a resource
    pub changed: bool,
    /// How the pass ended
    pub outcome: PassOutcome,
}

impl PassReport {
    /// The failure, if the pass failed
    pub fn error(&self) -> Option<&Error> {
        self.outcome.error()
    }
}

/// Why the walk stopped early
enum Stop {
    Halt(Halt),
    Failed(Error),
}

impl From<Error> for Stop {
    fn from(e: Error) -> Self {
        Self::Failed(e)
    }
}

/// Accumulates step results over one pass
#[derive(Default)]
struct PassState {
    observed: Observed,
    changed: bool,
    trail: Vec<(ResourceKind, bool)>,
}

impl PassState {
    /// Fold a step outcome into the pass, handing on the resource if it is usable
    fn absorb<T>(&mut self, kind: ResourceKind, outcome: StepOutcome<T>) -> Result<T, Stop> {
        let changed = outcome.changed();
        self.changed |= changed;
        self.trail.push((kind, changed));

        match outcome {
            StepOutcome::Ready { value, .. } => Ok(value),
            StepOutcome::Halted { halt, .. } => Err(Stop::Halt(halt)),
        }
    }
}

/// The ordered step sequence and the collaborators it runs against
pub struct Pipeline {
    adapters: Adapters,
    secrets: Arc<dyn SecretGenerator>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline over explicit collaborators
    pub fn new(adapters: Adapters, secrets: Arc<dyn SecretGenerator>, config: PipelineConfig) -> Self {
        Self {
            adapters,
            secrets,
            config,
        }
    }

    /// Create a pipeline talking to the cluster behind `client`
    pub fn kube(client: Client, config: PipelineConfig) -> Self {
        Self::new(
            Adapters::kube(client, &config.namespace),
            Arc::new(OsSecretGenerator),
            config,
        )
    }

    /// Run one reconciliation pass for `console`
    ///
    /// Never returns early without a status: the projector runs over whatever
    /// the pass observed, including after a halt or failure.
    #[instrument(skip(self, console), fields(console = %console.name_any()))]
    pub async fn run_pass(&self, console: &Console) -> PassReport {
        let mut state = PassState::default();

        let outcome = match self.walk(console, &mut state).await {
            Ok(()) if state.changed => PassOutcome::Progressed,
            Ok(()) => PassOutcome::Converged,
            Err(Stop::Halt(halt)) => PassOutcome::NotReady(halt),
            Err(Stop::Failed(e)) => PassOutcome::Failed(e),
        };

        debug!(steps = ?state.trail, changed = state.changed, "pass summary");
        match &outcome {
            PassOutcome::Converged => debug!("pass converged"),
            PassOutcome::Progressed => info!("pass progressed"),
            PassOutcome::NotReady(halt) => info!(halt = %halt, "pass halted"),
            PassOutcome::Failed(e) => warn!(error = %e, "pass failed"),
        }

        let status = project_status(console, &state.observed, &outcome);
        let mut updated = console.clone();
        updated.status = Some(status.clone());

        PassReport {
            console: updated,
            status,
            changed: state.changed,
            outcome,
        }
    }

    async fn walk(&self, console: &Console, state: &mut PassState) -> Result<(), Stop> {
        console.spec.validate()?;

        let ctx = SyncContext {
            console,
            namespace: &self.config.namespace,
            default_image: &self.config.default_image,
        };
        let adapters = &self.adapters;

        let route = state.absorb(
            ResourceKind::Route,
            sync_route(adapters.routes.as_ref(), &ctx).await?,
        )?;
        let host = route.host().unwrap_or_default().to_string();
        state.observed.route = Some(route);

        let service = state.absorb(
            ResourceKind::Service,
            sync_service(adapters.services.as_ref(), &ctx).await?,
        )?;
        state.observed.service = Some(service);

        let config_map = state.absorb(
            ResourceKind::ConfigMap,
            sync_config_map(adapters.config_maps.as_ref(), &ctx, &host).await?,
        )?;
        state.observed.config_map = Some(config_map.clone());

        let secret = state.absorb(
            ResourceKind::Secret,
            sync_secret(adapters.secrets.as_ref(), self.secrets.as_ref(), &ctx).await?,
        )?;
        let credential = client_secret(&secret);
        state.observed.secret = Some(secret.clone());

        let oauth_client = state.absorb(
            ResourceKind::OAuthClient,
            sync_oauth_client(adapters.oauth_clients.as_ref(), &host, &credential).await?,
        )?;
        state.observed.oauth_client = Some(oauth_client);

        let deployment = state.absorb(
            ResourceKind::Deployment,
            sync_deployment(adapters.deployments.as_ref(), &ctx, &config_map, &secret).await?,
        )?;
        state.observed.deployment = Some(deployment);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::fake::{Failure, FakeBackend, Op};
    use crate::adapter::MockSecretGenerator;
    use crate::controller::status::SYNCED_CONDITION;
    use crate::crd::ConditionStatus;
    use crate::sync::deployment::RolloutMarkers;
    use crate::sync::test_fixtures::console;
    use crate::{CONFIG_MAP_NAME, CONSOLE_NAME, OAUTH_SECRET_NAME};

    const HOST: &str = "console.example.com";
    const CREDENTIAL: &str = "generated-credential";

    fn generator() -> MockSecretGenerator {
        let mut generator = MockSecretGenerator::new();
        generator
            .expect_random_secret()
            .returning(|| CREDENTIAL.to_string());
        generator
    }

    fn pipeline(backend: &FakeBackend, generator: MockSecretGenerator) -> Pipeline {
        Pipeline::new(
            backend.adapters(),
            Arc::new(generator),
            PipelineConfig::default(),
        )
    }

    /// Backend where only the installer-provisioned OAuth client exists
    fn seeded_backend() -> FakeBackend {
        let backend = FakeBackend::new();
        backend.oauth_clients.insert(OAuthClient::new(CONSOLE_NAME));
        backend
    }

    fn admit_route(backend: &FakeBackend, host: &str) {
        let host = host.to_string();
        backend
            .routes
            .modify(CONSOLE_NAME, move |route| route.spec.host = host);
    }

    /// Drive a seeded backend to convergence, returning the pipeline used
    async fn converge(backend: &FakeBackend, console: &Console) -> Pipeline {
        let pipeline = pipeline(backend, generator());
        pipeline.run_pass(console).await;
        admit_route(backend, HOST);
        for _ in 0..3 {
            if matches!(pipeline.run_pass(console).await.outcome, PassOutcome::Converged) {
                backend.clear_log();
                return pipeline;
            }
        }
        panic!("pipeline did not converge");
    }

    fn fail(backend: &FakeBackend, kind: ResourceKind, op: Op, failure: Failure) {
        match kind {
            ResourceKind::Route => backend.routes.fail_on(op, failure),
            ResourceKind::Service => backend.services.fail_on(op, failure),
            ResourceKind::ConfigMap => backend.config_maps.fail_on(op, failure),
            ResourceKind::Secret => backend.secrets.fail_on(op, failure),
            ResourceKind::OAuthClient => backend.oauth_clients.fail_on(op, failure),
            ResourceKind::Deployment => backend.deployments.fail_on(op, failure),
        }
    }

    // =========================================================================
    // Scenario
    // =========================================================================

    /// Story: an empty cluster is brought up over four passes
    ///
    /// Pass 1 creates the route and stops. Pass 2 runs once the router has
    /// assigned a host and stops after generating the credential. Pass 3
    /// registers the OAuth client and creates the deployment. Pass 4 finds
    /// nothing to do.
    #[tokio::test]
    async fn story_empty_cluster_converges_in_four_passes() {
        let backend = seeded_backend();
        let mut generator = MockSecretGenerator::new();
        generator
            .expect_random_secret()
            .times(1)
            .returning(|| CREDENTIAL.to_string());
        let pipeline = pipeline(&backend, generator);
        let console = console("4.0");

        // Pass 1: route created, nothing else touched
        let report = pipeline.run_pass(&console).await;
        assert!(report.changed);
        assert!(matches!(
            report.outcome,
            PassOutcome::NotReady(Halt::JustCreated(ResourceKind::Route))
        ));
        assert_eq!(backend.touched(), vec![ResourceKind::Route]);
        assert_eq!(report.status.default_host_name, None);

        // Router admits the route
        admit_route(&backend, HOST);
        backend.clear_log();

        // Pass 2: service, config map and credential created; stops at the credential
        let report = pipeline.run_pass(&console).await;
        assert!(report.changed);
        assert!(matches!(
            report.outcome,
            PassOutcome::NotReady(Halt::JustCreated(ResourceKind::Secret))
        ));
        assert_eq!(
            backend.touched(),
            vec![
                ResourceKind::Route,
                ResourceKind::Service,
                ResourceKind::ConfigMap,
                ResourceKind::Secret,
            ]
        );
        assert_eq!(report.status.default_host_name.as_deref(), Some(HOST));
        assert!(!report.status.credential_agreement);
        backend.clear_log();

        // Pass 3: registration and deployment
        let report = pipeline.run_pass(&console).await;
        assert!(report.changed);
        assert!(matches!(
            report.outcome,
            PassOutcome::NotReady(Halt::JustCreated(ResourceKind::Deployment))
        ));
        assert_eq!(
            backend
                .oauth_clients
                .stored(CONSOLE_NAME)
                .unwrap()
                .secret_str(),
            CREDENTIAL
        );
        assert!(backend.deployments.stored(CONSOLE_NAME).is_some());
        assert!(report.status.credential_agreement);

        // Pass 4: converged
        let report = pipeline.run_pass(&console).await;
        assert!(!report.changed);
        assert!(matches!(report.outcome, PassOutcome::Converged));
        assert_eq!(report.status.default_host_name.as_deref(), Some(HOST));
        assert!(report.status.credential_agreement);
        assert_eq!(report.status.observed_version.as_deref(), Some("4.0"));
        assert_eq!(report.console.status, Some(report.status.clone()));
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    /// A failure at step k means steps after k are never called
    #[tokio::test]
    async fn test_failure_stops_all_later_steps() {
        for (index, kind) in ResourceKind::PIPELINE_ORDER.iter().enumerate() {
            let backend = seeded_backend();
            let console = console("4.0");
            let pipeline = converge(&backend, &console).await;

            fail(&backend, *kind, Op::Get, Failure::Backend("unavailable".to_string()));
            let report = pipeline.run_pass(&console).await;

            assert_eq!(report.error().and_then(Error::resource), Some(*kind));
            assert_eq!(
                backend.touched(),
                ResourceKind::PIPELINE_ORDER[..=index].to_vec(),
                "failure at {kind} leaked into later steps"
            );
        }
    }

    #[tokio::test]
    async fn test_unadmitted_route_stops_pass_with_partial_status() {
        let backend = seeded_backend();
        let pipeline = pipeline(&backend, generator());
        let console = console("4.0");

        pipeline.run_pass(&console).await;
        backend.clear_log();

        // Route exists but the router has not assigned a host yet
        let report = pipeline.run_pass(&console).await;

        assert!(!report.changed);
        assert!(matches!(
            report.outcome,
            PassOutcome::NotReady(Halt::NotYetReady {
                resource: ResourceKind::Route,
                ..
            })
        ));
        assert_eq!(backend.touched(), vec![ResourceKind::Route]);
        assert_eq!(report.status.default_host_name, None);
        assert_eq!(
            report
                .status
                .get_condition(SYNCED_CONDITION)
                .unwrap()
                .status,
            ConditionStatus::Unknown
        );
    }

    #[tokio::test]
    async fn test_invalid_spec_touches_nothing() {
        let backend = seeded_backend();
        let pipeline = pipeline(&backend, generator());
        let mut console = console("4.0");
        console.spec.custom_host = Some("https://console.example.com".to_string());

        let report = pipeline.run_pass(&console).await;

        assert!(matches!(report.error(), Some(Error::Validation(_))));
        assert!(backend.calls().is_empty());
        assert_eq!(
            report
                .status
                .get_condition(SYNCED_CONDITION)
                .unwrap()
                .reason,
            "InvalidSpec"
        );
    }

    // =========================================================================
    // Idempotence and immutability
    // =========================================================================

    #[tokio::test]
    async fn test_second_pass_changes_nothing() {
        let backend = seeded_backend();
        let console = console("4.0");
        let pipeline = converge(&backend, &console).await;

        let report = pipeline.run_pass(&console).await;

        assert!(!report.changed);
        assert!(matches!(report.outcome, PassOutcome::Converged));
        // Registration is always re-submitted; nothing else is written
        let writes = backend.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].resource, ResourceKind::OAuthClient);
        assert_eq!(writes[0].op, Op::Update);
    }

    /// Story: an existing credential survives any change to desired state
    #[tokio::test]
    async fn story_existing_credential_is_never_rewritten() {
        let backend = seeded_backend();
        let mut console = console("4.0");
        let _ = converge(&backend, &console).await;
        let before = backend.secrets.stored(OAUTH_SECRET_NAME).unwrap();

        // Later passes may never ask for a new credential
        let mut generator = MockSecretGenerator::new();
        generator.expect_random_secret().never();
        let pipeline = pipeline(&backend, generator);

        console.spec.version = "4.1".to_string();
        console.spec.replicas = 3;
        console.spec.log_level = Some("debug".to_string());
        pipeline.run_pass(&console).await;
        admit_route(&backend, "moved.example.com");
        pipeline.run_pass(&console).await;

        assert!(backend
            .writes()
            .iter()
            .all(|c| c.resource != ResourceKind::Secret));
        assert_eq!(backend.secrets.stored(OAUTH_SECRET_NAME).unwrap(), before);
    }

    // =========================================================================
    // Rollout propagation
    // =========================================================================

    /// Story: the route host moves; the config map is re-rendered and the
    /// deployment picks up its new version without any deployment field changing
    #[tokio::test]
    async fn story_host_change_rolls_deployment() {
        let backend = seeded_backend();
        let console = console("4.0");
        let pipeline = converge(&backend, &console).await;
        let before = RolloutMarkers::recorded(&backend.deployments.stored(CONSOLE_NAME).unwrap());

        admit_route(&backend, "moved.example.com");
        let report = pipeline.run_pass(&console).await;

        assert!(report.changed);
        assert!(matches!(report.outcome, PassOutcome::Progressed));

        let config_map = backend.config_maps.stored(CONFIG_MAP_NAME).unwrap();
        let after = RolloutMarkers::recorded(&backend.deployments.stored(CONSOLE_NAME).unwrap());
        assert_ne!(before.config_version, after.config_version);
        assert_eq!(
            Some(after.config_version.as_str()),
            config_map.metadata.resource_version.as_deref()
        );
        assert_eq!(before.secret_version, after.secret_version);
        assert!(backend
            .writes()
            .iter()
            .any(|c| c.resource == ResourceKind::Deployment && c.op == Op::Update));
        assert_eq!(
            report.status.default_host_name.as_deref(),
            Some("moved.example.com")
        );
    }

    // =========================================================================
    // Error taxonomy
    // =========================================================================

    #[tokio::test]
    async fn test_missing_oauth_client_is_fatal() {
        // No seeded OAuth client
        let backend = FakeBackend::new();
        let pipeline = pipeline(&backend, generator());
        let console = console("4.0");

        pipeline.run_pass(&console).await;
        admit_route(&backend, HOST);
        pipeline.run_pass(&console).await;
        backend.clear_log();

        let report = pipeline.run_pass(&console).await;

        let err = report.error().unwrap();
        assert!(matches!(
            err,
            Error::MissingPrerequisite {
                resource: ResourceKind::OAuthClient,
                ..
            }
        ));
        assert!(!err.is_retryable());
        assert!(!backend.touched().contains(&ResourceKind::Deployment));
        assert!(backend.oauth_clients.stored(CONSOLE_NAME).is_none());
        assert_eq!(
            report
                .status
                .get_condition(SYNCED_CONDITION)
                .unwrap()
                .reason,
            "MissingPrerequisite"
        );
    }

    #[tokio::test]
    async fn test_deployment_create_failure_is_not_a_halt() {
        let backend = seeded_backend();
        let pipeline = pipeline(&backend, generator());
        let console = console("4.0");

        pipeline.run_pass(&console).await;
        admit_route(&backend, HOST);
        pipeline.run_pass(&console).await;
        backend
            .deployments
            .fail_on(Op::Create, Failure::Backend("admission denied".to_string()));

        let report = pipeline.run_pass(&console).await;

        assert!(matches!(
            report.outcome,
            PassOutcome::Failed(Error::Backend {
                resource: ResourceKind::Deployment,
                ..
            })
        ));
        // The registration written before the failure still counts
        assert!(report.changed);

        backend.deployments.heal();
        let report = pipeline.run_pass(&console).await;
        assert!(matches!(
            report.outcome,
            PassOutcome::NotReady(Halt::JustCreated(ResourceKind::Deployment))
        ));
    }

    /// Story: another writer wins a race on the config map; the pass reports a
    /// retryable conflict and the deployment is left for the next pass
    #[tokio::test]
    async fn story_lost_write_race_is_retryable() {
        let backend = seeded_backend();
        let console = console("4.0");
        let pipeline = converge(&backend, &console).await;

        admit_route(&backend, "moved.example.com");
        backend.config_maps.fail_on(Op::Update, Failure::Conflict);
        let report = pipeline.run_pass(&console).await;

        let err = report.error().unwrap();
        assert!(matches!(
            err,
            Error::Conflict {
                resource: ResourceKind::ConfigMap,
                ..
            }
        ));
        assert!(err.is_retryable());
        assert!(!backend.touched().contains(&ResourceKind::Deployment));

        backend.config_maps.heal();
        let report = pipeline.run_pass(&console).await;
        assert!(matches!(report.outcome, PassOutcome::Progressed));
    }

    #[tokio::test]
    async fn test_concurrent_passes_on_converged_state() {
        let backend = seeded_backend();
        let console = console("4.0");
        let pipeline = converge(&backend, &console).await;

        let (a, b) = tokio::join!(pipeline.run_pass(&console), pipeline.run_pass(&console));

        assert!(matches!(a.outcome, PassOutcome::Converged));
        assert!(matches!(b.outcome, PassOutcome::Converged));
    }
}

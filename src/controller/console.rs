//! Console controller
//!
//! Glue between `kube::runtime::Controller` and the [`Pipeline`]: every
//! trigger runs one pass, persists the projected status, and turns the pass
//! outcome into a requeue decision.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use super::pipeline::{PassOutcome, Pipeline, PipelineConfig};
use crate::crd::{Console, ConsoleStatus};
use crate::{Error, FIELD_MANAGER};

/// Requeue delay after a pass that wrote something or halted
pub const PROGRESS_REQUEUE: Duration = Duration::from_secs(5);

/// Requeue delay after a failure someone has to fix
pub const REMEDIATION_REQUEUE: Duration = Duration::from_secs(60);

/// Persists console status
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Replace the status of the named console
    async fn patch_status(&self, name: &str, status: &ConsoleStatus) -> Result<(), Error>;
}

/// [`StatusWriter`] using a merge patch on the status subresource
pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    /// Create a new writer wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn patch_status(&self, name: &str, status: &ConsoleStatus) -> Result<(), Error> {
        let api: Api<Console> = Api::all(self.client.clone());

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch(status)?),
        )
        .await?;

        Ok(())
    }
}

/// Status fields a merge patch must send as `null` to clear
const CLEARABLE_STATUS_FIELDS: [&str; 2] = ["defaultHostName", "observedVersion"];

/// Merge patch body replacing the stored status with `status`
///
/// A merge patch leaves absent keys alone, so unset optional fields are
/// written as explicit nulls.
pub fn status_patch(status: &ConsoleStatus) -> Result<serde_json::Value, Error> {
    let mut body =
        serde_json::to_value(status).map_err(|e| Error::serialization(e.to_string()))?;

    if let Some(fields) = body.as_object_mut() {
        for field in CLEARABLE_STATUS_FIELDS {
            fields
                .entry(field)
                .or_insert(serde_json::Value::Null);
        }
    }

    Ok(serde_json::json!({ "status": body }))
}

/// Controller context shared by every reconciliation
pub struct Context {
    /// Reconciliation pipeline
    pub pipeline: Pipeline,
    /// Status persistence
    pub status: Arc<dyn StatusWriter>,
    /// Requeue interval once everything has converged
    pub resync: Duration,
}

impl Context {
    /// Create a context talking to the cluster behind `client`
    pub fn new(client: Client, config: PipelineConfig, resync: Duration) -> Self {
        Self {
            pipeline: Pipeline::kube(client.clone(), config),
            status: Arc::new(KubeStatusWriter::new(client)),
            resync,
        }
    }

    /// Create a context from explicit parts
    pub fn from_parts(pipeline: Pipeline, status: Arc<dyn StatusWriter>, resync: Duration) -> Self {
        Self {
            pipeline,
            status,
            resync,
        }
    }
}

/// Reconcile a Console
///
/// Runs one pass and writes the projected status unless it is equivalent to
/// what is already stored. Converged passes requeue after the resync
/// interval; passes that wrote something or halted come back quickly so the
/// next step gets its turn; failures go to [`error_policy`].
#[instrument(skip(console, ctx), fields(console = %console.name_any()))]
pub async fn reconcile(console: Arc<Console>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = console.name_any();
    debug!("reconciling console");

    let report = ctx.pipeline.run_pass(&console).await;

    let unchanged = console
        .status
        .as_ref()
        .is_some_and(|current| current.is_equivalent(&report.status));
    let written = if unchanged {
        debug!("status unchanged, skipping write");
        Ok(())
    } else {
        ctx.status.patch_status(&name, &report.status).await
    };

    match report.outcome {
        PassOutcome::Failed(e) => {
            if let Err(status_err) = written {
                warn!(error = %status_err, "failed to record failure in status");
            }
            Err(e)
        }
        outcome => {
            written?;
            match outcome {
                PassOutcome::Converged => Ok(Action::requeue(ctx.resync)),
                _ => {
                    info!(changed = report.changed, "requeueing to continue");
                    Ok(Action::requeue(PROGRESS_REQUEUE))
                }
            }
        }
    }
}

/// Error policy for the console controller
///
/// Transient failures come back quickly; failures that need an operator
/// (a missing OAuth client, an invalid spec) are retried slowly.
pub fn error_policy(console: Arc<Console>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        console = %console.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(PROGRESS_REQUEUE)
    } else {
        Action::requeue(REMEDIATION_REQUEUE)
    }
}

//! Console reconciliation
//!
//! - [`pipeline`] - the ordered pass over the managed resources
//! - [`status`] - projection of a pass onto the console status
//! - the controller glue ([`reconcile`], [`error_policy`]) that kube-runtime drives

mod console;
pub mod pipeline;
pub mod status;

pub use console::{
    error_policy, reconcile, status_patch, Context, KubeStatusWriter, StatusWriter,
    PROGRESS_REQUEUE, REMEDIATION_REQUEUE,
};
pub use pipeline::{Observed, PassOutcome, PassReport, Pipeline, PipelineConfig};
pub use status::{credentials_match, project_status, SYNCED_CONDITION};

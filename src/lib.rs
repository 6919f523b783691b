//! Console operator - keeps a web console installation converged on its desired state
//!
//! A single cluster-scoped `Console` resource declares what should run. The
//! operator drives six managed resources toward it, one reconciliation pass at
//! a time, in dependency order:
//!
//! ```text
//! Route -> Service -> ConfigMap -> Secret -> OAuthClient -> Deployment
//! ```
//!
//! A pass stops at the first step that fails, creates something, or finds a
//! resource not ready yet. The next pass starts over and walks through the
//! converged steps without writing. Correctness rests on every step being
//! idempotent and on the order, never on transactions or rollback.
//!
//! # Modules
//!
//! - [`crd`] - the `Console` custom resource and its status
//! - [`openshift`] - typed bindings for Route and OAuthClient
//! - [`adapter`] - per-kind backend capabilities and secret generation
//! - [`sync`] - the six resource sync steps
//! - [`controller`] - the pass orchestrator, status projection, and kube-runtime glue
//! - [`retry`] - backoff for startup calls
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod adapter;
pub mod controller;
pub mod crd;
pub mod error;
pub mod openshift;
pub mod retry;
pub mod sync;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Names and defaults
// =============================================================================

/// Name of the operator, used as field manager and managed-by label value
pub const OPERATOR_NAME: &str = "console-operator";

/// Field manager for server-side apply and status patches
pub const FIELD_MANAGER: &str = OPERATOR_NAME;

/// Namespace the console runs in unless configured otherwise
pub const DEFAULT_NAMESPACE: &str = "openshift-console";

/// Console image used when neither the spec nor the command line names one
pub const DEFAULT_CONSOLE_IMAGE: &str = "quay.io/openshift/origin-console:latest";

/// Default requeue interval after a converged pass, in seconds
pub const DEFAULT_RESYNC_SECS: u64 = 60;

/// Name of the route, service, deployment and OAuth client
pub const CONSOLE_NAME: &str = "console";

/// Name of the config map holding the console server config
pub const CONFIG_MAP_NAME: &str = "console-config";

/// Name of the secret holding the OAuth client secret
pub const OAUTH_SECRET_NAME: &str = "console-oauth-config";

/// Name of the secret the service CA fills with the serving certificate
pub const SERVING_CERT_SECRET_NAME: &str = "console-serving-cert";

/// Label carrying the application name
pub const APP_LABEL: &str = "app";

/// Value of [`APP_LABEL`] on every managed object
pub const APP_NAME: &str = "console";

/// Label recording who manages an object
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Pod template annotation recording the config map version pods were started with
pub const CONFIG_VERSION_ANNOTATION: &str = "console.operator.dev/config-version";

/// Pod template annotation recording the secret version pods were started with
pub const SECRET_VERSION_ANNOTATION: &str = "console.operator.dev/secret-version";

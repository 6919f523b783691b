//! Resource sync steps
//!
//! One module per managed resource. Each pairs a pure builder for the
//! desired object with an async `sync_*` step that fetches the live object,
//! decides whether it has diverged, and applies the difference through the
//! resource's adapter.
//!
//! Every step reports one of three things:
//! - [`StepOutcome::Ready`] - the resource is usable by later steps
//! - [`StepOutcome::Halted`] - the resource was just created or is not usable
//!   yet; the pass stops and a later pass picks up from here
//! - `Err(_)` - the backend failed or a prerequisite is missing

pub mod config_map;
pub mod deployment;
pub mod oauth_client;
pub mod route;
pub mod secret;
pub mod service;

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;

use crate::crd::Console;
use crate::{APP_LABEL, APP_NAME, MANAGED_BY_LABEL, OPERATOR_NAME};

/// Key in the credential secret holding the client secret
pub const CLIENT_SECRET_KEY: &str = "clientSecret";

/// Key in the config map holding the rendered server config
pub const CONFIG_FILE_KEY: &str = "console-config.yaml";

/// Where the config map is mounted in the console container
pub const CONFIG_MOUNT_PATH: &str = "/var/console-config";

/// Where the credential secret is mounted in the console container
pub const OAUTH_MOUNT_PATH: &str = "/var/oauth-config";

/// Where the serving certificate is mounted in the console container
pub const SERVING_CERT_MOUNT_PATH: &str = "/var/serving-cert";

/// HTTPS port the console container listens on
pub const CONSOLE_PORT: i32 = 8443;

/// Managed resource kinds, in pipeline order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Network endpoint
    Route,
    /// Traffic endpoint
    Service,
    /// Config artifact
    ConfigMap,
    /// Credential
    Secret,
    /// Identity-provider registration
    OAuthClient,
    /// Workload deployment
    Deployment,
}

impl ResourceKind {
    /// All kinds in the order a pass visits them
    pub const PIPELINE_ORDER: [ResourceKind; 6] = [
        ResourceKind::Route,
        ResourceKind::Service,
        ResourceKind::ConfigMap,
        ResourceKind::Secret,
        ResourceKind::OAuthClient,
        ResourceKind::Deployment,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Route => "Route",
            Self::Service => "Service",
            Self::ConfigMap => "ConfigMap",
            Self::Secret => "Secret",
            Self::OAuthClient => "OAuthClient",
            Self::Deployment => "Deployment",
        };
        f.write_str(s)
    }
}

/// Why a pass stopped before reaching the last step
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Halt {
    /// The resource was created during this pass and is not yet fully
    /// populated by the backend
    JustCreated(ResourceKind),
    /// The resource exists but cannot be consumed yet
    NotYetReady {
        /// Resource that is not ready
        resource: ResourceKind,
        /// What is missing
        reason: String,
    },
}

impl Halt {
    /// Resource the pass stopped at
    pub fn resource(&self) -> ResourceKind {
        match self {
            Self::JustCreated(kind) => *kind,
            Self::NotYetReady { resource, .. } => *resource,
        }
    }
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JustCreated(kind) => write!(f, "{} created, waiting for next pass", kind),
            Self::NotYetReady { resource, reason } => {
                write!(f, "{} not ready: {}", resource, reason)
            }
        }
    }
}

/// Result of one sync step that did not fail
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome<T> {
    /// The resource is usable by dependent steps
    Ready {
        /// Live object after the step
        value: T,
        /// Whether the step created or updated anything
        changed: bool,
    },
    /// The pass must stop here
    Halted {
        /// Why
        halt: Halt,
        /// Whether the step created or updated anything before stopping
        changed: bool,
    },
}

impl<T> StepOutcome<T> {
    /// The resource is usable
    pub fn ready(value: T, changed: bool) -> Self {
        Self::Ready { value, changed }
    }

    /// The resource was created this pass
    pub fn created(kind: ResourceKind, changed: bool) -> Self {
        Self::Halted {
            halt: Halt::JustCreated(kind),
            changed,
        }
    }

    /// The resource exists but cannot be consumed yet
    pub fn not_ready(kind: ResourceKind, reason: impl Into<String>) -> Self {
        Self::Halted {
            halt: Halt::NotYetReady {
                resource: kind,
                reason: reason.into(),
            },
            changed: false,
        }
    }

    /// Whether the step wrote anything
    pub fn changed(&self) -> bool {
        match self {
            Self::Ready { changed, .. } | Self::Halted { changed, .. } => *changed,
        }
    }
}

/// Inputs shared by every step of a pass
#[derive(Clone, Copy, Debug)]
pub struct SyncContext<'a> {
    /// Desired state for the pass
    pub console: &'a Console,
    /// Namespace the namespaced resources live in
    pub namespace: &'a str,
    /// Image used when the console spec does not name one
    pub default_image: &'a str,
}

impl<'a> SyncContext<'a> {
    /// Labels carried by every managed object
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (APP_LABEL.to_string(), APP_NAME.to_string()),
            (MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string()),
        ])
    }

    /// Metadata for a namespaced object owned by the console
    pub fn metadata(&self, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(self.namespace.to_string()),
            labels: Some(self.labels()),
            owner_references: self
                .console
                .controller_owner_ref(&())
                .map(|owner| vec![owner]),
            ..Default::default()
        }
    }

    /// Image the console container should run
    pub fn image(&self) -> &'a str {
        self.console
            .spec
            .image
            .as_deref()
            .unwrap_or(self.default_image)
    }
}

/// Insert `desired` entries into `target`, returning whether anything changed
pub(crate) fn merge_map(
    target: &mut Option<BTreeMap<String, String>>,
    desired: &BTreeMap<String, String>,
) -> bool {
    let map = target.get_or_insert_with(BTreeMap::new);
    let mut changed = false;
    for (k, v) in desired {
        if map.get(k) != Some(v) {
            map.insert(k.clone(), v.clone());
            changed = true;
        }
    }
    changed
}

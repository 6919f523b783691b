//! Console Custom Resource Definition
//!
//! The Console CRD is the desired state for one console installation. The
//! operator only reads its spec; everything it learns during a reconciliation
//! pass is written back into the status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, CustomizationSpec};

fn default_replicas() -> u32 {
    1
}

/// Specification for a Console
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "console.operator.dev",
    version = "v1alpha1",
    kind = "Console",
    plural = "consoles",
    status = "ConsoleStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Host","type":"string","jsonPath":".status.defaultHostName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleSpec {
    /// Console release to run (e.g., "4.0")
    pub version: String,

    /// Number of console pods
    #[serde(default = "default_replicas")]
    pub replicas: u32,

    /// Console image override; the operator default is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Console server log level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Host requested when the route is first created.
    ///
    /// Once the router admits the route its host is owned by the router and
    /// is never rewritten from here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_host: Option<String>,

    /// UI customization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customization: Option<CustomizationSpec>,
}

impl ConsoleSpec {
    /// Create a spec for the given version with defaults for everything else
    pub fn for_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            replicas: default_replicas(),
            image: None,
            log_level: None,
            custom_host: None,
            customization: None,
        }
    }

    /// Validate the console specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.version.trim().is_empty() {
            return Err(crate::Error::validation("spec.version must not be empty"));
        }

        if let Some(host) = &self.custom_host {
            if host.is_empty() || host.contains("://") || host.contains('/') {
                return Err(crate::Error::validation(format!(
                    "spec.customHost must be a bare host name, got '{}'",
                    host
                )));
            }
        }

        Ok(())
    }
}

/// Status for a Console
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleStatus {
    /// Host the console is reachable at, mirrored from the route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_host_name: Option<String>,

    /// Whether the OAuth client carries the same secret as the credential
    #[serde(default)]
    pub credential_agreement: bool,

    /// Console version of the last pass that ran every step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_version: Option<String>,

    /// Conditions describing the last reconciliation pass
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ConsoleStatus {
    /// Add a condition and return self for chaining
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }

    /// Find a condition by type
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// True when writing `self` over `other` would change nothing but timestamps
    pub fn is_equivalent(&self, other: &ConsoleStatus) -> bool {
        self.default_host_name == other.default_host_name
            && self.credential_agreement == other.credential_agreement
            && self.observed_version == other.observed_version
            && self.conditions.len() == other.conditions.len()
            && self.conditions.iter().all(|c| {
                other
                    .get_condition(&c.type_)
                    .is_some_and(|o| o.same_state(c))
            })
    }
}

//! Config artifact (ConfigMap) step
//!
//! The console server reads a single YAML document mounted from the config
//! map. The document is a pure function of the console spec and the route
//! host, so the step re-renders it every pass and compares.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    merge_map, ResourceKind, StepOutcome, SyncContext, CLIENT_SECRET_KEY, CONFIG_FILE_KEY,
    CONSOLE_PORT, OAUTH_MOUNT_PATH, SERVING_CERT_MOUNT_PATH,
};
use crate::adapter::ResourceAdapter;
use crate::crd::ConsoleSpec;
use crate::{Error, CONFIG_MAP_NAME, CONSOLE_NAME};

const DEFAULT_BRANDING: &str = "okd";
const DEFAULT_DOCUMENTATION_BASE_URL: &str = "https://docs.okd.io/4.0/";
const SERVICE_ACCOUNT_CA_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Console server configuration document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleServerConfig {
    /// Config schema version
    pub api_version: String,
    /// Always ConsoleConfig
    pub kind: String,
    /// TLS listener
    pub serving_info: ServingInfo,
    /// Where the console is reachable
    pub cluster_info: ClusterInfo,
    /// OAuth login
    pub auth: AuthConfig,
    /// UI customization
    pub customization: Customization,
}

/// TLS listener settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServingInfo {
    /// Listen URL
    pub bind_address: String,
    /// Serving certificate path
    pub cert_file: String,
    /// Serving key path
    pub key_file: String,
}

/// Public address of the console
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    /// External base URL
    pub console_base_address: String,
    /// Path prefix, empty when served at the root
    pub console_base_path: String,
}

/// OAuth login settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// OAuth client name
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Mounted client secret
    pub client_secret_file: String,
    /// CA bundle for the OAuth server
    #[serde(rename = "oauthEndpointCAFile")]
    pub oauth_endpoint_ca_file: String,
    /// Where to send users after logout
    pub logout_redirect: String,
}

/// Branding shown in the UI
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customization {
    /// Product branding
    pub branding: String,
    /// Documentation link target
    #[serde(rename = "documentationBaseURL")]
    pub documentation_base_url: String,
}

impl ConsoleServerConfig {
    /// Config for a console served at `host`
    pub fn new(spec: &ConsoleSpec, host: &str) -> Self {
        let customization = spec.customization.clone().unwrap_or_default();

        Self {
            api_version: "console.openshift.io/v1".to_string(),
            kind: "ConsoleConfig".to_string(),
            serving_info: ServingInfo {
                bind_address: format!("https://0.0.0.0:{}", CONSOLE_PORT),
                cert_file: format!("{}/tls.crt", SERVING_CERT_MOUNT_PATH),
                key_file: format!("{}/tls.key", SERVING_CERT_MOUNT_PATH),
            },
            cluster_info: ClusterInfo {
                console_base_address: format!("https://{}", host),
                console_base_path: String::new(),
            },
            auth: AuthConfig {
                client_id: CONSOLE_NAME.to_string(),
                client_secret_file: format!("{}/{}", OAUTH_MOUNT_PATH, CLIENT_SECRET_KEY),
                oauth_endpoint_ca_file: SERVICE_ACCOUNT_CA_FILE.to_string(),
                logout_redirect: String::new(),
            },
            customization: Customization {
                branding: customization
                    .branding
                    .unwrap_or_else(|| DEFAULT_BRANDING.to_string()),
                documentation_base_url: customization
                    .documentation_base_url
                    .unwrap_or_else(|| DEFAULT_DOCUMENTATION_BASE_URL.to_string()),
            },
        }
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self).map_err(|e| Error::serialization(e.to_string()))
    }
}

/// ConfigMap the console should have for the given route host
pub fn default_config_map(ctx: &SyncContext<'_>, host: &str) -> Result<ConfigMap, Error> {
    let rendered = ConsoleServerConfig::new(&ctx.console.spec, host).to_yaml()?;

    Ok(ConfigMap {
        metadata: ctx.metadata(CONFIG_MAP_NAME),
        data: Some(BTreeMap::from([(CONFIG_FILE_KEY.to_string(), rendered)])),
        ..Default::default()
    })
}

/// Ensure the config map holds the config for the current host
pub async fn sync_config_map(
    config_maps: &dyn ResourceAdapter<ConfigMap>,
    ctx: &SyncContext<'_>,
    host: &str,
) -> Result<StepOutcome<ConfigMap>, Error> {
    let desired = default_config_map(ctx, host)?;

    let Some(mut existing) = config_maps.get(CONFIG_MAP_NAME).await? else {
        let (stored, created) = config_maps.create(&desired).await?;
        info!(resource = %ResourceKind::ConfigMap, name = CONFIG_MAP_NAME, created, "config map created");
        return Ok(StepOutcome::ready(stored, created));
    };

    let mut diverged = merge_map(&mut existing.metadata.labels, &ctx.labels());
    if existing.data != desired.data {
        existing.data = desired.data;
        diverged = true;
    }
    if !diverged {
        return Ok(StepOutcome::ready(existing, false));
    }

    let (stored, changed) = config_maps.update(&existing).await?;
    info!(
        resource = %ResourceKind::ConfigMap,
        version = stored.metadata.resource_version.as_deref().unwrap_or_default(),
        changed,
        "config map updated"
    );
    Ok(StepOutcome::ready(stored, changed))
}

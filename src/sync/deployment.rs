//! Workload deployment step
//!
//! The pod template carries two markers recording which config map and
//! secret versions the running pods were started with. When either input
//! moves on, the markers change, the template changes, and the deployment
//! controller rolls the pods.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, HTTPGetAction, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, Secret, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::{debug, info};

use super::service::pod_selector;
use super::{
    ResourceKind, StepOutcome, SyncContext, CONFIG_FILE_KEY, CONFIG_MOUNT_PATH, CONSOLE_PORT,
    OAUTH_MOUNT_PATH, SERVING_CERT_MOUNT_PATH,
};
use crate::adapter::ResourceAdapter;
use crate::{
    Error, CONFIG_MAP_NAME, CONFIG_VERSION_ANNOTATION, CONSOLE_NAME, OAUTH_SECRET_NAME,
    SECRET_VERSION_ANNOTATION, SERVING_CERT_SECRET_NAME,
};

const BRIDGE_BINARY: &str = "/opt/bridge/bin/bridge";

/// Versions of the inputs the console pods consume
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RolloutMarkers {
    /// resourceVersion of the config map
    pub config_version: String,
    /// resourceVersion of the credential secret
    pub secret_version: String,
}

impl RolloutMarkers {
    /// Markers for the given live inputs
    pub fn from_inputs(config_map: &ConfigMap, secret: &Secret) -> Self {
        Self {
            config_version: config_map
                .metadata
                .resource_version
                .clone()
                .unwrap_or_default(),
            secret_version: secret.metadata.resource_version.clone().unwrap_or_default(),
        }
    }

    /// Markers recorded on a deployment's pod template
    pub fn recorded(deployment: &Deployment) -> Self {
        let annotations = deployment
            .spec
            .as_ref()
            .and_then(|s| s.template.metadata.as_ref())
            .and_then(|m| m.annotations.as_ref());
        let read = |key: &str| {
            annotations
                .and_then(|a| a.get(key))
                .cloned()
                .unwrap_or_default()
        };

        Self {
            config_version: read(CONFIG_VERSION_ANNOTATION),
            secret_version: read(SECRET_VERSION_ANNOTATION),
        }
    }

    fn annotations(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                CONFIG_VERSION_ANNOTATION.to_string(),
                self.config_version.clone(),
            ),
            (
                SECRET_VERSION_ANNOTATION.to_string(),
                self.secret_version.clone(),
            ),
        ])
    }

    /// Write the markers onto the pod template, leaving other annotations alone
    fn stamp(&self, deployment: &mut Deployment) {
        let spec = deployment.spec.get_or_insert_with(Default::default);
        spec.template
            .metadata
            .get_or_insert_with(ObjectMeta::default)
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(self.annotations());
    }
}

fn console_command(ctx: &SyncContext<'_>) -> Vec<String> {
    let mut command = vec![
        BRIDGE_BINARY.to_string(),
        "--public-dir=/opt/bridge/static".to_string(),
        format!("--config={}/{}", CONFIG_MOUNT_PATH, CONFIG_FILE_KEY),
    ];
    if let Some(level) = &ctx.console.spec.log_level {
        command.push(format!("--log-level=*={}", level));
    }
    command
}

fn health_probe(initial_delay_seconds: Option<i32>) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/health".to_string()),
            port: IntOrString::Int(CONSOLE_PORT),
            scheme: Some("HTTPS".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds,
        ..Default::default()
    }
}

fn read_only_mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

fn console_container(ctx: &SyncContext<'_>) -> Container {
    Container {
        name: CONSOLE_NAME.to_string(),
        image: Some(ctx.image().to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(console_command(ctx)),
        ports: Some(vec![ContainerPort {
            name: Some("https".to_string()),
            container_port: CONSOLE_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        readiness_probe: Some(health_probe(None)),
        liveness_probe: Some(health_probe(Some(150))),
        resources: Some(ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity("10m".to_string())),
                ("memory".to_string(), Quantity("100Mi".to_string())),
            ])),
            ..Default::default()
        }),
        volume_mounts: Some(vec![
            read_only_mount("serving-cert", SERVING_CERT_MOUNT_PATH),
            read_only_mount("oauth-config", OAUTH_MOUNT_PATH),
            read_only_mount("console-config", CONFIG_MOUNT_PATH),
        ]),
        ..Default::default()
    }
}

fn secret_volume(name: &str, secret_name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Deployment the console should have, stamped with `markers`
pub fn default_deployment(ctx: &SyncContext<'_>, markers: &RolloutMarkers) -> Deployment {
    let mut pod_labels = ctx.labels();
    pod_labels.extend(pod_selector());

    let mut deployment = Deployment {
        metadata: ctx.metadata(CONSOLE_NAME),
        spec: Some(DeploymentSpec {
            replicas: Some(i32::try_from(ctx.console.spec.replicas).unwrap_or(i32::MAX)),
            selector: LabelSelector {
                match_labels: Some(pod_selector()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(CONSOLE_NAME.to_string()),
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![console_container(ctx)],
                    volumes: Some(vec![
                        secret_volume("serving-cert", SERVING_CERT_SECRET_NAME),
                        secret_volume("oauth-config", OAUTH_SECRET_NAME),
                        Volume {
                            name: "console-config".to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: CONFIG_MAP_NAME.to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    ]),
                    termination_grace_period_seconds: Some(30),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };
    markers.stamp(&mut deployment);
    deployment
}

/// Ensure the deployment exists and runs the current config and credential
pub async fn sync_deployment(
    deployments: &dyn ResourceAdapter<Deployment>,
    ctx: &SyncContext<'_>,
    config_map: &ConfigMap,
    secret: &Secret,
) -> Result<StepOutcome<Deployment>, Error> {
    let markers = RolloutMarkers::from_inputs(config_map, secret);

    let Some(existing) = deployments.get(CONSOLE_NAME).await? else {
        let desired = default_deployment(ctx, &markers);
        let (_, created) = deployments.create(&desired).await?;
        info!(
            resource = %ResourceKind::Deployment,
            config_version = %markers.config_version,
            secret_version = %markers.secret_version,
            created,
            "deployment created"
        );
        return Ok(StepOutcome::created(ResourceKind::Deployment, created));
    };

    let recorded = RolloutMarkers::recorded(&existing);
    if recorded == markers {
        debug!(resource = %ResourceKind::Deployment, "deployment markers current");
        return Ok(StepOutcome::ready(existing, false));
    }

    let mut updated = existing;
    markers.stamp(&mut updated);
    let (stored, changed) = deployments.update(&updated).await?;
    info!(
        resource = %ResourceKind::Deployment,
        from_config = %recorded.config_version,
        to_config = %markers.config_version,
        from_secret = %recorded.secret_version,
        to_secret = %markers.secret_version,
        changed,
        "deployment rolling to new inputs"
    );
    Ok(StepOutcome::ready(stored, changed))
}

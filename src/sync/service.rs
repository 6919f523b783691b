//! Traffic endpoint (Service) step

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::info;

use super::{merge_map, ResourceKind, StepOutcome, SyncContext, CONSOLE_PORT};
use crate::adapter::ResourceAdapter;
use crate::{Error, APP_LABEL, APP_NAME, CONSOLE_NAME, SERVING_CERT_SECRET_NAME};

/// Annotation asking the service CA to mint a serving certificate
pub const SERVING_CERT_ANNOTATION: &str = "service.alpha.openshift.io/serving-cert-secret-name";

/// Label identifying the console component within the app
pub const COMPONENT_LABEL: &str = "component";

/// Value of [`COMPONENT_LABEL`] on console pods
pub const COMPONENT_UI: &str = "ui";

/// Labels selecting console pods
pub fn pod_selector() -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), APP_NAME.to_string()),
        (COMPONENT_LABEL.to_string(), COMPONENT_UI.to_string()),
    ])
}

fn serving_cert_annotations() -> BTreeMap<String, String> {
    BTreeMap::from([(
        SERVING_CERT_ANNOTATION.to_string(),
        SERVING_CERT_SECRET_NAME.to_string(),
    )])
}

fn https_port() -> ServicePort {
    ServicePort {
        name: Some("https".to_string()),
        port: 443,
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::Int(CONSOLE_PORT)),
        ..Default::default()
    }
}

/// Service the console should have
pub fn default_service(ctx: &SyncContext<'_>) -> Service {
    let mut metadata = ctx.metadata(CONSOLE_NAME);
    metadata.annotations = Some(serving_cert_annotations());

    Service {
        metadata,
        spec: Some(ServiceSpec {
            ports: Some(vec![https_port()]),
            selector: Some(pod_selector()),
            type_: Some("ClusterIP".to_string()),
            session_affinity: Some("None".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Fold the desired service into `existing`, returning whether it moved.
///
/// Fields the API server fills in (cluster IP, node ports) are left alone.
fn merge_service(existing: &mut Service, desired: &Service, ctx: &SyncContext<'_>) -> bool {
    let mut changed = merge_map(&mut existing.metadata.labels, &ctx.labels());
    changed |= merge_map(&mut existing.metadata.annotations, &serving_cert_annotations());

    let Some(want) = desired.spec.as_ref() else {
        return changed;
    };
    let have = existing.spec.get_or_insert_with(Default::default);

    let port = https_port();
    let ports_match = have.ports.as_deref().is_some_and(|ports| match ports {
        [only] => {
            only.name == port.name
                && only.port == port.port
                && only.target_port == port.target_port
        }
        _ => false,
    });
    if !ports_match {
        have.ports = Some(vec![port]);
        changed = true;
    }
    if have.selector != want.selector {
        have.selector = want.selector.clone();
        changed = true;
    }
    if have.type_ != want.type_ {
        have.type_ = want.type_.clone();
        changed = true;
    }
    changed
}

/// Ensure the console service exists and selects console pods.
///
/// A freshly created service is usable immediately, so creation does not
/// stop the pass.
pub async fn sync_service(
    services: &dyn ResourceAdapter<Service>,
    ctx: &SyncContext<'_>,
) -> Result<StepOutcome<Service>, Error> {
    let desired = default_service(ctx);

    let Some(mut existing) = services.get(CONSOLE_NAME).await? else {
        let (stored, created) = services.create(&desired).await?;
        info!(resource = %ResourceKind::Service, name = CONSOLE_NAME, created, "service created");
        return Ok(StepOutcome::ready(stored, created));
    };

    if !merge_service(&mut existing, &desired, ctx) {
        return Ok(StepOutcome::ready(existing, false));
    }

    let (stored, changed) = services.update(&existing).await?;
    info!(resource = %ResourceKind::Service, changed, "service updated");
    Ok(StepOutcome::ready(stored, changed))
}

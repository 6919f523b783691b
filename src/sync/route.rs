//! Network endpoint (Route) step
//!
//! The route is created once and never deleted. Its host belongs to the
//! router as soon as it is populated; writing it from desired state would
//! fight the router forever, so only the routing fields are reconciled.

use tracing::{debug, info};

use super::{ResourceKind, StepOutcome, SyncContext};
use crate::adapter::ResourceAdapter;
use crate::openshift::{Route, RoutePort, RouteSpec, RouteTargetReference, TlsConfig};
use crate::{Error, CONSOLE_NAME};

/// Route the console should have
pub fn default_route(ctx: &SyncContext<'_>) -> Route {
    let mut route = Route::new(
        CONSOLE_NAME,
        RouteSpec {
            host: ctx.console.spec.custom_host.clone().unwrap_or_default(),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: CONSOLE_NAME.to_string(),
                weight: Some(100),
            },
            port: Some(RoutePort {
                target_port: "https".to_string(),
            }),
            tls: Some(TlsConfig {
                termination: "reencrypt".to_string(),
                insecure_edge_termination_policy: Some("Redirect".to_string()),
            }),
            wildcard_policy: Some("None".to_string()),
        },
    );
    route.metadata = ctx.metadata(CONSOLE_NAME);
    route
}

/// True when the routing fields of `existing` differ from `desired`
fn routing_diverges(existing: &RouteSpec, desired: &RouteSpec) -> bool {
    existing.to != desired.to
        || existing.port != desired.port
        || existing.tls != desired.tls
        || existing.wildcard_policy != desired.wildcard_policy
}

/// Ensure the route exists, has a host, and routes to the console service
pub async fn sync_route(
    routes: &dyn ResourceAdapter<Route>,
    ctx: &SyncContext<'_>,
) -> Result<StepOutcome<Route>, Error> {
    let desired = default_route(ctx);

    let Some(existing) = routes.get(CONSOLE_NAME).await? else {
        let (_, created) = routes.create(&desired).await?;
        info!(resource = %ResourceKind::Route, name = CONSOLE_NAME, created, "route not found, created");
        return Ok(StepOutcome::created(ResourceKind::Route, created));
    };

    if existing.host().is_none() {
        debug!(resource = %ResourceKind::Route, "waiting on route host");
        return Ok(StepOutcome::not_ready(
            ResourceKind::Route,
            "waiting on route host assignment",
        ));
    }

    if !routing_diverges(&existing.spec, &desired.spec) {
        return Ok(StepOutcome::ready(existing, false));
    }

    let mut updated = existing.clone();
    updated.spec.to = desired.spec.to;
    updated.spec.port = desired.spec.port;
    updated.spec.tls = desired.spec.tls;
    updated.spec.wildcard_policy = desired.spec.wildcard_policy;

    let (stored, changed) = routes.update(&updated).await?;
    info!(resource = %ResourceKind::Route, host = %stored.spec.host, changed, "route routing updated");
    Ok(StepOutcome::ready(stored, changed))
}

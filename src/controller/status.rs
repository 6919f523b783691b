//! Status projection
//!
//! Derives the externally visible console status from whatever a pass
//! managed to observe. A pass that stopped at the route still produces a
//! status; it just says less.

use k8s_openapi::api::core::v1::Secret;

use super::pipeline::{Observed, PassOutcome};
use crate::crd::{Condition, ConditionStatus, Console, ConsoleStatus};
use crate::openshift::OAuthClient;
use crate::sync::secret::client_secret;
use crate::Error;

/// Condition type describing the last pass
pub const SYNCED_CONDITION: &str = "Synced";

/// Whether the registration carries the credential's value.
///
/// An empty credential never matches: agreement on "nothing" is not a usable
/// login setup.
pub fn credentials_match(credential: &str, registered: &str) -> bool {
    !credential.is_empty() && credential == registered
}

fn credential_agreement(secret: Option<&Secret>, client: Option<&OAuthClient>) -> bool {
    match (secret, client) {
        (Some(secret), Some(client)) => credentials_match(&client_secret(secret), client.secret_str()),
        _ => false,
    }
}

fn failure_reason(error: &Error) -> &'static str {
    match error {
        Error::MissingPrerequisite { .. } => "MissingPrerequisite",
        Error::Conflict { .. } => "Conflict",
        Error::Validation(_) => "InvalidSpec",
        Error::Serialization(_) => "RenderFailed",
        _ => "BackendError",
    }
}

fn synced_condition(outcome: &PassOutcome) -> Condition {
    match outcome {
        PassOutcome::Converged => Condition::new(
            SYNCED_CONDITION,
            ConditionStatus::True,
            "Converged",
            "all managed resources match the desired state",
        ),
        PassOutcome::Progressed => Condition::new(
            SYNCED_CONDITION,
            ConditionStatus::True,
            "Progressed",
            "managed resources were updated to the desired state",
        ),
        PassOutcome::NotReady(halt) => Condition::new(
            SYNCED_CONDITION,
            ConditionStatus::Unknown,
            "InProgress",
            halt.to_string(),
        ),
        PassOutcome::Failed(error) => Condition::new(
            SYNCED_CONDITION,
            ConditionStatus::False,
            failure_reason(error),
            error.to_string(),
        ),
    }
}

/// Project the status for `console` after a pass
///
/// Conditions whose state did not move keep their original transition time.
pub fn project_status(console: &Console, observed: &Observed, outcome: &PassOutcome) -> ConsoleStatus {
    let previous = console.status.clone().unwrap_or_default();

    let observed_version = if outcome.is_complete() {
        Some(console.spec.version.clone())
    } else {
        previous.observed_version.clone()
    };

    let mut condition = synced_condition(outcome);
    if let Some(existing) = previous.get_condition(SYNCED_CONDITION) {
        if existing.same_state(&condition) {
            condition.last_transition_time = existing.last_transition_time;
        }
    }

    ConsoleStatus {
        default_host_name: observed
            .route
            .as_ref()
            .and_then(|route| route.host())
            .map(str::to_string),
        credential_agreement: credential_agreement(
            observed.secret.as_ref(),
            observed.oauth_client.as_ref(),
        ),
        observed_version,
        conditions: Vec::new(),
    }
    .condition(condition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openshift::{Route, RouteSpec};
    use crate::sync::secret::default_secret;
    use crate::sync::test_fixtures::{console, context};
    use crate::sync::{Halt, ResourceKind};

    fn routed(host: &str) -> Route {
        Route::new(
            "console",
            RouteSpec {
                host: host.to_string(),
                ..Default::default()
            },
        )
    }

    fn registered(secret: &str) -> OAuthClient {
        let mut client = OAuthClient::new("console");
        client.secret = Some(secret.to_string());
        client
    }

    #[test]
    fn test_credentials_match() {
        assert!(credentials_match("abc", "abc"));
        assert!(!credentials_match("abc", "abd"));
        assert!(!credentials_match("", ""));
        assert!(!credentials_match("abc", ""));
    }

    #[test]
    fn test_empty_observation_still_projects() {
        let console = console("4.0");
        let halt = Halt::NotYetReady {
            resource: ResourceKind::Route,
            reason: "waiting on route host assignment".to_string(),
        };

        let status = project_status(&console, &Observed::default(), &PassOutcome::NotReady(halt));

        assert_eq!(status.default_host_name, None);
        assert!(!status.credential_agreement);
        assert_eq!(status.observed_version, None);
        let synced = status.get_condition(SYNCED_CONDITION).unwrap();
        assert_eq!(synced.status, ConditionStatus::Unknown);
    }

    #[test]
    fn test_full_observation_reports_agreement() {
        let console = console("4.0");
        let observed = Observed {
            route: Some(routed("console.example.com")),
            secret: Some(default_secret(&context(&console), "s3cret")),
            oauth_client: Some(registered("s3cret")),
            ..Default::default()
        };

        let status = project_status(&console, &observed, &PassOutcome::Converged);

        assert_eq!(status.default_host_name.as_deref(), Some("console.example.com"));
        assert!(status.credential_agreement);
        assert_eq!(status.observed_version.as_deref(), Some("4.0"));
    }

    #[test]
    fn test_stale_registration_disagrees() {
        let console = console("4.0");
        let observed = Observed {
            secret: Some(default_secret(&context(&console), "new")),
            oauth_client: Some(registered("old")),
            ..Default::default()
        };
        let outcome = PassOutcome::Failed(Error::backend(ResourceKind::OAuthClient, "timeout"));

        let status = project_status(&console, &observed, &outcome);

        assert!(!status.credential_agreement);
        let synced = status.get_condition(SYNCED_CONDITION).unwrap();
        assert_eq!(synced.status, ConditionStatus::False);
        assert_eq!(synced.reason, "BackendError");
    }

    #[test]
    fn test_halted_pass_keeps_previous_observed_version() {
        let mut console = console("4.1");
        console.status = Some(ConsoleStatus {
            observed_version: Some("4.0".to_string()),
            ..Default::default()
        });

        let outcome = PassOutcome::NotReady(Halt::JustCreated(ResourceKind::Deployment));
        let status = project_status(&console, &Observed::default(), &outcome);

        assert_eq!(status.observed_version.as_deref(), Some("4.0"));
    }

    #[test]
    fn test_unchanged_condition_keeps_transition_time() {
        let mut console = console("4.0");
        let first = project_status(&console, &Observed::default(), &PassOutcome::Converged);
        console.status = Some(first.clone());

        let second = project_status(&console, &Observed::default(), &PassOutcome::Converged);

        assert_eq!(
            first.get_condition(SYNCED_CONDITION).unwrap().last_transition_time,
            second.get_condition(SYNCED_CONDITION).unwrap().last_transition_time
        );
        assert!(second.is_equivalent(&first));
    }
}

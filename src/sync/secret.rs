//! Credential (Secret) step
//!
//! The client secret is generated exactly once. After a non-empty value is
//! stored the step never writes the secret again, so the OAuth client and
//! the running console keep agreeing on it.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use tracing::{debug, info};

use super::{ResourceKind, StepOutcome, SyncContext, CLIENT_SECRET_KEY};
use crate::adapter::{ResourceAdapter, SecretGenerator};
use crate::{Error, OAUTH_SECRET_NAME};

/// Secret holding the given client secret value
pub fn default_secret(ctx: &SyncContext<'_>, value: &str) -> Secret {
    Secret {
        metadata: ctx.metadata(OAUTH_SECRET_NAME),
        data: Some(secret_data(value)),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

fn secret_data(value: &str) -> BTreeMap<String, ByteString> {
    BTreeMap::from([(
        CLIENT_SECRET_KEY.to_string(),
        ByteString(value.as_bytes().to_vec()),
    )])
}

/// The client secret stored in `secret`, or "" when absent or not UTF-8
pub fn client_secret(secret: &Secret) -> String {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(CLIENT_SECRET_KEY))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(CLIENT_SECRET_KEY))
                .cloned()
        })
        .unwrap_or_default()
}

/// Ensure a non-empty client secret exists
pub async fn sync_secret(
    secrets: &dyn ResourceAdapter<Secret>,
    generator: &dyn SecretGenerator,
    ctx: &SyncContext<'_>,
) -> Result<StepOutcome<Secret>, Error> {
    let Some(existing) = secrets.get(OAUTH_SECRET_NAME).await? else {
        let desired = default_secret(ctx, &generator.random_secret());
        let (_, created) = secrets.create(&desired).await?;
        info!(resource = %ResourceKind::Secret, name = OAUTH_SECRET_NAME, created, "credential created");
        return Ok(StepOutcome::created(ResourceKind::Secret, created));
    };

    if !client_secret(&existing).is_empty() {
        debug!(resource = %ResourceKind::Secret, "credential present");
        return Ok(StepOutcome::ready(existing, false));
    }

    let mut filled = existing;
    filled
        .data
        .get_or_insert_with(BTreeMap::new)
        .extend(secret_data(&generator.random_secret()));
    if let Some(string_data) = filled.string_data.as_mut() {
        string_data.remove(CLIENT_SECRET_KEY);
    }

    let (_, changed) = secrets.update(&filled).await?;
    info!(resource = %ResourceKind::Secret, changed, "empty credential regenerated");
    Ok(StepOutcome::created(ResourceKind::Secret, changed))
}

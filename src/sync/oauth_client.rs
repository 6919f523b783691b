//! Identity-provider registration (OAuthClient) step
//!
//! The OAuth client is provisioned by the cluster installer. The operator
//! only registers the console with it: the current credential and the
//! redirect URI for the current route host.

use tracing::info;

use super::{ResourceKind, StepOutcome};
use crate::adapter::ResourceAdapter;
use crate::openshift::OAuthClient;
use crate::{Error, CONSOLE_NAME};

/// Redirect URI the OAuth server sends users back to after login
pub fn redirect_uri(host: &str) -> String {
    format!("https://{}/auth/callback", host)
}

/// Point `client` at the console served on `host` with `credential`
pub fn register(client: &mut OAuthClient, host: &str, credential: &str) {
    client.secret = Some(credential.to_string());
    client.redirect_uris = vec![redirect_uri(host)];
}

/// Register the console with its OAuth client
///
/// The update is always submitted; whether it changed anything is up to the
/// backend.
pub async fn sync_oauth_client(
    oauth_clients: &dyn ResourceAdapter<OAuthClient>,
    host: &str,
    credential: &str,
) -> Result<StepOutcome<OAuthClient>, Error> {
    let Some(mut client) = oauth_clients.get(CONSOLE_NAME).await? else {
        return Err(Error::missing(
            ResourceKind::OAuthClient,
            format!(
                "oauthclient '{}' does not exist; it is provisioned with the cluster and must be restored",
                CONSOLE_NAME
            ),
        ));
    };

    register(&mut client, host, credential);
    let (stored, changed) = oauth_clients.update(&client).await?;
    if changed {
        info!(resource = %ResourceKind::OAuthClient, host, "console registered with oauth client");
    }
    Ok(StepOutcome::ready(stored, changed))
}

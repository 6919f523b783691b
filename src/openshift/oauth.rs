//! Typed binding for `oauth.openshift.io/v1` OAuthClient
//!
//! OAuthClient keeps its fields at the top level instead of under `spec`, so
//! it cannot go through the `CustomResource` derive and implements
//! [`kube::Resource`] by hand.

use std::borrow::Cow;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::{ClusterResourceScope, TypeMeta};
use kube::Resource;
use serde::{Deserialize, Serialize};

const GROUP: &str = "oauth.openshift.io";
const VERSION: &str = "v1";
const KIND: &str = "OAuthClient";

/// Cluster-scoped OAuth client registration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OAuthClient {
    /// apiVersion and kind
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,

    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Client secret the console presents to the OAuth server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// URIs the OAuth server may redirect back to
    #[serde(rename = "redirectURIs", default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_uris: Vec<String>,

    /// auto or prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_method: Option<String>,
}

impl OAuthClient {
    /// Create an empty client with the given name
    pub fn new(name: &str) -> Self {
        Self {
            types: Some(TypeMeta {
                api_version: format!("{}/{}", GROUP, VERSION),
                kind: KIND.to_string(),
            }),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// The registered secret, or "" when none is set
    pub fn secret_str(&self) -> &str {
        self.secret.as_deref().unwrap_or_default()
    }
}

impl Resource for OAuthClient {
    type DynamicType = ();
    type Scope = ClusterResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(KIND)
    }

    fn group(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(GROUP)
    }

    fn version(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(VERSION)
    }

    fn plural(_: &()) -> Cow<'_, str> {
        Cow::Borrowed("oauthclients")
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

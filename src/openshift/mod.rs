//! Bindings for the OpenShift API kinds the operator manages
//!
//! - [`Route`] - external network endpoint for the console
//! - [`OAuthClient`] - identity-provider registration for console login

mod oauth;
mod route;

pub use oauth::OAuthClient;
pub use route::{
    Route, RouteIngress, RoutePort, RouteSpec, RouteStatus, RouteTargetReference, TlsConfig,
};

//! @acp:module "OAuth Discovery"
//! @acp:summary "Static OAuth 2.0 authorization server metadata over HTTP"
//! @acp:domain auth
//! @acp:layer transport
//!
//! Serves `/.well-known/oauth-authorization-server` so MCP clients can find
//! the Microsoft Entra endpoints for the configured tenant.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::routing::any;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

pub const DISCOVERY_PATH: &str = "/.well-known/oauth-authorization-server";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl DiscoveryDocument {
    pub fn for_tenant(authority_host: &str, tenant_id: &str) -> Self {
        let base = format!("{}/{}", authority_host.trim_end_matches('/'), tenant_id);

        Self {
            issuer: format!("{}/v2.0", base),
            authorization_endpoint: format!("{}/oauth2/v2.0/authorize", base),
            token_endpoint: format!("{}/oauth2/v2.0/token", base),
            jwks_uri: format!("{}/discovery/v2.0/keys", base),
            response_types_supported: strings(&["code", "id_token", "token"]),
            grant_types_supported: strings(&[
                "authorization_code",
                "client_credentials",
                "refresh_token",
            ]),
            scopes_supported: strings(&["openid", "profile", "email", "offline_access"]),
            token_endpoint_auth_methods_supported: strings(&[
                "client_secret_post",
                "client_secret_basic",
                "private_key_jwt",
            ]),
        }
    }
}

/// Router answering every method on the discovery path
pub fn router(document: DiscoveryDocument) -> Router {
    Router::new()
        .route(DISCOVERY_PATH, any(oauth_authorization_server))
        .with_state(Arc::new(document))
}

async fn oauth_authorization_server(
    State(document): State<Arc<DiscoveryDocument>>,
) -> Json<DiscoveryDocument> {
    info!("Serving OAuth authorization server metadata");
    Json(document.as_ref().clone())
}

/// Bind the discovery address. Fails if the address is taken or not allowed.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding OAuth discovery listener on {}", addr))?;
    info!(
        "OAuth discovery listening on http://{}{}",
        listener.local_addr()?,
        DISCOVERY_PATH
    );
    Ok(listener)
}

/// Serve the discovery route on a bound listener until it fails
pub async fn serve(listener: TcpListener, document: DiscoveryDocument) -> anyhow::Result<()> {
    axum::serve(listener, router(document)).await?;
    Ok(())
}

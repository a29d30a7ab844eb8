//! @acp:module "Settings"
//! @acp:summary "Immutable runtime configuration resolved from flags and environment"
//! @acp:domain azure
//! @acp:layer config
//!
//! Subscription, tenant and cloud endpoints are resolved once at startup and
//! handed to each component at construction.

use std::net::SocketAddr;

use crate::error::{Error, Result};

pub const DEFAULT_TENANT_ID: &str = "common";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_RESOURCE_MANAGER_ENDPOINT: &str = "https://management.azure.com";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Subscription scope for resource queries
    pub subscription_id: Option<String>,
    /// Tenant advertised by the discovery document
    pub tenant_id: String,
    /// Microsoft Entra authority, e.g. `https://login.microsoftonline.com`
    pub authority_host: String,
    /// Azure Resource Manager base URL
    pub resource_manager_endpoint: String,
    /// Listen address for the discovery route, if it should be served
    pub discovery_addr: Option<SocketAddr>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            subscription_id: None,
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            resource_manager_endpoint: DEFAULT_RESOURCE_MANAGER_ENDPOINT.to_string(),
            discovery_addr: None,
        }
    }
}

impl Settings {
    /// Subscription id, or an error if none was configured.
    ///
    /// Only the resource tools need it, so a missing value is reported per
    /// invocation rather than at startup.
    pub fn subscription_id(&self) -> Result<&str> {
        self.subscription_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(Error::MissingSubscription)
    }

    /// Token scope for Azure Resource Manager calls
    pub fn management_scope(&self) -> String {
        format!(
            "{}/.default",
            self.resource_manager_endpoint.trim_end_matches('/')
        )
    }
}

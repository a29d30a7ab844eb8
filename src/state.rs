//! @acp:module "Application State"
//! @acp:summary "Shared immutable state: settings, tool registry and discovery document"
//! @acp:domain daemon
//! @acp:layer service
//!
//! Built once at startup and shared by the MCP service, the discovery route
//! and the CLI subcommands.

use std::sync::Arc;

use tracing::{info, warn};

use crate::azure::{DefaultAzureCredential, ResourceManagementClient, ResourceQuery};
use crate::config::Settings;
use crate::discovery::DiscoveryDocument;
use crate::mcp::registry::ToolRegistry;
use crate::mcp::tools::builtin_registry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    settings: Settings,
    tools: ToolRegistry,
    discovery: DiscoveryDocument,
}

impl AppState {
    /// Wire the ambient credential chain and the Resource Manager client
    pub fn load(settings: Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        match settings.subscription_id() {
            Ok(id) => info!("Subscription: {}", id),
            Err(_) => warn!("AZURE_SUBSCRIPTION_ID not set, resource tools will fail"),
        }

        let credential = Arc::new(DefaultAzureCredential::from_env(
            http.clone(),
            &settings.authority_host,
        ));
        let resources = Arc::new(ResourceManagementClient::new(http, credential, &settings));

        Ok(Self::with_resources(settings, resources))
    }

    /// Build state around any resource backend
    pub fn with_resources(settings: Settings, resources: Arc<dyn ResourceQuery>) -> Self {
        let discovery =
            DiscoveryDocument::for_tenant(&settings.authority_host, &settings.tenant_id);
        let tools = builtin_registry(resources);
        info!("Registered {} tools", tools.len());

        Self {
            inner: Arc::new(AppStateInner {
                settings,
                tools,
                discovery,
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.tools
    }

    pub fn discovery(&self) -> &DiscoveryDocument {
        &self.inner.discovery
    }
}

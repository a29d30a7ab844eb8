#![forbid(unsafe_code)]

//! @acp:module "Azure MCP Server Entry Point"
//! @acp:summary "Main entry point for the Azure MCP server"
//! @acp:domain mcp
//! @acp:layer application
//!
//! The Azure MCP server exposes read-only Azure Resource Manager queries as
//! MCP tools, plus an OAuth discovery document over HTTP for clients that
//! need to find the tenant's authorization endpoints.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod azure;
mod config;
mod discovery;
mod error;
mod mcp;
mod state;

use config::{
    Settings, DEFAULT_AUTHORITY_HOST, DEFAULT_RESOURCE_MANAGER_ENDPOINT, DEFAULT_TENANT_ID,
};
use discovery::DiscoveryDocument;
use mcp::registry::ToolInvocationContext;
use state::AppState;

/// Azure MCP Server - Azure resource management tools for AI agents
#[derive(Parser, Debug)]
#[command(name = "azure-mcp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Subscription to query
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    subscription_id: Option<String>,

    /// Tenant advertised in the OAuth discovery document
    #[arg(long, env = "AZURE_TENANT_ID", default_value = DEFAULT_TENANT_ID)]
    tenant_id: String,

    /// Microsoft Entra authority host
    #[arg(long, env = "AZURE_AUTHORITY_HOST", default_value = DEFAULT_AUTHORITY_HOST)]
    authority_host: String,

    /// Azure Resource Manager endpoint
    #[arg(
        long,
        env = "AZURE_RESOURCE_MANAGER_ENDPOINT",
        default_value = DEFAULT_RESOURCE_MANAGER_ENDPOINT
    )]
    resource_manager_endpoint: String,

    /// Serve GET /.well-known/oauth-authorization-server on this address.
    /// Without it no HTTP listener is opened; a bind failure stops startup.
    #[arg(long, env = "MCP_DISCOVERY_ADDR")]
    discovery_addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server over stdio (default)
    Serve,
    /// Print every registered tool with its property schema
    Tools,
    /// Invoke one tool with a JSON invocation envelope and print the result
    Invoke {
        /// Tool name, e.g. list_by_resource_group
        tool: String,
        /// Envelope of the form {"arguments": {...}}
        #[arg(default_value = r#"{"arguments":{}}"#)]
        envelope: String,
    },
    /// Print the OAuth discovery document
    Discovery,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            subscription_id: self.subscription_id.clone(),
            tenant_id: self.tenant_id.clone(),
            authority_host: self.authority_host.clone(),
            resource_manager_endpoint: self.resource_manager_endpoint.clone(),
            discovery_addr: self.discovery_addr,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging (to stderr so stdout is free for MCP)
    init_logging(&cli.log_level);

    let settings = cli.settings();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Tools => {
            let state = AppState::load(settings)?;
            println!("{}", serde_json::to_string_pretty(&state.tools().manifest()?)?);
            Ok(())
        }
        Command::Invoke { tool, envelope } => {
            let state = AppState::load(settings)?;
            let context = ToolInvocationContext::parse(&envelope)?;
            println!("{}", state.tools().invoke(&tool, &context).await?);
            Ok(())
        }
        Command::Discovery => {
            let document =
                DiscoveryDocument::for_tenant(&settings.authority_host, &settings.tenant_id);
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
    }
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    info!("Azure MCP Server starting");
    let state = AppState::load(settings)?;

    if let Some(addr) = state.settings().discovery_addr {
        let listener = discovery::bind(addr).await?;
        let document = state.discovery().clone();
        tokio::spawn(async move {
            if let Err(e) = discovery::serve(listener, document).await {
                error!("OAuth discovery listener failed: {}", e);
            }
        });
    } else {
        info!("No discovery address configured, OAuth discovery route disabled");
    }

    // Run MCP server over stdio
    mcp::run_stdio_server(state).await
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

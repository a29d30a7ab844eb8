//! @acp:module "MCP Server"
//! @acp:summary "Model Context Protocol server for AI agent integration"
//! @acp:domain daemon
//! @acp:layer transport
//!
//! Provides MCP server capabilities for AI agents like Claude Desktop.
//! Exposes Azure resource queries as MCP tools.

pub mod registry;
mod service;
pub mod tools;

pub use service::AzureMcpService;

use rmcp::ServiceExt;
use tokio::io::{stdin, stdout};
use tracing::{error, info};

use crate::state::AppState;

/// Run the MCP server over stdio
pub async fn run_stdio_server(state: AppState) -> anyhow::Result<()> {
    info!("Starting MCP server over stdio");

    // Create MCP service
    let service = AzureMcpService::new(state);

    // Create stdio transport
    let transport = (stdin(), stdout());

    // Serve MCP protocol
    info!("MCP server ready, waiting for requests...");
    match service.serve(transport).await {
        Ok(server) => {
            server.waiting().await?;
            info!("MCP server shutdown");
        }
        Err(e) => {
            error!("MCP server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

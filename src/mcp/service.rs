//! @acp:module "MCP Service"
//! @acp:summary "Core MCP service implementation using rmcp SDK"
//! @acp:domain daemon
//! @acp:layer service
//!
//! Implements the ServerHandler trait on top of the tool registry.
//! `tools/list` is answered from the registry's declared properties and
//! `tools/call` dispatches by tool name.

use rmcp::{model::*, ErrorData as McpError, ServerHandler};
use std::sync::Arc;
use tracing::error;

use super::registry::{properties_to_schema, ToolInvocationContext};
use crate::error::Error;
use crate::state::AppState;

/// Azure MCP Service - exposes Azure resource queries to AI agents
#[derive(Clone)]
pub struct AzureMcpService {
    state: AppState,
}

fn to_mcp_error(err: Error) -> McpError {
    match err {
        Error::ToolNotFound(_) | Error::InvalidEnvelope(_) => {
            McpError::invalid_params(err.to_string(), None)
        }
        other => {
            error!("Tool invocation failed: {}", other);
            McpError::internal_error(other.to_string(), None)
        }
    }
}

impl AzureMcpService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn build_tools(&self) -> Vec<Tool> {
        self.state
            .tools()
            .tools()
            .map(|tool| {
                Tool::new(
                    tool.name.clone(),
                    tool.description.clone(),
                    Arc::new(properties_to_schema(&tool.properties)),
                )
            })
            .collect()
    }

    /// Run one tool and wrap its text output
    async fn handle_call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        let context = ToolInvocationContext::from_arguments(arguments);
        let text = self
            .state
            .tools()
            .invoke(name, &context)
            .await
            .map_err(to_mcp_error)?;

        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[allow(clippy::manual_async_fn)]
impl ServerHandler for AzureMcpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Azure resource management tools. Use list_resource_groups to see the \
                 resource groups in the configured subscription, then \
                 list_by_resource_group to list the resources inside one."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            Ok(ListToolsResult {
                tools: self.build_tools(),
                next_cursor: None,
            })
        }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move { self.handle_call_tool(&request.name, request.arguments).await }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::mcp::tools::testing::FakeResources;

    fn create_test_service(fake: FakeResources) -> AzureMcpService {
        let state = AppState::with_resources(Settings::default(), Arc::new(fake));
        AzureMcpService::new(state)
    }

    fn text_of(result: &CallToolResult) -> String {
        result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    fn arguments(value: serde_json::Value) -> Option<JsonObject> {
        value.as_object().cloned()
    }

    #[test]
    fn test_build_tools() {
        let service = create_test_service(FakeResources::default());
        let tools = service.build_tools();

        assert_eq!(tools.len(), 3);
        assert_eq!(tools[0].name, "hello_mcp");

        let by_group = tools
            .iter()
            .find(|t| t.name == "list_by_resource_group")
            .unwrap();
        let required = by_group.input_schema.get("required").unwrap();
        assert_eq!(required, &serde_json::json!(["resource_group"]));
    }

    #[tokio::test]
    async fn test_call_hello() {
        let service = create_test_service(FakeResources::default());

        let result = service.handle_call_tool("hello_mcp", None).await.unwrap();
        assert_eq!(text_of(&result), "Hello I am MCPTool!");
    }

    #[tokio::test]
    async fn test_call_list_resource_groups() {
        let service = create_test_service(FakeResources {
            groups: vec!["rg-a", "rg-b"],
            ..Default::default()
        });

        let result = service
            .handle_call_tool("list_resource_groups", None)
            .await
            .unwrap();
        assert_eq!(text_of(&result), "rg-a\nrg-b");
    }

    #[tokio::test]
    async fn test_call_list_by_resource_group_empty_argument() {
        let service = create_test_service(FakeResources::default());

        let result = service
            .handle_call_tool(
                "list_by_resource_group",
                arguments(serde_json::json!({"resource_group": ""})),
            )
            .await
            .unwrap();
        assert_eq!(text_of(&result), "no resource group specified");
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let service = create_test_service(FakeResources::default());

        let result = service.handle_call_tool("delete_everything", None).await;
        assert!(result.is_err(), "Unknown tool should fail");
    }

    #[tokio::test]
    async fn test_call_propagates_backend_failure() {
        let service = create_test_service(FakeResources {
            fail: true,
            ..Default::default()
        });

        let result = service.handle_call_tool("list_resource_groups", None).await;
        assert!(result.is_err(), "Backend failure should surface as an error");
    }
}

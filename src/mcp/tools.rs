//! @acp:module "MCP Tools"
//! @acp:summary "Azure resource tools and the hello smoke-test tool"
//! @acp:domain mcp
//! @acp:layer service
//!
//! Each handler is single-shot: parse arguments, make one Resource Manager
//! query, format the result as newline-joined text.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::registry::{ToolHandler, ToolInvocationContext, ToolProperty, ToolRegistry};
use crate::azure::ResourceQuery;
use crate::error::Result;

pub const HELLO_MESSAGE: &str = "Hello I am MCPTool!";
pub const NO_RESOURCE_GROUP: &str = "no resource group specified";
pub const RESOURCE_GROUP_PROPERTY: &str = "resource_group";

/// Constant greeting, used to check the tool plumbing end to end
pub struct HelloTool;

#[async_trait]
impl ToolHandler for HelloTool {
    async fn call(&self, _context: &ToolInvocationContext) -> Result<String> {
        Ok(HELLO_MESSAGE.to_string())
    }
}

pub struct ListResourceGroupsTool {
    resources: Arc<dyn ResourceQuery>,
}

impl ListResourceGroupsTool {
    pub fn new(resources: Arc<dyn ResourceQuery>) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl ToolHandler for ListResourceGroupsTool {
    async fn call(&self, _context: &ToolInvocationContext) -> Result<String> {
        let groups = self.resources.list_resource_groups().await?;
        info!("Found {} resource groups", groups.len());

        for group in &groups {
            debug!(
                "{} ({})",
                group.name,
                group.location.as_deref().unwrap_or("unknown location")
            );
        }

        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        Ok(names.join("\n"))
    }
}

/// One output line of `list_by_resource_group`
#[derive(Debug, Serialize)]
struct ResourceLine<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    resource_type: &'a str,
}

pub struct ListByResourceGroupTool {
    resources: Arc<dyn ResourceQuery>,
}

impl ListByResourceGroupTool {
    pub fn new(resources: Arc<dyn ResourceQuery>) -> Self {
        Self { resources }
    }
}

#[async_trait]
impl ToolHandler for ListByResourceGroupTool {
    async fn call(&self, context: &ToolInvocationContext) -> Result<String> {
        let resource_group = match context.str_argument(RESOURCE_GROUP_PROPERTY) {
            Some(group) if !group.is_empty() => group,
            _ => return Ok(NO_RESOURCE_GROUP.to_string()),
        };

        info!("Listing resources in resource group {}", resource_group);
        let resources = self.resources.list_by_resource_group(resource_group).await?;
        info!(
            "Found {} resources in resource group {}",
            resources.len(),
            resource_group
        );

        let mut lines = Vec::with_capacity(resources.len());
        for resource in &resources {
            debug!(
                "{} created {:?}, changed {:?}",
                resource.name, resource.created_time, resource.changed_time
            );
            let line = ResourceLine {
                name: &resource.name,
                resource_type: resource.short_type()?,
            };
            lines.push(serde_json::to_string(&line)?);
        }

        Ok(lines.join("\n"))
    }
}

/// Registry with every tool this server exposes
pub fn builtin_registry(resources: Arc<dyn ResourceQuery>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register("hello_mcp", "Hello world.", vec![], Arc::new(HelloTool))
        .register(
            "list_resource_groups",
            "list all Azure resource groups",
            vec![],
            Arc::new(ListResourceGroupsTool::new(Arc::clone(&resources))),
        )
        .register(
            "list_by_resource_group",
            "list all Azure resources in a resource group",
            vec![ToolProperty::string(
                RESOURCE_GROUP_PROPERTY,
                "The name of the resource group.",
            )],
            Arc::new(ListByResourceGroupTool::new(resources)),
        );
    registry
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::azure::resources::{ResourceGroupSummary, ResourceSummary};
    use crate::azure::ResourceQuery;
    use crate::error::{Error, Result};

    /// In-memory stand-in for Resource Manager
    #[derive(Default)]
    pub struct FakeResources {
        pub groups: Vec<&'static str>,
        pub resources: Vec<(&'static str, &'static str)>,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl FakeResources {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResourceQuery for FakeResources {
        async fn list_resource_groups(&self) -> Result<Vec<ResourceGroupSummary>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Authentication("no credential".to_string()));
            }
            Ok(self
                .groups
                .iter()
                .map(|name| ResourceGroupSummary {
                    name: name.to_string(),
                    location: None,
                })
                .collect())
        }

        async fn list_by_resource_group(
            &self,
            _resource_group: &str,
        ) -> Result<Vec<ResourceSummary>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Authentication("no credential".to_string()));
            }
            Ok(self
                .resources
                .iter()
                .map(|(name, resource_type)| ResourceSummary {
                    name: name.to_string(),
                    resource_type: resource_type.to_string(),
                    created_time: None,
                    changed_time: None,
                })
                .collect())
        }
    }
}

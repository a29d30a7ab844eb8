//! @acp:module "Tool Registry"
//! @acp:summary "Name-to-handler map with declared property schemas"
//! @acp:domain mcp
//! @acp:layer service
//!
//! Built once at startup. Each entry carries the tool's name, a human
//! description, its declared properties and the handler that runs it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// JSON type of a declared tool property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
}

impl PropertyType {
    fn as_str(self) -> &'static str {
        match self {
            PropertyType::String => "string",
        }
    }
}

/// One named argument a tool accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolProperty {
    property_name: String,
    property_type: PropertyType,
    description: String,
}

impl ToolProperty {
    pub fn new(
        property_name: impl Into<String>,
        property_type: PropertyType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            property_type,
            description: description.into(),
        }
    }

    pub fn string(property_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(property_name, PropertyType::String, description)
    }

    pub fn name(&self) -> &str {
        &self.property_name
    }
}

/// Encode properties as `[{propertyName, propertyType, description}, ...]`
pub fn properties_to_json(properties: &[ToolProperty]) -> Result<String> {
    Ok(serde_json::to_string(properties)?)
}

/// JSON Schema object describing the tool's arguments. Every declared
/// property is required.
pub fn properties_to_schema(properties: &[ToolProperty]) -> Map<String, Value> {
    let mut props = Map::new();
    for property in properties {
        props.insert(
            property.property_name.clone(),
            json!({
                "type": property.property_type.as_str(),
                "description": property.description,
            }),
        );
    }

    let required: Vec<&str> = properties.iter().map(ToolProperty::name).collect();

    let mut schema = Map::new();
    schema.insert("type".to_string(), Value::String("object".to_string()));
    schema.insert("properties".to_string(), Value::Object(props));
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }
    schema
}

/// Arguments of one tool invocation
#[derive(Debug, Clone, Default)]
pub struct ToolInvocationContext {
    arguments: Map<String, Value>,
}

impl ToolInvocationContext {
    /// Parse a raw envelope of the form `{"arguments": {...}}`.
    /// A missing or null `arguments` member means no arguments.
    pub fn parse(raw: &str) -> Result<Self> {
        let envelope: Value = serde_json::from_str(raw)?;
        let Value::Object(mut envelope) = envelope else {
            return Err(Error::InvalidEnvelope(
                "envelope must be a JSON object".to_string(),
            ));
        };

        match envelope.remove("arguments") {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(Value::Object(arguments)) => Ok(Self { arguments }),
            Some(other) => Err(Error::InvalidEnvelope(format!(
                "'arguments' must be an object, got {}",
                other
            ))),
        }
    }

    pub fn from_arguments(arguments: Option<Map<String, Value>>) -> Self {
        Self {
            arguments: arguments.unwrap_or_default(),
        }
    }

    /// String value of an argument. Non-string values count as absent.
    pub fn str_argument(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).and_then(Value::as_str)
    }
}

/// Runs one tool invocation and returns its text result
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, context: &ToolInvocationContext) -> Result<String>;
}

pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub properties: Vec<ToolProperty>,
    handler: Arc<dyn ToolHandler>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A second registration under the same name replaces
    /// the first.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        properties: Vec<ToolProperty>,
        handler: Arc<dyn ToolHandler>,
    ) -> &mut Self {
        let tool = RegisteredTool {
            name: name.into(),
            description: description.into(),
            properties,
            handler,
        };

        match self.index.get(&tool.name) {
            Some(&slot) => {
                warn!("Tool {} registered twice, replacing", tool.name);
                self.tools[slot] = tool;
            }
            None => {
                debug!("Registered tool {}", tool.name);
                self.index.insert(tool.name.clone(), self.tools.len());
                self.tools.push(tool);
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    /// Tools in registration order
    pub fn tools(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.tools.iter()
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub async fn invoke(&self, name: &str, context: &ToolInvocationContext) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        debug!("Invoking tool {}", name);
        tool.handler.call(context).await
    }

    /// Trigger metadata for every tool: name, description and the
    /// JSON-encoded property list.
    pub fn manifest(&self) -> Result<Value> {
        let entries = self
            .tools()
            .map(|tool| -> Result<Value> {
                Ok(json!({
                    "toolName": tool.name,
                    "description": tool.description,
                    "toolProperties": properties_to_json(&tool.properties)?,
                }))
            })
            .collect::<Result<Vec<Value>>>()?;
        Ok(Value::Array(entries))
    }
}

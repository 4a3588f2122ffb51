//! Read-only snapshot of the tools a server exposes.

use crate::error::McpError;
use serde_json::Value;
use std::collections::HashMap;

/// A tool exposed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Name-indexed tool descriptors, in the order the server listed them.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a registry. A repeated name keeps its first descriptor.
    pub fn new(descriptors: impl IntoIterator<Item = ToolDescriptor>) -> Self {
        let mut registry = Self::default();
        for descriptor in descriptors {
            if registry.index.contains_key(&descriptor.name) {
                tracing::warn!("MCP server listed tool '{}' twice, ignoring duplicate", descriptor.name);
                continue;
            }
            registry
                .index
                .insert(descriptor.name.clone(), registry.tools.len());
            registry.tools.push(descriptor);
        }
        registry
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Like [`lookup`](Self::lookup), failing with [`McpError::UnknownTool`].
    pub fn require(&self, name: &str) -> Result<&ToolDescriptor, McpError> {
        self.lookup(name).ok_or_else(|| McpError::UnknownTool {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

use std::collections::HashMap;
use std::fmt;

use crate::tool::{DynTool, ToolDefinition};

/// Tools keyed by name, listed in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, DynTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Creates a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any tool of the same name in place.
    /// Returns the replaced tool.
    pub fn register(&mut self, tool: DynTool) -> Option<DynTool> {
        let name = tool.name().to_string();
        let previous = self.tools.insert(name.clone(), tool);
        if previous.is_none() {
            self.order.push(name);
        }
        previous
    }

    /// Gets a tool by name.
    pub fn get(&self, name: &str) -> Option<&DynTool> {
        self.tools.get(name)
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Returns all registered tools in registration order.
    pub fn list(&self) -> Vec<&DynTool> {
        self.order.iter().filter_map(|name| self.tools.get(name)).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Converts all tools to their definitions.
    pub fn to_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.list().into_iter().map(|tool| tool.to_definition()).collect()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{Tool, ToolError, ToolResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct Echo(&'static str);

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "echo"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok(args))
        }
    }

    #[test]
    fn test_registration_order_is_kept() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(Echo("b")));
        registry.register(Arc::new(Echo("a")));
        registry.register(Arc::new(Echo("c")));
        assert_eq!(registry.names(), vec!["b", "a", "c"]);

        assert!(registry.register(Arc::new(Echo("a"))).is_some());
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["b", "a", "c"]);

        let names: Vec<String> = registry
            .to_tool_definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_get_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo("echo")));
        let tool = registry.get("echo").unwrap();
        let result = tool.execute(json!({"x": 1})).await.unwrap();
        assert_eq!(result.output, json!({"x": 1}));
        assert!(registry.get("missing").is_none());
    }
}

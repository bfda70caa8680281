//! Closure-backed tools.
//!
//! `StructuredTool` pairs a name, description and argument schema with a
//! function, which is how the board tools are handed to agents.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::base_tool::{render, Tool, ToolError, ToolErrorKind, ToolResult};

/// Type alias for a structured tool function.
pub type StructuredToolFn = Arc<dyn Fn(HashMap<String, Value>) -> ToolResult + Send + Sync>;

/// A tool defined by a synchronous function over its arguments.
#[derive(Clone)]
pub struct StructuredTool {
    /// The name of the tool.
    pub name: String,
    /// A description of what the tool does.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub args_schema: Value,
    func: StructuredToolFn,
}

impl fmt::Debug for StructuredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl fmt::Display for StructuredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StructuredTool(name='{}')", self.name)
    }
}

impl StructuredTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        args_schema: Value,
        func: StructuredToolFn,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            args_schema,
            func,
        }
    }

    /// Parse raw arguments into a map.
    ///
    /// Accepts either a JSON object or a string holding one. Models sometimes
    /// send `null` for tools without arguments, which maps to an empty map.
    pub fn parse_args(raw_args: Value) -> Result<HashMap<String, Value>, ToolError> {
        match raw_args {
            Value::Object(map) => Ok(map.into_iter().collect()),
            Value::Null => Ok(HashMap::new()),
            Value::String(s) if s.trim().is_empty() => Ok(HashMap::new()),
            Value::String(s) => serde_json::from_str::<serde_json::Map<String, Value>>(&s)
                .map(|map| map.into_iter().collect())
                .map_err(|e| {
                    ToolError::new(
                        ToolErrorKind::InvalidArguments,
                        s.clone(),
                        format!("failed to parse arguments as JSON: {}", e),
                    )
                }),
            other => Err(ToolError::new(
                ToolErrorKind::InvalidArguments,
                other.to_string(),
                "arguments must be a JSON object or string",
            )),
        }
    }

    /// Run the function and keep the structured result.
    pub fn invoke(&self, args: HashMap<String, Value>) -> ToolResult {
        (self.func)(args)
    }
}

#[async_trait]
impl Tool for StructuredTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn args_schema(&self) -> Value {
        self.args_schema.clone()
    }

    async fn run(&self, args: HashMap<String, Value>) -> String {
        render(self.invoke(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool() -> StructuredTool {
        StructuredTool::new(
            "echo",
            "Echo the text argument.",
            json!({"type": "object", "properties": {"text": {"type": "string"}}}),
            Arc::new(|args: HashMap<String, Value>| {
                let text = crate::tools::base_tool::string_arg(&args, "text")?;
                Ok(text.to_uppercase())
            }),
        )
    }

    #[test]
    fn test_parse_args_variants() {
        let parsed = StructuredTool::parse_args(json!({"a": 1})).unwrap();
        assert_eq!(parsed["a"], json!(1));

        let parsed = StructuredTool::parse_args(json!("{\"a\": \"x\"}")).unwrap();
        assert_eq!(parsed["a"], json!("x"));

        assert!(StructuredTool::parse_args(Value::Null).unwrap().is_empty());
        assert!(StructuredTool::parse_args(json!("")).unwrap().is_empty());
        assert!(StructuredTool::parse_args(json!([1, 2])).is_err());
        assert!(StructuredTool::parse_args(json!("{not json")).is_err());
    }

    #[tokio::test]
    async fn test_run_renders_success_and_failure() {
        let tool = echo_tool();
        let mut args = HashMap::new();
        args.insert("text".to_string(), json!("hi"));
        assert_eq!(tool.run(args).await, "HI");

        let out = tool.run(HashMap::new()).await;
        assert!(out.starts_with("Invalid arguments:"));
    }

    #[test]
    fn test_spec_uses_schema() {
        let spec = echo_tool().spec();
        assert_eq!(spec.name, "echo");
        assert_eq!(spec.parameters["properties"]["text"]["type"], "string");
    }
}

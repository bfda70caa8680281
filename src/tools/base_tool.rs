//! Base tool definitions.
//!
//! Provides the [`Tool`] trait every agent-callable action implements and the
//! structured [`ToolError`] used internally by tool implementations.
//!
//! Agents only ever see text: a tool's `run` renders both success and
//! failure to a single string, so the model can read a rejection and retry
//! inside its own reasoning loop.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::llms::base_llm::ToolSpec;

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

/// Failure category of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// A FEN could not be loaded.
    InvalidPosition,
    /// A move code is not shaped like `e2e4` / `e7e8q`.
    InvalidMoveFormat,
    /// A well-formed move code that is not legal in the current position.
    IllegalMove,
    /// A side-restricted tool was used while the other side is to move.
    NotYourTurn,
    /// Algebraic notation that does not resolve to a legal move.
    InvalidSan,
    /// A required argument is missing or has the wrong type.
    InvalidArguments,
    /// The remote tool provider failed or reported an error.
    Remote,
}

/// Structured tool failure.
///
/// `input` is what the caller passed, `detail` explains the failure and
/// `suggestions` lists inputs that would have succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub input: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, input: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            input: input.into(),
            detail: detail.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Missing or mistyped argument.
    pub fn missing_argument(name: &str) -> Self {
        Self::new(
            ToolErrorKind::InvalidArguments,
            name,
            format!("missing required string argument '{}'", name),
        )
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ToolErrorKind::InvalidPosition => f.write_str(&self.detail),
            ToolErrorKind::InvalidMoveFormat => write!(
                f,
                "Invalid UCI format '{}'. Use convert_move_to_uci tool if you have algebraic \
                 notation, or get_legal_moves to see valid UCI moves.",
                self.input
            ),
            ToolErrorKind::IllegalMove => write!(
                f,
                "Illegal move '{}'. Use UCI format like these legal moves: {}",
                self.input,
                self.suggestions.join(", ")
            ),
            ToolErrorKind::NotYourTurn => write!(
                f,
                "Not your turn: it's {} to move. Wait for opponent.",
                self.detail
            ),
            ToolErrorKind::InvalidSan => write!(
                f,
                "Could not convert '{}' to UCI format. Error: {}",
                self.input, self.detail
            ),
            ToolErrorKind::InvalidArguments => write!(f, "Invalid arguments: {}", self.detail),
            ToolErrorKind::Remote => write!(f, "Tool error: {}", self.detail),
        }
    }
}

impl std::error::Error for ToolError {}

/// Result of a tool implementation before it is rendered for an agent.
pub type ToolResult = Result<String, ToolError>;

/// Render a tool result to the text an agent reads.
pub fn render(result: ToolResult) -> String {
    match result {
        Ok(text) => text,
        Err(e) => e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tool trait
// ---------------------------------------------------------------------------

/// An action an agent can call by name.
///
/// Implementors take a map of primitive arguments and return one
/// descriptive string. Failures are part of the text, never a hard error.
#[async_trait]
pub trait Tool: Send + Sync + fmt::Debug {
    /// The unique name of the tool.
    fn name(&self) -> &str;

    /// Description used to tell the model when to use the tool.
    fn description(&self) -> &str;

    /// JSON schema for the arguments that the tool accepts.
    fn args_schema(&self) -> Value {
        empty_schema()
    }

    /// Execute the tool.
    async fn run(&self, args: HashMap<String, Value>) -> String;

    /// Declaration advertised to a model for native function calling.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.args_schema(),
        }
    }
}

/// Schema for a tool without arguments.
pub fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Fetch a string argument.
pub fn string_arg<'a>(args: &'a HashMap<String, Value>, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::missing_argument(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_move_rendering() {
        let err = ToolError::new(ToolErrorKind::IllegalMove, "e2e5", "not legal")
            .with_suggestions(vec!["e2e4".into(), "d2d4".into()]);
        assert_eq!(
            err.to_string(),
            "Illegal move 'e2e5'. Use UCI format like these legal moves: e2e4, d2d4"
        );
    }

    #[test]
    fn test_not_your_turn_rendering() {
        let err = ToolError::new(ToolErrorKind::NotYourTurn, "e7e5", "white");
        assert_eq!(
            err.to_string(),
            "Not your turn: it's white to move. Wait for opponent."
        );
    }

    #[test]
    fn test_render_passes_success_through() {
        assert_eq!(render(Ok("fine".into())), "fine");
        let err = ToolError::new(ToolErrorKind::InvalidMoveFormat, "Nf3", "bad shape");
        assert!(render(Err(err)).starts_with("Invalid UCI format 'Nf3'."));
    }

    #[test]
    fn test_string_arg() {
        let mut args = HashMap::new();
        args.insert("move".to_string(), json!("e2e4"));
        args.insert("depth".to_string(), json!(3));
        assert_eq!(string_arg(&args, "move").unwrap(), "e2e4");
        let err = string_arg(&args, "depth").unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::InvalidArguments);
        assert!(string_arg(&args, "fen").is_err());
    }

    #[test]
    fn test_error_serializes_kind_tag() {
        let err = ToolError::new(ToolErrorKind::InvalidSan, "Zz9", "invalid san");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "invalid_san");
        assert!(value.get("suggestions").is_none());
    }
}

//! Agent-callable tools.
//!
//! - [`base_tool`] - the [`Tool`] trait and structured [`ToolError`]
//! - [`structured_tool`] - closure-backed tools with a JSON schema
//! - [`board_tools`] - the six board tools bound to a shared board
//! - [`mcp_native_tool`] - tools served by a remote MCP server

pub mod base_tool;
pub mod board_tools;
pub mod mcp_native_tool;
pub mod structured_tool;

pub use base_tool::{render, Tool, ToolError, ToolErrorKind, ToolResult};
pub use board_tools::{create_base_tools, BoardTools, LegalMoves, MoveOutcome};
pub use mcp_native_tool::McpTool;
pub use structured_tool::StructuredTool;

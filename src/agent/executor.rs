//! Tool-calling agent loop.
//!
//! [`ToolAgent::stream`] drives a native function-calling loop: call the
//! model, run the tools it asked for, feed the results back, and repeat until
//! the model answers without tool calls. Each step is surfaced as an
//! [`AgentEvent`] on a lazy stream, so a consumer sees tool results as soon as
//! they exist.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};

use crate::agent::AgentError;
use crate::llms::base_llm::{ChatMessage, ChatModel, ToolCallRequest, ToolSpec};
use crate::tools::base_tool::Tool;
use crate::tools::structured_tool::StructuredTool;

/// Default cap on model calls per invocation.
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

/// One step of the agent loop.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// The model answered; the message may carry tool calls.
    Agent { message: ChatMessage },
    /// Results of the requested tool calls, in request order.
    Tools { messages: Vec<ChatMessage> },
}

/// A chat model wired to a fixed set of tools.
#[derive(Clone)]
pub struct ToolAgent {
    model: Arc<dyn ChatModel>,
    tools: Vec<Arc<dyn Tool>>,
    pub max_iterations: usize,
}

impl fmt::Debug for ToolAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolAgent")
            .field("provider", &self.model.provider())
            .field("model", &self.model.model())
            .field("tools", &self.tool_names())
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

enum Phase {
    CallModel,
    RunTools(Vec<ToolCallRequest>),
    Done,
}

struct LoopState {
    agent: ToolAgent,
    specs: Vec<ToolSpec>,
    messages: Vec<ChatMessage>,
    iterations: usize,
    phase: Phase,
}

impl ToolAgent {
    pub fn new(model: Arc<dyn ChatModel>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            model,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn model(&self) -> &dyn ChatModel {
        self.model.as_ref()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Run the loop over `messages`.
    ///
    /// Nothing happens until the stream is polled. The stream ends after the
    /// model's final answer, or right after the first error.
    pub fn stream(
        &self,
        messages: Vec<ChatMessage>,
    ) -> BoxStream<'static, Result<AgentEvent, AgentError>> {
        let state = LoopState {
            agent: self.clone(),
            specs: self.tools.iter().map(|t| t.spec()).collect(),
            messages,
            iterations: 0,
            phase: Phase::CallModel,
        };

        stream::unfold(state, |mut state| async move {
            match std::mem::replace(&mut state.phase, Phase::Done) {
                Phase::Done => None,
                Phase::RunTools(calls) => {
                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        let output = state.agent.execute_tool(call).await;
                        results.push(ChatMessage::tool_result(call, output));
                    }
                    state.messages.extend(results.iter().cloned());
                    state.phase = Phase::CallModel;
                    Some((Ok(AgentEvent::Tools { messages: results }), state))
                }
                Phase::CallModel => {
                    if state.iterations >= state.agent.max_iterations {
                        log::warn!(
                            "Agent stopped after {} model calls without a final answer",
                            state.iterations
                        );
                        let err = AgentError::MaxIterations(state.agent.max_iterations);
                        return Some((Err(err), state));
                    }
                    state.iterations += 1;

                    let completion = state.agent.model.complete(&state.messages, &state.specs);
                    let response = match completion.await {
                        Ok(response) => response,
                        Err(e) => return Some((Err(AgentError::Model(e)), state)),
                    };
                    log::debug!(
                        "Agent iteration {}: {} tool call(s)",
                        state.iterations,
                        response.tool_calls.len()
                    );

                    let message = ChatMessage::from_response(&response);
                    state.messages.push(message.clone());
                    if response.has_tool_calls() {
                        state.phase = Phase::RunTools(response.tool_calls);
                    }
                    Some((Ok(AgentEvent::Agent { message }), state))
                }
            }
        })
        .boxed()
    }

    /// Run one requested tool call and return the text the model will read.
    ///
    /// Unknown tools and malformed arguments become error text, not failures.
    async fn execute_tool(&self, call: &ToolCallRequest) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.name() == call.name) else {
            log::warn!("Agent requested unknown tool {}", call.name);
            return format!(
                "Error: {} is not a valid tool, try one of [{}].",
                call.name,
                self.tool_names().join(", ")
            );
        };

        let args: HashMap<_, _> = match StructuredTool::parse_args(call.arguments.clone()) {
            Ok(args) => args,
            Err(e) => return e.to_string(),
        };
        log::debug!("Agent calling tool {} with {:?}", call.name, args);
        tool.run(args).await
    }
}

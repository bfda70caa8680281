//! Scripted model and factory doubles for tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::agent::{AgentError, AgentFactory, ModelConfig, ToolAgent};
use crate::llms::base_llm::{
    new_call_id, ChatMessage, ChatModel, LlmError, ModelResponse, ToolCallRequest, ToolSpec,
};
use crate::tools::Tool;

/// Model response asking for a single tool call.
pub fn tool_call(name: &str, arguments: Value) -> ModelResponse {
    ModelResponse {
        content: Value::Null,
        tool_calls: vec![ToolCallRequest::new(new_call_id(), name, arguments)],
    }
}

/// A model that replays queued responses and records every request.
///
/// Clones share the same queue, so one script can span several agents.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    script: Arc<Mutex<VecDeque<Result<ModelResponse, LlmError>>>>,
    requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<ModelResponse, LlmError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<ModelResponse, LlmError> {
        self.requests.lock().push(messages.to_vec());
        self.script.lock().pop_front().unwrap_or_else(|| {
            Err(LlmError::Api {
                provider: "scripted".into(),
                status: 503,
                body: "script exhausted".into(),
            })
        })
    }
}

/// Factory handing every agent the same [`ScriptedModel`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    pub model: ScriptedModel,
    /// Tool names given to each created agent, in creation order.
    pub created: Arc<Mutex<Vec<Vec<String>>>>,
    pub fail: bool,
}

impl ScriptedFactory {
    pub fn new(script: Vec<Result<ModelResponse, LlmError>>) -> Self {
        Self {
            model: ScriptedModel::new(script),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<Vec<String>> {
        self.created.lock().clone()
    }
}

impl AgentFactory for ScriptedFactory {
    fn create_agent(
        &self,
        config: &ModelConfig,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<ToolAgent, AgentError> {
        if self.fail {
            return Err(AgentError::MissingCredential {
                provider: config.provider,
                env_var: "TEST_API_KEY".into(),
            });
        }
        self.created
            .lock()
            .push(tools.iter().map(|t| t.name().to_string()).collect());
        Ok(ToolAgent::new(Arc::new(self.model.clone()), tools))
    }
}

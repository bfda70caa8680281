//! Folding an agent's event stream into the transcript.
//!
//! The bridge never fails: tool results, final answers and errors all end up
//! as transcript entries, and every append yields a full snapshot.

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

use crate::agent::executor::{AgentEvent, ToolAgent};
use crate::llms::base_llm::ChatMessage;
use crate::transcript::{Role, Transcript, TranscriptEntry};

/// Answer text used when the model only called tools.
pub const TOOL_CALL_PLACEHOLDER: &str = "Calling tool(s)";

/// Convert transcript history into model messages.
///
/// Assistant entries become assistant messages; every other role becomes a
/// user message. A trailing user entry is dropped since the instruction
/// restates it.
pub fn to_chat_messages(transcript: &Transcript) -> Vec<ChatMessage> {
    let mut entries = transcript.entries();
    if let Some((last, rest)) = entries.split_last() {
        if last.role == Role::User {
            entries = rest;
        }
    }
    entries
        .iter()
        .map(|entry| match entry.role {
            Role::Assistant => ChatMessage::assistant(entry.content.clone()),
            Role::User | Role::System => ChatMessage::user(entry.content.clone()),
        })
        .collect()
}

/// Text of a final answer.
///
/// A list yields its first element, an object its `text` field; anything
/// empty falls back to [`TOOL_CALL_PLACEHOLDER`].
pub fn extract_answer_text(content: &Value) -> String {
    let first = match content {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };
    let text = match first {
        Value::Object(map) => map.get("text").unwrap_or(&Value::Null),
        other => other,
    };
    match text {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Null | Value::String(_) | Value::Bool(false) => TOOL_CALL_PLACEHOLDER.to_string(),
        other => other.to_string(),
    }
}

/// Drive one agent turn and yield the transcript after every append.
///
/// The instruction goes to the model after the converted history but is not
/// itself added to the transcript.
pub fn invoke(
    agent: &ToolAgent,
    transcript: Transcript,
    instruction: String,
) -> BoxStream<'static, Transcript> {
    log::info!("Invoking agent with instruction: {}", instruction.trim());
    let mut messages = to_chat_messages(&transcript);
    messages.push(ChatMessage::user(instruction));

    let events = agent.stream(messages);
    stream::unfold(
        (events, transcript, false),
        |(mut events, mut transcript, finished)| async move {
            if finished {
                return None;
            }
            let mut snapshots = Vec::new();
            let mut finished = false;
            match events.next().await {
                None => return None,
                Some(Ok(AgentEvent::Tools { messages })) => {
                    for message in messages {
                        let tool = message.name.clone().unwrap_or_default();
                        log::debug!("Tool {} returned: {}", tool, message.text_content());
                        transcript.push(TranscriptEntry::tool_result(tool, message.text_content()));
                        snapshots.push(transcript.clone());
                    }
                }
                Some(Ok(AgentEvent::Agent { message })) => {
                    let text = extract_answer_text(&message.content);
                    log::debug!("Agent message: {}", text);
                    transcript.push(TranscriptEntry::assistant(text));
                    snapshots.push(transcript.clone());
                }
                Some(Err(e)) => {
                    log::error!("Agent invocation failed: {}", e);
                    transcript.push(TranscriptEntry::assistant(format!("Error: {}", e)));
                    snapshots.push(transcript.clone());
                    finished = true;
                }
            }
            Some((stream::iter(snapshots), (events, transcript, finished)))
        },
    )
    .flatten()
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardHandle, Side};
    use crate::llms::base_llm::{LlmError, ModelResponse, ToolCallRequest};
    use crate::testing::{tool_call, ScriptedModel};
    use crate::tools::create_base_tools;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_extract_answer_text() {
        assert_eq!(extract_answer_text(&json!("e4 played")), "e4 played");
        assert_eq!(extract_answer_text(&json!(["first", "second"])), "first");
        assert_eq!(
            extract_answer_text(&json!([{"type": "text", "text": "hello"}, {"type": "tool_use"}])),
            "hello"
        );
        assert_eq!(extract_answer_text(&json!({"text": "keyed"})), "keyed");
        assert_eq!(extract_answer_text(&json!([])), TOOL_CALL_PLACEHOLDER);
        assert_eq!(extract_answer_text(&json!("")), TOOL_CALL_PLACEHOLDER);
        assert_eq!(extract_answer_text(&Value::Null), TOOL_CALL_PLACEHOLDER);
        assert_eq!(
            extract_answer_text(&json!([{"type": "tool_use", "id": "x"}])),
            TOOL_CALL_PLACEHOLDER
        );
    }

    #[test]
    fn test_to_chat_messages_maps_roles_and_drops_trailing_user() {
        let transcript: Transcript = vec![
            TranscriptEntry::system("New game started. White to move."),
            TranscriptEntry::assistant("e4"),
            TranscriptEntry::tool_result("make_move", "fen | status=ongoing"),
            TranscriptEntry::user("what now?"),
        ]
        .into();
        let messages = to_chat_messages(&transcript);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], ChatMessage::user("New game started. White to move."));
        assert_eq!(messages[1], ChatMessage::assistant("e4"));
        assert_eq!(messages[2], ChatMessage::assistant("fen | status=ongoing"));

        let transcript: Transcript = vec![TranscriptEntry::assistant("done")].into();
        assert_eq!(to_chat_messages(&transcript).len(), 1);
    }

    #[tokio::test]
    async fn test_invoke_yields_after_each_entry() {
        let board = BoardHandle::default();
        let mut call = tool_call("make_move", json!({"move": "e2e4"}));
        call.tool_calls.push(ToolCallRequest::new("c2", "get_status", json!({})));
        let model = ScriptedModel::new(vec![
            Ok(call),
            Ok(ModelResponse {
                content: json!([{"type": "text", "text": "I opened with e4."}]),
                tool_calls: Vec::new(),
            }),
        ]);
        let tools = create_base_tools(board.clone(), Some(Side::White));
        let agent = ToolAgent::new(Arc::new(model.clone()), tools);

        let start: Transcript =
            vec![TranscriptEntry::system("New game started. White to move.")].into();
        let snapshots: Vec<Transcript> = invoke(&agent, start, "your move".into()).collect().await;

        // placeholder answer, two tool results, final answer
        assert_eq!(snapshots.len(), 4);
        let last = snapshots.last().unwrap();
        assert_eq!(last.len(), 5);
        assert_eq!(last.entries()[1].content, TOOL_CALL_PLACEHOLDER);
        assert_eq!(last.entries()[2].attribution.as_deref(), Some("make_move"));
        assert_eq!(last.entries()[3].attribution.as_deref(), Some("get_status"));
        assert_eq!(last.entries()[4].content, "I opened with e4.");
        for (i, snapshot) in snapshots.iter().enumerate() {
            assert_eq!(snapshot.len(), i + 2);
        }

        let sent = &model.requests()[0];
        assert_eq!(sent.last().unwrap(), &ChatMessage::user("your move"));
        assert_eq!(board.side_to_move(), Side::Black);
    }

    #[tokio::test]
    async fn test_invoke_turns_failure_into_error_entry() {
        let model = ScriptedModel::new(vec![Err(LlmError::Api {
            provider: "openai".into(),
            status: 401,
            body: "bad key".into(),
        })]);
        let agent = ToolAgent::new(Arc::new(model), Vec::new());
        let snapshots: Vec<Transcript> = invoke(&agent, Transcript::default(), "go".into())
            .collect()
            .await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].len(), 1);
        assert_eq!(snapshots[0].entries()[0].role, Role::Assistant);
        assert!(snapshots[0].entries()[0].content.starts_with("Error: "));
        assert!(snapshots[0].entries()[0].content.contains("bad key"));
    }
}

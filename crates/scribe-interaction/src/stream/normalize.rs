//! Reduces stream records to [`AgentMessage`]s.

use std::collections::HashMap;

use scribe_core::agent::{AgentMessage, MessageRole, ToolInvocation, ToolStatus};
use serde_json::Value;

use super::record::{ContentBlock, StreamRecord, text_of};

/// Per-session normalizer.
///
/// Remembers tool-use ids so that later results, which only carry the id,
/// can be labelled with the tool's name.
#[derive(Debug, Default)]
pub struct StreamNormalizer {
    tool_names: HashMap<String, String>,
}

impl StreamNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes one complete stdout line.
    ///
    /// Blank lines yield nothing. Lines that are not typed records always
    /// yield exactly one streaming assistant message carrying the raw line.
    pub fn normalize_line(&mut self, line: &str) -> Option<AgentMessage> {
        if line.trim().is_empty() {
            return None;
        }
        match StreamRecord::parse(line) {
            Some(record) => self.normalize(record),
            None => Some(AgentMessage::assistant(line).streaming()),
        }
    }

    pub fn normalize(&mut self, record: StreamRecord) -> Option<AgentMessage> {
        match record {
            StreamRecord::Assistant {
                message: Some(envelope),
                ..
            } => self.assistant_turn(envelope.blocks()),
            StreamRecord::Assistant { content, text, .. } | StreamRecord::Text { text, content } => {
                let fragment = non_empty(&[&content, &text])?;
                Some(AgentMessage::assistant(fragment).streaming())
            }
            StreamRecord::ContentBlockDelta { delta } => delta_text(&delta),
            StreamRecord::StreamEvent { event } => {
                if event.get("type").and_then(Value::as_str) == Some("content_block_delta") {
                    delta_text(event.get("delta").unwrap_or(&Value::Null))
                } else {
                    None
                }
            }
            StreamRecord::ToolUse { id, name, input } => {
                let name = name.unwrap_or_else(|| "unknown".to_string());
                if let Some(id) = id {
                    self.tool_names.insert(id, name.clone());
                }
                Some(tool_started(name, input))
            }
            StreamRecord::ToolResult {
                tool_use_id,
                name,
                content,
                is_error,
            } => {
                let name = name.or_else(|| self.name_for(tool_use_id.as_deref()));
                Some(tool_finished(vec![(name, text_of(&content), is_error)]))
            }
            StreamRecord::User { message } => {
                let results: Vec<_> = message
                    .map(|m| m.blocks())
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } => Some((self.name_for(tool_use_id.as_deref()), text_of(&content), is_error)),
                        _ => None,
                    })
                    .collect();
                (!results.is_empty()).then(|| tool_finished(results))
            }
            StreamRecord::Error { error, message } => {
                let text = non_empty(&[&error, &message]).unwrap_or_else(|| "Unknown error".to_string());
                Some(AgentMessage::system(text))
            }
            StreamRecord::Result {
                result,
                content,
                is_error,
                subtype,
            } => {
                if is_error {
                    tracing::warn!(?subtype, "[StreamParser] agent reported an error result");
                }
                non_empty(&[&result, &content]).map(AgentMessage::assistant)
            }
            StreamRecord::System {
                subtype,
                session_id,
                model,
            } => {
                tracing::debug!(?subtype, ?session_id, ?model, "[StreamParser] system record");
                None
            }
            StreamRecord::Unknown => None,
        }
    }

    fn assistant_turn(&mut self, blocks: Vec<ContentBlock>) -> Option<AgentMessage> {
        let mut text = String::new();
        let mut tools = Vec::new();
        for block in blocks {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::ToolUse { id, name, input } => {
                    if let Some(id) = id {
                        self.tool_names.insert(id, name.clone());
                    }
                    let mut tool = ToolInvocation::new(name, input);
                    tool.advance(ToolStatus::Running);
                    tools.push(tool);
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
            }
        }

        if text.is_empty() {
            let first = tools.first()?;
            text = format!("Using tool: {}", first.name);
        }
        let mut message = AgentMessage::assistant(text);
        message.tool_calls = tools;
        Some(message)
    }

    fn name_for(&self, tool_use_id: Option<&str>) -> Option<String> {
        tool_use_id.and_then(|id| self.tool_names.get(id).cloned())
    }
}

fn non_empty(fields: &[&Value]) -> Option<String> {
    fields.iter().map(|v| text_of(v)).find(|s| !s.is_empty())
}

fn delta_text(delta: &Value) -> Option<AgentMessage> {
    let fragment = text_of(delta);
    (!fragment.is_empty()).then(|| AgentMessage::assistant(fragment).streaming())
}

fn tool_started(name: String, input: Value) -> AgentMessage {
    let mut tool = ToolInvocation::new(name.clone(), input);
    tool.advance(ToolStatus::Running);
    AgentMessage::assistant(format!("Using tool: {name}")).with_tool(tool)
}

/// One message for one or more finished tools. The output text lives on the
/// invocation; the message body is a short label.
fn tool_finished(results: Vec<(Option<String>, String, bool)>) -> AgentMessage {
    let mut labels = Vec::with_capacity(results.len());
    let mut tools = Vec::with_capacity(results.len());
    for (name, output, is_error) in results {
        let name = name.unwrap_or_else(|| "unknown".to_string());
        let mut tool = ToolInvocation::new(name.clone(), Value::Object(Default::default()));
        tool.output = Some(output);
        tool.advance(ToolStatus::Running);
        tool.advance(if is_error {
            ToolStatus::Error
        } else {
            ToolStatus::Completed
        });
        labels.push(format!("Tool result: {name}"));
        tools.push(tool);
    }
    let mut message = AgentMessage::new(MessageRole::Assistant, labels.join("\n"));
    message.tool_calls = tools;
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn one(line: &str) -> AgentMessage {
        StreamNormalizer::new()
            .normalize_line(line)
            .unwrap_or_else(|| panic!("expected a message for {line}"))
    }

    #[test]
    fn test_malformed_line_becomes_plain_text() {
        for line in ["Loading config...", "{broken json", "[1,2,3]", r#"{"no":"type"}"#] {
            let msg = one(line);
            assert_eq!(msg.role, MessageRole::Assistant);
            assert_eq!(msg.content, line);
            assert!(msg.is_streaming);
        }
    }

    #[test]
    fn test_blank_and_unknown_lines_yield_nothing() {
        let mut n = StreamNormalizer::new();
        assert!(n.normalize_line("   ").is_none());
        assert!(n.normalize_line(r#"{"type":"future_event_kind","payload":{}}"#).is_none());
        assert!(n.normalize_line(r#"{"type":"system","subtype":"init","model":"m"}"#).is_none());
    }

    #[test]
    fn test_assistant_envelope_collects_text_and_tools() {
        let msg = one(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Let me "},{"type":"text","text":"check."},{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"a.md"}}]}}"#,
        );
        assert_eq!(msg.content, "Let me check.");
        assert!(!msg.is_streaming);
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].name, "Read");
        assert_eq!(msg.tool_calls[0].input, json!({"file_path": "a.md"}));
        assert_eq!(msg.tool_calls[0].status, ToolStatus::Running);
    }

    #[test]
    fn test_tool_only_turn_gets_synthetic_label() {
        let msg = one(r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Grep","input":{}}]}}"#);
        assert_eq!(msg.content, "Using tool: Grep");
    }

    #[test]
    fn test_empty_assistant_turn_is_dropped() {
        let mut n = StreamNormalizer::new();
        assert!(
            n.normalize_line(r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hm"}]}}"#)
                .is_none()
        );
    }

    #[test]
    fn test_deltas_are_streaming_fragments() {
        let mut n = StreamNormalizer::new();
        let a = n
            .normalize_line(r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"Hel"}}"#)
            .unwrap();
        let b = n.normalize_line(r#"{"type":"text","text":"lo"}"#).unwrap();
        let c = n
            .normalize_line(
                r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"!"}}}"#,
            )
            .unwrap();
        assert_eq!(format!("{}{}{}", a.content, b.content, c.content), "Hello!");
        assert!(a.is_streaming && b.is_streaming && c.is_streaming);
        assert!(
            n.normalize_line(r#"{"type":"stream_event","event":{"type":"message_start"}}"#)
                .is_none()
        );
    }

    #[test]
    fn test_standalone_tool_events() {
        let mut n = StreamNormalizer::new();
        let started = n
            .normalize_line(r#"{"type":"tool_use","id":"t9","name":"Write","input":{"path":"x"}}"#)
            .unwrap();
        assert_eq!(started.content, "Using tool: Write");
        assert_eq!(started.tool_calls[0].status, ToolStatus::Running);

        let finished = n
            .normalize_line(r#"{"type":"tool_result","tool_use_id":"t9","content":"wrote 3 lines"}"#)
            .unwrap();
        assert_eq!(finished.tool_calls[0].name, "Write");
        assert_eq!(finished.tool_calls[0].status, ToolStatus::Completed);
        assert_eq!(finished.tool_calls[0].output.as_deref(), Some("wrote 3 lines"));
    }

    #[test]
    fn test_user_envelope_tool_results_use_remembered_names() {
        let mut n = StreamNormalizer::new();
        n.normalize_line(r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"abc","name":"Bash","input":{}}]}}"#);
        let msg = n
            .normalize_line(r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"abc","content":[{"type":"text","text":"exit 2"}],"is_error":true}]}}"#)
            .unwrap();
        assert_eq!(msg.tool_calls[0].name, "Bash");
        assert_eq!(msg.tool_calls[0].status, ToolStatus::Error);
        assert_eq!(msg.tool_calls[0].output.as_deref(), Some("exit 2"));

        assert!(
            n.normalize_line(r#"{"type":"user","message":{"content":"plain prompt echo"}}"#)
                .is_none()
        );
    }

    #[test]
    fn test_error_record_is_system_message() {
        let msg = one(r#"{"type":"error","error":{"message":"overloaded"}}"#);
        assert_eq!(msg.role, MessageRole::System);
        assert_eq!(msg.content, "overloaded");

        let fallback = one(r#"{"type":"error"}"#);
        assert_eq!(fallback.content, "Unknown error");
    }

    #[test]
    fn test_result_is_final_assistant_message() {
        let msg = one(r#"{"type":"result","subtype":"success","result":"hi there","is_error":false}"#);
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.content, "hi there");
        assert!(!msg.is_streaming);
    }

    #[test]
    fn test_mistyped_fields_still_classify_by_type() {
        let result = one(r#"{"type":"result","result":"hi there","is_error":null}"#);
        assert_eq!(result.content, "hi there");
        assert!(!result.is_streaming);

        let mut n = StreamNormalizer::new();
        let started = n
            .normalize_line(r#"{"type":"tool_use","id":7,"name":"Read","input":{}}"#)
            .unwrap();
        assert_eq!(started.tool_calls.len(), 1);
        assert_eq!(started.tool_calls[0].name, "Read");
        let finished = n
            .normalize_line(r#"{"type":"tool_result","tool_use_id":7,"content":"ok","is_error":"no"}"#)
            .unwrap();
        assert_eq!(finished.tool_calls[0].name, "Read");
        assert_eq!(finished.tool_calls[0].status, ToolStatus::Completed);

        let turn = one(r#"{"type":"assistant","message":"Draft ready."}"#);
        assert_eq!(turn.content, "Draft ready.");
        assert!(!turn.is_streaming);

        let blocks = one(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":null},{"type":"tool_use","id":1,"name":"Grep"}]}}"#,
        );
        assert_eq!(blocks.content, "Using tool: Grep");

        let error = one(r#"{"type":"error","message":"rate limited","error":null}"#);
        assert_eq!(error.role, MessageRole::System);
        assert_eq!(error.content, "rate limited");

        let mut quiet = StreamNormalizer::new();
        assert!(quiet.normalize_line(r#"{"type":"system","subtype":1,"session_id":null}"#).is_none());
        assert!(quiet.normalize_line(r#"{"type":"user","message":false}"#).is_none());
    }
}

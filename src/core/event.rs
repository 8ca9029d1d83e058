//! Stream event decoding.
//!
//! Each line of the response body is one JSON object tagged by an `object`
//! or `type` field. Decoding never fails outward: anything unknown or
//! malformed becomes [`StreamEvent::Unrecognized`] and is dropped by the
//! transport loop. One line is one event; there is no re-buffering of a
//! JSON object split across lines.

use serde_json::Value;

use crate::api::{ChunkEvent, ToolResultEvent, ToolUseEvent, UsageEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk {
        content: String,
        session_id: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: String,
    },
    ToolResult {
        tool_id: String,
        name: Option<String>,
        is_error: bool,
        output: String,
        duration_ms: Option<u64>,
        exit_code: Option<i32>,
    },
    Usage {
        input_tokens: u64,
        output_tokens: u64,
        cost: f64,
    },
    Done,
    Unrecognized,
}

fn extract_data_payload(line: &str) -> &str {
    line.strip_prefix("data:")
        .map(str::trim_start)
        .unwrap_or(line)
}

fn tool_input_text(input: Value) -> String {
    match input {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Decode one raw protocol line into a typed event.
pub fn decode_event(line: &str) -> StreamEvent {
    let payload = extract_data_payload(line.trim());
    if payload == "[DONE]" {
        return StreamEvent::Done;
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(_) => return StreamEvent::Unrecognized,
    };

    let kind = value
        .get("object")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    match kind.as_str() {
        "chat.completion.chunk" => match serde_json::from_value::<ChunkEvent>(value) {
            Ok(event) => StreamEvent::Chunk {
                content: event
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .unwrap_or_default(),
                session_id: event.session_id,
            },
            Err(_) => StreamEvent::Unrecognized,
        },
        "tool_use" => match serde_json::from_value::<ToolUseEvent>(value) {
            Ok(event) => StreamEvent::ToolUse {
                id: event.id,
                name: event.name,
                input: tool_input_text(event.input),
            },
            Err(_) => StreamEvent::Unrecognized,
        },
        "tool_result" => match serde_json::from_value::<ToolResultEvent>(value) {
            Ok(event) => StreamEvent::ToolResult {
                tool_id: event.tool_id,
                name: event.name,
                is_error: event.is_error,
                output: event.content,
                duration_ms: event.duration_ms,
                exit_code: event.exit_code,
            },
            Err(_) => StreamEvent::Unrecognized,
        },
        "usage" => match serde_json::from_value::<UsageEvent>(value) {
            Ok(event) => StreamEvent::Usage {
                input_tokens: event.input_tokens,
                output_tokens: event.output_tokens,
                cost: event.total_cost,
            },
            Err(_) => StreamEvent::Unrecognized,
        },
        "done" => StreamEvent::Done,
        _ => StreamEvent::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_chunk_with_and_without_data_prefix() {
        let bare = r#"{"object":"chat.completion.chunk","choices":[{"delta":{"content":"Hi"}}]}"#;
        let prefixed = format!("data: {bare}");
        for line in [bare.to_string(), prefixed] {
            match decode_event(&line) {
                StreamEvent::Chunk {
                    content,
                    session_id,
                } => {
                    assert_eq!(content, "Hi");
                    assert!(session_id.is_none());
                }
                other => panic!("expected chunk, got {other:?}"),
            }
        }
    }

    #[test]
    fn chunk_carries_server_assigned_session_id() {
        let line = r#"{"object":"chat.completion.chunk","session_id":"s-42","choices":[{"delta":{"content":""}}]}"#;
        match decode_event(line) {
            StreamEvent::Chunk { session_id, .. } => {
                assert_eq!(session_id.as_deref(), Some("s-42"))
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn decodes_tool_use_with_object_input() {
        let line = r#"{"type":"tool_use","id":"t1","name":"Search","input":{"q":"rust"}}"#;
        match decode_event(line) {
            StreamEvent::ToolUse { id, name, input } => {
                assert_eq!(id, "t1");
                assert_eq!(name, "Search");
                assert_eq!(input, r#"{"q":"rust"}"#);
            }
            other => panic!("expected tool_use, got {other:?}"),
        }
    }

    #[test]
    fn decodes_tool_result_fields() {
        let line = r#"{"type":"tool_result","tool_id":"t1","name":"Search","is_error":false,"content":"3 results","duration_ms":120,"exit_code":0}"#;
        match decode_event(line) {
            StreamEvent::ToolResult {
                tool_id,
                is_error,
                output,
                duration_ms,
                exit_code,
                ..
            } => {
                assert_eq!(tool_id, "t1");
                assert!(!is_error);
                assert_eq!(output, "3 results");
                assert_eq!(duration_ms, Some(120));
                assert_eq!(exit_code, Some(0));
            }
            other => panic!("expected tool_result, got {other:?}"),
        }
    }

    #[test]
    fn decodes_usage_totals() {
        let line = r#"{"type":"usage","input_tokens":30,"output_tokens":20,"total_cost":0.002}"#;
        assert_eq!(
            decode_event(line),
            StreamEvent::Usage {
                input_tokens: 30,
                output_tokens: 20,
                cost: 0.002
            }
        );
    }

    #[test]
    fn done_sentinels_decode_to_done() {
        assert_eq!(decode_event("data: [DONE]"), StreamEvent::Done);
        assert_eq!(decode_event(r#"{"type":"done"}"#), StreamEvent::Done);
    }

    #[test]
    fn unknown_and_malformed_lines_are_unrecognized() {
        assert_eq!(
            decode_event(r#"{"type":"telemetry","n":1}"#),
            StreamEvent::Unrecognized
        );
        assert_eq!(decode_event("not json at all"), StreamEvent::Unrecognized);
        assert_eq!(
            decode_event(r#"{"object":"chat.completion.chunk","choices":"oops"}"#),
            StreamEvent::Unrecognized
        );
    }
}

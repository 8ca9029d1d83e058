use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message in the outbound completion request.
#[derive(Serialize, Clone)]
pub struct ApiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub messages: Vec<ApiMessage>,
    pub stream: bool,
}

#[derive(Deserialize)]
pub struct ChunkDelta {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ChunkChoice {
    pub delta: ChunkDelta,
}

/// A `chat.completion.chunk` stream event.
#[derive(Deserialize)]
pub struct ChunkEvent {
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// A `tool_use` stream event. `input` arrives as arbitrary JSON.
#[derive(Deserialize)]
pub struct ToolUseEvent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

/// A `tool_result` stream event.
#[derive(Deserialize)]
pub struct ToolResultEvent {
    pub tool_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

/// A `usage` stream event. Totals are cumulative for the turn.
#[derive(Deserialize, Clone, Copy)]
pub struct UsageEvent {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost: f64,
}

#[derive(Deserialize)]
pub struct CompletionMessage {
    pub content: String,
}

#[derive(Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

/// The single-object response body of a non-streaming completion call.
#[derive(Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub usage: Option<UsageEvent>,
}

/// Response of `GET v1/chat/completions/{session_id}/status`, the
/// authoritative token/cost accounting for a finished turn.
#[derive(Deserialize)]
pub struct SessionStatusResponse {
    pub total_tokens: u64,
    pub total_cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_skips_absent_session_id() {
        let request = ChatRequest {
            model: "gpt-test".into(),
            project_id: "p1".into(),
            session_id: None,
            messages: vec![ApiMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
            stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("session_id").is_none());
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn tool_result_defaults_optional_fields() {
        let event: ToolResultEvent =
            serde_json::from_str(r#"{"tool_id":"t1"}"#).unwrap();
        assert_eq!(event.tool_id, "t1");
        assert!(!event.is_error);
        assert!(event.duration_ms.is_none());
        assert!(event.exit_code.is_none());
        assert_eq!(event.content, "");
    }

    #[test]
    fn completion_response_parses_usage() {
        let body = r#"{
            "choices": [{"message": {"content": "Hello!"}}],
            "session_id": "s-9",
            "usage": {"input_tokens": 12, "output_tokens": 4, "total_cost": 0.001}
        }"#;
        let response: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.choices[0].message.content, "Hello!");
        assert_eq!(response.session_id.as_deref(), Some("s-9"));
        assert_eq!(response.usage.unwrap().input_tokens, 12);
    }
}

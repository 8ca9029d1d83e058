//! Streaming transport.
//!
//! One tokio task per turn reads the chunked response body, splits it into
//! lines, decodes each line, and forwards the events over a single mpsc
//! channel in arrival order. Every message is tagged with the turn's
//! `stream_id` so the consumer can structurally discard traffic from a
//! cancelled or superseded turn.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ApiMessage, ChatRequest, CompletionResponse, SessionStatusResponse};
use crate::core::config::Config;
use crate::core::event::{decode_event, StreamEvent};
use crate::utils::url::construct_api_url;

/// How long a single body-chunk read may stall before the turn is failed.
/// The protocol has no request-level deadline; an idle-read cap keeps a
/// dead connection from hanging the turn forever.
pub const IDLE_READ_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone, Debug)]
pub enum StreamMessage {
    /// A decoded protocol event.
    Event(StreamEvent),
    /// Transport or HTTP failure, carrying diagnostic text. At most one
    /// per turn.
    Error(String),
    /// The stream finished, cleanly or after an error. Exactly one per
    /// turn that was actually spawned.
    End,
    /// Authoritative post-stream accounting from the status resource.
    UsageReconciled { total_tokens: u64, total_cost: f64 },
    /// Timer message that retires a displayed error.
    ClearError,
}

pub type StreamSender = mpsc::UnboundedSender<(StreamMessage, u64)>;
pub type StreamReceiver = mpsc::UnboundedReceiver<(StreamMessage, u64)>;

/// Everything one turn needs, snapshotted at spawn time.
pub struct TurnParams {
    pub config: Config,
    pub session_id: Option<String>,
    pub messages: Vec<ApiMessage>,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

/// The seam between the session controller and the network. Production
/// uses [`HttpTurnTransport`]; tests substitute a scripted fake.
#[async_trait]
pub trait TurnTransport: Send + Sync {
    /// Open one turn against the backend and feed its events into the
    /// shared channel. Never blocks the caller.
    fn spawn_turn(&self, params: TurnParams);

    /// Best-effort server-side cancellation of an in-flight generation.
    fn spawn_cancel(&self, config: Config, session_id: String);

    /// Fetch the authoritative usage for a finished turn and report it as
    /// [`StreamMessage::UsageReconciled`].
    fn spawn_reconcile(&self, config: Config, session_id: String, stream_id: u64);

    /// Schedule a [`StreamMessage::ClearError`] for the given turn.
    fn spawn_error_clear(&self, stream_id: u64, delay: Duration);

    /// Probe backend health before opening a stream.
    async fn health_check(&self, config: &Config) -> Result<(), String>;
}

fn summarize_error_body(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Reduce an error response body to a one-line diagnostic, pulling the
/// message out of common JSON error envelopes when possible.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "API error: <empty response>".to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = summarize_error_body(&value) {
            if !summary.is_empty() {
                return format!("API error: {summary}");
            }
        }
    }

    format!("API error: {trimmed}")
}

/// Decode one line and forward the event. Returns true when the line ends
/// the stream. Unrecognized lines are dropped, one line never aborts the
/// turn.
fn forward_line(line: &str, tx: &StreamSender, stream_id: u64) -> bool {
    if line.is_empty() {
        return false;
    }
    match decode_event(line) {
        StreamEvent::Done => {
            let _ = tx.send((StreamMessage::End, stream_id));
            true
        }
        StreamEvent::Unrecognized => {
            debug!(stream_id, line, "dropping unrecognized stream line");
            false
        }
        event => {
            let _ = tx.send((StreamMessage::Event(event), stream_id));
            false
        }
    }
}

/// Synthesize the streaming channel traffic for a completed non-streaming
/// turn: one chunk event, the usage event when present, then `End`.
fn forward_completion(completion: CompletionResponse, tx: &StreamSender, stream_id: u64) {
    let content = completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .unwrap_or_default();
    let _ = tx.send((
        StreamMessage::Event(StreamEvent::Chunk {
            content,
            session_id: completion.session_id,
        }),
        stream_id,
    ));
    if let Some(usage) = completion.usage {
        let _ = tx.send((
            StreamMessage::Event(StreamEvent::Usage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                cost: usage.total_cost,
            }),
            stream_id,
        ));
    }
    let _ = tx.send((StreamMessage::End, stream_id));
}

fn apply_auth(request: reqwest::RequestBuilder, config: &Config) -> reqwest::RequestBuilder {
    match config.api_key.as_deref() {
        Some(key) if !key.is_empty() => request.header("Authorization", format!("Bearer {key}")),
        _ => request,
    }
}

pub struct HttpTurnTransport {
    client: reqwest::Client,
    tx: StreamSender,
}

impl HttpTurnTransport {
    pub fn new(client: reqwest::Client, tx: StreamSender) -> Self {
        Self { client, tx }
    }

    /// Convenience constructor creating the channel alongside the
    /// transport, mirroring how the controller consumes it.
    pub fn with_channel(client: reqwest::Client) -> (Self, StreamSender, StreamReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(client, tx.clone()), tx, rx)
    }

    async fn run_streaming_turn(
        client: reqwest::Client,
        tx: StreamSender,
        request: ChatRequest,
        config: Config,
        cancel_token: CancellationToken,
        stream_id: u64,
    ) {
        let url = construct_api_url(&config.base_url, "v1/chat/completions");
        let http_request = apply_auth(request_json(&client, &url), &config);

        let response = match http_request.json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(stream_id, error = %e, "stream connect failed");
                let _ = tx.send((StreamMessage::Error(format_api_error(&e.to_string())), stream_id));
                let _ = tx.send((StreamMessage::End, stream_id));
                return;
            }
        };

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            let _ = tx.send((StreamMessage::Error(format_api_error(&error_text)), stream_id));
            let _ = tx.send((StreamMessage::End, stream_id));
            return;
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let chunk = match tokio::time::timeout(IDLE_READ_TIMEOUT, stream.next()).await {
                Ok(chunk) => chunk,
                Err(_) => {
                    let _ = tx.send((
                        StreamMessage::Error("stream idle timeout: no data received".to_string()),
                        stream_id,
                    ));
                    let _ = tx.send((StreamMessage::End, stream_id));
                    return;
                }
            };

            let Some(chunk) = chunk else {
                // Clean remote close terminates the turn.
                let _ = tx.send((StreamMessage::End, stream_id));
                return;
            };

            if cancel_token.is_cancelled() {
                return;
            }

            let chunk_bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx.send((StreamMessage::Error(format_api_error(&e.to_string())), stream_id));
                    let _ = tx.send((StreamMessage::End, stream_id));
                    return;
                }
            };

            buffer.extend_from_slice(&chunk_bytes);
            while let Some(newline_pos) = memchr(b'\n', &buffer) {
                let ended = match std::str::from_utf8(&buffer[..newline_pos]) {
                    Ok(line) => forward_line(line.trim(), &tx, stream_id),
                    Err(e) => {
                        debug!(stream_id, error = %e, "invalid utf-8 in stream, dropping line");
                        false
                    }
                };
                buffer.drain(..=newline_pos);
                if ended {
                    return;
                }
            }
        }
    }

    async fn run_blocking_turn(
        client: reqwest::Client,
        tx: StreamSender,
        request: ChatRequest,
        config: Config,
        stream_id: u64,
    ) {
        let url = construct_api_url(&config.base_url, "v1/chat/completions");
        let http_request = apply_auth(request_json(&client, &url), &config);

        let response = match http_request.json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                let _ = tx.send((StreamMessage::Error(format_api_error(&e.to_string())), stream_id));
                let _ = tx.send((StreamMessage::End, stream_id));
                return;
            }
        };

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            let _ = tx.send((StreamMessage::Error(format_api_error(&error_text)), stream_id));
            let _ = tx.send((StreamMessage::End, stream_id));
            return;
        }

        match response.json::<CompletionResponse>().await {
            Ok(completion) => forward_completion(completion, &tx, stream_id),
            Err(e) => {
                let _ = tx.send((StreamMessage::Error(format_api_error(&e.to_string())), stream_id));
                let _ = tx.send((StreamMessage::End, stream_id));
            }
        }
    }
}

fn request_json(client: &reqwest::Client, url: &str) -> reqwest::RequestBuilder {
    client.post(url).header("Content-Type", "application/json")
}

#[async_trait]
impl TurnTransport for HttpTurnTransport {
    fn spawn_turn(&self, params: TurnParams) {
        let client = self.client.clone();
        let tx = self.tx.clone();
        let TurnParams {
            config,
            session_id,
            messages,
            cancel_token,
            stream_id,
        } = params;

        let request = ChatRequest {
            model: config.model.clone(),
            project_id: config.project_id.clone(),
            session_id,
            messages,
            stream: config.streaming_enabled,
        };

        tokio::spawn(async move {
            if config.streaming_enabled {
                tokio::select! {
                    _ = Self::run_streaming_turn(
                        client, tx, request, config, cancel_token.clone(), stream_id,
                    ) => {}
                    _ = cancel_token.cancelled() => {
                        debug!(stream_id, "stream cancelled");
                    }
                }
            } else {
                tokio::select! {
                    _ = Self::run_blocking_turn(client, tx, request, config, stream_id) => {}
                    _ = cancel_token.cancelled() => {}
                }
            }
        });
    }

    fn spawn_cancel(&self, config: Config, session_id: String) {
        let client = self.client.clone();
        tokio::spawn(async move {
            let url = construct_api_url(
                &config.base_url,
                &format!("v1/chat/completions/{session_id}"),
            );
            let request = apply_auth(client.delete(url), &config);
            if let Err(e) = request.send().await {
                debug!(error = %e, "server-side cancel failed");
            }
        });
    }

    fn spawn_reconcile(&self, config: Config, session_id: String, stream_id: u64) {
        let client = self.client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let url = construct_api_url(
                &config.base_url,
                &format!("v1/chat/completions/{session_id}/status"),
            );
            let request = apply_auth(client.get(url), &config);
            let status = async {
                request
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<SessionStatusResponse>()
                    .await
            }
            .await;

            match status {
                Ok(status) => {
                    let _ = tx.send((
                        StreamMessage::UsageReconciled {
                            total_tokens: status.total_tokens,
                            total_cost: status.total_cost,
                        },
                        stream_id,
                    ));
                }
                // Interim in-stream usage stays in place when the status
                // resource is unavailable.
                Err(e) => debug!(stream_id, error = %e, "usage reconciliation failed"),
            }
        });
    }

    fn spawn_error_clear(&self, stream_id: u64, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send((StreamMessage::ClearError, stream_id));
        });
    }

    async fn health_check(&self, config: &Config) -> Result<(), String> {
        crate::core::monitor::probe(&self.client, config).await
    }
}

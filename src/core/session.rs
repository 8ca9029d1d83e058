//! Session orchestration.
//!
//! [`SessionController`] drives one conversational turn at a time: it owns
//! the transcript, the tool list, and the usage snapshot, spawns turns
//! through a [`TurnTransport`], and consumes the event channel on a single
//! context so the trackers never race each other. Every channel message is
//! tagged with a stream id; bumping the id is how a cancelled or superseded
//! turn's traffic is discarded without tearing down the channel.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::config::Config;
use crate::core::event::StreamEvent;
use crate::core::message::ChatMessage;
use crate::core::tools::{ToolExecution, ToolExecutionTracker};
use crate::core::transcript::TranscriptAssembler;
use crate::core::transport::{StreamMessage, StreamReceiver, TurnParams, TurnTransport};
use crate::core::usage::{SessionInfo, SessionUsage, UsageAccumulator};

/// How long a surfaced error stays visible before reverting to
/// `Disconnected`. The indicator clears; the turn is never resent
/// automatically.
pub const ERROR_DISPLAY_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    Idle,
    Sending,
    Streaming,
}

pub struct SessionController {
    transport: Arc<dyn TurnTransport>,
    rx: StreamReceiver,
    config: Config,
    transcript: TranscriptAssembler,
    tools: ToolExecutionTracker,
    usage: UsageAccumulator,
    status: ConnectionStatus,
    last_error: Option<String>,
    session_id: Option<String>,
    phase: TurnPhase,
    current_stream_id: u64,
    cancel_token: Option<CancellationToken>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn TurnTransport>, rx: StreamReceiver, config: Config) -> Self {
        Self {
            transport,
            rx,
            config,
            transcript: TranscriptAssembler::new(),
            tools: ToolExecutionTracker::new(),
            usage: UsageAccumulator::new(),
            status: ConnectionStatus::Disconnected,
            last_error: None,
            session_id: None,
            phase: TurnPhase::Idle,
            current_stream_id: 0,
            cancel_token: None,
        }
    }

    /// Send one user message and open a turn. Single-flight: a no-op while
    /// a turn is already in progress.
    pub async fn send_message(&mut self, text: &str) {
        if self.phase != TurnPhase::Idle {
            debug!("send_message ignored: turn already in flight");
            return;
        }
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.clear_error();

        if let Err(e) = self.transport.health_check(&self.config).await {
            self.surface_error(e);
            return;
        }

        // A partial reply stranded by a failed turn is committed here;
        // once the new user message lands behind it, it could never be
        // finalized or removed again.
        self.transcript.finalize();
        self.transcript.push_user(text);
        self.begin_turn();
    }

    /// Drop a dangling partial reply from a failed or aborted turn, then
    /// resend the most recent user message.
    pub async fn retry_last_message(&mut self) {
        if self.phase != TurnPhase::Idle {
            return;
        }
        self.transcript.remove_dangling();
        if self.transcript.last_user_text().is_none() {
            return;
        }
        self.clear_error();

        if let Err(e) = self.transport.health_check(&self.config).await {
            self.surface_error(e);
            return;
        }

        self.begin_turn();
    }

    /// Stop the active turn. Idempotent: calling again, or after the turn
    /// already finished, changes nothing. After this returns, traffic from
    /// the cancelled turn can no longer mutate published state.
    pub fn stop_streaming(&mut self) {
        if self.phase == TurnPhase::Idle {
            return;
        }
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        // Retiring the stream id structurally discards anything the dying
        // task still manages to send.
        self.current_stream_id += 1;
        self.phase = TurnPhase::Idle;
        // A truncated reply is committed, not discarded.
        self.transcript.finalize();
        self.status = ConnectionStatus::Disconnected;

        if let Some(session_id) = self.session_id.clone() {
            self.transport.spawn_cancel(self.config.clone(), session_id);
        }
    }

    fn begin_turn(&mut self) {
        self.current_stream_id += 1;
        let token = CancellationToken::new();
        self.cancel_token = Some(token.clone());
        self.phase = TurnPhase::Sending;
        self.status = ConnectionStatus::Connecting;

        self.transport.spawn_turn(TurnParams {
            config: self.config.clone(),
            session_id: self.session_id.clone(),
            messages: self.transcript.api_messages(),
            cancel_token: token,
            stream_id: self.current_stream_id,
        });
    }

    /// Drain every message currently queued without awaiting.
    pub fn process_pending(&mut self) {
        while let Ok((message, stream_id)) = self.rx.try_recv() {
            self.handle_message(message, stream_id);
        }
    }

    /// Await and process one channel message. Returns false once the
    /// channel is closed (all transport senders dropped).
    pub async fn next_message(&mut self) -> bool {
        match self.rx.recv().await {
            Some((message, stream_id)) => {
                self.handle_message(message, stream_id);
                true
            }
            None => false,
        }
    }

    /// Process messages until the active turn finishes. Usage
    /// reconciliation may still arrive afterwards; it is applied on the
    /// next processing call.
    pub async fn run_turn(&mut self) {
        while self.phase != TurnPhase::Idle {
            if !self.next_message().await {
                break;
            }
        }
    }

    fn handle_message(&mut self, message: StreamMessage, stream_id: u64) {
        if stream_id != self.current_stream_id {
            debug!(stream_id, "dropping message from superseded stream");
            return;
        }
        match message {
            StreamMessage::Event(event) => {
                if self.phase == TurnPhase::Sending {
                    self.phase = TurnPhase::Streaming;
                    self.status = ConnectionStatus::Connected;
                }
                self.dispatch_event(event);
            }
            StreamMessage::Error(text) => {
                self.cancel_token = None;
                self.phase = TurnPhase::Idle;
                // The trailing End from the failed turn must not flip the
                // status back to Connected.
                self.current_stream_id += 1;
                self.surface_error(text);
            }
            StreamMessage::End => self.finish_turn(),
            StreamMessage::UsageReconciled {
                total_tokens,
                total_cost,
            } => {
                self.usage.reconcile(total_tokens, total_cost);
            }
            StreamMessage::ClearError => {
                if matches!(self.status, ConnectionStatus::Error(_)) {
                    self.status = ConnectionStatus::Disconnected;
                    self.last_error = None;
                }
            }
        }
    }

    fn dispatch_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Chunk {
                content,
                session_id,
            } => {
                // Adopt a server-assigned session id on the first turn.
                if self.session_id.is_none() {
                    if let Some(id) = session_id {
                        self.session_id = Some(id);
                    }
                }
                if !content.is_empty() {
                    self.transcript.on_chunk(&content);
                }
            }
            StreamEvent::ToolUse { id, name, input } => {
                self.tools.begin(id, name, input);
            }
            StreamEvent::ToolResult {
                tool_id,
                name,
                is_error,
                output,
                duration_ms,
                exit_code,
            } => {
                self.tools
                    .complete(&tool_id, name, is_error, output, duration_ms, exit_code);
            }
            StreamEvent::Usage {
                input_tokens,
                output_tokens,
                cost,
            } => {
                self.usage.record(input_tokens, output_tokens, cost);
            }
            StreamEvent::Done => self.finish_turn(),
            StreamEvent::Unrecognized => {}
        }
    }

    fn finish_turn(&mut self) {
        if self.phase == TurnPhase::Idle {
            return;
        }
        self.cancel_token = None;
        self.phase = TurnPhase::Idle;
        self.transcript.finalize();
        self.status = ConnectionStatus::Connected;

        if let Some(session_id) = self.session_id.clone() {
            self.transport
                .spawn_reconcile(self.config.clone(), session_id, self.current_stream_id);
        }
    }

    fn surface_error(&mut self, text: String) {
        debug!(error = %text, "turn failed");
        self.last_error = Some(text.clone());
        self.status = ConnectionStatus::Error(text);
        self.transport
            .spawn_error_clear(self.current_stream_id, ERROR_DISPLAY_DURATION);
    }

    fn clear_error(&mut self) {
        self.last_error = None;
        if matches!(self.status, ConnectionStatus::Error(_)) {
            self.status = ConnectionStatus::Disconnected;
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.transcript.messages()
    }

    pub fn tool_executions(&self) -> &[ToolExecution] {
        self.tools.executions()
    }

    pub fn usage(&self) -> SessionUsage {
        self.usage.snapshot()
    }

    pub fn connection_status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn current_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == TurnPhase::Streaming
    }

    pub fn is_busy(&self) -> bool {
        self.phase != TurnPhase::Idle
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Post-turn summary, available once the server has assigned a
    /// session id.
    pub fn session_info(&self) -> Option<SessionInfo> {
        let usage = self.usage.snapshot();
        self.session_id.as_ref().map(|id| SessionInfo {
            id: id.clone(),
            project_id: self.config.project_id.clone(),
            model: self.config.model.clone(),
            message_count: self.transcript.len(),
            total_tokens: usage.total_tokens,
            total_cost: usage.total_cost,
        })
    }
}

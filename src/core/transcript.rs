//! In-flight transcript assembly.
//!
//! Chunk deltas are appended to the open assistant message in the exact
//! order the transport delivered them. The assembler never reorders or
//! deduplicates; arrival order is the only ordering source of truth.

use crate::api::ApiMessage;
use crate::core::message::{ChatMessage, Role};

#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    messages: Vec<ChatMessage>,
    next_id: u64,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> u64 {
        let id = self.allocate_id();
        self.messages.push(ChatMessage::user(id, content));
        id
    }

    /// Fold one chunk delta into the open assistant message, opening a new
    /// one on the first chunk of the turn.
    pub fn on_chunk(&mut self, delta: &str) {
        if !matches!(self.messages.last(), Some(last) if last.is_assistant() && last.is_streaming)
        {
            let id = self.allocate_id();
            self.messages.push(ChatMessage::assistant_streaming(id));
        }
        if let Some(last) = self.messages.last_mut() {
            last.content.push_str(delta);
        }
    }

    /// Close the open assistant message, if any. Safe to call repeatedly;
    /// a stopped turn commits whatever partial content has arrived.
    pub fn finalize(&mut self) {
        if let Some(last) = self.messages.last_mut() {
            last.is_streaming = false;
        }
    }

    /// Drop a dangling partial assistant reply left by an aborted turn.
    /// Returns whether anything was removed.
    pub fn remove_dangling(&mut self) -> bool {
        match self.messages.last() {
            Some(last) if last.is_assistant() && last.is_streaming => {
                self.messages.pop();
                true
            }
            _ => false,
        }
    }

    pub fn last_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|msg| msg.is_user())
            .map(|msg| msg.content.clone())
    }

    /// Conversation history shaped for the completion request body.
    pub fn api_messages(&self) -> Vec<ApiMessage> {
        self.messages
            .iter()
            .filter(|msg| !msg.is_streaming)
            .map(|msg| ApiMessage {
                role: msg.role.as_str().to_string(),
                content: msg.content.clone(),
            })
            .collect()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_concatenate_in_arrival_order() {
        let mut transcript = TranscriptAssembler::new();
        transcript.push_user("Hello");
        for delta in ["Hi", " there", "!"] {
            transcript.on_chunk(delta);
        }
        let last = transcript.messages().last().unwrap();
        assert_eq!(last.content, "Hi there!");
        assert!(last.is_streaming);
        // One user message plus one assistant message, not one per chunk.
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn finalize_clears_streaming_flag() {
        let mut transcript = TranscriptAssembler::new();
        transcript.on_chunk("partial");
        transcript.finalize();
        let last = transcript.messages().last().unwrap();
        assert!(!last.is_streaming);
        assert_eq!(last.content, "partial");
        // Finalizing again is a no-op.
        transcript.finalize();
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn chunk_after_finalize_opens_a_new_message() {
        let mut transcript = TranscriptAssembler::new();
        transcript.on_chunk("first");
        transcript.finalize();
        transcript.on_chunk("second");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].content, "first");
        assert_eq!(transcript.messages()[1].content, "second");
        assert_ne!(transcript.messages()[0].id, transcript.messages()[1].id);
    }

    #[test]
    fn remove_dangling_only_touches_streaming_assistant_tail() {
        let mut transcript = TranscriptAssembler::new();
        transcript.push_user("question");
        assert!(!transcript.remove_dangling());

        transcript.on_chunk("half an ans");
        assert!(transcript.remove_dangling());
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.last_user_text().as_deref(), Some("question"));

        // A finalized reply is immutable and never removed.
        transcript.on_chunk("full answer");
        transcript.finalize();
        assert!(!transcript.remove_dangling());
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn api_messages_exclude_the_open_reply() {
        let mut transcript = TranscriptAssembler::new();
        transcript.push_user("question");
        transcript.on_chunk("in flight");
        let api = transcript.api_messages();
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].role, "user");
    }
}

//! Colloquy is a chat streaming session engine for OpenAI-style
//! completion backends.
//!
//! It drives one conversational turn at a time over a chunked,
//! newline-delimited event stream, incrementally assembling the assistant
//! reply, tracking tool-invocation lifecycles interleaved with the text,
//! and reconciling token/cost usage once the stream closes. The crate is
//! organized around a small set of collaborating layers:
//! - [`core::session`] owns the turn state machine and is the sole mutator
//!   of transcript, tool list, and usage.
//! - [`core::transport`] opens the streaming request, splits the body into
//!   lines, and forwards decoded events in arrival order; the
//!   [`core::transport::TurnTransport`] trait is the seam test doubles
//!   plug into.
//! - [`core::event`] decodes one protocol line into a typed event.
//! - [`core::transcript`], [`core::tools`], and [`core::usage`] fold
//!   events into published state.
//! - [`core::monitor`] polls backend health.
//! - [`api`] defines the wire payloads shared by all of the above.
//!
//! A minimal embedding looks like:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use colloquy::core::config::Config;
//! use colloquy::core::session::SessionController;
//! use colloquy::core::transport::HttpTurnTransport;
//!
//! # async fn run() {
//! let (transport, _tx, rx) = HttpTurnTransport::with_channel(reqwest::Client::new());
//! let mut session = SessionController::new(Arc::new(transport), rx, Config::load().unwrap());
//! session.send_message("Hello").await;
//! session.run_turn().await;
//! for message in session.messages() {
//!     println!("{}: {}", message.role.as_str(), message.content);
//! }
//! # }
//! ```

pub mod api;
pub mod core;
pub mod utils;

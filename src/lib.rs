//! DataChat - conversational data-analytics client library
//!
//! This library provides the core functionality of the DataChat client:
//! consuming a streamed turn from the backend, reducing it into a
//! consistent conversation state, and gating generated SQL behind human
//! review.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `stream`: byte decoding, frame splitting, and event parsing
//! - `conversation`: message log, plan timeline, interrupt gate, reducer
//! - `client`: HTTP turn transport and the single consumption loop
//! - `session`: session registry contract and thread-id persistence
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use datachat::client::{run_turn, ChatClient, TurnRequest};
//! use datachat::conversation::ConversationState;
//! use std::time::Duration;
//!
//! # async fn example() -> datachat::error::Result<()> {
//! let client = ChatClient::new(
//!     url::Url::parse("http://localhost:8000/").unwrap(),
//!     None,
//!     Duration::from_secs(10),
//!     Duration::from_secs(30),
//! );
//! let mut state = ConversationState::new("thread-1");
//! let request = TurnRequest::for_input(&state, "total revenue by region?")?;
//! run_turn(&client, &mut state, &request).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod session;
pub mod stream;

// Re-export commonly used types
pub use client::{ChatClient, TurnCommand, TurnRequest};
pub use config::Config;
pub use conversation::{ConversationState, InterruptGate, Message, ReviewDecision, Role};
pub use error::{DatachatError, Result};
pub use stream::AgentEvent;

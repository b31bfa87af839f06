//! Streaming turn pipeline: decode -> split -> parse
//!
//! The backend streams one chat turn as a long-lived HTTP response body
//! carrying blank-line-delimited event frames. This module owns the three
//! leaf stages that turn raw bytes into typed [`AgentEvent`]s:
//!
//! - [`Utf8StreamDecoder`] -- incremental UTF-8 decoding over arbitrarily
//!   chunked bytes
//! - [`FrameSplitter`] -- frame extraction on `\n\n` boundaries with
//!   carry-over
//! - [`parse_frame`] -- `event:` / `data:` extraction and payload decoding
//!
//! All three stages are pure state machines with no I/O; the consumption
//! loop that drives them lives in [`crate::client`].

pub mod decoder;
pub mod framing;
pub mod parser;

pub use decoder::Utf8StreamDecoder;
pub use framing::FrameSplitter;
pub use parser::{parse_frame, AgentEvent, PlanStep, TableData, VizPayload};

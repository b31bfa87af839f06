//! Streaming turn transport and consumption loop
//!
//! One chat turn is an HTTP POST whose response body streams blank-line
//! delimited event frames until the backend closes the turn. This module
//! owns the request shape ([`TurnRequest`]), the transport
//! ([`ChatClient`]), and the single consumption loop that drives
//! decode -> split -> parse -> reduce ([`run_turn_with`]).
//!
//! # Concurrency model
//!
//! There is exactly one active turn per conversation. The loop awaits one
//! read at a time, so reducer mutations are inherently serialized and no
//! locking is needed. Cancellation is dropping the driver future; any
//! buffered partial frame is discarded without error.

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use url::Url;

use crate::conversation::ConversationState;
use crate::error::{DatachatError, Result};
use crate::stream::{parse_frame, AgentEvent, FrameSplitter, Utf8StreamDecoder};

/// Distinguishing command of a turn request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnCommand {
    /// Plain free-form submission.
    Start,
    /// Resubmit the reviewed SQL unmodified.
    Approve,
    /// Resubmit a user-edited SQL string.
    Edit,
    /// Answer a clarifying question.
    Clarify,
    /// Cut off the turn currently streaming.
    Interrupt,
}

/// One chat turn request, POSTed to the backend.
///
/// The locally persisted `thread_id` rides on every request; the backend
/// creates the session lazily on the first message of a new thread.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_tables: Option<Vec<String>>,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<TurnCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl TurnRequest {
    fn base(message: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            selected_tables: None,
            thread_id: thread_id.into(),
            project_id: None,
            command: None,
            sql: None,
        }
    }

    /// A plain free-form turn.
    pub fn start(message: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            command: Some(TurnCommand::Start),
            ..Self::base(message, thread_id)
        }
    }

    /// Build the request for free-form input against the current state.
    ///
    /// A submission while a turn is still loading goes out as an
    /// `interrupt` command rather than a second concurrent stream.
    ///
    /// # Errors
    ///
    /// Rejects input with `GateClosed` while a SQL review is outstanding;
    /// reviews go through [`TurnRequest::approve`] / [`TurnRequest::edit`].
    pub fn for_input(state: &ConversationState, message: impl Into<String>) -> Result<Self> {
        state.gate().ensure_open()?;
        let command = if state.is_loading() {
            TurnCommand::Interrupt
        } else {
            TurnCommand::Start
        };
        Ok(Self {
            command: Some(command),
            selected_tables: if state.selected_tables().is_empty() {
                None
            } else {
                Some(state.selected_tables().to_vec())
            },
            ..Self::base(message, state.thread_id())
        })
    }

    /// Approve the reviewed SQL unmodified.
    pub fn approve(sql: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            command: Some(TurnCommand::Approve),
            sql: Some(sql.into()),
            ..Self::base(String::new(), thread_id)
        }
    }

    /// Resubmit a user-edited SQL string.
    pub fn edit(sql: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            command: Some(TurnCommand::Edit),
            sql: Some(sql.into()),
            ..Self::base(String::new(), thread_id)
        }
    }

    /// Answer a clarifying question.
    pub fn clarify(message: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            command: Some(TurnCommand::Clarify),
            ..Self::base(message, thread_id)
        }
    }

    pub fn with_project(mut self, project_id: Option<u64>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.selected_tables = if tables.is_empty() { None } else { Some(tables) };
        self
    }

    /// True when this request carries user-visible input that belongs in
    /// the message log (review decisions do not).
    pub fn echoes_user_message(&self) -> bool {
        !matches!(
            self.command,
            Some(TurnCommand::Approve) | Some(TurnCommand::Edit)
        )
    }
}

/// HTTP transport for streamed chat turns.
pub struct ChatClient {
    http_client: reqwest::Client,
    base_url: Url,
    bearer_token: Option<String>,
    stall_after: Duration,
}

impl ChatClient {
    /// Construct a client targeting `base_url`.
    ///
    /// `connect_timeout` bounds connection establishment only; the
    /// response body is an unbounded stream and must not carry a total
    /// request timeout. `stall_after` is the watchdog interval after
    /// which a silent stream is flagged as stalled (never auto-aborted).
    pub fn new(
        base_url: Url,
        bearer_token: Option<String>,
        connect_timeout: Duration,
        stall_after: Duration,
    ) -> Self {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            // SAFETY: Default reqwest client construction cannot fail
            // unless TLS initialisation fails, which is a fatal startup
            // condition on any supported platform.
            .expect("failed to build reqwest client");

        Self {
            http_client,
            base_url,
            bearer_token,
            stall_after,
        }
    }

    pub fn stall_after(&self) -> Duration {
        self.stall_after
    }

    /// POST one turn request and return the raw response byte stream.
    ///
    /// # Errors
    ///
    /// - `DatachatError::Authentication` on 401; the turn is aborted
    ///   before any state mutation so re-authentication can retry cleanly.
    /// - `DatachatError::Transport` on connection failure or any other
    ///   non-success status.
    pub async fn open_turn(
        &self,
        request: &TurnRequest,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>>> {
        let url = self
            .base_url
            .join("api/chat")
            .map_err(|e| DatachatError::Config(format!("invalid base url: {}", e)))?;

        let mut req = self
            .http_client
            .post(url)
            .header("Accept", "text/event-stream")
            .json(request);

        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }

        let response = req
            .send()
            .await
            .map_err(|e| DatachatError::Transport(format!("chat request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DatachatError::Authentication(
                "chat endpoint returned 401".to_string(),
            )
            .into());
        }
        if !status.is_success() {
            return Err(
                DatachatError::Transport(format!("chat endpoint returned HTTP {}", status)).into(),
            );
        }

        Ok(response.bytes_stream())
    }
}

/// Run one turn end to end without an observer.
pub async fn run_turn(
    client: &ChatClient,
    state: &mut ConversationState,
    request: &TurnRequest,
) -> Result<()> {
    run_turn_with(client, state, request, |_, _| {}).await
}

/// Run one turn end to end, invoking `on_event` after each reduced event.
///
/// The user message is appended only after the backend accepted the
/// request, so a 401 or a refused connection leaves the state untouched.
pub async fn run_turn_with<F>(
    client: &ChatClient,
    state: &mut ConversationState,
    request: &TurnRequest,
    on_event: F,
) -> Result<()>
where
    F: FnMut(&AgentEvent, &ConversationState),
{
    let byte_stream = client.open_turn(request).await?;

    if request.echoes_user_message() {
        state.begin_turn(request.message.clone())?;
    } else {
        state.begin_followup();
    }

    consume_turn_stream(byte_stream, state, client.stall_after(), on_event).await
}

/// Drive the decode -> split -> parse -> reduce pipeline over one
/// response body.
///
/// Events are applied strictly in byte-arrival order. A mid-stream
/// transport failure surfaces as a single agent error message and
/// terminates the turn without leaving the state half-mutated. Absence of
/// frames for `stall_after` flags the state as stalled but never aborts.
pub async fn consume_turn_stream<S, F>(
    byte_stream: S,
    state: &mut ConversationState,
    stall_after: Duration,
    mut on_event: F,
) -> Result<()>
where
    S: Stream<Item = reqwest::Result<Bytes>>,
    F: FnMut(&AgentEvent, &ConversationState),
{
    let mut decoder = Utf8StreamDecoder::new();
    let mut splitter = FrameSplitter::new();

    tokio::pin!(byte_stream);

    loop {
        match tokio::time::timeout(stall_after, byte_stream.next()).await {
            // Watchdog: surface the stall once, keep waiting.
            Err(_) => {
                if !state.is_stalled() {
                    tracing::warn!(
                        interval_secs = stall_after.as_secs(),
                        "no frames received; turn looks stalled"
                    );
                    state.mark_stalled();
                }
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                tracing::warn!(error = %err, "turn stream failed mid-read");
                let event = AgentEvent::Error {
                    message: format!("connection lost: {}", err),
                };
                state.apply(event.clone());
                on_event(&event, state);
                state.finish_turn();
                return Ok(());
            }
            Ok(Some(Ok(chunk))) => {
                state.clear_stalled();
                let text = decoder.decode(&chunk);
                for frame in splitter.push(&text) {
                    if let Some(event) = parse_frame(&frame) {
                        state.apply(event.clone());
                        on_event(&event, state);
                    }
                }
            }
        }
    }

    // Flush residual decode state, then any final frame that arrived
    // without a trailing delimiter.
    let tail = decoder.finish();
    for frame in splitter.push(&tail) {
        if let Some(event) = parse_frame(&frame) {
            state.apply(event.clone());
            on_event(&event, state);
        }
    }
    if let Some(frame) = splitter.finish() {
        if let Some(event) = parse_frame(&frame) {
            state.apply(event.clone());
            on_event(&event, state);
        }
    }

    state.finish_turn();
    Ok(())
}

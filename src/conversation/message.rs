//! Message and turn-log vocabulary
//!
//! The renderable [`Message`] is not mutated ad hoc by event handlers.
//! Instead every turn phase is appended to a log of [`TurnRecord`]s and the
//! message list is a projection derived from that log (see
//! [`crate::conversation::reducer`]). This keeps the append-vs-mutate
//! decision in exactly one place.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::plan::{TaskItem, TaskStatus};
use crate::stream::{TableData, VizPayload};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// A clarifying question the backend asked before committing to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clarification {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub multi_select: bool,
}

/// One entry of the rendered conversation.
///
/// An Agent message with `interrupt = true` holds exactly the pending SQL
/// text in `content` and never mutates once the review decision is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Accumulated reasoning deltas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Snapshot of the execution plan attached to this turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Vec<TaskItem>>,
    #[serde(default)]
    pub interrupt: bool,
    /// Renderer-specific chart option from a `visualization` event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viz_option: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_data: Option<TableData>,
    /// Name of a custom UI component the backend asked for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// Raw rows attached by a `data_export` event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_rows: Option<Vec<Value>>,
    /// Server-side token attached by a `data_download` event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification: Option<Clarification>,
}

impl Message {
    /// A closed user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(text.into()),
            ..Self::empty(Role::User)
        }
    }

    /// An empty agent message, to be filled by the projection.
    pub fn agent() -> Self {
        Self::empty(Role::Agent)
    }

    fn empty(role: Role) -> Self {
        Self {
            role,
            content: None,
            thinking: None,
            plan: None,
            interrupt: false,
            viz_option: None,
            table_data: None,
            ui_component: None,
            images: None,
            export_rows: None,
            download_token: None,
            clarification: None,
        }
    }

    /// True once the message carries visible body text.
    ///
    /// The visualization handler uses this to decide between populating
    /// the current card in place and appending a new one.
    pub fn has_body(&self) -> bool {
        self.content.is_some() || self.thinking.is_some()
    }
}

/// One phase of a turn, appended to the conversation log as it happens.
///
/// The log is append-only; messages are derived from it. Replaying the
/// whole log through the projection must produce the same messages as
/// applying records incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TurnRecord {
    /// The user's free-form input opening a turn.
    UserTurn { text: String },
    /// A reasoning delta for the open agent turn.
    ThinkingDelta { text: String },
    /// A full plan replacement, statuses already assigned.
    PlanSnapshot { tasks: Vec<TaskItem> },
    /// A completion report for one plan node.
    StepUpdate {
        node: String,
        outcome: TaskStatus,
        details: String,
        duration_ms: Option<u64>,
    },
    /// A SQL review request; always its own message.
    InterruptRequest { sql: String },
    /// The terminal answer text for the turn.
    ResultCard { text: String },
    /// A terminal chart/table card.
    VisualizationCard { viz: VizPayload },
    /// A surfaced protocol or transport error.
    ErrorCard { message: String },
    /// A clarifying question from the backend (history replay and the
    /// `clarify` command flow).
    ClarificationCard { clarification: Clarification },
    /// Raw rows attached to the turn's last agent message.
    DataExport { rows: Vec<Value> },
    /// A download token attached to the turn's last agent message.
    DataDownload { token: String },
}

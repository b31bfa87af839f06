//! Event routing and conversation state
//!
//! [`ConversationState`] owns everything a conversation view renders: the
//! append-only turn log, the message projection derived from it, the
//! execution-plan timeline, the interrupt gate, and the loading/stalled
//! flags. Events are applied through one exhaustive `match`, so a new
//! backend event type requires a conscious decision here rather than a
//! silent fallthrough.
//!
//! # Append vs. mutate
//!
//! Handlers never mutate messages directly. Each event appends a
//! [`TurnRecord`] and the projection decides whether that record extends
//! the open agent message or starts a new one. In-place extension is only
//! allowed while the last message is an open agent turn; a terminal record
//! (`result`, `visualization`, `interrupt`, `error`) closes the turn, so an
//! out-of-order card arriving later appends instead of overwriting.

use serde_json::Value;

use crate::conversation::gate::{InterruptGate, ReviewDecision};
use crate::conversation::message::{Message, Role, TurnRecord};
use crate::conversation::plan::{PlanTimeline, TaskStatus};
use crate::error::Result;
use crate::stream::AgentEvent;

/// A projected message plus whether its turn is still open for extension.
#[derive(Debug, Clone)]
struct Entry {
    message: Message,
    open: bool,
}

impl Entry {
    fn closed(message: Message) -> Self {
        Self {
            message,
            open: false,
        }
    }

    fn open(message: Message) -> Self {
        Self {
            message,
            open: true,
        }
    }
}

/// The authoritative state of one conversation thread.
pub struct ConversationState {
    thread_id: String,
    /// Append-only log of turn phases; the projection derives from it.
    log: Vec<TurnRecord>,
    entries: Vec<Entry>,
    plan: PlanTimeline,
    gate: InterruptGate,
    loading: bool,
    stalled: bool,
    latest_export: Option<Vec<Value>>,
    selected_tables: Vec<String>,
}

impl ConversationState {
    /// Fresh state for a thread with no history.
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            log: Vec::new(),
            entries: Vec::new(),
            plan: PlanTimeline::default(),
            gate: InterruptGate::default(),
            loading: false,
            stalled: false,
            latest_export: None,
            selected_tables: Vec::new(),
        }
    }

    /// Rebuild state wholesale from a pre-mapped record log (session
    /// resume).
    pub fn from_records(thread_id: impl Into<String>, records: Vec<TurnRecord>) -> Self {
        let mut state = Self::new(thread_id);
        for record in records {
            state.push_record(record);
        }
        // History is settled; nothing stays open for extension.
        close_open(&mut state.entries);
        state
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn gate(&self) -> &InterruptGate {
        &self.gate
    }

    pub fn plan(&self) -> &PlanTimeline {
        &self.plan
    }

    pub fn messages(&self) -> Vec<&Message> {
        self.entries.iter().map(|e| &e.message).collect()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.entries.last().map(|e| &e.message)
    }

    pub fn log(&self) -> &[TurnRecord] {
        &self.log
    }

    /// The most recent exportable tabular result, if any.
    pub fn latest_export(&self) -> Option<&[Value]> {
        self.latest_export.as_deref()
    }

    /// Table names last forwarded by the schema-selection collaborator.
    pub fn selected_tables(&self) -> &[String] {
        &self.selected_tables
    }

    /// Open a new turn with the user's input.
    ///
    /// # Errors
    ///
    /// Rejects free-form input with `GateClosed` while a SQL review is
    /// outstanding.
    pub fn begin_turn(&mut self, text: impl Into<String>) -> Result<()> {
        self.gate.ensure_open()?;
        self.push_record(TurnRecord::UserTurn { text: text.into() });
        self.loading = true;
        self.stalled = false;
        Ok(())
    }

    /// Apply a review decision, reopening the gate.
    ///
    /// Returns the SQL to resubmit; the interrupt message itself never
    /// mutates. The follow-up turn starts loading only once the backend
    /// accepts it (see [`begin_followup`](Self::begin_followup)).
    pub fn resolve_review(&mut self, decision: &ReviewDecision) -> Result<String> {
        self.gate.resolve(decision)
    }

    /// Start loading for a follow-up turn that echoes no user message
    /// (an approve/edit resubmission).
    pub fn begin_followup(&mut self) {
        self.loading = true;
        self.stalled = false;
    }

    /// Close out the current turn after the stream ends.
    ///
    /// Clears the loading/stalled flags and seals any message left open by
    /// a stream that ended without a terminal event.
    pub fn finish_turn(&mut self) {
        self.loading = false;
        self.stalled = false;
        close_open(&mut self.entries);
    }

    /// Flag the turn as stalled (no frames for the watchdog interval).
    pub fn mark_stalled(&mut self) {
        self.stalled = true;
    }

    pub fn clear_stalled(&mut self) {
        self.stalled = false;
    }

    /// Discard everything and start over under a freshly minted thread id.
    pub fn reset(&mut self, thread_id: impl Into<String>) {
        *self = Self::new(thread_id);
    }

    /// Route one parsed event into the state.
    pub fn apply(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Thinking { content } => {
                self.push_record(TurnRecord::ThinkingDelta { text: content });
            }
            AgentEvent::Plan { steps } => {
                let mut staged = PlanTimeline::default();
                staged.replace(&steps);
                self.push_record(TurnRecord::PlanSnapshot {
                    tasks: staged.tasks().to_vec(),
                });
            }
            AgentEvent::Step {
                node,
                status,
                details,
                duration_ms,
            } => {
                let outcome = TaskStatus::from_step_status(&status);
                self.push_record(TurnRecord::StepUpdate {
                    node,
                    outcome,
                    details,
                    duration_ms,
                });
            }
            AgentEvent::Interrupt { sql } => {
                self.push_record(TurnRecord::InterruptRequest { sql: sql.clone() });
                self.gate.suspend(sql);
                self.loading = false;
            }
            AgentEvent::Result { content } => {
                self.push_record(TurnRecord::ResultCard { text: content });
                self.loading = false;
            }
            AgentEvent::Visualization(viz) => {
                self.push_record(TurnRecord::VisualizationCard { viz });
                self.loading = false;
            }
            AgentEvent::SelectedTables { tables } => {
                // Collaborator forwarding only; not part of the turn log.
                self.selected_tables = tables;
            }
            AgentEvent::DataExport { rows } => {
                self.latest_export = Some(rows.clone());
                self.push_record(TurnRecord::DataExport { rows });
            }
            AgentEvent::DataDownload { token } => {
                self.push_record(TurnRecord::DataDownload { token });
            }
            AgentEvent::Error { message } => {
                self.push_record(TurnRecord::ErrorCard { message });
                self.loading = false;
            }
            AgentEvent::Unknown { event_type } => {
                tracing::debug!(event_type, "ignoring unknown event type");
            }
        }
    }

    /// Recompute the projection and timeline by replaying the log.
    ///
    /// Incremental application and replay must agree; tests rely on this.
    pub fn rebuild_projection(&mut self) {
        let mut entries = Vec::new();
        let mut plan = PlanTimeline::default();
        for record in &self.log {
            apply_record(&mut entries, &mut plan, record);
        }
        self.entries = entries;
        self.plan = plan;
    }

    fn push_record(&mut self, record: TurnRecord) {
        apply_record(&mut self.entries, &mut self.plan, &record);
        self.log.push(record);
    }
}

/// Seal every entry still open for extension.
fn close_open(entries: &mut [Entry]) {
    for entry in entries.iter_mut() {
        entry.open = false;
    }
}

/// Project one record onto the message list and plan timeline.
///
/// This is the single place that decides append vs. extend-in-place.
fn apply_record(entries: &mut Vec<Entry>, plan: &mut PlanTimeline, record: &TurnRecord) {
    match record {
        TurnRecord::UserTurn { text } => {
            close_open(entries);
            entries.push(Entry::closed(Message::user(text.clone())));
        }
        TurnRecord::ThinkingDelta { text } => match open_agent(entries) {
            Some(message) => {
                message
                    .thinking
                    .get_or_insert_with(String::new)
                    .push_str(text);
            }
            None => {
                let mut message = Message::agent();
                message.thinking = Some(text.clone());
                entries.push(Entry::open(message));
            }
        },
        TurnRecord::PlanSnapshot { tasks } => {
            plan.set_tasks(tasks.clone());
            match open_agent(entries) {
                Some(message) => message.plan = Some(tasks.clone()),
                None => {
                    let mut message = Message::agent();
                    message.plan = Some(tasks.clone());
                    entries.push(Entry::open(message));
                }
            }
        }
        TurnRecord::StepUpdate {
            node,
            outcome,
            details,
            duration_ms,
        } => {
            if plan.apply_step(node, *outcome, details, *duration_ms) {
                // Keep the rendered snapshot in step with the timeline.
                if let Some(entry) = entries
                    .iter_mut()
                    .rev()
                    .find(|e| e.open && e.message.plan.is_some())
                {
                    entry.message.plan = Some(plan.tasks().to_vec());
                }
            }
        }
        TurnRecord::InterruptRequest { sql } => {
            close_open(entries);
            let mut message = Message::agent();
            message.content = Some(sql.clone());
            message.interrupt = true;
            entries.push(Entry::closed(message));
        }
        TurnRecord::ResultCard { text } => {
            match open_agent(entries) {
                Some(message) => message.content = Some(text.clone()),
                None => {
                    let mut message = Message::agent();
                    message.content = Some(text.clone());
                    entries.push(Entry::closed(message));
                }
            }
            close_open(entries);
        }
        TurnRecord::VisualizationCard { viz } => {
            let populate_in_place = entries
                .last()
                .map(|e| e.open && e.message.role == Role::Agent && !e.message.has_body())
                .unwrap_or(false);

            if populate_in_place {
                // `populate_in_place` guarantees a last entry exists.
                if let Some(entry) = entries.last_mut() {
                    entry.message.table_data = viz.table_data.clone();
                    entry.message.viz_option = viz.option.clone();
                }
            } else {
                let mut message = Message::agent();
                message.table_data = viz.table_data.clone();
                message.viz_option = viz.option.clone();
                entries.push(Entry::closed(message));
            }
            close_open(entries);
        }
        TurnRecord::ErrorCard { message: text } => {
            close_open(entries);
            let mut message = Message::agent();
            message.content = Some(text.clone());
            entries.push(Entry::closed(message));
        }
        TurnRecord::ClarificationCard { clarification } => {
            close_open(entries);
            let mut message = Message::agent();
            message.clarification = Some(clarification.clone());
            entries.push(Entry::closed(message));
        }
        TurnRecord::DataExport { rows } => {
            if let Some(entry) = last_agent(entries) {
                entry.message.export_rows = Some(rows.clone());
            }
        }
        TurnRecord::DataDownload { token } => {
            if let Some(entry) = last_agent(entries) {
                entry.message.download_token = Some(token.clone());
            }
        }
    }
}

/// The last message iff it is an agent turn still open for extension.
fn open_agent(entries: &mut [Entry]) -> Option<&mut Message> {
    entries
        .last_mut()
        .filter(|e| e.open && e.message.role == Role::Agent && !e.message.interrupt)
        .map(|e| &mut e.message)
}

/// The most recent agent message, open or closed (attachment target).
fn last_agent(entries: &mut [Entry]) -> Option<&mut Entry> {
    entries
        .iter_mut()
        .rev()
        .find(|e| e.message.role == Role::Agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{parse_frame, PlanStep, TableData, VizPayload};

    fn state() -> ConversationState {
        let mut state = ConversationState::new("thread-1");
        state.begin_turn("show me revenue").expect("gate open");
        state
    }

    fn plan_event(nodes: &[(&str, &str)]) -> AgentEvent {
        AgentEvent::Plan {
            steps: nodes
                .iter()
                .map(|(node, desc)| PlanStep {
                    node: node.to_string(),
                    desc: desc.to_string(),
                })
                .collect(),
        }
    }

    fn step_event(node: &str, status: &str, details: &str, duration: u64) -> AgentEvent {
        AgentEvent::Step {
            node: node.to_string(),
            status: status.to_string(),
            details: details.to_string(),
            duration_ms: Some(duration),
        }
    }

    #[test]
    fn test_begin_turn_appends_user_message_and_sets_loading() {
        let state = state();
        assert!(state.is_loading());
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].role, Role::User);
        assert_eq!(
            state.messages()[0].content.as_deref(),
            Some("show me revenue")
        );
    }

    #[test]
    fn test_thinking_deltas_concatenate_in_order() {
        // Scenario A from the protocol contract.
        let mut state = state();
        state.apply(AgentEvent::Thinking {
            content: "Hel".to_string(),
        });
        state.apply(AgentEvent::Thinking {
            content: "lo".to_string(),
        });

        let messages = state.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].thinking.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_plan_then_step_advances_timeline() {
        // Scenario B from the protocol contract.
        let mut state = state();
        state.apply(plan_event(&[("A", "x"), ("B", "y")]));
        state.apply(step_event("A", "ok", "done A", 120));

        let tasks = state.plan().tasks();
        assert_eq!(tasks[0].status, TaskStatus::Done);
        assert_eq!(tasks[1].status, TaskStatus::Running);

        // The rendered snapshot mirrors the timeline.
        let messages = state.messages();
        let snapshot = messages[1].plan.as_ref().expect("plan snapshot");
        assert_eq!(snapshot[0].status, TaskStatus::Done);
        assert_eq!(snapshot[1].status, TaskStatus::Running);
    }

    #[test]
    fn test_plan_attaches_to_existing_open_message() {
        let mut state = state();
        state.apply(AgentEvent::Thinking {
            content: "thinking".to_string(),
        });
        state.apply(plan_event(&[("A", "x")]));

        let messages = state.messages();
        assert_eq!(messages.len(), 2, "plan joins the open agent message");
        assert!(messages[1].plan.is_some());
        assert_eq!(messages[1].thinking.as_deref(), Some("thinking"));
    }

    #[test]
    fn test_interrupt_appends_sql_message_and_closes_gate() {
        let mut state = state();
        state.apply(AgentEvent::Interrupt {
            sql: "SELECT 1".to_string(),
        });

        assert!(!state.is_loading());
        assert!(state.gate().is_awaiting());

        let messages = state.messages();
        let last = messages.last().expect("interrupt message");
        assert!(last.interrupt);
        assert_eq!(last.content.as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_interrupt_message_never_mutates_after_decision() {
        let mut state = state();
        state.apply(AgentEvent::Interrupt {
            sql: "SELECT 1".to_string(),
        });
        let sql = state
            .resolve_review(&ReviewDecision::Approve)
            .expect("approve");
        assert_eq!(sql, "SELECT 1");

        // A late result must not touch the interrupt message.
        state.apply(AgentEvent::Result {
            content: "42".to_string(),
        });
        let messages = state.messages();
        let interrupt = messages
            .iter()
            .find(|m| m.interrupt)
            .expect("interrupt kept");
        assert_eq!(interrupt.content.as_deref(), Some("SELECT 1"));
        assert_eq!(messages.last().unwrap().content.as_deref(), Some("42"));
    }

    #[test]
    fn test_result_replaces_open_content_and_closes_turn() {
        let mut state = state();
        state.apply(AgentEvent::Thinking {
            content: "reasoning".to_string(),
        });
        state.apply(AgentEvent::Result {
            content: "the answer".to_string(),
        });

        assert!(!state.is_loading());
        let messages = state.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content.as_deref(), Some("the answer"));
        assert_eq!(messages[1].thinking.as_deref(), Some("reasoning"));
    }

    #[test]
    fn test_visualization_populates_empty_open_message() {
        let mut state = state();
        state.apply(plan_event(&[("A", "x")]));
        state.apply(AgentEvent::Visualization(VizPayload {
            chart_type: Some("table".to_string()),
            table_data: Some(TableData {
                columns: vec!["a".to_string()],
                data: vec![vec![serde_json::json!(1)]],
            }),
            option: None,
        }));

        let messages = state.messages();
        assert_eq!(messages.len(), 2, "populated in place, no new message");
        assert!(messages[1].table_data.is_some());
        assert!(!state.is_loading());
    }

    #[test]
    fn test_visualization_appends_when_body_present() {
        let mut state = state();
        state.apply(AgentEvent::Thinking {
            content: "text".to_string(),
        });
        state.apply(AgentEvent::Visualization(VizPayload::default()));

        assert_eq!(state.messages().len(), 3, "appended as its own card");
    }

    #[test]
    fn test_out_of_order_visualization_does_not_overwrite_closed_turn() {
        let mut state = state();
        state.apply(AgentEvent::Result {
            content: "done".to_string(),
        });
        state.apply(AgentEvent::Visualization(VizPayload {
            chart_type: None,
            table_data: None,
            option: Some(serde_json::json!({"late": true})),
        }));

        let messages = state.messages();
        assert_eq!(messages[1].content.as_deref(), Some("done"));
        assert!(messages[1].viz_option.is_none());
        assert!(messages[2].viz_option.is_some());
    }

    #[test]
    fn test_error_event_surfaces_message_and_clears_loading() {
        let mut state = state();
        state.apply(AgentEvent::Error {
            message: "query failed".to_string(),
        });

        assert!(!state.is_loading());
        let last = state.last_message().expect("error message");
        assert_eq!(last.role, Role::Agent);
        assert_eq!(last.content.as_deref(), Some("query failed"));
    }

    #[test]
    fn test_selected_tables_forwarded_not_logged() {
        let mut state = state();
        let before = state.log().len();
        state.apply(AgentEvent::SelectedTables {
            tables: vec!["orders".to_string()],
        });

        assert_eq!(state.selected_tables(), &["orders".to_string()]);
        assert_eq!(state.log().len(), before);
    }

    #[test]
    fn test_data_export_attaches_rows_and_latest_export() {
        let mut state = state();
        state.apply(AgentEvent::Result {
            content: "table below".to_string(),
        });
        state.apply(AgentEvent::DataExport {
            rows: vec![serde_json::json!({"a": 1})],
        });

        assert_eq!(state.latest_export().map(|r| r.len()), Some(1));
        let last = state.last_message().expect("agent message");
        assert!(last.export_rows.is_some());
    }

    #[test]
    fn test_data_download_attaches_token() {
        let mut state = state();
        state.apply(AgentEvent::Result {
            content: "ready".to_string(),
        });
        state.apply(AgentEvent::DataDownload {
            token: "tok-9".to_string(),
        });

        let last = state.last_message().expect("agent message");
        assert_eq!(last.download_token.as_deref(), Some("tok-9"));
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let mut state = state();
        let messages_before = state.messages().len();
        state.apply(AgentEvent::Unknown {
            event_type: "telemetry".to_string(),
        });
        assert_eq!(state.messages().len(), messages_before);
    }

    #[test]
    fn test_malformed_frame_between_valid_frames_does_not_block() {
        // Scenario D: the stream continues after a bad frame.
        let mut state = state();
        for frame in [
            "event: thinking\ndata: {\"content\":\"a\"}",
            "event: thinking\ndata: {broken",
            "event: thinking\ndata: {\"content\":\"b\"}",
        ] {
            if let Some(event) = parse_frame(frame) {
                state.apply(event);
            }
        }

        let messages = state.messages();
        assert_eq!(messages[1].thinking.as_deref(), Some("ab"));
    }

    #[test]
    fn test_replay_matches_incremental_projection() {
        let mut state = state();
        state.apply(AgentEvent::Thinking {
            content: "t1".to_string(),
        });
        state.apply(plan_event(&[("A", "x"), ("B", "y")]));
        state.apply(step_event("A", "ok", "done", 10));
        state.apply(AgentEvent::Result {
            content: "answer".to_string(),
        });
        state.apply(AgentEvent::DataDownload {
            token: "tok".to_string(),
        });

        let incremental: Vec<Message> = state.messages().into_iter().cloned().collect();
        let plan_incremental = state.plan().clone();

        state.rebuild_projection();

        let replayed: Vec<Message> = state.messages().into_iter().cloned().collect();
        assert_eq!(incremental, replayed);
        assert_eq!(&plan_incremental, state.plan());
    }

    #[test]
    fn test_begin_turn_rejected_while_review_pending() {
        let mut state = state();
        state.apply(AgentEvent::Interrupt {
            sql: "SELECT 1".to_string(),
        });

        let err = state.begin_turn("more input").expect_err("gate closed");
        assert!(matches!(
            err.downcast_ref::<crate::error::DatachatError>(),
            Some(crate::error::DatachatError::GateClosed)
        ));
    }

    #[test]
    fn test_reset_clears_everything_under_new_thread() {
        let mut state = state();
        state.apply(AgentEvent::Result {
            content: "x".to_string(),
        });
        state.reset("thread-2");

        assert_eq!(state.thread_id(), "thread-2");
        assert!(state.messages().is_empty());
        assert!(state.log().is_empty());
        assert!(!state.is_loading());
    }

    #[test]
    fn test_finish_turn_seals_open_message() {
        let mut state = state();
        state.apply(AgentEvent::Thinking {
            content: "unfinished".to_string(),
        });
        state.finish_turn();
        assert!(!state.is_loading());

        // A late delta after the seal starts a new message.
        state.apply(AgentEvent::Thinking {
            content: "late".to_string(),
        });
        let messages = state.messages();
        assert_eq!(messages[1].thinking.as_deref(), Some("unfinished"));
        assert_eq!(messages[2].thinking.as_deref(), Some("late"));
    }

    #[test]
    fn test_stall_flag_round_trip() {
        let mut state = state();
        state.mark_stalled();
        assert!(state.is_stalled());
        state.clear_stalled();
        assert!(!state.is_stalled());
    }
}

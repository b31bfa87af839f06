//! Frame parsing into typed agent events
//!
//! A frame carries an `event: <type>` line and one or more `data:` lines
//! holding a JSON payload. Parsing is tolerant by design: frames without a
//! payload are keepalives and are silently discarded; malformed JSON is
//! logged and drops only that frame; unrecognized event tags map to
//! [`AgentEvent::Unknown`] so the reducer ignores them deliberately instead
//! of falling through a string match.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One plan step as announced by a `plan` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Stable node identifier, referenced by later `step` events.
    pub node: String,
    /// Human-readable step title.
    #[serde(default)]
    pub desc: String,
}

/// Tabular payload carried by `visualization` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub data: Vec<Vec<Value>>,
}

/// Chart/table payload of a `visualization` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VizPayload {
    /// Discriminator; `"table"` selects the tabular branch.
    #[serde(default)]
    pub chart_type: Option<String>,
    #[serde(default)]
    pub table_data: Option<TableData>,
    /// Renderer-specific chart option object.
    #[serde(default)]
    pub option: Option<Value>,
}

/// The closed set of events a turn stream can carry.
///
/// Every tag the backend emits maps to exactly one variant; tags this
/// client does not know map to [`AgentEvent::Unknown`] for forward
/// compatibility. Adding a backend event type therefore requires touching
/// this enum and every `match` over it.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Reasoning delta to append to the open agent message.
    Thinking { content: String },
    /// Full replacement of the execution plan.
    Plan { steps: Vec<PlanStep> },
    /// Completion report for one plan node.
    Step {
        node: String,
        status: String,
        details: String,
        duration_ms: Option<u64>,
    },
    /// Human-in-the-loop SQL review request.
    Interrupt { sql: String },
    /// Terminal answer text for the turn.
    Result { content: String },
    /// Terminal chart/table card for the turn.
    Visualization(VizPayload),
    /// Table names chosen by the backend schema selector.
    SelectedTables { tables: Vec<String> },
    /// Raw tabular rows for export.
    DataExport { rows: Vec<Value> },
    /// Server-side download token for the result set.
    DataDownload { token: String },
    /// Terminal protocol error, surfaced verbatim.
    Error { message: String },
    /// Unrecognized event tag, ignored by the reducer.
    Unknown { event_type: String },
}

#[derive(Debug, Deserialize)]
struct TextPayload {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct PlanPayload {
    content: Vec<PlanStep>,
}

#[derive(Debug, Deserialize)]
struct StepPayload {
    node: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: String,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct VizEnvelope {
    #[serde(default)]
    content: VizPayload,
}

#[derive(Debug, Deserialize)]
struct TablesPayload {
    #[serde(default)]
    content: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExportPayload {
    #[serde(default)]
    content: Vec<Value>,
}

/// Parse one frame into a typed event.
///
/// Returns `None` for keepalive frames (no `data:` payload) and for frames
/// whose payload fails to parse; the latter are logged at `warn` and never
/// abort the stream.
pub fn parse_frame(frame: &str) -> Option<AgentEvent> {
    let mut event_type: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        } else if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim());
        }
        // All other lines are ignored.
    }

    let data = data_lines.join("\n");

    // A frame lacking a payload is a keepalive, not an error.
    if data.is_empty() {
        return None;
    }

    let event_type = event_type.unwrap_or("");

    match decode_event(event_type, &data) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::warn!(
                event_type,
                error = %err,
                "dropping frame with malformed payload"
            );
            None
        }
    }
}

/// Decode a payload string for a known event tag.
fn decode_event(event_type: &str, data: &str) -> serde_json::Result<AgentEvent> {
    let event = match event_type {
        "thinking" => {
            let payload: TextPayload = serde_json::from_str(data)?;
            AgentEvent::Thinking {
                content: payload.content,
            }
        }
        "plan" => {
            let payload: PlanPayload = serde_json::from_str(data)?;
            AgentEvent::Plan {
                steps: payload.content,
            }
        }
        "step" => {
            let payload: StepPayload = serde_json::from_str(data)?;
            AgentEvent::Step {
                node: payload.node,
                status: payload.status,
                details: payload.details,
                duration_ms: payload.duration.map(|ms| ms.max(0.0) as u64),
            }
        }
        "interrupt" => {
            let payload: TextPayload = serde_json::from_str(data)?;
            AgentEvent::Interrupt {
                sql: payload.content,
            }
        }
        "result" => {
            let payload: TextPayload = serde_json::from_str(data)?;
            AgentEvent::Result {
                content: payload.content,
            }
        }
        "visualization" => {
            let payload: VizEnvelope = serde_json::from_str(data)?;
            AgentEvent::Visualization(payload.content)
        }
        "selected_tables" => {
            let payload: TablesPayload = serde_json::from_str(data)?;
            AgentEvent::SelectedTables {
                tables: payload.content,
            }
        }
        "data_export" => {
            let payload: ExportPayload = serde_json::from_str(data)?;
            AgentEvent::DataExport {
                rows: payload.content,
            }
        }
        "data_download" => {
            let payload: TextPayload = serde_json::from_str(data)?;
            AgentEvent::DataDownload {
                token: payload.content,
            }
        }
        "error" => {
            let payload: TextPayload = serde_json::from_str(data)?;
            AgentEvent::Error {
                message: payload.content,
            }
        }
        other => {
            // Still require well-formed JSON so garbage is logged, then
            // hand the tag to the reducer as a conscious no-op.
            let _: Value = serde_json::from_str(data)?;
            AgentEvent::Unknown {
                event_type: other.to_string(),
            }
        }
    };

    Ok(event)
}

//! Conversation state core
//!
//! Owns the ordered message log, the execution-plan timeline, and the
//! human-in-the-loop interrupt gate. All mutation flows through
//! [`ConversationState::apply`], which routes typed events from the
//! streaming pipeline into an append-only turn log and derives the
//! renderable messages from it.

pub mod gate;
pub mod message;
pub mod plan;
pub mod reducer;

pub use gate::{GateState, InterruptGate, ReviewDecision};
pub use message::{Clarification, Message, Role, TurnRecord};
pub use plan::{PlanTimeline, TaskItem, TaskStatus};
pub use reducer::ConversationState;

//! Human-in-the-loop SQL review gate
//!
//! An `interrupt` event suspends free-form input until the user decides
//! what to do with the proposed SQL: approve it unchanged or resubmit an
//! edited statement. The gate is the single source of truth for whether
//! the composer is enabled; UI collaborators must not keep their own copy.

use crate::error::{DatachatError, Result};

/// Gate position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GateState {
    /// Free-form submission allowed.
    #[default]
    Open,
    /// A SQL review is outstanding; only a review decision is accepted.
    AwaitingReview {
        /// The proposed SQL exactly as the backend sent it.
        sql: String,
    },
}

/// The user's decision on a pending SQL review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Resubmit the proposed SQL unmodified.
    Approve,
    /// Resubmit a user-edited SQL string.
    Edit(String),
}

/// Suspends free-form input while a SQL review is outstanding.
///
/// # Examples
///
/// ```
/// use datachat::conversation::{InterruptGate, ReviewDecision};
///
/// let mut gate = InterruptGate::default();
/// gate.suspend("SELECT 1");
/// assert!(gate.is_awaiting());
///
/// let sql = gate.resolve(&ReviewDecision::Approve).unwrap();
/// assert_eq!(sql, "SELECT 1");
/// assert!(!gate.is_awaiting());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InterruptGate {
    state: GateState,
}

impl InterruptGate {
    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, GateState::AwaitingReview { .. })
    }

    /// The SQL under review, if a review is outstanding.
    pub fn pending_sql(&self) -> Option<&str> {
        match &self.state {
            GateState::AwaitingReview { sql } => Some(sql),
            GateState::Open => None,
        }
    }

    /// Enter `AwaitingReview` with the proposed SQL.
    pub fn suspend(&mut self, sql: impl Into<String>) {
        self.state = GateState::AwaitingReview { sql: sql.into() };
    }

    /// Err(`GateClosed`) while a review is outstanding; used to reject
    /// free-form submissions.
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_awaiting() {
            return Err(DatachatError::GateClosed.into());
        }
        Ok(())
    }

    /// Apply a review decision, returning the SQL to resubmit.
    ///
    /// Leaving `AwaitingReview` requires exactly this call; the gate
    /// reopens and the returned SQL goes out as the next turn's request.
    ///
    /// # Errors
    ///
    /// Returns `DatachatError::NoPendingReview` when the gate is open.
    pub fn resolve(&mut self, decision: &ReviewDecision) -> Result<String> {
        let GateState::AwaitingReview { sql } = &self.state else {
            return Err(DatachatError::NoPendingReview.into());
        };

        let submitted = match decision {
            ReviewDecision::Approve => sql.clone(),
            ReviewDecision::Edit(edited) => edited.clone(),
        };

        self.state = GateState::Open;
        Ok(submitted)
    }

    /// Force the gate open, discarding any pending review (session reset).
    pub fn reset(&mut self) {
        self.state = GateState::Open;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_starts_open() {
        let gate = InterruptGate::default();
        assert_eq!(gate.state(), &GateState::Open);
        assert!(!gate.is_awaiting());
        assert!(gate.ensure_open().is_ok());
    }

    #[test]
    fn test_interrupt_suspends_and_approve_reopens() {
        let mut gate = InterruptGate::default();
        gate.suspend("SELECT 1");

        assert!(gate.is_awaiting());
        assert_eq!(gate.pending_sql(), Some("SELECT 1"));

        let sql = gate.resolve(&ReviewDecision::Approve).expect("approve");
        assert_eq!(sql, "SELECT 1");
        assert!(!gate.is_awaiting());
    }

    #[test]
    fn test_edit_resubmits_user_sql() {
        let mut gate = InterruptGate::default();
        gate.suspend("SELECT * FROM orders");

        let sql = gate
            .resolve(&ReviewDecision::Edit("SELECT id FROM orders".to_string()))
            .expect("edit");
        assert_eq!(sql, "SELECT id FROM orders");
        assert!(!gate.is_awaiting());
    }

    #[test]
    fn test_free_form_rejected_while_awaiting() {
        let mut gate = InterruptGate::default();
        gate.suspend("SELECT 1");

        let err = gate.ensure_open().expect_err("gate should be closed");
        assert!(matches!(
            err.downcast_ref::<DatachatError>(),
            Some(DatachatError::GateClosed)
        ));
    }

    #[test]
    fn test_resolve_without_pending_review_fails() {
        let mut gate = InterruptGate::default();
        let err = gate
            .resolve(&ReviewDecision::Approve)
            .expect_err("nothing pending");
        assert!(matches!(
            err.downcast_ref::<DatachatError>(),
            Some(DatachatError::NoPendingReview)
        ));
    }

    #[test]
    fn test_reset_discards_pending_review() {
        let mut gate = InterruptGate::default();
        gate.suspend("SELECT 1");
        gate.reset();
        assert!(!gate.is_awaiting());
        assert_eq!(gate.pending_sql(), None);
    }
}

//! Execution-plan timeline
//!
//! A `plan` event replaces the whole task list; `step` events then report
//! per-node completion. The timeline enforces the lifecycle
//! `Pending -> Running -> Done | Error`: status only moves forward, the
//! terminal states never change, and at most one task is `Running` at a
//! time. Completing a task auto-promotes its successor.

use serde::{Deserialize, Serialize};

use crate::stream::PlanStep;

/// Lifecycle state of one plan task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl TaskStatus {
    /// True for `Done` and `Error`, which never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Map a `step` event's status string to the terminal state it reports.
    ///
    /// The backend uses free-form status strings; anything that does not
    /// signal failure counts as success.
    pub fn from_step_status(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "error" | "failed" | "failure" => Self::Error,
            _ => Self::Done,
        }
    }
}

/// One task in the execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    /// Stable node identifier from the `plan` event.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    pub status: TaskStatus,
    /// Completion details from the `step` event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Accumulated step detail lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
}

impl TaskItem {
    fn from_step(step: &PlanStep, status: TaskStatus) -> Self {
        Self {
            id: step.node.clone(),
            title: step.desc.clone(),
            status,
            description: None,
            duration_ms: None,
            logs: None,
        }
    }
}

/// The current execution-plan task list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanTimeline {
    tasks: Vec<TaskItem>,
}

impl PlanTimeline {
    /// Replace the task list from a `plan` event.
    ///
    /// The first task starts `Running`, the rest `Pending`.
    pub fn replace(&mut self, steps: &[PlanStep]) {
        self.tasks = steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let status = if i == 0 {
                    TaskStatus::Running
                } else {
                    TaskStatus::Pending
                };
                TaskItem::from_step(step, status)
            })
            .collect();
    }

    /// Restore a previously captured task list (history rebuild).
    pub fn set_tasks(&mut self, tasks: Vec<TaskItem>) {
        self.tasks = tasks;
    }

    /// Apply a `step` completion report for `node`.
    ///
    /// Returns `false` without touching anything when the node is unknown
    /// or already terminal, so a duplicate `step` event cannot re-promote
    /// the successor. Otherwise marks the node with `outcome` and promotes
    /// the next task iff it exists and is still `Pending`.
    pub fn apply_step(
        &mut self,
        node: &str,
        outcome: TaskStatus,
        details: &str,
        duration_ms: Option<u64>,
    ) -> bool {
        let Some(index) = self.tasks.iter().position(|t| t.id == node) else {
            tracing::warn!(node, "step event for unknown plan node");
            return false;
        };

        if self.tasks[index].status.is_terminal() {
            tracing::debug!(node, "duplicate step event for terminal node");
            return false;
        }

        let task = &mut self.tasks[index];
        task.status = if outcome.is_terminal() {
            outcome
        } else {
            TaskStatus::Done
        };
        if !details.is_empty() {
            task.description = Some(details.to_string());
            task.logs.get_or_insert_with(Vec::new).push(details.to_string());
        }
        if duration_ms.is_some() {
            task.duration_ms = duration_ms;
        }

        if let Some(next) = self.tasks.get_mut(index + 1) {
            if next.status == TaskStatus::Pending {
                next.status = TaskStatus::Running;
            }
        }

        true
    }

    pub fn tasks(&self) -> &[TaskItem] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The task currently running, if any.
    pub fn running(&self) -> Option<&TaskItem> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Running)
    }

    /// True once every task reached a terminal state.
    pub fn is_settled(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    /// Discard all tasks (new turn / reset).
    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(nodes: &[(&str, &str)]) -> Vec<PlanStep> {
        nodes
            .iter()
            .map(|(node, desc)| PlanStep {
                node: node.to_string(),
                desc: desc.to_string(),
            })
            .collect()
    }

    fn timeline(nodes: &[(&str, &str)]) -> PlanTimeline {
        let mut plan = PlanTimeline::default();
        plan.replace(&steps(nodes));
        plan
    }

    #[test]
    fn test_replace_marks_first_running_rest_pending() {
        let plan = timeline(&[("A", "x"), ("B", "y"), ("C", "z")]);
        assert_eq!(plan.tasks()[0].status, TaskStatus::Running);
        assert_eq!(plan.tasks()[1].status, TaskStatus::Pending);
        assert_eq!(plan.tasks()[2].status, TaskStatus::Pending);
    }

    #[test]
    fn test_step_completes_and_promotes_successor() {
        let mut plan = timeline(&[("A", "x"), ("B", "y")]);
        assert!(plan.apply_step("A", TaskStatus::Done, "done A", Some(120)));

        assert_eq!(plan.tasks()[0].status, TaskStatus::Done);
        assert_eq!(plan.tasks()[0].description.as_deref(), Some("done A"));
        assert_eq!(plan.tasks()[0].duration_ms, Some(120));
        assert_eq!(plan.tasks()[1].status, TaskStatus::Running);
    }

    #[test]
    fn test_duplicate_step_does_not_repromote() {
        let mut plan = timeline(&[("A", "x"), ("B", "y"), ("C", "z")]);
        assert!(plan.apply_step("A", TaskStatus::Done, "", None));
        assert!(plan.apply_step("B", TaskStatus::Done, "", None));

        // Replay of the first step must not touch C.
        assert!(!plan.apply_step("A", TaskStatus::Done, "", None));
        assert_eq!(plan.tasks()[2].status, TaskStatus::Running);
        assert!(!plan.apply_step("A", TaskStatus::Done, "", None));
        assert_eq!(plan.tasks()[2].status, TaskStatus::Running);
    }

    #[test]
    fn test_error_is_terminal_and_promotes() {
        let mut plan = timeline(&[("A", "x"), ("B", "y")]);
        assert!(plan.apply_step("A", TaskStatus::Error, "boom", None));

        assert_eq!(plan.tasks()[0].status, TaskStatus::Error);
        assert_eq!(plan.tasks()[1].status, TaskStatus::Running);

        // Terminal states never change.
        assert!(!plan.apply_step("A", TaskStatus::Done, "", None));
        assert_eq!(plan.tasks()[0].status, TaskStatus::Error);
    }

    #[test]
    fn test_at_most_one_running_throughout() {
        let mut plan = timeline(&[("A", "x"), ("B", "y"), ("C", "z")]);
        let running = |plan: &PlanTimeline| {
            plan.tasks()
                .iter()
                .filter(|t| t.status == TaskStatus::Running)
                .count()
        };

        assert_eq!(running(&plan), 1);
        plan.apply_step("A", TaskStatus::Done, "", None);
        assert_eq!(running(&plan), 1);
        plan.apply_step("B", TaskStatus::Done, "", None);
        assert_eq!(running(&plan), 1);
        plan.apply_step("C", TaskStatus::Done, "", None);
        assert_eq!(running(&plan), 0);
        assert!(plan.is_settled());
    }

    #[test]
    fn test_unknown_node_is_noop() {
        let mut plan = timeline(&[("A", "x")]);
        assert!(!plan.apply_step("missing", TaskStatus::Done, "", None));
        assert_eq!(plan.tasks()[0].status, TaskStatus::Running);
    }

    #[test]
    fn test_step_logs_accumulate() {
        let mut plan = timeline(&[("A", "x"), ("B", "y")]);
        plan.apply_step("A", TaskStatus::Done, "first pass", None);
        let logs = plan.tasks()[0].logs.as_ref().expect("logs");
        assert_eq!(logs, &vec!["first pass".to_string()]);
    }

    #[test]
    fn test_from_step_status_mapping() {
        assert_eq!(TaskStatus::from_step_status("ok"), TaskStatus::Done);
        assert_eq!(TaskStatus::from_step_status("success"), TaskStatus::Done);
        assert_eq!(TaskStatus::from_step_status("error"), TaskStatus::Error);
        assert_eq!(TaskStatus::from_step_status("FAILED"), TaskStatus::Error);
    }

    #[test]
    fn test_replace_resets_previous_plan() {
        let mut plan = timeline(&[("A", "x")]);
        plan.apply_step("A", TaskStatus::Done, "", None);

        plan.replace(&steps(&[("D", "q"), ("E", "r")]));
        assert_eq!(plan.tasks().len(), 2);
        assert_eq!(plan.tasks()[0].id, "D");
        assert_eq!(plan.tasks()[0].status, TaskStatus::Running);
    }
}

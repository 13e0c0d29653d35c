//! Local to-do list and the task directive interpreter.
//!
//! Directives resolve tasks by title: case-insensitive exact match, first
//! hit wins. `complete` only considers open tasks; `delete` considers all of
//! them. A directive that matches nothing changes nothing. Task directives
//! skip the authorization gate entirely.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::directive::{TaskAction, TaskDirective, TaskPriority};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// A persisted to-do item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Time-ordered identifier, unique within a process.
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

impl Task {
    pub fn new(title: impl Into<String>, priority: TaskPriority, due_date: Option<String>) -> Self {
        let created_at = Utc::now();
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("task_{}_{seq}", created_at.timestamp_millis()),
            title: title.into(),
            completed: false,
            priority,
            created_at,
            due_date,
        }
    }

    fn title_matches(&self, title: &str) -> bool {
        self.title.trim().to_lowercase() == title.trim().to_lowercase()
    }
}

/// What applying a directive did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEffect {
    Added(Task),
    Completed(Task),
    Deleted(Task),
    /// No task had the requested title.
    NoMatch(String),
    /// `list` needs no mutation; carries a summary for the model or the user.
    ShowList(String),
    /// `add`, `complete` and `delete` need a title.
    MissingTitle(TaskAction),
}

impl TaskEffect {
    /// Whether the list changed and must be persisted.
    pub fn mutated(&self) -> bool {
        matches!(
            self,
            TaskEffect::Added(_) | TaskEffect::Completed(_) | TaskEffect::Deleted(_)
        )
    }
}

/// Ordered task list, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskList {
    tasks: Vec<Task>,
}

impl TaskList {
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Open tasks, newest first.
    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| !t.completed)
    }

    /// Prepend a task.
    pub fn add(&mut self, task: Task) -> &Task {
        self.tasks.insert(0, task);
        &self.tasks[0]
    }

    /// Flip a task's completion state by id.
    pub fn toggle(&mut self, id: &str) -> Option<&Task> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        task.completed = !task.completed;
        Some(task)
    }

    /// Remove a task by id.
    pub fn remove(&mut self, id: &str) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(idx))
    }

    /// Counts, urgent items and the open list, as plain text.
    pub fn summary(&self) -> String {
        let total = self.tasks.len();
        let pending: Vec<&Task> = self.pending().collect();
        let completed = total - pending.len();

        if total == 0 {
            return "You have no tasks.".to_owned();
        }

        let mut out = format!(
            "You have {total} task{} ({} pending, {completed} completed).",
            if total == 1 { "" } else { "s" },
            pending.len()
        );

        let urgent: Vec<&str> = pending
            .iter()
            .filter(|t| t.priority == TaskPriority::High)
            .map(|t| t.title.as_str())
            .collect();
        if !urgent.is_empty() {
            out.push_str(&format!("\nHigh priority: {}.", urgent.join(", ")));
        }

        if !pending.is_empty() {
            out.push_str("\nPending:");
            for task in &pending {
                out.push_str(&format!("\n- {} [{}]", task.title, task.priority));
                if let Some(due) = &task.due_date {
                    out.push_str(&format!(" (due {due})"));
                }
            }
        }
        out
    }
}

/// Apply one directive to the list.
pub fn apply_directive(list: &mut TaskList, directive: &TaskDirective) -> TaskEffect {
    if directive.action == TaskAction::List {
        return TaskEffect::ShowList(list.summary());
    }

    let Some(title) = directive.title.as_deref() else {
        debug!(action = ?directive.action, "task directive without title");
        return TaskEffect::MissingTitle(directive.action);
    };

    match directive.action {
        TaskAction::Add => {
            let task = Task::new(title, directive.priority, directive.due_date.clone());
            info!(id = %task.id, priority = %task.priority, "task added");
            TaskEffect::Added(list.add(task).clone())
        }
        TaskAction::Complete => {
            match list
                .tasks
                .iter_mut()
                .find(|t| !t.completed && t.title_matches(title))
            {
                Some(task) => {
                    task.completed = true;
                    info!(id = %task.id, "task completed");
                    TaskEffect::Completed(task.clone())
                }
                None => TaskEffect::NoMatch(title.to_owned()),
            }
        }
        TaskAction::Delete => match list.tasks.iter().position(|t| t.title_matches(title)) {
            Some(idx) => {
                let task = list.tasks.remove(idx);
                info!(id = %task.id, "task deleted");
                TaskEffect::Deleted(task)
            }
            None => TaskEffect::NoMatch(title.to_owned()),
        },
        TaskAction::List => TaskEffect::ShowList(list.summary()),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn directive(action: TaskAction, title: Option<&str>) -> TaskDirective {
        TaskDirective {
            action,
            title: title.map(str::to_owned),
            priority: TaskPriority::Medium,
            due_date: None,
        }
    }

    #[test]
    fn add_prepends_with_priority() {
        let mut list = TaskList::default();
        apply_directive(&mut list, &directive(TaskAction::Add, Some("First")));
        let effect = apply_directive(
            &mut list,
            &TaskDirective {
                action: TaskAction::Add,
                title: Some("Buy milk".into()),
                priority: TaskPriority::High,
                due_date: Some("tomorrow".into()),
            },
        );
        assert!(effect.mutated());
        let first = list.iter().next().unwrap();
        assert_eq!(first.title, "Buy milk");
        assert_eq!(first.priority, TaskPriority::High);
        assert_eq!(first.due_date.as_deref(), Some("tomorrow"));
        assert!(!first.completed);
    }

    #[test]
    fn ids_are_unique_within_a_burst() {
        let ids: std::collections::HashSet<String> =
            (0..100).map(|_| Task::new("x", TaskPriority::Low, None).id).collect();
        assert_eq!(ids.len(), 100);
        assert!(ids.iter().all(|id| id.starts_with("task_")));
    }

    #[test]
    fn complete_matches_case_insensitively_first_open_task() {
        let mut list = TaskList::default();
        apply_directive(&mut list, &directive(TaskAction::Add, Some("Buy milk")));
        apply_directive(&mut list, &directive(TaskAction::Add, Some("buy MILK")));

        let effect = apply_directive(&mut list, &directive(TaskAction::Complete, Some("BUY MILK")));
        let TaskEffect::Completed(done) = effect else {
            panic!("expected completion");
        };
        // Newest first, so the second add is the first match.
        assert_eq!(done.title, "buy MILK");

        let effect = apply_directive(&mut list, &directive(TaskAction::Complete, Some("buy milk")));
        assert!(matches!(effect, TaskEffect::Completed(t) if t.title == "Buy milk"));

        // Both done now, nothing left to complete.
        let effect = apply_directive(&mut list, &directive(TaskAction::Complete, Some("buy milk")));
        assert_eq!(effect, TaskEffect::NoMatch("buy milk".into()));
    }

    #[test]
    fn complete_and_delete_are_noops_without_match() {
        let mut list = TaskList::default();
        apply_directive(&mut list, &directive(TaskAction::Add, Some("Call bank")));
        let before = list.clone();

        let effect = apply_directive(&mut list, &directive(TaskAction::Complete, Some("Call mom")));
        assert!(matches!(effect, TaskEffect::NoMatch(_)));
        assert!(!effect.mutated());
        let effect = apply_directive(&mut list, &directive(TaskAction::Delete, Some("Call mom")));
        assert!(matches!(effect, TaskEffect::NoMatch(_)));
        assert_eq!(list, before);
    }

    #[test]
    fn delete_considers_completed_tasks() {
        let mut list = TaskList::default();
        apply_directive(&mut list, &directive(TaskAction::Add, Some("Old chore")));
        apply_directive(&mut list, &directive(TaskAction::Complete, Some("old chore")));
        let effect = apply_directive(&mut list, &directive(TaskAction::Delete, Some("OLD CHORE")));
        assert!(matches!(effect, TaskEffect::Deleted(_)));
        assert!(list.is_empty());
    }

    #[test]
    fn missing_title_does_not_mutate() {
        let mut list = TaskList::default();
        for action in [TaskAction::Add, TaskAction::Complete, TaskAction::Delete] {
            let effect = apply_directive(&mut list, &directive(action, None));
            assert_eq!(effect, TaskEffect::MissingTitle(action));
        }
        assert!(list.is_empty());
    }

    #[test]
    fn list_summarises_without_mutation() {
        let mut list = TaskList::default();
        apply_directive(
            &mut list,
            &TaskDirective {
                action: TaskAction::Add,
                title: Some("Pay rent".into()),
                priority: TaskPriority::High,
                due_date: Some("Friday".into()),
            },
        );
        apply_directive(&mut list, &directive(TaskAction::Add, Some("Water plants")));
        apply_directive(&mut list, &directive(TaskAction::Add, Some("Done already")));
        apply_directive(&mut list, &directive(TaskAction::Complete, Some("Done already")));
        let before = list.clone();

        let TaskEffect::ShowList(summary) = apply_directive(&mut list, &directive(TaskAction::List, None))
        else {
            panic!("expected summary");
        };
        assert!(summary.contains("3 tasks (2 pending, 1 completed)"));
        assert!(summary.contains("High priority: Pay rent."));
        assert!(summary.contains("- Pay rent [high] (due Friday)"));
        assert!(summary.contains("- Water plants [medium]"));
        assert!(!summary.contains("- Done already"));
        assert_eq!(list, before);
    }

    #[test]
    fn empty_list_summary() {
        assert_eq!(TaskList::default().summary(), "You have no tasks.");
    }

    #[test]
    fn toggle_and_remove_by_id() {
        let mut list = TaskList::default();
        let id = list.add(Task::new("Stretch", TaskPriority::Low, None)).id.clone();
        assert!(list.toggle(&id).unwrap().completed);
        assert!(!list.toggle(&id).unwrap().completed);
        assert_eq!(list.pending().count(), 1);
        assert_eq!(list.remove(&id).unwrap().title, "Stretch");
        assert!(list.toggle(&id).is_none());
        assert!(list.remove(&id).is_none());
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let mut list = TaskList::default();
        list.add(Task::new("Stretch", TaskPriority::Low, Some("today".into())));
        let json = serde_json::to_string(&list).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"dueDate\":\"today\""));
        let back: TaskList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }
}

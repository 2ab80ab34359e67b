//! Conductor data types
//!
//! Tasks produced by the Planner, results produced by the Executor, and the
//! read-only context both receive from the Orchestrator.

use crate::memory::{ConversationRecord, StorageError};
use sdk::errors::AgentError;
use sdk::types::EventRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Lifecycle of a sub-task within one turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

/// One unit of work derived from a user request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    /// Lower runs first
    pub priority: i64,
    /// Ids of tasks that must finish first, without duplicates
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>, priority: i64) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            priority,
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            result: None,
        }
    }

    /// Add dependencies, skipping duplicates and self references
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in dependencies {
            let dep = dep.into();
            if dep != self.id && !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    pub fn kind(&self) -> TaskKind {
        TaskKind::infer(&self.description)
    }
}

/// Prompt family chosen from the task description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Search,
    Analyze,
    Recommend,
    Generic,
}

impl TaskKind {
    /// Keyword match in order search, analyze, recommend; anything else is generic
    pub fn infer(description: &str) -> TaskKind {
        let lower = description.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |keyword: &str| words.contains(&keyword);

        if has("search") || has("find") || has("where") || lower.contains("look up") {
            TaskKind::Search
        } else if has("analyze") || has("analyse") || has("compare") || has("evaluate") {
            TaskKind::Analyze
        } else if has("recommend") || has("suggest") || has("best") || has("should") {
            TaskKind::Recommend
        } else {
            TaskKind::Generic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Search => "search",
            TaskKind::Analyze => "analyze",
            TaskKind::Recommend => "recommend",
            TaskKind::Generic => "generic",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a successful task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub content: String,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Service calls made, 0 when served from the cache
    pub attempts: u32,
    pub from_cache: bool,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// A task that could not produce a result
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Task {task_id} failed after {attempts} attempt(s): {reason}")]
    Failed {
        task_id: String,
        reason: String,
        attempts: u32,
    },

    /// Caching the result failed; fatal to the turn
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ExecutionError> for AgentError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Failed {
                task_id,
                reason,
                attempts,
            } => AgentError::Execution {
                task_id,
                reason,
                attempts,
            },
            ExecutionError::Storage(e) => e.into(),
        }
    }
}

/// Structural problems in a plan
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("Duplicate task id '{0}'")]
    DuplicateId(String),

    #[error("Task '{task_id}' depends on unknown task '{dependency}'")]
    UnknownDependency { task_id: String, dependency: String },

    #[error("Dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

impl From<PlanError> for AgentError {
    fn from(err: PlanError) -> Self {
        AgentError::Planning(err.to_string())
    }
}

/// Recalled memory handed to the Planner and Executor
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    /// Most recent first
    pub recent_conversations: Vec<ConversationRecord>,
    pub preferences: BTreeMap<String, String>,
}

impl MemoryContext {
    pub fn is_empty(&self) -> bool {
        self.recent_conversations.is_empty() && self.preferences.is_empty()
    }

    pub fn format_for_prompt(&self) -> String {
        let mut out = String::new();

        if !self.recent_conversations.is_empty() {
            out.push_str("Recent conversations:\n");
            for record in &self.recent_conversations {
                out.push_str(&format!(
                    "- User: {}\n  Assistant: {}\n",
                    record.user_input,
                    truncate(&record.agent_response, 300)
                ));
            }
        }

        if !self.preferences.is_empty() {
            out.push_str("User preferences:\n");
            for (key, value) in &self.preferences {
                out.push_str(&format!("- {}: {}\n", key, value));
            }
        }

        out
    }
}

/// Everything the Executor needs besides the task itself
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub memory: &'a MemoryContext,
    pub catalog: &'a str,
    pub location: &'a str,
    /// (task id, content) of completed dependencies
    pub dependency_outputs: &'a [(String, String)],
}

/// Cut `text` to at most `max` characters, marking the cut
pub(crate) fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_inference() {
        assert_eq!(TaskKind::infer("search for AI info"), TaskKind::Search);
        assert_eq!(TaskKind::infer("Where is Osheaga held?"), TaskKind::Search);
        assert_eq!(TaskKind::infer("Look up metro stations"), TaskKind::Search);
        assert_eq!(TaskKind::infer("Compare ticket prices"), TaskKind::Analyze);
        assert_eq!(TaskKind::infer("Which one should I attend"), TaskKind::Recommend);
        assert_eq!(TaskKind::infer("Tell me a joke"), TaskKind::Generic);
        // "finding" is not the keyword "find"
        assert_eq!(TaskKind::infer("finding nemo screening"), TaskKind::Generic);
    }

    #[test]
    fn test_with_dependencies_dedups_and_drops_self() {
        let task = Task::new("task_2", "analyze", 1).with_dependencies(["task_1", "task_1", "task_2"]);
        assert_eq!(task.dependencies, vec!["task_1".to_string()]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[test]
    fn test_plan_error_display() {
        let err = PlanError::Cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Dependency cycle: a -> b -> a");

        let agent: AgentError = err.into();
        assert!(matches!(agent, AgentError::Planning(_)));
        assert!(sdk::errors::AgentErrorExt::is_recoverable(&agent));
    }
}

//! Turn Orchestrator
//!
//! Drives one user turn through `Received -> Planning -> Executing ->
//! Responding -> Done`. The orchestrator owns the memory store; the planner
//! and executor only borrow it for the duration of a call, and `&mut self`
//! keeps turns strictly sequential.

use crate::conductor::executor::Executor;
use crate::conductor::planner::{
    fallback_task, prioritize_tasks, schedule_tasks, validate_task_dependencies, Planner,
};
use crate::conductor::types::{
    ExecutionContext, ExecutionError, MemoryContext, Task, TaskKind, TaskResult, TaskStatus,
};
use crate::memory::{
    ConversationRecord, MemoryStore, PatternObservation, TaskDisposition, TaskSummaryEntry,
};
use sdk::errors::AgentError;
use sdk::types::EventCategory;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

/// Preference key set from festival categories mentioned in requests
pub const PREFERRED_CATEGORY_KEY: &str = "preferred_category";

/// Phase of the current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    Received,
    Planning,
    Executing,
    Responding,
    Done,
    Error,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Received => "received",
            TurnState::Planning => "planning",
            TurnState::Executing => "executing",
            TurnState::Responding => "responding",
            TurnState::Done => "done",
            TurnState::Error => "error",
        };
        f.write_str(name)
    }
}

/// What happened to one sub-task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub description: String,
    pub disposition: TaskDisposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    /// Human-readable reason for a failure or skip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of a completed turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub turn_id: String,
    pub user_input: String,
    pub used_fallback_plan: bool,
    pub outcomes: Vec<TaskOutcome>,
    /// Full user-facing response, including the task summary
    pub response: String,
}

impl TurnReport {
    pub fn succeeded(&self) -> usize {
        self.count(TaskDisposition::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(TaskDisposition::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(TaskDisposition::Skipped)
    }

    fn count(&self, disposition: TaskDisposition) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.disposition == disposition)
            .count()
    }
}

pub struct Orchestrator {
    planner: Planner,
    executor: Executor,
    store: MemoryStore,
    catalog: String,
    location: String,
    recall_limit: usize,
    state: TurnState,
}

impl Orchestrator {
    pub fn new(planner: Planner, executor: Executor, store: MemoryStore) -> Self {
        Self {
            planner,
            executor,
            store,
            catalog: String::new(),
            location: "Montreal, Canada".to_string(),
            recall_limit: 3,
            state: TurnState::Done,
        }
    }

    /// Festival data embedded in task prompts, already formatted
    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = catalog.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit;
        self
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Process one user turn to completion
    ///
    /// # Errors
    ///
    /// - `InputValidation` for empty input, before any side effect
    /// - `Storage` when memory cannot be written; the turn ends in `Error`
    ///
    /// Task failures never surface here; they are listed in the report.
    pub async fn handle_turn(&mut self, raw_input: &str) -> Result<TurnReport, AgentError> {
        let turn_id = uuid::Uuid::new_v4().to_string();
        self.transition(&turn_id, TurnState::Received);

        let user_input = raw_input.trim();
        if user_input.is_empty() {
            self.transition(&turn_id, TurnState::Error);
            return Err(AgentError::InputValidation("input is empty".to_string()));
        }

        match self.run_turn(&turn_id, user_input).await {
            Ok(report) => {
                self.transition(&turn_id, TurnState::Done);
                Ok(report)
            }
            Err(err) => {
                warn!(turn_id = %turn_id, error = %err, "Turn aborted");
                self.transition(&turn_id, TurnState::Error);
                Err(err)
            }
        }
    }

    async fn run_turn(&mut self, turn_id: &str, user_input: &str) -> Result<TurnReport, AgentError> {
        // Planning
        self.transition(turn_id, TurnState::Planning);
        let memory = MemoryContext {
            recent_conversations: self.store.recall_conversations(self.recall_limit),
            preferences: self
                .store
                .user_preferences()
                .iter()
                .map(|(k, v)| (k.clone(), v.value.clone()))
                .collect(),
        };

        let parsed = self.planner.plan(user_input, &memory).await;
        let mut used_fallback_plan = parsed.is_fallback();
        let tasks = match validate_task_dependencies(prioritize_tasks(parsed.into_tasks())) {
            Ok(tasks) => schedule_tasks(tasks),
            Err(err) => {
                let err = AgentError::from(err);
                warn!(turn_id = %turn_id, error = %err, "Invalid plan, using fallback task");
                used_fallback_plan = true;
                vec![fallback_task(user_input)]
            }
        };
        info!(turn_id = %turn_id, tasks = tasks.len(), fallback = used_fallback_plan, "Plan ready");

        // Executing
        self.transition(turn_id, TurnState::Executing);
        let outcomes = self.execute_all(tasks, &memory).await?;

        // Responding
        self.transition(turn_id, TurnState::Responding);
        let response = compose_response(&outcomes);

        for outcome in &outcomes {
            if outcome.disposition != TaskDisposition::Skipped {
                let kind = TaskKind::infer(&outcome.description);
                self.store
                    .learn_pattern(PatternObservation::new(kind.as_str(), &outcome.description))?;
            }
        }
        self.learn_preferences(user_input)?;

        let summary = outcomes
            .iter()
            .map(|o| TaskSummaryEntry {
                task_id: o.task_id.clone(),
                description: o.description.clone(),
                disposition: o.disposition,
                detail: o.reason.clone().unwrap_or_default(),
            })
            .collect();
        self.store
            .store_conversation(ConversationRecord::new(user_input, &response, summary))?;

        Ok(TurnReport {
            turn_id: turn_id.to_string(),
            user_input: user_input.to_string(),
            used_fallback_plan,
            outcomes,
            response,
        })
    }

    /// Run tasks in order; a task runs only when all its dependencies are done
    async fn execute_all(
        &mut self,
        mut tasks: Vec<Task>,
        memory: &MemoryContext,
    ) -> Result<Vec<TaskOutcome>, AgentError> {
        let mut status: HashMap<String, TaskStatus> =
            tasks.iter().map(|t| (t.id.clone(), t.status)).collect();
        let mut contents: HashMap<String, String> = HashMap::new();
        let mut outcomes = Vec::with_capacity(tasks.len());

        for task in tasks.iter_mut() {
            // Scheduling puts every dependency earlier, so it has already settled
            let blocker = task
                .dependencies
                .iter()
                .find_map(|dep| match status.get(dep.as_str()) {
                    Some(TaskStatus::Failed) => Some((dep.clone(), "failed")),
                    Some(TaskStatus::Skipped) => Some((dep.clone(), "was skipped")),
                    _ => None,
                });

            if let Some((dependency, why)) = blocker {
                task.status = TaskStatus::Skipped;
                status.insert(task.id.clone(), TaskStatus::Skipped);
                let skipped = AgentError::DependencySkipped {
                    task_id: task.id.clone(),
                    dependency: dependency.clone(),
                };
                info!(task_id = %task.id, dependency = %dependency, "{}", skipped);
                outcomes.push(TaskOutcome {
                    task_id: task.id.clone(),
                    description: task.description.clone(),
                    disposition: TaskDisposition::Skipped,
                    result: None,
                    reason: Some(format!("depends on {}, which {}", dependency, why)),
                });
                continue;
            }

            task.status = TaskStatus::Running;
            status.insert(task.id.clone(), TaskStatus::Running);

            let dependency_outputs: Vec<(String, String)> = task
                .dependencies
                .iter()
                .filter_map(|dep| contents.get(dep).map(|c| (dep.clone(), c.clone())))
                .collect();
            let context = ExecutionContext {
                memory,
                catalog: &self.catalog,
                location: &self.location,
                dependency_outputs: &dependency_outputs,
            };

            match self
                .executor
                .execute_task(task, &context, &mut self.store)
                .await
            {
                Ok(result) => {
                    task.status = TaskStatus::Done;
                    task.result = Some(result.clone());
                    status.insert(task.id.clone(), TaskStatus::Done);
                    contents.insert(task.id.clone(), result.content.clone());
                    outcomes.push(TaskOutcome {
                        task_id: task.id.clone(),
                        description: task.description.clone(),
                        disposition: TaskDisposition::Succeeded,
                        result: Some(result),
                        reason: None,
                    });
                }
                Err(ExecutionError::Failed {
                    reason, attempts, ..
                }) => {
                    task.status = TaskStatus::Failed;
                    status.insert(task.id.clone(), TaskStatus::Failed);
                    outcomes.push(TaskOutcome {
                        task_id: task.id.clone(),
                        description: task.description.clone(),
                        disposition: TaskDisposition::Failed,
                        result: None,
                        reason: Some(format!("{} (after {} attempt(s))", reason, attempts)),
                    });
                }
                Err(err @ ExecutionError::Storage(_)) => return Err(err.into()),
            }
        }

        Ok(outcomes)
    }

    fn learn_preferences(&mut self, user_input: &str) -> Result<(), AgentError> {
        let category = EventCategory::infer(user_input);
        if category == EventCategory::Other {
            return Ok(());
        }

        self.store
            .store_user_preference(PREFERRED_CATEGORY_KEY, category.as_str())?;
        self.store
            .learn_pattern(PatternObservation::new("preference", category.as_str()))?;
        Ok(())
    }

    fn transition(&mut self, turn_id: &str, next: TurnState) {
        info!(turn_id = %turn_id, from = %self.state, state = %next, "Turn state");
        self.state = next;
    }
}

/// Task outputs followed by a per-task summary
pub fn compose_response(outcomes: &[TaskOutcome]) -> String {
    let mut response = String::new();

    for outcome in outcomes {
        if let Some(result) = &outcome.result {
            if !response.is_empty() {
                response.push_str("\n\n");
            }
            response.push_str(result.content.trim());
        }
    }

    let succeeded = outcomes
        .iter()
        .filter(|o| o.disposition == TaskDisposition::Succeeded)
        .count();

    if !response.is_empty() {
        response.push_str("\n\n");
    }
    response.push_str(&format!(
        "{}/{} tasks succeeded",
        succeeded,
        outcomes.len()
    ));

    for outcome in outcomes {
        let line = match (&outcome.disposition, &outcome.reason) {
            (TaskDisposition::Succeeded, _) => {
                format!("\n  [ok] {}: {}", outcome.task_id, outcome.description)
            }
            (disposition, reason) => format!(
                "\n  [{}] {}: {} ({})",
                disposition,
                outcome.task_id,
                outcome.description,
                reason.as_deref().unwrap_or("no reason given")
            ),
        };
        response.push_str(&line);
    }

    response
}

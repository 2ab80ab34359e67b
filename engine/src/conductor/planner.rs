//! Conductor Planner
//!
//! Asks the generative-text service to break a user request into sub-tasks
//! and turns its free-form answer into `Task`s. Planning never fails: when
//! the service errors or its output is unusable, the request becomes a
//! single fallback task.

use crate::conductor::types::{MemoryContext, PlanError, Task};
use crate::llm::retry::RetryPolicy;
use crate::llm::{extract_fenced_block, GenerationParams, Message, TextGenerator};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of parsing the service's plan
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPlan {
    Structured(Vec<Task>),
    RawFallback(Task),
}

impl ParsedPlan {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ParsedPlan::RawFallback(_))
    }

    pub fn into_tasks(self) -> Vec<Task> {
        match self {
            ParsedPlan::Structured(tasks) => tasks,
            ParsedPlan::RawFallback(task) => vec![task],
        }
    }
}

pub struct Planner {
    llm: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    params: GenerationParams,
}

/// Intermediate deserialization type for generated JSON
///
/// Fields are loosely typed because models emit ids and priorities as
/// strings or numbers interchangeably.
#[derive(Debug, Deserialize)]
struct RawTask {
    id: Option<Value>,
    description: Option<String>,
    priority: Option<Value>,
    dependencies: Option<Value>,
}

impl Planner {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        retry: RetryPolicy,
        attempt_timeout: Duration,
        params: GenerationParams,
    ) -> Self {
        Self {
            llm,
            retry,
            attempt_timeout,
            params,
        }
    }

    /// Plan a request, reporting whether the fallback was used
    pub async fn plan(&self, user_input: &str, memory: &MemoryContext) -> ParsedPlan {
        let messages = [
            Message::system(PLANNER_SYSTEM_PROMPT),
            Message::user(build_planning_prompt(user_input, memory)),
        ];

        let outcome = self
            .retry
            .run(self.attempt_timeout, || {
                self.llm.generate(&messages, self.params)
            })
            .await;

        match outcome.into_result() {
            Ok((response, attempts)) => {
                let parsed = parse_plan(&response, user_input);
                if parsed.is_fallback() {
                    warn!(attempts, "Unusable plan output, using fallback task");
                } else {
                    debug!(attempts, "Parsed structured plan");
                }
                parsed
            }
            Err((err, attempts)) => {
                warn!(attempts, error = %err, "Planning call failed, using fallback task");
                ParsedPlan::RawFallback(fallback_task(user_input))
            }
        }
    }

    /// Plan a request into a non-empty task list
    pub async fn plan_tasks(&self, user_input: &str, memory: &MemoryContext) -> Vec<Task> {
        let tasks = self.plan(user_input, memory).await.into_tasks();
        info!(count = tasks.len(), "Planned tasks");
        tasks
    }
}

const PLANNER_SYSTEM_PROMPT: &str = "You are the planner of a festival concierge. \
Break the user's request into a small number of concrete sub-tasks.\n\
Output ONLY a JSON array. Each element must have:\n\
- \"id\": short unique string such as \"task_1\"\n\
- \"description\": what to do, phrased as an instruction\n\
- \"priority\": integer, lower runs first\n\
- \"dependencies\": array of ids that must finish first (empty if none)\n\n\
Example:\n\
[{\"id\":\"task_1\",\"description\":\"Find music festivals this weekend\",\"priority\":1,\"dependencies\":[]},\
{\"id\":\"task_2\",\"description\":\"Recommend the best one for a first visit\",\"priority\":2,\"dependencies\":[\"task_1\"]}]\n\n\
Output ONLY the JSON array, no markdown, no explanation.";

fn build_planning_prompt(user_input: &str, memory: &MemoryContext) -> String {
    let mut prompt = format!("User request: {}\n", user_input);
    if !memory.is_empty() {
        prompt.push('\n');
        prompt.push_str(&memory.format_for_prompt());
    }
    prompt
}

/// The single task used when no structured plan is available
pub fn fallback_task(user_input: &str) -> Task {
    Task::new("task_1", user_input.trim(), 0)
}

/// Parse generated text into tasks
///
/// Individual fields are coerced (missing id becomes `task_N`, missing
/// priority becomes the position, negative priority becomes 0). The plan as
/// a whole is rejected, yielding the fallback, when no JSON is found, no
/// tasks are present, or any task lacks a description.
pub fn parse_plan(response: &str, user_input: &str) -> ParsedPlan {
    match parse_structured(response) {
        Some(tasks) if !tasks.is_empty() => ParsedPlan::Structured(tasks),
        _ => ParsedPlan::RawFallback(fallback_task(user_input)),
    }
}

fn parse_structured(response: &str) -> Option<Vec<Task>> {
    let trimmed = response.trim();
    let body = extract_fenced_block(trimmed).unwrap_or(trimmed);

    let value = extract_json(body)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("tasks") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    let mut tasks = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let raw: RawTask = serde_json::from_value(item).ok()?;

        let description = raw.description.map(|d| d.trim().to_string())?;
        if description.is_empty() {
            return None;
        }

        let id = raw
            .id
            .as_ref()
            .and_then(value_as_id)
            .unwrap_or_else(|| format!("task_{}", i + 1));

        let priority = raw
            .priority
            .as_ref()
            .and_then(value_as_priority)
            .unwrap_or(i as i64)
            .max(0);

        let dependencies = raw
            .dependencies
            .as_ref()
            .map(values_as_ids)
            .unwrap_or_default();

        tasks.push(Task::new(id, description, priority).with_dependencies(dependencies));
    }

    Some(tasks)
}

/// The outermost JSON array, or failing that the outermost object
fn extract_json(text: &str) -> Option<Value> {
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                    return Some(value);
                }
            }
        }
    }
    None
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A list, a single id, or null
fn values_as_ids(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_as_id).collect(),
        other => value_as_id(other).into_iter().collect(),
    }
}

fn value_as_priority(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Stable sort by ascending priority
pub fn prioritize_tasks(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by_key(|task| task.priority);
    tasks
}

/// Reject duplicate ids, unknown dependencies and cycles
///
/// Returns the tasks unchanged when the plan is well formed.
pub fn validate_task_dependencies(tasks: Vec<Task>) -> Result<Vec<Task>, PlanError> {
    let mut by_id: HashMap<&str, &Task> = HashMap::with_capacity(tasks.len());
    for task in &tasks {
        if by_id.insert(task.id.as_str(), task).is_some() {
            return Err(PlanError::DuplicateId(task.id.clone()));
        }
    }

    for task in &tasks {
        if let Some(dep) = task
            .dependencies
            .iter()
            .find(|dep| !by_id.contains_key(dep.as_str()))
        {
            return Err(PlanError::UnknownDependency {
                task_id: task.id.clone(),
                dependency: dep.clone(),
            });
        }
    }

    let mut finished: HashSet<&str> = HashSet::new();
    for task in &tasks {
        let mut path = Vec::new();
        if let Some(cycle) = find_cycle(task.id.as_str(), &by_id, &mut path, &mut finished) {
            return Err(PlanError::Cycle(cycle));
        }
    }

    Ok(tasks)
}

/// Depth-first search; `path` holds the ids on the current stack
fn find_cycle<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a Task>,
    path: &mut Vec<&'a str>,
    finished: &mut HashSet<&'a str>,
) -> Option<Vec<String>> {
    if finished.contains(id) {
        return None;
    }
    if let Some(pos) = path.iter().position(|p| *p == id) {
        let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
        cycle.push(id.to_string());
        return Some(cycle);
    }

    path.push(id);
    if let Some(task) = by_id.get(id) {
        for dep in &task.dependencies {
            if let Some(cycle) = find_cycle(dep.as_str(), by_id, path, finished) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    finished.insert(id);
    None
}

/// Order a validated plan so every task follows its dependencies
///
/// Takes the priority-sorted tasks and repeatedly moves the first task whose
/// dependencies are already placed, so priority order is kept wherever the
/// dependency graph allows it. Priority values are left as planned.
pub fn schedule_tasks(tasks: Vec<Task>) -> Vec<Task> {
    let mut pending = tasks;
    let mut placed: HashSet<String> = HashSet::with_capacity(pending.len());
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let next = pending
            .iter()
            .position(|task| task.dependencies.iter().all(|dep| placed.contains(dep)))
            // Only reachable with a cycle or unknown id, which validation rejects
            .unwrap_or(0);

        let task = pending.remove(next);
        if next > 0 {
            debug!(task_id = %task.id, "Moved ahead of a dependent with lower priority");
        }
        placed.insert(task.id.clone());
        ordered.push(task);
    }

    ordered
}

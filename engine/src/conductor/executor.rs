//! Conductor Executor
//!
//! Runs a single sub-task against the generative-text service. The prompt
//! template is chosen from the task kind and filled with the festival
//! catalog, recalled memory and the outputs of completed dependencies.

use crate::conductor::types::{ExecutionContext, ExecutionError, Task, TaskKind, TaskResult};
use crate::llm::retry::RetryPolicy;
use crate::llm::{GenerationParams, Message, TextGenerator};
use crate::memory::{CachedOutput, MemoryStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct Executor {
    llm: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    params: GenerationParams,
    cache_max_age: Duration,
}

impl Executor {
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
            cache_max_age: Duration::ZERO,
        }
    }

    /// Reuse cached results younger than `max_age`; zero disables reuse
    pub fn with_cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age = max_age;
        self
    }

    /// Execute a single task
    ///
    /// The executor:
    /// 1. Returns a cached result for the same description if one is fresh
    /// 2. Builds the prompt for the task's kind
    /// 3. Calls the service under the retry policy
    /// 4. Caches the successful output in the memory store
    ///
    /// # Errors
    ///
    /// `ExecutionError::Failed` carries the last failure reason and the
    /// number of attempts. `ExecutionError::Storage` means the result could
    /// not be cached.
    pub async fn execute_task(
        &self,
        task: &Task,
        context: &ExecutionContext<'_>,
        store: &mut MemoryStore,
    ) -> Result<TaskResult, ExecutionError> {
        let start = Instant::now();

        if let Some(cached) = store.lookup_task_result(&task.description, self.cache_max_age) {
            info!(task_id = %task.id, "Using cached result");
            return Ok(TaskResult {
                task_id: task.id.clone(),
                content: cached.result.content,
                elapsed: start.elapsed(),
                attempts: 0,
                from_cache: true,
            });
        }

        let kind = task.kind();
        debug!(task_id = %task.id, kind = %kind, "Executing task");

        let messages = [
            Message::system(system_prompt(context.location)),
            Message::user(build_task_prompt(task, kind, context)),
        ];

        let outcome = self
            .retry
            .run(self.attempt_timeout, || {
                self.llm.generate(&messages, self.params)
            })
            .await;

        match outcome.into_result() {
            Ok((content, attempts)) => {
                let elapsed = start.elapsed();
                info!(
                    task_id = %task.id,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Task completed"
                );

                store.store_task_result(
                    &task.description,
                    CachedOutput {
                        content: content.clone(),
                        elapsed_ms: elapsed.as_millis() as u64,
                        attempts,
                    },
                )?;

                Ok(TaskResult {
                    task_id: task.id.clone(),
                    content,
                    elapsed,
                    attempts,
                    from_cache: false,
                })
            }
            Err((err, attempts)) => {
                warn!(task_id = %task.id, attempts, error = %err, "Task failed");
                Err(ExecutionError::Failed {
                    task_id: task.id.clone(),
                    reason: err.to_string(),
                    attempts,
                })
            }
        }
    }
}

fn system_prompt(location: &str) -> String {
    format!(
        "You are a festival concierge for {}. Answer with exact, concise information. \
        Use only the festival data provided. Include venue addresses suitable for a map \
        search, cost estimates in local currency and the nearest metro station when relevant. \
        If nothing matches, say so and suggest alternatives.",
        location
    )
}

fn template_for(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Search => {
            "Find the festivals and events that match the request. \
            List at most 5, one per line: name, venue, address, price, metro station."
        }
        TaskKind::Analyze => {
            "Analyze the relevant festivals for the request. \
            Compare them on dates, cost, location and audience in at most 5 short points."
        }
        TaskKind::Recommend => {
            "Recommend the best options for the request and explain each choice in one sentence. \
            Take the user's preferences into account."
        }
        TaskKind::Generic => "Answer the request directly and briefly.",
    }
}

fn build_task_prompt(task: &Task, kind: TaskKind, context: &ExecutionContext<'_>) -> String {
    let mut prompt = String::new();

    prompt.push_str("AVAILABLE FESTIVAL DATA:\n");
    if context.catalog.trim().is_empty() {
        prompt.push_str("No festivals currently available.\n");
    } else {
        prompt.push_str(context.catalog);
        prompt.push('\n');
    }

    if !context.memory.is_empty() {
        prompt.push('\n');
        prompt.push_str(&context.memory.format_for_prompt());
    }

    if !context.dependency_outputs.is_empty() {
        prompt.push_str("\nResults of earlier steps:\n");
        for (id, content) in context.dependency_outputs {
            prompt.push_str(&format!("[{}]\n{}\n", id, content));
        }
    }

    prompt.push_str(&format!(
        "\nTASK ({}): {}\n\n{}",
        kind,
        task.description,
        template_for(kind)
    ));

    prompt
}

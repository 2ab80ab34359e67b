//! Conductor System
//!
//! Plans a user request into sub-tasks, executes them in priority order and
//! records the turn in memory.

pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod types;

pub use executor::Executor;
pub use orchestrator::{Orchestrator, TaskOutcome, TurnReport, TurnState};
pub use planner::{
    fallback_task, parse_plan, prioritize_tasks, schedule_tasks, validate_task_dependencies,
    ParsedPlan, Planner,
};
pub use types::{
    ExecutionContext, ExecutionError, MemoryContext, PlanError, Task, TaskKind, TaskResult,
    TaskStatus,
};

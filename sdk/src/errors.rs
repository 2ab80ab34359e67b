//! Error types and handling
//!
//! This module provides the top-level error type used throughout the concierge.
//! All errors implement the `AgentErrorExt` trait which provides user-friendly
//! hints and indicates whether a turn can continue after the error.
//!
//! # Security
//!
//! Hints are static strings. They never echo:
//! - API keys or tokens
//! - File paths of the memory document
//! - Raw provider responses

use thiserror::Error;

/// Trait for concierge error extensions
///
/// Gives every error a user-facing hint and a recoverability flag. A
/// non-recoverable error aborts the current turn; recoverable ones are
/// reported inside the turn's summary.
pub trait AgentErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// secrets, file paths or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable within a turn
    fn is_recoverable(&self) -> bool;
}

/// Main concierge error type
///
/// # Error Categories
///
/// - **Input**: Empty or malformed user input, rejected before planning
/// - **Planning**: The planning call failed or its output could not be used
/// - **Execution**: A sub-task failed after exhausting its retries
/// - **Dependency**: A sub-task was skipped because a dependency failed or was skipped
/// - **Storage**: The memory document could not be read or written
/// - **Configuration**: Missing credential or invalid config file
///
/// # Examples
///
/// ```
/// use sdk::errors::{AgentError, AgentErrorExt};
///
/// let error = AgentError::InputValidation("input is empty".to_string());
/// assert!(error.is_recoverable());
///
/// let fatal = AgentError::Storage("disk full".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum AgentError {
    // Input errors
    #[error("Invalid input: {0}")]
    InputValidation(String),

    // Planning errors
    #[error("Planning failed: {0}")]
    Planning(String),

    // Execution errors
    #[error("Task {task_id} failed after {attempts} attempt(s): {reason}")]
    Execution {
        task_id: String,
        reason: String,
        attempts: u32,
    },

    #[error("Task {task_id} skipped: dependency {dependency} failed or was skipped")]
    DependencySkipped { task_id: String, dependency: String },

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),
}

impl AgentErrorExt for AgentError {
    fn user_hint(&self) -> &str {
        match self {
            Self::InputValidation(_) => "Please type a question or request",
            Self::Planning(_) => "Could not break the request into steps. It was handled as a single step",
            Self::Execution { .. } => "One step could not be completed. Try again in a moment",
            Self::DependencySkipped { .. } => "This step needed an earlier step that did not finish",
            Self::Storage(_) => "Conversation memory is unavailable. Check the data directory",
            Self::Config(_) => "Check your config.toml file for errors",
            Self::MissingCredential(_) => "Set the required API key in your environment",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // These abort the turn
            Self::Storage(_) | Self::Config(_) | Self::MissingCredential(_) => false,

            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_are_not_recoverable() {
        assert!(!AgentError::Storage("x".into()).is_recoverable());
        assert!(!AgentError::Config("x".into()).is_recoverable());
        assert!(!AgentError::MissingCredential("GOOGLE_API_KEY".into()).is_recoverable());
    }

    #[test]
    fn test_task_level_errors_are_recoverable() {
        let exec = AgentError::Execution {
            task_id: "task_1".into(),
            reason: "rate limited".into(),
            attempts: 3,
        };
        assert!(exec.is_recoverable());
        assert_eq!(
            exec.to_string(),
            "Task task_1 failed after 3 attempt(s): rate limited"
        );

        let skipped = AgentError::DependencySkipped {
            task_id: "task_2".into(),
            dependency: "task_1".into(),
        };
        assert!(skipped.is_recoverable());
        assert!(skipped.to_string().contains("task_1"));
    }

    #[test]
    fn test_hint_does_not_echo_payload() {
        let err = AgentError::Storage("/home/me/.concierge/memory.json".into());
        assert!(!err.user_hint().contains("/home/me"));
    }
}

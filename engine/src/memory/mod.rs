//! Durable conversational memory
//!
//! Conversation history, cached task results, user preferences and learned
//! patterns, kept in a single JSON document on disk.

use sdk::errors::AgentError;
use std::path::PathBuf;

pub mod document;
pub mod store;

pub use document::{
    CachedOutput, CachedTaskResult, ConversationRecord, LearnedPattern, MemoryDocument,
    PatternObservation, TaskDisposition, TaskSummaryEntry, UserPreference,
};
pub use store::{MemoryStats, MemoryStore};

/// Errors from reading or writing the memory document
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to read memory file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Memory file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize memory: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write memory file: {0}")]
    Write(String),
}

impl From<StorageError> for AgentError {
    fn from(err: StorageError) -> Self {
        AgentError::Storage(err.to_string())
    }
}

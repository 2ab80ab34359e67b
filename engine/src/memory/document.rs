//! Persisted memory document
//!
//! The whole memory is one JSON document with five top-level keys:
//! `conversations`, `task_results`, `user_preferences`, `learned_patterns`
//! and `metadata`. Missing keys deserialize as empty collections so older
//! documents keep loading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Current document format version
pub const DOCUMENT_VERSION: &str = "1.0";

/// Examples kept per learned pattern
pub const MAX_PATTERN_EXAMPLES: usize = 5;

/// Observations needed before a pattern reaches full confidence
const CONFIDENCE_SATURATION: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryDocument {
    #[serde(default)]
    pub conversations: Vec<ConversationRecord>,

    #[serde(default)]
    pub task_results: Vec<CachedTaskResult>,

    #[serde(default)]
    pub user_preferences: BTreeMap<String, UserPreference>,

    #[serde(default)]
    pub learned_patterns: Vec<LearnedPattern>,

    #[serde(default)]
    pub metadata: Metadata,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self {
            conversations: Vec::new(),
            task_results: Vec::new(),
            user_preferences: BTreeMap::new(),
            learned_patterns: Vec::new(),
            metadata: Metadata::default(),
        }
    }
}

impl MemoryDocument {
    /// Refresh `updated_at` and the counts before a write
    pub fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
        self.metadata.total_conversations = self.conversations.len();
        self.metadata.total_task_results = self.task_results.len();
        self.metadata.total_user_preferences = self.user_preferences.len();
        self.metadata.total_learned_patterns = self.learned_patterns.len();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: String,
    #[serde(default)]
    pub total_conversations: usize,
    #[serde(default)]
    pub total_task_results: usize,
    #[serde(default)]
    pub total_user_preferences: usize,
    #[serde(default)]
    pub total_learned_patterns: usize,
}

impl Default for Metadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            version: DOCUMENT_VERSION.to_string(),
            total_conversations: 0,
            total_task_results: 0,
            total_user_preferences: 0,
            total_learned_patterns: 0,
        }
    }
}

/// One completed turn. Never modified after it is written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub agent_response: String,
    #[serde(default)]
    pub task_summary: Vec<TaskSummaryEntry>,
}

impl ConversationRecord {
    pub fn new(
        user_input: impl Into<String>,
        agent_response: impl Into<String>,
        task_summary: Vec<TaskSummaryEntry>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            user_input: user_input.into(),
            agent_response: agent_response.into(),
            task_summary,
        }
    }
}

/// How a sub-task ended, as recorded with its conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskDisposition {
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for TaskDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskDisposition::Succeeded => write!(f, "succeeded"),
            TaskDisposition::Failed => write!(f, "failed"),
            TaskDisposition::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSummaryEntry {
    pub task_id: String,
    pub description: String,
    pub disposition: TaskDisposition,
    /// Reason for a failure or skip, empty on success
    #[serde(default)]
    pub detail: String,
}

/// Output of a successful task, as cached
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedOutput {
    pub content: String,
    pub elapsed_ms: u64,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedTaskResult {
    pub fingerprint: String,
    pub task_description: String,
    pub result: CachedOutput,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPreference {
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// A repeated task description or preference, counted over time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearnedPattern {
    pub key: String,
    pub category: String,
    #[serde(default)]
    pub examples: Vec<String>,
    pub frequency: u64,
    pub confidence: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl LearnedPattern {
    pub fn first(observation: &PatternObservation, now: DateTime<Utc>) -> Self {
        Self {
            key: observation.key(),
            category: observation.category.clone(),
            examples: vec![observation.text.clone()],
            frequency: 1,
            confidence: confidence_for(1),
            first_seen: now,
            last_seen: now,
        }
    }

    pub fn observe(&mut self, observation: &PatternObservation, now: DateTime<Utc>) {
        self.frequency += 1;
        self.confidence = confidence_for(self.frequency);
        self.last_seen = now;

        if !self.examples.contains(&observation.text) {
            self.examples.push(observation.text.clone());
            if self.examples.len() > MAX_PATTERN_EXAMPLES {
                self.examples.remove(0);
            }
        }
    }
}

fn confidence_for(frequency: u64) -> f64 {
    (frequency as f64 / CONFIDENCE_SATURATION).min(1.0)
}

/// Something the orchestrator saw that may repeat
#[derive(Debug, Clone, PartialEq)]
pub struct PatternObservation {
    /// Pattern family, e.g. a task kind or "preference"
    pub category: String,
    pub text: String,
}

impl PatternObservation {
    pub fn new(category: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            text: text.into(),
        }
    }

    /// Category plus the normalized text
    pub fn key(&self) -> String {
        format!("{}:{}", self.category, normalize(&self.text))
    }
}

/// Lowercase with runs of whitespace collapsed
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable cache key for a task description
pub fn fingerprint(description: &str) -> String {
    let hash = blake3::hash(normalize(description).as_bytes());
    hash.to_hex()[..16].to_string()
}

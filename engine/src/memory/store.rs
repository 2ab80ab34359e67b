//! JSON-backed memory store
//!
//! The full document is read once at open. Each mutation is applied to a
//! copy, the copy is written whole, and only then does it replace the live
//! document; a failed write leaves both disk and memory as they were. Writes
//! go to a temp file in the same directory which is then renamed over the
//! target, so a crash leaves either the old or the new document on disk.

use super::document::{
    fingerprint, CachedOutput, CachedTaskResult, ConversationRecord, LearnedPattern,
    MemoryDocument, PatternObservation, UserPreference,
};
use super::StorageError;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Counts reported by `get_stats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub conversations: usize,
    pub task_results: usize,
    pub user_preferences: usize,
    pub learned_patterns: usize,
    pub size_bytes: u64,
}

pub struct MemoryStore {
    path: PathBuf,
    document: MemoryDocument,
}

impl MemoryStore {
    /// Open the store at `path`
    ///
    /// A missing file opens as an empty store; nothing is written until the
    /// first mutation.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the file exists but cannot be read or
    /// does not hold a valid memory document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let document = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|source| StorageError::Read {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
                path: path.clone(),
                source,
            })?
        } else {
            MemoryDocument::default()
        };

        info!(
            path = %path.display(),
            conversations = document.conversations.len(),
            "Memory store opened"
        );

        Ok(Self { path, document })
    }

    pub fn document(&self) -> &MemoryDocument {
        &self.document
    }

    /// Append a conversation record
    pub fn store_conversation(&mut self, record: ConversationRecord) -> Result<(), StorageError> {
        let id = record.id.clone();
        self.commit(|doc| doc.conversations.push(record))?;
        debug!(conversation_id = %id, "Stored conversation");
        Ok(())
    }

    /// Up to `limit` most recent conversations, most recent first
    pub fn recall_conversations(&self, limit: usize) -> Vec<ConversationRecord> {
        self.document
            .conversations
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Cache a task's output, replacing any entry with the same fingerprint
    pub fn store_task_result(
        &mut self,
        description: &str,
        output: CachedOutput,
    ) -> Result<(), StorageError> {
        let fingerprint = fingerprint(description);
        let entry = CachedTaskResult {
            fingerprint: fingerprint.clone(),
            task_description: description.to_string(),
            result: output,
            timestamp: Utc::now(),
        };

        // Upserted entries move to the end so the list stays in write order
        self.commit(|doc| {
            doc.task_results
                .retain(|existing| existing.fingerprint != entry.fingerprint);
            doc.task_results.push(entry);
        })?;
        debug!(fingerprint = %fingerprint, "Stored task result");
        Ok(())
    }

    /// Cached output for `description` no older than `max_age`
    pub fn lookup_task_result(
        &self,
        description: &str,
        max_age: Duration,
    ) -> Option<CachedTaskResult> {
        if max_age.is_zero() {
            return None;
        }

        let fingerprint = fingerprint(description);
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();

        self.document
            .task_results
            .iter()
            .find(|entry| entry.fingerprint == fingerprint)
            .filter(|entry| now.signed_duration_since(entry.timestamp) <= max_age)
            .cloned()
    }

    /// Most recent cached results, optionally only those whose description
    /// contains `keyword` (case-insensitive)
    pub fn recall_task_results(&self, keyword: Option<&str>, limit: usize) -> Vec<CachedTaskResult> {
        let keyword = keyword.map(str::to_lowercase);

        self.document
            .task_results
            .iter()
            .rev()
            .filter(|entry| match &keyword {
                Some(k) => entry.task_description.to_lowercase().contains(k),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Record one observation of a pattern
    pub fn learn_pattern(&mut self, observation: PatternObservation) -> Result<(), StorageError> {
        let key = observation.key();
        let now = Utc::now();

        self.commit(|doc| {
            match doc
                .learned_patterns
                .iter_mut()
                .find(|pattern| pattern.key == key)
            {
                Some(pattern) => pattern.observe(&observation, now),
                None => doc
                    .learned_patterns
                    .push(LearnedPattern::first(&observation, now)),
            }
        })?;
        debug!(pattern = %key, "Learned pattern");
        Ok(())
    }

    /// Learned patterns, optionally only one category
    pub fn learned_patterns(&self, category: Option<&str>) -> Vec<LearnedPattern> {
        self.document
            .learned_patterns
            .iter()
            .filter(|pattern| category.map_or(true, |c| pattern.category == c))
            .cloned()
            .collect()
    }

    /// Set a preference; the last write wins
    pub fn store_user_preference(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), StorageError> {
        let key = key.into();
        let value = value.into();
        debug!(key = %key, value = %value, "Stored user preference");

        self.commit(|doc| {
            doc.user_preferences.insert(
                key,
                UserPreference {
                    value,
                    updated_at: Utc::now(),
                },
            );
        })
    }

    pub fn user_preference(&self, key: &str) -> Option<&str> {
        self.document
            .user_preferences
            .get(key)
            .map(|pref| pref.value.as_str())
    }

    pub fn user_preferences(&self) -> &BTreeMap<String, UserPreference> {
        &self.document.user_preferences
    }

    /// Collection counts plus the size of the file on disk
    pub fn get_stats(&self) -> MemoryStats {
        let size_bytes = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);

        MemoryStats {
            conversations: self.document.conversations.len(),
            task_results: self.document.task_results.len(),
            user_preferences: self.document.user_preferences.len(),
            learned_patterns: self.document.learned_patterns.len(),
            size_bytes,
        }
    }

    /// Reset to an empty document and persist it
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.commit(|doc| *doc = MemoryDocument::default())?;
        info!("Memory cleared");
        Ok(())
    }

    /// Apply `mutate` to a copy, write it, then make it live
    fn commit(&mut self, mutate: impl FnOnce(&mut MemoryDocument)) -> Result<(), StorageError> {
        let mut next = self.document.clone();
        mutate(&mut next);
        next.touch();

        self.persist(&next)?;
        self.document = next;
        Ok(())
    }

    fn persist(&self, document: &MemoryDocument) -> Result<(), StorageError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| StorageError::Write(e.to_string()))?;

        let json = serde_json::to_vec_pretty(document)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| StorageError::Write(e.to_string()))?;
        tmp.write_all(&json)
            .map_err(|e| StorageError::Write(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StorageError::Write(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::Write(e.error.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::document::{TaskDisposition, TaskSummaryEntry};

    fn temp_store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("memory.json")).unwrap();
        (dir, store)
    }

    fn output(content: &str) -> CachedOutput {
        CachedOutput {
            content: content.to_string(),
            elapsed_ms: 120,
            attempts: 1,
        }
    }

    #[test]
    fn test_recall_on_empty_store() {
        let (_dir, store) = temp_store();
        assert!(store.recall_conversations(3).is_empty());
        assert_eq!(store.get_stats().size_bytes, 0);
    }

    #[test]
    fn test_recall_most_recent_first() {
        let (_dir, mut store) = temp_store();
        for i in 0..5 {
            store
                .store_conversation(ConversationRecord::new(
                    format!("question {}", i),
                    format!("answer {}", i),
                    vec![TaskSummaryEntry {
                        task_id: "task_1".into(),
                        description: "d".into(),
                        disposition: TaskDisposition::Succeeded,
                        detail: String::new(),
                    }],
                ))
                .unwrap();
        }

        let recalled = store.recall_conversations(3);
        let inputs: Vec<_> = recalled.iter().map(|r| r.user_input.as_str()).collect();
        assert_eq!(inputs, vec!["question 4", "question 3", "question 2"]);
    }

    #[test]
    fn test_task_result_upsert() {
        let (_dir, mut store) = temp_store();
        store
            .store_task_result("Find jazz festivals", output("first"))
            .unwrap();
        store
            .store_task_result("find  JAZZ festivals", output("second"))
            .unwrap();

        assert_eq!(store.get_stats().task_results, 1);
        let hit = store
            .lookup_task_result("find jazz festivals", Duration::from_secs(60))
            .unwrap();
        assert_eq!(hit.result.content, "second");
    }

    #[test]
    fn test_lookup_zero_max_age_disables_cache() {
        let (_dir, mut store) = temp_store();
        store.store_task_result("find food", output("x")).unwrap();
        assert!(store.lookup_task_result("find food", Duration::ZERO).is_none());
    }

    #[test]
    fn test_recall_task_results_by_keyword() {
        let (_dir, mut store) = temp_store();
        store.store_task_result("Find jazz shows", output("a")).unwrap();
        store.store_task_result("Recommend food", output("b")).unwrap();
        store.store_task_result("Compare jazz venues", output("c")).unwrap();

        let jazz = store.recall_task_results(Some("JAZZ"), 10);
        assert_eq!(jazz.len(), 2);
        assert_eq!(jazz[0].task_description, "Compare jazz venues");

        assert_eq!(store.recall_task_results(None, 2).len(), 2);
    }

    #[test]
    fn test_learn_pattern_increments_frequency() {
        let (_dir, mut store) = temp_store();
        store
            .learn_pattern(PatternObservation::new("search", "Find jazz"))
            .unwrap();
        store
            .learn_pattern(PatternObservation::new("search", "find JAZZ"))
            .unwrap();
        store
            .learn_pattern(PatternObservation::new("recommend", "best food"))
            .unwrap();

        let search = store.learned_patterns(Some("search"));
        assert_eq!(search.len(), 1);
        assert_eq!(search[0].frequency, 2);
        assert_eq!(search[0].examples.len(), 2);
        assert_eq!(store.learned_patterns(None).len(), 2);
    }

    #[test]
    fn test_preferences_last_write_wins() {
        let (_dir, mut store) = temp_store();
        store.store_user_preference("preferred_category", "music").unwrap();
        store.store_user_preference("preferred_category", "food").unwrap();

        assert_eq!(store.user_preference("preferred_category"), Some("food"));
        assert_eq!(store.user_preferences().len(), 1);
        assert_eq!(store.user_preference("missing"), None);
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let mut store = MemoryStore::open(blocker.join("memory.json")).unwrap();

        assert!(store
            .store_conversation(ConversationRecord::new("q", "a", Vec::new()))
            .is_err());
        assert!(store.store_task_result("find food", output("x")).is_err());
        assert!(store
            .learn_pattern(PatternObservation::new("search", "find food"))
            .is_err());
        assert!(store.store_user_preference("k", "v").is_err());

        assert!(store.recall_conversations(3).is_empty());
        assert!(store.recall_task_results(None, 3).is_empty());
        assert!(store.learned_patterns(None).is_empty());
        assert_eq!(store.user_preference("k"), None);
        assert_eq!(store.document().metadata.total_conversations, 0);
    }

    #[test]
    fn test_clear_resets_document() {
        let (_dir, mut store) = temp_store();
        store.store_user_preference("k", "v").unwrap();
        store.clear().unwrap();

        let stats = store.get_stats();
        assert_eq!(stats.user_preferences, 0);
        assert!(stats.size_bytes > 0);
    }
}

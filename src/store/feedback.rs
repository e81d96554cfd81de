//! Reader feedback, kept as an append-only list.

use super::{State, StoreName};
use crate::error::StoreError;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const FEEDBACK_KEY: &str = "eaders-feedback";

/// One submitted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub text: String,
    /// RFC 3339 UTC time with milliseconds, e.g. `2024-05-01T12:00:00.000Z`.
    pub timestamp: String,
}

/// Repository for the feedback list.
#[derive(Clone)]
pub struct FeedbackStore {
    state: State,
}

impl FeedbackStore {
    pub fn new(state: State) -> Self {
        Self { state }
    }

    pub fn entries(&self) -> Result<Vec<FeedbackEntry>, StoreError> {
        Ok(self.state.load(FEEDBACK_KEY)?.unwrap_or_default())
    }

    /// Appends `text`, trimmed and stamped with the current time.
    pub fn append(&self, text: &str) -> Result<FeedbackEntry, StoreError> {
        let entry = FeedbackEntry {
            text: text.trim().to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let mut entries = self.entries()?;
        entries.push(entry.clone());
        self.state.save(StoreName::Feedback, FEEDBACK_KEY, &entries)?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeBus, KeyValueStore, MemoryStore};
    use std::sync::Arc;

    #[test]
    fn test_append_keeps_order() {
        let feedback = FeedbackStore::new(State::in_memory());
        assert!(feedback.entries().unwrap().is_empty());

        feedback.append("  More fantasy please \n").unwrap();
        feedback.append("Dark mode").unwrap();

        let texts: Vec<String> = feedback
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(texts, ["More fantasy please", "Dark mode"]);
    }

    #[test]
    fn test_stored_shape() {
        let kv = Arc::new(MemoryStore::new());
        let feedback = FeedbackStore::new(State::new(kv.clone(), ChangeBus::new()));
        let entry = feedback.append("Hi").unwrap();

        assert!(entry.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&entry.timestamp).is_ok());

        let raw = kv.get(FEEDBACK_KEY).unwrap().unwrap();
        assert_eq!(
            raw,
            format!(r#"[{{"text":"Hi","timestamp":"{}"}}]"#, entry.timestamp)
        );
    }

    #[test]
    fn test_malformed_list_starts_over() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(FEEDBACK_KEY, r#"{"text":"not a list"}"#).unwrap();
        let feedback = FeedbackStore::new(State::new(kv, ChangeBus::new()));

        feedback.append("First").unwrap();
        assert_eq!(feedback.entries().unwrap().len(), 1);
    }
}

//! Challenge history
//!
//! Bounded in-memory archive of finished challenges. Oldest entries are
//! evicted first; nothing is persisted.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How an archived challenge ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeOutcome {
    /// Requirement met before the deadline.
    Success,
    /// Deadline passed with the requirement unmet.
    Failed,
    /// Dropped while pending because the media became ungoverned.
    Cancelled,
}

impl ChallengeOutcome {
    /// Lowercase name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One archived challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Challenge id
    pub challenge_id: String,
    /// Policy id
    pub policy_id: String,
    /// Selection id
    pub selection_id: String,
    /// Target zone
    pub zone_id: String,
    /// Outcome at the time it was recorded
    pub outcome: ChallengeOutcome,
    /// Later flipped to success by recovery
    pub recovered: bool,
    /// Live required count at resolution
    pub required_count: usize,
    /// Participants in zone at resolution
    pub actual_count: usize,
    /// Milliseconds from start to resolution
    pub duration_ms: u64,
    /// Wall-clock time the entry was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Bounded challenge archive.
#[derive(Debug, Clone)]
pub struct ChallengeHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl ChallengeHistory {
    /// Creates an archive that keeps at most `limit` entries.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit.min(1024)),
            limit,
        }
    }

    /// Appends an entry, evicting the oldest when full.
    pub fn record(&mut self, entry: HistoryEntry) {
        if self.limit == 0 {
            return;
        }
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Marks an archived failure as recovered.
    ///
    /// Returns `false` if the entry was already evicted.
    pub fn mark_recovered(&mut self, challenge_id: &str) -> bool {
        self.entries
            .iter_mut()
            .rev()
            .find(|e| e.challenge_id == challenge_id)
            .map(|entry| entry.recovered = true)
            .is_some()
    }

    /// Looks up an entry by challenge id.
    #[must_use]
    pub fn get(&self, challenge_id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.challenge_id == challenge_id)
    }

    /// Most recently recorded entry.
    #[must_use]
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, outcome: ChallengeOutcome) -> HistoryEntry {
        HistoryEntry {
            challenge_id: id.to_string(),
            policy_id: "p".to_string(),
            selection_id: "s".to_string(),
            zone_id: "hot".to_string(),
            outcome,
            recovered: false,
            required_count: 2,
            actual_count: 1,
            duration_ms: 30_000,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_evicts_oldest() {
        let mut history = ChallengeHistory::new(2);
        history.record(entry("1", ChallengeOutcome::Success));
        history.record(entry("2", ChallengeOutcome::Failed));
        history.record(entry("3", ChallengeOutcome::Cancelled));

        let ids: Vec<_> = history.iter().map(|e| e.challenge_id.as_str()).collect();
        assert_eq!(ids, ["2", "3"]);
        assert_eq!(history.last().unwrap().outcome, ChallengeOutcome::Cancelled);
    }

    #[test]
    fn test_mark_recovered() {
        let mut history = ChallengeHistory::new(10);
        history.record(entry("1", ChallengeOutcome::Failed));
        assert!(history.mark_recovered("1"));
        assert!(history.get("1").unwrap().recovered);
        assert!(!history.mark_recovered("missing"));
    }

    #[test]
    fn test_zero_limit_keeps_nothing() {
        let mut history = ChallengeHistory::new(0);
        history.record(entry("1", ChallengeOutcome::Success));
        assert!(history.is_empty());
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let json = serde_json::to_value(entry("1", ChallengeOutcome::Cancelled)).unwrap();
        assert_eq!(json["outcome"], "cancelled");
        assert_eq!(ChallengeOutcome::Failed.as_str(), "failed");
    }
}

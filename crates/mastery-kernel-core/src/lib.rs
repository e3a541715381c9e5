//! Scoring, mastery aggregation and decay rules for study items.
//!
//! Counters live behind the [`ScoreStore`] trait. Everything else in this
//! crate is pure: [`mastery_percentage`] and friends aggregate counters,
//! [`ItemSetResolver`] maps level keys onto item identifiers, and
//! [`DecayEngine`] applies a [`DecayPolicy`] to a store snapshot.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

mod compact;
mod decay;
mod levels;
mod mastery;

pub use compact::{
    decode_prefixed_key, encode_prefixed_key, format_compact_record, parse_compact_record,
};
pub use decay::{
    decay_record, DecayEngine, DecayPolicy, DecayReport, ReminderNotifier, ReminderVariant,
};
pub use levels::{
    ActivityConfig, FixedSet, ItemCatalog, ItemSetResolver, KanjiEntry, LevelCategory,
    LevelDefinition, LevelDefinitions, ReviewLists, SectionDefinition, StaticCatalog, WordEntry,
};
pub use mastery::{
    level_mastery, level_progress, mastered_share, mastery_for_items, mastery_percentage,
    LevelProgress, USER_LIST_DATA_FILE,
};

/// Ceiling on the balance a single counter contributes to mastery.
pub const MASTERY_CAP: u64 = 10;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum MasteryError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("notifier error: {0}")]
    Notify(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    Recognition,
    Reading,
    Writing,
    Grammar,
}

impl ScoreType {
    pub const ALL: [Self; 4] = [Self::Recognition, Self::Reading, Self::Writing, Self::Grammar];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recognition => "recognition",
            Self::Reading => "reading",
            Self::Writing => "writing",
            Self::Grammar => "grammar",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "recognition" => Some(Self::Recognition),
            "reading" => Some(Self::Reading),
            "writing" => Some(Self::Writing),
            "grammar" => Some(Self::Grammar),
            _ => None,
        }
    }

    /// Name of the review list that collects missed items of this type.
    #[must_use]
    pub fn review_list_name(self) -> &'static str {
        match self {
            Self::Recognition => "Recognition_List",
            Self::Reading => "Reading_List",
            Self::Writing => "Writing_List",
            Self::Grammar => "Grammar_List",
        }
    }
}

impl Display for ScoreType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Identifies one counter: an opaque item identifier under one practice mode.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ScoreKey {
    pub item_id: String,
    pub score_type: ScoreType,
}

impl ScoreKey {
    #[must_use]
    pub fn new(item_id: impl Into<String>, score_type: ScoreType) -> Self {
        Self {
            item_id: item_id.into(),
            score_type,
        }
    }

    /// Validates that the key can be persisted.
    ///
    /// # Errors
    /// Returns [`MasteryError::Validation`] when the item identifier is blank.
    pub fn validate(&self) -> Result<(), MasteryError> {
        if self.item_id.trim().is_empty() {
            return Err(MasteryError::Validation(
                "item_id MUST be a non-empty string".to_string(),
            ));
        }
        Ok(())
    }
}

impl Display for ScoreKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.score_type, self.item_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct ScoreRecord {
    pub successes: u64,
    pub failures: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

impl Default for ScoreRecord {
    fn default() -> Self {
        Self::zero()
    }
}

impl ScoreRecord {
    /// The implicit record of a key that was never practiced.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            successes: 0,
            failures: 0,
            last_updated: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.successes.saturating_add(self.failures)
    }

    /// `successes - failures`, unclamped.
    #[must_use]
    pub fn balance(&self) -> i64 {
        let successes = i64::try_from(self.successes).unwrap_or(i64::MAX);
        let failures = i64::try_from(self.failures).unwrap_or(i64::MAX);
        successes.saturating_sub(failures)
    }

    /// Balance clamped to `[0, MASTERY_CAP]`.
    #[must_use]
    pub fn clamped_balance(&self) -> u64 {
        u64::try_from(self.balance()).map_or(0, |value| value.min(MASTERY_CAP))
    }

    #[must_use]
    pub fn is_mastered(&self) -> bool {
        self.clamped_balance() == MASTERY_CAP
    }

    #[must_use]
    pub fn with_attempt(&self, was_correct: bool, at: OffsetDateTime) -> Self {
        let mut next = *self;
        if was_correct {
            next.successes = next.successes.saturating_add(1);
        } else {
            next.failures = next.failures.saturating_add(1);
        }
        next.last_updated = truncate_to_millis(at);
        next
    }
}

/// Durable key to counters mapping.
///
/// Implementations linearize writes per key and never expose a partially
/// written record. Missing keys read as [`ScoreRecord::zero`].
pub trait ScoreStore {
    /// Counts one attempt stamped with `at` and returns the committed record.
    ///
    /// # Errors
    /// Returns [`MasteryError::Validation`] for blank keys and
    /// [`MasteryError::Store`] when the backing medium fails.
    fn record_attempt_at(
        &self,
        key: &ScoreKey,
        was_correct: bool,
        at: OffsetDateTime,
    ) -> Result<ScoreRecord, MasteryError>;

    /// Counts one attempt stamped with the current time.
    ///
    /// # Errors
    /// See [`ScoreStore::record_attempt_at`].
    fn record_attempt(&self, key: &ScoreKey, was_correct: bool) -> Result<ScoreRecord, MasteryError> {
        self.record_attempt_at(key, was_correct, now_utc())
    }

    /// # Errors
    /// Returns [`MasteryError::Store`] only for medium faults; an unknown key
    /// is not an error.
    fn get_score(&self, key: &ScoreKey) -> Result<ScoreRecord, MasteryError>;

    /// Batch read in input order.
    ///
    /// # Errors
    /// Returns [`MasteryError::Store`] when the backing medium fails.
    fn get_scores(
        &self,
        item_ids: &[String],
        score_type: ScoreType,
    ) -> Result<Vec<ScoreRecord>, MasteryError> {
        item_ids
            .iter()
            .map(|item_id| self.get_score(&ScoreKey::new(item_id.clone(), score_type)))
            .collect()
    }

    /// Point-in-time snapshot of stored records, optionally for one type.
    ///
    /// # Errors
    /// Returns [`MasteryError::Store`] when the backing medium fails.
    fn get_all_scores(
        &self,
        score_type: Option<ScoreType>,
    ) -> Result<BTreeMap<ScoreKey, ScoreRecord>, MasteryError>;

    /// Overwrites a record with its decayed value.
    ///
    /// # Errors
    /// Returns [`MasteryError::Store`] when the write is not committed.
    fn apply_decay(&self, key: &ScoreKey, record: &ScoreRecord) -> Result<(), MasteryError>;

    /// Journals a finished decay pass. Stores without a journal ignore it.
    ///
    /// # Errors
    /// Returns [`MasteryError::Store`] when the journal write fails.
    fn record_decay_run(&self, _report: &DecayReport) -> Result<(), MasteryError> {
        Ok(())
    }
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`MasteryError::Validation`] when parsing fails or an input
/// timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, MasteryError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| MasteryError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(MasteryError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`MasteryError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, MasteryError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            MasteryError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

/// Drops sub-millisecond precision, matching what the compact format keeps.
#[must_use]
pub fn truncate_to_millis(at: OffsetDateTime) -> OffsetDateTime {
    at.replace_nanosecond(u32::from(at.millisecond()) * 1_000_000)
        .unwrap_or(at)
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub(crate) fn deterministic_bucket(input: &str) -> f32 {
    // Stable FNV-1a hash to avoid platform-randomized hashers.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }

    let fraction = (hash as f64) / (u64::MAX as f64);
    fraction as f32
}


#[cfg(test)]
mod tests {
    use super::test_support::{must, must_utc, MemoryStore};
    use super::*;

    #[test]
    fn zero_record_is_epoch_dated() {
        let zero = ScoreRecord::zero();
        assert_eq!(zero.successes, 0);
        assert_eq!(zero.failures, 0);
        assert_eq!(zero.last_updated, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(zero, ScoreRecord::default());
    }

    #[test]
    fn clamped_balance_stays_within_cap() {
        let record = |successes, failures| ScoreRecord {
            successes,
            failures,
            last_updated: OffsetDateTime::UNIX_EPOCH,
        };

        assert_eq!(record(3, 1).clamped_balance(), 2);
        assert_eq!(record(1, 4).clamped_balance(), 0);
        assert_eq!(record(40, 2).clamped_balance(), MASTERY_CAP);
        assert_eq!(record(u64::MAX, 0).balance(), i64::MAX);
        assert!(record(12, 2).is_mastered());
        assert!(!record(11, 2).is_mastered());
    }

    #[test]
    fn with_attempt_touches_one_counter_and_timestamp() {
        let at = must_utc("2026-02-07T12:00:00Z");
        let after_hit = ScoreRecord::zero().with_attempt(true, at);
        let after_miss = after_hit.with_attempt(false, at);

        assert_eq!(after_hit.successes, 1);
        assert_eq!(after_hit.failures, 0);
        assert_eq!(after_miss.successes, 1);
        assert_eq!(after_miss.failures, 1);
        assert_eq!(after_miss.last_updated, at);
        assert_eq!(after_miss.attempts(), 2);
    }

    #[test]
    fn attempt_timestamps_keep_millisecond_precision() {
        let at = must_utc("2026-02-07T12:00:00.123456789Z");
        let record = ScoreRecord::zero().with_attempt(true, at);
        assert_eq!(record.last_updated, must_utc("2026-02-07T12:00:00.123Z"));
        assert_eq!(
            parse_compact_record(&format_compact_record(&record)),
            Some(record)
        );
    }

    #[test]
    fn blank_item_ids_are_rejected() {
        let store = MemoryStore::default();
        let result = store.record_attempt(&ScoreKey::new("  ", ScoreType::Reading), true);
        assert!(matches!(result, Err(MasteryError::Validation(_))));
    }

    #[test]
    fn attempt_counts_match_outcomes() {
        let store = MemoryStore::default();
        let key = ScoreKey::new("あ", ScoreType::Recognition);
        let outcomes = [true, false, true, true, false, true];

        for outcome in outcomes {
            let _ = must(store.record_attempt(&key, outcome));
        }

        let record = must(store.get_score(&key));
        assert_eq!(record.attempts(), 6);
        assert_eq!(record.successes, 4);
        assert_eq!(record.failures, 2);
    }

    #[test]
    fn score_types_keep_independent_counters() {
        let store = MemoryStore::default();
        let _ = must(store.record_attempt(&ScoreKey::new("水", ScoreType::Writing), true));

        let reading = must(store.get_score(&ScoreKey::new("水", ScoreType::Reading)));
        assert_eq!(reading, ScoreRecord::zero());
    }

    #[test]
    fn rfc3339_helpers_require_utc() {
        assert!(parse_rfc3339_utc("2026-02-07T12:00:00+02:00").is_err());
        let parsed = must_utc("2026-02-07T12:00:00Z");
        assert_eq!(must(format_rfc3339(parsed)), "2026-02-07T12:00:00Z");
    }

    #[test]
    fn score_record_json_uses_rfc3339() {
        let record = ScoreRecord {
            successes: 3,
            failures: 1,
            last_updated: must_utc("2026-02-07T12:00:00Z"),
        };
        let value = must(serde_json::to_value(record));
        assert_eq!(
            value,
            serde_json::json!({
                "successes": 3,
                "failures": 1,
                "last_updated": "2026-02-07T12:00:00Z"
            })
        );
    }
}

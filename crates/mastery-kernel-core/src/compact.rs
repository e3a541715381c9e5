//! Legacy key-value encoding: `"<successes>-<failures>[-<epoch_millis>]"`
//! under keys prefixed by practice mode (`reading_`, `writing_`, `grammar_`,
//! bare for recognition).

use time::OffsetDateTime;

use crate::{ScoreKey, ScoreRecord, ScoreType};

const NANOS_PER_MILLI: i128 = 1_000_000;

fn legacy_prefix(score_type: ScoreType) -> &'static str {
    match score_type {
        ScoreType::Recognition => "",
        ScoreType::Reading => "reading_",
        ScoreType::Writing => "writing_",
        ScoreType::Grammar => "grammar_",
    }
}

/// Splits a legacy stored key into its practice mode and item identifier.
#[must_use]
pub fn decode_prefixed_key(stored_key: &str) -> ScoreKey {
    for score_type in [ScoreType::Reading, ScoreType::Writing, ScoreType::Grammar] {
        if let Some(item_id) = stored_key.strip_prefix(legacy_prefix(score_type)) {
            return ScoreKey::new(item_id, score_type);
        }
    }
    ScoreKey::new(stored_key, ScoreType::Recognition)
}

#[must_use]
pub fn encode_prefixed_key(key: &ScoreKey) -> String {
    format!("{}{}", legacy_prefix(key.score_type), key.item_id)
}

/// Decodes a compact record. Returns `None` for anything malformed, including
/// counts above `i64::MAX`; callers substitute [`ScoreRecord::zero`].
#[must_use]
pub fn parse_compact_record(raw: &str) -> Option<ScoreRecord> {
    let mut parts = raw.trim().split('-');
    let successes = parse_count(parts.next()?)?;
    let failures = parse_count(parts.next()?)?;
    let last_updated = match parts.next() {
        Some(millis) => {
            let millis = millis.parse::<i64>().ok()?;
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * NANOS_PER_MILLI).ok()?
        }
        None => OffsetDateTime::UNIX_EPOCH,
    };

    if parts.next().is_some() {
        return None;
    }

    Some(ScoreRecord {
        successes,
        failures,
        last_updated,
    })
}

fn parse_count(raw: &str) -> Option<u64> {
    let count = raw.parse::<i64>().ok()?;
    u64::try_from(count).ok()
}

/// Encodes a record; sub-millisecond precision is dropped.
#[must_use]
pub fn format_compact_record(record: &ScoreRecord) -> String {
    let millis = record.last_updated.unix_timestamp_nanos() / NANOS_PER_MILLI;
    format!("{}-{}-{}", record.successes, record.failures, millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::must_utc;

    #[test]
    fn prefixed_keys_map_to_score_types() {
        assert_eq!(
            decode_prefixed_key("reading_水"),
            ScoreKey::new("水", ScoreType::Reading)
        );
        assert_eq!(
            decode_prefixed_key("grammar_は"),
            ScoreKey::new("は", ScoreType::Grammar)
        );
        assert_eq!(
            decode_prefixed_key("火"),
            ScoreKey::new("火", ScoreType::Recognition)
        );
        assert_eq!(
            encode_prefixed_key(&ScoreKey::new("木", ScoreType::Writing)),
            "writing_木"
        );
    }

    #[test]
    fn two_part_values_default_to_epoch() {
        let record = parse_compact_record("3-1");
        assert_eq!(
            record,
            Some(ScoreRecord {
                successes: 3,
                failures: 1,
                last_updated: OffsetDateTime::UNIX_EPOCH,
            })
        );
    }

    #[test]
    fn three_part_values_carry_millis() {
        let at = must_utc("2026-02-07T12:00:00Z");
        let record = ScoreRecord {
            successes: 7,
            failures: 2,
            last_updated: at,
        };

        let encoded = format_compact_record(&record);
        assert_eq!(encoded, "7-2-1770465600000");
        assert_eq!(parse_compact_record(&encoded), Some(record));
    }

    #[test]
    fn malformed_values_are_rejected() {
        for raw in ["", "abc", "3", "3-x", "-1-2", "3--1", "1-2-3-4", "1-2-soon"] {
            assert_eq!(parse_compact_record(raw), None, "accepted {raw:?}");
        }
    }

    #[test]
    fn counts_beyond_signed_range_are_rejected() {
        assert_eq!(parse_compact_record("18446744073709551615-0"), None);
        assert_eq!(parse_compact_record("0-9223372036854775808"), None);
        assert_eq!(
            parse_compact_record("9223372036854775807-0").map(|record| record.successes),
            Some(9_223_372_036_854_775_807)
        );
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    ItemSetResolver, LevelDefinitions, ScoreKey, ScoreRecord, ScoreStore, ScoreType, MASTERY_CAP,
};

/// Activity data file naming the learner's review list.
pub const USER_LIST_DATA_FILE: &str = "user_list";

/// Mastery of a set of records: summed clamped balance over the maximum
/// attainable balance, scaled to `[0, 100]`. An empty set is 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mastery_percentage<'r>(records: impl IntoIterator<Item = &'r ScoreRecord>) -> f64 {
    let (count, total) = records
        .into_iter()
        .fold((0_u64, 0_u64), |(count, total), record| {
            (count + 1, total.saturating_add(record.clamped_balance()))
        });

    if count == 0 {
        return 0.0;
    }

    let ceiling = count.saturating_mul(MASTERY_CAP);
    total.saturating_mul(100) as f64 / ceiling as f64
}

/// Mastery of `item_ids` under `score_type` given an already fetched snapshot.
/// Items absent from the snapshot count as zero records.
#[must_use]
pub fn mastery_for_items(
    item_ids: &[String],
    score_type: ScoreType,
    scores: &BTreeMap<ScoreKey, ScoreRecord>,
) -> f64 {
    let zero = ScoreRecord::zero();
    mastery_percentage(item_ids.iter().map(|item_id| {
        scores
            .get(&ScoreKey::new(item_id.clone(), score_type))
            .unwrap_or(&zero)
    }))
}

/// Share of records whose raw balance reached the cap, in `[0, 100]`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mastered_share<'r>(records: impl IntoIterator<Item = &'r ScoreRecord>) -> f64 {
    let (count, mastered) = records
        .into_iter()
        .fold((0_u64, 0_u64), |(count, mastered), record| {
            (count + 1, mastered + u64::from(record.is_mastered()))
        });

    if count == 0 {
        return 0.0;
    }
    (mastered * 100) as f64 / count as f64
}

/// Resolves `level_key` and computes its mastery against the store.
///
/// A store fault is logged and reported as 0 so progress views keep
/// rendering.
#[must_use]
pub fn level_mastery(
    store: &dyn ScoreStore,
    resolver: &ItemSetResolver<'_>,
    level_key: &str,
    score_type: ScoreType,
) -> f64 {
    let item_ids = resolver.resolve(level_key, score_type);
    if item_ids.is_empty() {
        return 0.0;
    }

    match store.get_scores(&item_ids, score_type) {
        Ok(records) => mastery_percentage(&records),
        Err(err) => {
            warn!(level_key, score_type = %score_type, error = %err, "level mastery read failed");
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelProgress {
    pub level_id: String,
    pub title: String,
    pub section: String,
    pub score_type: ScoreType,
    pub data_file: String,
    pub percentage: f64,
    pub sort_order: i32,
}

/// Progress rows for every enabled activity, ordered by global step.
///
/// Activities backed by [`USER_LIST_DATA_FILE`] report [`mastered_share`]
/// over every encountered record of their type.
#[must_use]
pub fn level_progress(
    definitions: &LevelDefinitions,
    resolver: &ItemSetResolver<'_>,
    scores: &BTreeMap<ScoreKey, ScoreRecord>,
) -> Vec<LevelProgress> {
    let mut rows = Vec::new();

    for (section, level) in definitions.ordered_levels() {
        for (score_type, activity) in &level.activities {
            if !activity.enabled {
                continue;
            }

            let percentage = if activity.data_file == USER_LIST_DATA_FILE {
                mastered_share(
                    scores
                        .iter()
                        .filter(|(key, _)| key.score_type == *score_type)
                        .map(|(_, record)| record),
                )
            } else {
                let item_ids = resolver.resolve(&activity.data_file, *score_type);
                mastery_for_items(&item_ids, *score_type, scores)
            };

            rows.push(LevelProgress {
                level_id: level.id.clone(),
                title: level.name.clone(),
                section: section.name.clone(),
                score_type: *score_type,
                data_file: activity.data_file.clone(),
                percentage,
                sort_order: level.sort_order,
            });
        }
    }

    rows
}

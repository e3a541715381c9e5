use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{MasteryError, ScoreType};

/// Level sets with a fixed, well-known key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FixedSet {
    Hiragana,
    Katakana,
    NativeChallenge,
    NoReading,
    NoMeaning,
    ReviewList,
}

const FIXED_LEVEL_KEYS: &[(&str, FixedSet)] = &[
    ("hiragana", FixedSet::Hiragana),
    ("katakana", FixedSet::Katakana),
    ("native_challenge", FixedSet::NativeChallenge),
    ("native challenge", FixedSet::NativeChallenge),
    ("no_reading", FixedSet::NoReading),
    ("no reading", FixedSet::NoReading),
    ("no_meaning", FixedSet::NoMeaning),
    ("no meaning", FixedSet::NoMeaning),
    ("user_custom_list", FixedSet::ReviewList),
];

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum LevelCategory {
    Fixed(FixedSet),
    /// School grade, `grade_<n>` or `grade<n>`.
    Grade(u8),
    /// JLPT level, `jlpt_n<n>` or `n<n>`.
    Jlpt(u8),
    /// Any key containing `wordlist`; keeps the caller's spelling.
    WordList(String),
    /// Fallback bucket: a free-form level tag looked up in the kanji catalog.
    Tagged(String),
}

impl LevelCategory {
    /// Classifies a level key. Never fails; unknown keys land in
    /// [`LevelCategory::Tagged`] and resolve to whatever the catalog knows.
    #[must_use]
    pub fn parse(level_key: &str) -> Self {
        let trimmed = level_key.trim();
        let lower = trimmed.to_lowercase();

        if let Some((_, fixed)) = FIXED_LEVEL_KEYS.iter().find(|(key, _)| *key == lower) {
            return Self::Fixed(*fixed);
        }

        if lower.contains("wordlist") {
            return Self::WordList(trimmed.to_string());
        }

        if let Some(grade) = numbered_suffix(&lower, &["grade_", "grade"]) {
            return Self::Grade(grade);
        }

        if let Some(level) = numbered_suffix(&lower, &["jlpt_n", "jlpt", "n"]) {
            if (1..=5).contains(&level) {
                return Self::Jlpt(level);
            }
        }

        Self::Tagged(trimmed.to_string())
    }
}

fn numbered_suffix(value: &str, prefixes: &[&str]) -> Option<u8> {
    prefixes.iter().find_map(|prefix| {
        let digits = value.strip_prefix(prefix)?;
        if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return None;
        }
        digits.parse::<u8>().ok()
    })
}

/// Content source consulted by [`ItemSetResolver`].
pub trait ItemCatalog {
    /// Ordered item identifiers for a category; empty when unknown.
    fn list_items(&self, category: &LevelCategory) -> Vec<String>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KanjiEntry {
    pub character: String,
    #[serde(default)]
    pub levels: Vec<String>,
    #[serde(default)]
    pub grade: Option<u8>,
    #[serde(default)]
    pub jlpt: Option<u8>,
    #[serde(default)]
    pub readings: Vec<String>,
    #[serde(default)]
    pub meanings: Vec<String>,
    /// Set for component/radical entries that are not standalone kanji.
    #[serde(default)]
    pub category: Option<String>,
}

impl KanjiEntry {
    fn is_standalone(&self) -> bool {
        self.category.as_deref().unwrap_or_default().is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WordEntry {
    pub text: String,
    #[serde(default)]
    pub jlpt: Option<u8>,
    #[serde(default)]
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActivityConfig {
    pub data_file: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LevelDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub global_step: i32,
    #[serde(default)]
    pub activities: BTreeMap<ScoreType, ActivityConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SectionDefinition {
    pub name: String,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub levels: Vec<LevelDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LevelDefinitions {
    #[serde(default)]
    pub sections: BTreeMap<String, SectionDefinition>,
}

impl LevelDefinitions {
    /// All levels with their section name, ordered by `global_step`.
    #[must_use]
    pub fn ordered_levels(&self) -> Vec<(&SectionDefinition, &LevelDefinition)> {
        let mut levels: Vec<_> = self
            .sections
            .values()
            .flat_map(|section| section.levels.iter().map(move |level| (section, level)))
            .collect();
        levels.sort_by_key(|(_, level)| level.global_step);
        levels
    }
}

/// In-memory catalog, typically decoded from a JSON content bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StaticCatalog {
    #[serde(default)]
    pub hiragana: Vec<String>,
    #[serde(default)]
    pub katakana: Vec<String>,
    #[serde(default)]
    pub kanji: Vec<KanjiEntry>,
    #[serde(default)]
    pub words: Vec<WordEntry>,
    #[serde(default)]
    pub word_lists: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub levels: LevelDefinitions,
}

impl StaticCatalog {
    /// Decodes a catalog from JSON.
    ///
    /// # Errors
    /// Returns [`MasteryError::Configuration`] when the payload does not match
    /// the catalog shape.
    pub fn from_json(value: &Value) -> Result<Self, MasteryError> {
        serde_json::from_value(value.clone()).map_err(|err| {
            MasteryError::Configuration(format!("invalid catalog JSON payload: {err}"))
        })
    }

    fn kanji_where(&self, predicate: impl Fn(&KanjiEntry) -> bool) -> Vec<String> {
        self.kanji
            .iter()
            .filter(|entry| predicate(entry))
            .map(|entry| entry.character.clone())
            .collect()
    }

    fn word_list(&self, name: &str) -> Vec<String> {
        if let Some(items) = self.word_lists.get(name) {
            return items.clone();
        }

        // jlpt_wordlist_n5 style keys fall back to the word table.
        let lower = name.to_lowercase();
        let level = lower
            .strip_prefix("jlpt_wordlist_n")
            .and_then(|digits| digits.parse::<u8>().ok());
        match level {
            Some(level) => self
                .words
                .iter()
                .filter(|word| word.jlpt == Some(level))
                .map(|word| word.text.clone())
                .collect(),
            None => Vec::new(),
        }
    }
}

impl ItemCatalog for StaticCatalog {
    fn list_items(&self, category: &LevelCategory) -> Vec<String> {
        match category {
            LevelCategory::Fixed(FixedSet::Hiragana) => self.hiragana.clone(),
            LevelCategory::Fixed(FixedSet::Katakana) => self.katakana.clone(),
            LevelCategory::Fixed(FixedSet::NativeChallenge) => {
                self.kanji_where(|entry| entry.is_standalone() && !entry.readings.is_empty())
            }
            LevelCategory::Fixed(FixedSet::NoReading) => self.kanji_where(|entry| {
                entry.is_standalone() && entry.readings.is_empty() && !entry.meanings.is_empty()
            }),
            LevelCategory::Fixed(FixedSet::NoMeaning) => {
                self.kanji_where(|entry| entry.is_standalone() && entry.meanings.is_empty())
            }
            LevelCategory::Fixed(FixedSet::ReviewList) => Vec::new(),
            LevelCategory::Grade(grade) => self.kanji_where(|entry| entry.grade == Some(*grade)),
            LevelCategory::Jlpt(level) => self.kanji_where(|entry| entry.jlpt == Some(*level)),
            LevelCategory::WordList(name) => self.word_list(name),
            LevelCategory::Tagged(tag) => self.kanji_where(|entry| {
                entry
                    .levels
                    .iter()
                    .any(|level| level.eq_ignore_ascii_case(tag))
            }),
        }
    }
}

/// Review list contents per practice mode, loaded ahead of resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewLists {
    pub lists: BTreeMap<ScoreType, Vec<String>>,
}

impl ReviewLists {
    #[must_use]
    pub fn items(&self, score_type: ScoreType) -> &[String] {
        self.lists
            .get(&score_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub struct ItemSetResolver<'a> {
    catalog: &'a dyn ItemCatalog,
    review_lists: Option<&'a ReviewLists>,
}

impl<'a> ItemSetResolver<'a> {
    #[must_use]
    pub fn new(catalog: &'a dyn ItemCatalog) -> Self {
        Self {
            catalog,
            review_lists: None,
        }
    }

    #[must_use]
    pub fn with_review_lists(mut self, review_lists: &'a ReviewLists) -> Self {
        self.review_lists = Some(review_lists);
        self
    }

    /// Ordered, de-duplicated item identifiers covered by `level_key`.
    #[must_use]
    pub fn resolve(&self, level_key: &str, score_type: ScoreType) -> Vec<String> {
        let category = LevelCategory::parse(level_key);
        let items = match &category {
            LevelCategory::Fixed(FixedSet::ReviewList) => self
                .review_lists
                .map(|lists| lists.items(score_type).to_vec())
                .unwrap_or_default(),
            other => self.catalog.list_items(other),
        };

        let mut seen = BTreeSet::new();
        items
            .into_iter()
            .filter(|item| !item.is_empty() && seen.insert(item.clone()))
            .collect()
    }
}

#![allow(clippy::missing_errors_doc)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use mastery_kernel_core::{
    decode_prefixed_key, encode_prefixed_key, format_compact_record, format_rfc3339, now_utc,
    parse_compact_record, parse_rfc3339_utc, DecayPolicy, DecayReport, MasteryError,
    ReminderVariant, ReviewLists, ScoreKey, ScoreRecord, ScoreStore, ScoreType,
};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use ulid::Ulid;

const SCORE_MIGRATION_VERSION: i64 = 1;
pub const BACKUP_CONTRACT_VERSION: &str = "backup.v1";
pub const DECAY_STATUS_CONTRACT_VERSION: &str = "decay_status.v1";

const SCHEMA_SCORES_V1: &str = r"
CREATE TABLE IF NOT EXISTS score_records (
  item_id TEXT NOT NULL CHECK (length(item_id) > 0),
  score_type TEXT NOT NULL CHECK (
    score_type IN ('recognition', 'reading', 'writing', 'grammar')
  ),
  successes INTEGER NOT NULL CHECK (successes >= 0),
  failures INTEGER NOT NULL CHECK (failures >= 0),
  last_updated TEXT NOT NULL,
  PRIMARY KEY (item_id, score_type)
);

CREATE INDEX IF NOT EXISTS idx_score_records_type
  ON score_records(score_type, item_id);

CREATE TABLE IF NOT EXISTS review_list_items (
  list_seq INTEGER PRIMARY KEY AUTOINCREMENT,
  score_type TEXT NOT NULL CHECK (
    score_type IN ('recognition', 'reading', 'writing', 'grammar')
  ),
  item_id TEXT NOT NULL CHECK (length(item_id) > 0),
  added_at TEXT NOT NULL,
  UNIQUE (score_type, item_id)
);

CREATE TABLE IF NOT EXISTS decay_policies (
  policy_version INTEGER PRIMARY KEY,
  policy_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decay_runs (
  run_seq INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL UNIQUE,
  ran_at TEXT NOT NULL,
  policy_version INTEGER NOT NULL,
  examined INTEGER NOT NULL CHECK (examined >= 0),
  decayed INTEGER NOT NULL CHECK (decayed >= 0),
  failed_writes INTEGER NOT NULL CHECK (failed_writes >= 0),
  notified INTEGER NOT NULL CHECK (notified IN (0, 1)),
  reminder TEXT
);
";

/// Review list bookkeeping performed alongside every attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewListSettings {
    /// A wrong answer puts the item on its type's review list.
    pub add_wrong_answers: bool,
    /// A correct answer that reaches the mastery cap takes it off again.
    pub remove_mastered: bool,
}

impl Default for ReviewListSettings {
    fn default() -> Self {
        Self {
            add_wrong_answers: true,
            remove_mastered: true,
        }
    }
}

/// SQLite-backed [`ScoreStore`].
///
/// All access goes through one connection guarded by a mutex; attempts run in
/// `IMMEDIATE` transactions so separate processes on the same file serialize
/// on the SQLite write lock as well.
pub struct SqliteScoreStore {
    conn: Mutex<Connection>,
    review_settings: ReviewListSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecayStatus {
    pub contract_version: String,
    pub active_policy_version: u32,
    pub tracked_records: u64,
    pub run_count: u64,
    pub last_run: Option<DecayReport>,
}

/// Portable dump of scores and review lists in the legacy compact encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Backup {
    pub contract_version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub exported_at: OffsetDateTime,
    pub scores: BTreeMap<String, String>,
    pub review_lists: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored_scores: usize,
    pub restored_review_items: usize,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegacyImportReport {
    pub imported: usize,
    pub skipped: Vec<String>,
}

impl SqliteScoreStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self {
            conn: Mutex::new(conn),
            review_settings: ReviewListSettings::default(),
        })
    }

    #[must_use]
    pub fn with_review_settings(mut self, settings: ReviewListSettings) -> Self {
        self.review_settings = settings;
        self
    }

    #[must_use]
    pub fn review_settings(&self) -> ReviewListSettings {
        self.review_settings
    }

    pub fn migrate(&self) -> Result<()> {
        {
            let conn = self.conn()?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

            ensure_supported_schema(&conn)?;

            conn.execute_batch(SCHEMA_SCORES_V1)
                .context("failed to apply score schema")?;

            let now = format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?;
            conn.execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![SCORE_MIGRATION_VERSION, now],
            )
            .context("failed to register score schema migration")?;
        }

        if self.get_policies()?.is_empty() {
            self.upsert_policy(&DecayPolicy::v1())?;
        }

        info!(schema_version = SCORE_MIGRATION_VERSION, "score store migrated");
        Ok(())
    }

    /// Flushes and closes the underlying connection.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| anyhow!("sqlite connection mutex poisoned"))?;
        conn.close()
            .map_err(|(_, err)| err)
            .context("failed to close sqlite database")
    }

    pub fn upsert_policy(&self, policy: &DecayPolicy) -> Result<()> {
        policy
            .validate()
            .map_err(|err| anyhow!("invalid decay policy configuration: {err}"))?;

        let payload = serde_json::to_string(policy).context("failed to serialize decay policy")?;
        let now = format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?;

        self.conn()?
            .execute(
                "INSERT INTO decay_policies(policy_version, policy_json, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(policy_version) DO UPDATE SET
                   policy_json = excluded.policy_json,
                   created_at = excluded.created_at",
                params![i64::from(policy.policy_version), payload, now],
            )
            .context("failed to upsert decay policy")?;

        Ok(())
    }

    pub fn get_policies(&self) -> Result<BTreeMap<u32, DecayPolicy>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT policy_version, policy_json FROM decay_policies ORDER BY policy_version ASC",
        )?;

        let mut rows = stmt.query([])?;
        let mut map = BTreeMap::new();

        while let Some(row) = rows.next()? {
            let version_i64: i64 = row.get(0)?;
            let version = u32::try_from(version_i64)
                .with_context(|| format!("invalid policy_version: {version_i64}"))?;
            let json: String = row.get(1)?;
            let value: Value =
                serde_json::from_str(&json).context("invalid stored decay policy JSON")?;
            let policy = DecayPolicy::from_json(&value)
                .map_err(|err| anyhow!("failed to parse decay policy {version}: {err}"))?;
            map.insert(version, policy);
        }

        Ok(map)
    }

    /// Highest stored policy version, or [`DecayPolicy::v1`] on an empty table.
    pub fn active_policy(&self) -> Result<DecayPolicy> {
        Ok(self
            .get_policies()?
            .into_values()
            .next_back()
            .unwrap_or_else(DecayPolicy::v1))
    }

    pub fn review_list_items(&self, score_type: ScoreType) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT item_id FROM review_list_items WHERE score_type = ?1 ORDER BY list_seq ASC",
        )?;
        let rows = stmt.query_map(params![score_type.as_str()], |row| row.get::<_, String>(0))?;
        collect_rows(rows)
    }

    /// Returns `true` when the item was not listed before.
    pub fn add_to_review_list(&self, key: &ScoreKey) -> Result<bool> {
        key.validate()?;
        let conn = self.conn()?;
        insert_review_item(&conn, key, now_utc())
    }

    /// Returns `true` when the item was listed.
    pub fn remove_from_review_list(&self, key: &ScoreKey) -> Result<bool> {
        let conn = self.conn()?;
        delete_review_item(&conn, key)
    }

    /// Snapshot of every review list, for resolving `user_custom_list`.
    pub fn review_lists(&self) -> Result<ReviewLists> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT score_type, item_id FROM review_list_items ORDER BY list_seq ASC")?;
        let rows = stmt.query_map([], |row| {
            let raw: String = row.get(0)?;
            let item_id: String = row.get(1)?;
            Ok((parse_score_type(&raw, 0)?, item_id))
        })?;

        let mut lists = ReviewLists::default();
        for (score_type, item_id) in collect_rows(rows)? {
            lists.lists.entry(score_type).or_default().push(item_id);
        }
        Ok(lists)
    }

    pub fn decay_status(&self) -> Result<DecayStatus> {
        let active_policy_version = self.active_policy()?.policy_version;
        let conn = self.conn()?;

        let run_count = count_rows(&conn, "SELECT COUNT(*) FROM decay_runs")?;
        let tracked_records = count_rows(&conn, "SELECT COUNT(*) FROM score_records")?;
        let last_run = conn
            .query_row(
                "SELECT run_id, ran_at, policy_version, examined, decayed, failed_writes,
                        notified, reminder
                 FROM decay_runs
                 ORDER BY run_seq DESC
                 LIMIT 1",
                [],
                parse_decay_run_row,
            )
            .optional()
            .context("failed to query latest decay run")?;

        Ok(DecayStatus {
            contract_version: DECAY_STATUS_CONTRACT_VERSION.to_string(),
            active_policy_version,
            tracked_records,
            run_count,
            last_run,
        })
    }

    pub fn export_backup(&self) -> Result<Backup> {
        let scores = self
            .read_all_scores(None)?
            .iter()
            .map(|(key, record)| (encode_prefixed_key(key), format_compact_record(record)))
            .collect();

        let review_lists = self
            .review_lists()?
            .lists
            .into_iter()
            .map(|(score_type, items)| (score_type.review_list_name().to_string(), items))
            .collect();

        Ok(Backup {
            contract_version: BACKUP_CONTRACT_VERSION.to_string(),
            exported_at: now_utc(),
            scores,
            review_lists,
        })
    }

    /// Merges the backup into the store in one transaction: scores are
    /// upserted and review list items added. Records absent from the backup
    /// are kept. Undecodable entries are skipped and reported.
    pub fn restore_backup(&self, backup: &Backup) -> Result<RestoreReport> {
        if backup.contract_version != BACKUP_CONTRACT_VERSION {
            return Err(anyhow!(
                "unsupported backup contract_version {}; expected {BACKUP_CONTRACT_VERSION}",
                backup.contract_version
            ));
        }

        let mut report = RestoreReport::default();
        let restored_at = now_utc();
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start restore transaction")?;

        for (stored_key, raw) in &backup.scores {
            let key = decode_prefixed_key(stored_key);
            match (key.validate(), parse_compact_record(raw)) {
                (Ok(()), Some(record)) => {
                    upsert_record(&tx, &key, &record)?;
                    report.restored_scores += 1;
                }
                _ => report.skipped.push(format!("score:{stored_key}")),
            }
        }

        for (list_name, items) in &backup.review_lists {
            let Some(score_type) = review_list_type(list_name) else {
                report.skipped.push(format!("list:{list_name}"));
                continue;
            };
            for item_id in items {
                let key = ScoreKey::new(item_id.clone(), score_type);
                if key.validate().is_err() {
                    report.skipped.push(format!("list:{list_name}:{item_id}"));
                    continue;
                }
                if insert_review_item(&tx, &key, restored_at)? {
                    report.restored_review_items += 1;
                }
            }
        }

        tx.commit().context("failed to commit restore transaction")?;

        info!(
            restored_scores = report.restored_scores,
            restored_review_items = report.restored_review_items,
            skipped = report.skipped.len(),
            "backup restored"
        );
        Ok(report)
    }

    /// Merges a legacy key-value dump (`reading_水` to `"3-1-<millis>"`) into
    /// the store. Entries that do not decode are skipped and reported.
    pub fn import_legacy_scores(
        &self,
        entries: &BTreeMap<String, String>,
    ) -> Result<LegacyImportReport> {
        let mut report = LegacyImportReport::default();
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start legacy import transaction")?;

        for (stored_key, raw) in entries {
            let key = decode_prefixed_key(stored_key);
            match (key.validate(), parse_compact_record(raw)) {
                (Ok(()), Some(record)) => {
                    upsert_record(&tx, &key, &record)?;
                    report.imported += 1;
                }
                _ => {
                    warn!(stored_key = %stored_key, "skipping undecodable legacy score entry");
                    report.skipped.push(stored_key.clone());
                }
            }
        }

        tx.commit()
            .context("failed to commit legacy import transaction")?;

        info!(
            imported = report.imported,
            skipped = report.skipped.len(),
            "legacy scores imported"
        );
        Ok(report)
    }

    fn write_attempt(
        &self,
        key: &ScoreKey,
        was_correct: bool,
        at: OffsetDateTime,
    ) -> Result<ScoreRecord> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start attempt transaction")?;

        let next = read_record(&tx, key)?.with_attempt(was_correct, at);
        upsert_record(&tx, key, &next)?;

        if !was_correct && self.review_settings.add_wrong_answers {
            insert_review_item(&tx, key, at)?;
        } else if was_correct && self.review_settings.remove_mastered && next.is_mastered() {
            delete_review_item(&tx, key)?;
        }

        tx.commit().context("failed to commit attempt transaction")?;

        debug!(
            key = %key,
            successes = next.successes,
            failures = next.failures,
            "attempt recorded"
        );
        Ok(next)
    }

    fn read_scores(&self, item_ids: &[String], score_type: ScoreType) -> Result<Vec<ScoreRecord>> {
        let conn = self.conn()?;
        item_ids
            .iter()
            .map(|item_id| read_record(&conn, &ScoreKey::new(item_id.clone(), score_type)))
            .collect()
    }

    fn read_all_scores(
        &self,
        score_type: Option<ScoreType>,
    ) -> Result<BTreeMap<ScoreKey, ScoreRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT item_id, score_type, successes, failures, last_updated
             FROM score_records
             WHERE (?1 IS NULL OR score_type = ?1)
             ORDER BY score_type ASC, item_id ASC",
        )?;
        let rows = stmt.query_map(params![score_type.map(ScoreType::as_str)], parse_score_row)?;

        Ok(collect_rows(rows)?.into_iter().collect())
    }

    fn write_decayed(&self, key: &ScoreKey, record: &ScoreRecord) -> Result<()> {
        let conn = self.conn()?;
        upsert_record(&conn, key, record)
    }

    fn write_decay_run(&self, report: &DecayReport) -> Result<()> {
        let ran_at = format_rfc3339(report.ran_at).map_err(|err| anyhow!(err.to_string()))?;
        self.conn()?
            .execute(
                "INSERT INTO decay_runs(
                    run_id, ran_at, policy_version, examined, decayed, failed_writes,
                    notified, reminder
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    report.run_id.to_string(),
                    ran_at,
                    i64::from(report.policy_version),
                    count_to_sql(report.examined)?,
                    count_to_sql(report.decayed)?,
                    count_to_sql(report.failed_writes)?,
                    bool_to_sql(report.notified),
                    report.reminder.map(ReminderVariant::as_str),
                ],
            )
            .context("failed to journal decay run")?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection mutex poisoned"))
    }
}

impl ScoreStore for SqliteScoreStore {
    fn record_attempt_at(
        &self,
        key: &ScoreKey,
        was_correct: bool,
        at: OffsetDateTime,
    ) -> Result<ScoreRecord, MasteryError> {
        key.validate()?;
        self.write_attempt(key, was_correct, at)
            .map_err(store_error)
    }

    fn get_score(&self, key: &ScoreKey) -> Result<ScoreRecord, MasteryError> {
        let conn = self.conn().map_err(store_error)?;
        read_record(&conn, key).map_err(store_error)
    }

    fn get_scores(
        &self,
        item_ids: &[String],
        score_type: ScoreType,
    ) -> Result<Vec<ScoreRecord>, MasteryError> {
        self.read_scores(item_ids, score_type).map_err(store_error)
    }

    fn get_all_scores(
        &self,
        score_type: Option<ScoreType>,
    ) -> Result<BTreeMap<ScoreKey, ScoreRecord>, MasteryError> {
        self.read_all_scores(score_type).map_err(store_error)
    }

    fn apply_decay(&self, key: &ScoreKey, record: &ScoreRecord) -> Result<(), MasteryError> {
        self.write_decayed(key, record).map_err(store_error)
    }

    fn record_decay_run(&self, report: &DecayReport) -> Result<(), MasteryError> {
        self.write_decay_run(report).map_err(store_error)
    }
}

fn store_error(err: anyhow::Error) -> MasteryError {
    MasteryError::Store(format!("{err:#}"))
}

fn read_record(conn: &Connection, key: &ScoreKey) -> Result<ScoreRecord> {
    let raw = conn
        .query_row(
            "SELECT successes, failures, last_updated
             FROM score_records
             WHERE item_id = ?1 AND score_type = ?2",
            params![key.item_id, key.score_type.as_str()],
            |row| {
                Ok((
                    row.get::<_, SqlValue>(0)?,
                    row.get::<_, SqlValue>(1)?,
                    row.get::<_, SqlValue>(2)?,
                ))
            },
        )
        .optional()
        .with_context(|| format!("failed to read score {key}"))?;

    Ok(match raw {
        Some((successes, failures, last_updated)) => {
            record_or_zero(key, &successes, &failures, &last_updated)
        }
        None => ScoreRecord::zero(),
    })
}

fn upsert_record(conn: &Connection, key: &ScoreKey, record: &ScoreRecord) -> Result<()> {
    let last_updated =
        format_rfc3339(record.last_updated).map_err(|err| anyhow!(err.to_string()))?;
    conn.execute(
        "INSERT INTO score_records(item_id, score_type, successes, failures, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(item_id, score_type) DO UPDATE SET
           successes = excluded.successes,
           failures = excluded.failures,
           last_updated = excluded.last_updated",
        params![
            key.item_id,
            key.score_type.as_str(),
            count_to_sql(record.successes)?,
            count_to_sql(record.failures)?,
            last_updated,
        ],
    )
    .with_context(|| format!("failed to write score {key}"))?;
    Ok(())
}

fn insert_review_item(conn: &Connection, key: &ScoreKey, at: OffsetDateTime) -> Result<bool> {
    let added_at = format_rfc3339(at).map_err(|err| anyhow!(err.to_string()))?;
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO review_list_items(score_type, item_id, added_at)
             VALUES (?1, ?2, ?3)",
            params![key.score_type.as_str(), key.item_id, added_at],
        )
        .with_context(|| format!("failed to add {key} to review list"))?;
    Ok(inserted > 0)
}

fn delete_review_item(conn: &Connection, key: &ScoreKey) -> Result<bool> {
    let deleted = conn
        .execute(
            "DELETE FROM review_list_items WHERE score_type = ?1 AND item_id = ?2",
            params![key.score_type.as_str(), key.item_id],
        )
        .with_context(|| format!("failed to remove {key} from review list"))?;
    Ok(deleted > 0)
}

/// Decodes raw column values; anything off-shape is replaced by the zero
/// record and logged.
fn record_or_zero(
    key: &ScoreKey,
    successes: &SqlValue,
    failures: &SqlValue,
    last_updated: &SqlValue,
) -> ScoreRecord {
    let decoded = match (successes, failures, last_updated) {
        (SqlValue::Integer(successes), SqlValue::Integer(failures), SqlValue::Text(raw)) => {
            match (
                u64::try_from(*successes),
                u64::try_from(*failures),
                parse_rfc3339_utc(raw),
            ) {
                (Ok(successes), Ok(failures), Ok(last_updated)) => Some(ScoreRecord {
                    successes,
                    failures,
                    last_updated,
                }),
                _ => None,
            }
        }
        _ => None,
    };

    decoded.unwrap_or_else(|| {
        warn!(key = %key, "malformed score row; substituting zero record");
        ScoreRecord::zero()
    })
}

fn parse_score_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(ScoreKey, ScoreRecord)> {
    let item_id: String = row.get(0)?;
    let score_type_raw: String = row.get(1)?;
    let key = ScoreKey::new(item_id, parse_score_type(&score_type_raw, 1)?);

    let record = record_or_zero(
        &key,
        &row.get::<_, SqlValue>(2)?,
        &row.get::<_, SqlValue>(3)?,
        &row.get::<_, SqlValue>(4)?,
    );
    Ok((key, record))
}

fn parse_decay_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DecayReport> {
    let run_id_raw: String = row.get(0)?;
    let ran_at_raw: String = row.get(1)?;
    let policy_version_i64: i64 = row.get(2)?;
    let reminder_raw: Option<String> = row.get(7)?;

    let run_id = Ulid::from_string(&run_id_raw).map_err(|_| {
        conversion_error(0, Type::Text, format!("invalid run_id ULID: {run_id_raw}"))
    })?;
    let ran_at = parse_rfc3339_utc(&ran_at_raw)
        .map_err(|err| conversion_error(1, Type::Text, err.to_string()))?;
    let policy_version = u32::try_from(policy_version_i64).map_err(|_| {
        conversion_error(
            2,
            Type::Integer,
            format!("invalid policy_version: {policy_version_i64}"),
        )
    })?;
    let reminder = reminder_raw
        .as_deref()
        .map(|raw| {
            ReminderVariant::parse(raw).ok_or_else(|| {
                conversion_error(7, Type::Text, format!("invalid reminder variant: {raw}"))
            })
        })
        .transpose()?;

    Ok(DecayReport {
        run_id,
        ran_at,
        policy_version,
        examined: count_from_sql(row, 3)?,
        decayed: count_from_sql(row, 4)?,
        failed_writes: count_from_sql(row, 5)?,
        notified: row.get::<_, i64>(6)? == 1,
        reminder,
    })
}

fn parse_score_type(raw: &str, column: usize) -> rusqlite::Result<ScoreType> {
    ScoreType::parse(raw)
        .ok_or_else(|| conversion_error(column, Type::Text, format!("invalid score_type: {raw}")))
}

fn review_list_type(list_name: &str) -> Option<ScoreType> {
    ScoreType::ALL
        .into_iter()
        .find(|score_type| score_type.review_list_name() == list_name)
}

fn conversion_error(column: usize, kind: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        kind,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message,
        )),
    )
}

fn count_from_sql(row: &rusqlite::Row<'_>, column: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(column)?;
    u64::try_from(value)
        .map_err(|_| conversion_error(column, Type::Integer, format!("invalid count: {value}")))
}

fn count_to_sql(value: u64) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("count {value} exceeds sqlite integer range"))
}

fn count_rows(conn: &Connection, sql: &str) -> Result<u64> {
    let count = conn
        .query_row(sql, [], |row| row.get::<_, i64>(0))
        .with_context(|| format!("failed to run count query: {sql}"))?;
    u64::try_from(count).with_context(|| format!("invalid row count: {count}"))
}

fn bool_to_sql(value: bool) -> i64 {
    i64::from(value)
}

fn ensure_supported_schema(conn: &Connection) -> Result<()> {
    let applied = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get::<_, Option<i64>>(0)
        })
        .context("failed to query applied schema version")?;

    match applied {
        Some(version) if version > SCORE_MIGRATION_VERSION => Err(anyhow!(
            "database schema version {version} is newer than supported version {SCORE_MIGRATION_VERSION}"
        )),
        _ => Ok(()),
    }
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

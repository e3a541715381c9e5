//! Command surface for the mastery scoring engine.
//!
//! Hosts embed it through:
//! - [`run_cli`] for full parsed CLI execution.
//! - [`run_mastery_with_db`] for direct [`Command`] execution against a DB path.
//! - [`run_mastery`] for execution against an existing [`SqliteScoreStore`].
//!
//! JSON goes to stdout; diagnostics go to stderr through `tracing`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use mastery_kernel_core::{
    level_mastery, level_progress, now_utc, parse_rfc3339_utc, DecayEngine, DecayPolicy,
    DecayReport, ItemSetResolver, LevelProgress, MasteryError, ReminderNotifier, ReminderVariant,
    ScoreKey, ScoreRecord, ScoreStore, ScoreType, StaticCatalog,
};
use mastery_kernel_store_sqlite::{Backup, DecayStatus, SqliteScoreStore};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the `tracing` filter directive.
pub const LOG_ENV: &str = "MASTERY_LOG";

#[derive(Debug, Parser)]
#[command(name = "mastery")]
#[command(about = "Mastery scoring and decay CLI")]
pub struct Cli {
    #[arg(long, default_value = "./mastery.sqlite3")]
    db: PathBuf,

    /// JSON item catalog used to resolve level keys.
    #[arg(long)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Records one practice attempt.
    Attempt(AttemptArgs),
    Score {
        #[command(subcommand)]
        command: Box<ScoreCommand>,
    },
    /// Mastery percentage of one level.
    Mastery(MasteryArgs),
    /// Progress of every enabled level activity in the catalog.
    Progress(JsonArgs),
    Decay {
        #[command(subcommand)]
        command: Box<DecayCommand>,
    },
    Policy {
        #[command(subcommand)]
        command: Box<PolicyCommand>,
    },
    Review {
        #[command(subcommand)]
        command: Box<ReviewCommand>,
    },
    Backup {
        #[command(subcommand)]
        command: Box<BackupCommand>,
    },
    Legacy {
        #[command(subcommand)]
        command: Box<LegacyCommand>,
    },
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("outcome").required(true).args(["correct", "wrong"])))]
pub struct AttemptArgs {
    #[arg(long)]
    item: String,
    #[arg(long = "type")]
    score_type: ScoreTypeArg,
    #[arg(long)]
    correct: bool,
    #[arg(long)]
    wrong: bool,
    #[arg(long)]
    at: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ScoreCommand {
    Show(ScoreShowArgs),
    List(ScoreListArgs),
}

#[derive(Debug, Args)]
pub struct ScoreShowArgs {
    #[arg(long)]
    item: String,
    #[arg(long = "type")]
    score_type: ScoreTypeArg,
}

#[derive(Debug, Args)]
pub struct ScoreListArgs {
    #[arg(long = "type")]
    score_type: Option<ScoreTypeArg>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct MasteryArgs {
    #[arg(long)]
    level: String,
    #[arg(long = "type")]
    score_type: ScoreTypeArg,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct JsonArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum DecayCommand {
    /// Runs one decay pass with the active policy.
    Run(DecayRunArgs),
    Status(JsonArgs),
}

#[derive(Debug, Args)]
pub struct DecayRunArgs {
    #[arg(long)]
    at: Option<String>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum PolicyCommand {
    Set(PolicySetArgs),
    Show,
}

#[derive(Debug, Args)]
pub struct PolicySetArgs {
    #[arg(long)]
    json_file: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum ReviewCommand {
    List(ReviewListArgs),
}

#[derive(Debug, Args)]
pub struct ReviewListArgs {
    #[arg(long = "type")]
    score_type: ScoreTypeArg,
}

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    Export(BackupExportArgs),
    Restore(InputArgs),
}

#[derive(Debug, Args)]
pub struct BackupExportArgs {
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum LegacyCommand {
    /// Imports a legacy `{"reading_水": "3-1-<millis>"}` key-value dump.
    Import(InputArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    #[arg(long)]
    input: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScoreTypeArg {
    Recognition,
    Reading,
    Writing,
    Grammar,
}

impl From<ScoreTypeArg> for ScoreType {
    fn from(value: ScoreTypeArg) -> Self {
        match value {
            ScoreTypeArg::Recognition => Self::Recognition,
            ScoreTypeArg::Reading => Self::Reading,
            ScoreTypeArg::Writing => Self::Writing,
            ScoreTypeArg::Grammar => Self::Grammar,
        }
    }
}

/// Flat JSON view of one counter.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoreView {
    #[serde(flatten)]
    pub key: ScoreKey,
    #[serde(flatten)]
    pub record: ScoreRecord,
    pub clamped_balance: u64,
}

impl ScoreView {
    #[must_use]
    pub fn new(key: ScoreKey, record: ScoreRecord) -> Self {
        Self {
            clamped_balance: record.clamped_balance(),
            key,
            record,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MasteryView {
    pub contract_version: String,
    pub level_key: String,
    pub score_type: ScoreType,
    pub item_count: usize,
    pub percentage: f64,
}

/// Delivers decay reminders to stderr.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl ReminderNotifier for LogNotifier {
    fn notify(&self, variant: ReminderVariant) -> Result<(), MasteryError> {
        info!(variant = variant.as_str(), "sending decay reminder");
        eprintln!("{}", reminder_message(variant));
        Ok(())
    }
}

#[must_use]
pub fn reminder_message(variant: ReminderVariant) -> &'static str {
    match variant {
        ReminderVariant::KeepFresh => "Don't let your progress dry out. Time for a quick review?",
        ReminderVariant::MissedYou => "Your kanji missed you! Come back to refresh your memory.",
        ReminderVariant::PracticeInvite => "Fresh reviews keep things sticky. Let's practice!",
        ReminderVariant::StretchBrain => "It's time to stretch your brain!",
    }
}

/// Installs the stderr `tracing` subscriber, filtered by [`LOG_ENV`]
/// (default `warn`). Safe to call more than once.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when the catalog cannot be loaded, the store cannot be
/// opened or migrated, or the command fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    run_mastery_with_db(&cli.db, cli.catalog.as_deref(), cli.command)
}

/// Executes a parsed command using the provided `SQLite` DB path.
///
/// # Errors
/// Returns an error when store open/migrate fails or the requested command fails.
pub fn run_mastery_with_db(
    db_path: &Path,
    catalog_path: Option<&Path>,
    command: Command,
) -> Result<()> {
    let catalog = load_catalog(catalog_path)?;
    let store = SqliteScoreStore::open(db_path)?;
    store.migrate()?;
    let result = run_mastery(command, &store, &catalog);
    store.close()?;
    result
}

/// Executes a parsed command against an existing store handle.
///
/// # Errors
/// Returns an error when validation, persistence, or output fails.
pub fn run_mastery(
    command: Command,
    store: &SqliteScoreStore,
    catalog: &StaticCatalog,
) -> Result<()> {
    match command {
        Command::Attempt(args) => {
            let key = ScoreKey::new(args.item, args.score_type.into());
            let at = parse_optional_utc(args.at.as_deref())?;
            let record = store.record_attempt_at(&key, args.correct, at)?;
            print_json(&ScoreView::new(key, record))
        }
        Command::Score { command } => run_score(*command, store),
        Command::Mastery(args) => {
            let score_type = ScoreType::from(args.score_type);
            let review_lists = store.review_lists()?;
            let resolver = ItemSetResolver::new(catalog).with_review_lists(&review_lists);
            let view = MasteryView {
                contract_version: "mastery.v1".to_string(),
                item_count: resolver.resolve(&args.level, score_type).len(),
                percentage: level_mastery(store, &resolver, &args.level, score_type),
                level_key: args.level,
                score_type,
            };

            if args.json {
                print_json(&view)
            } else {
                println!(
                    "level={} type={} items={} mastery={:.1}%",
                    view.level_key, view.score_type, view.item_count, view.percentage
                );
                Ok(())
            }
        }
        Command::Progress(args) => {
            if catalog.levels.sections.is_empty() {
                return Err(anyhow!(
                    "progress requires --catalog with level definitions"
                ));
            }

            let review_lists = store.review_lists()?;
            let resolver = ItemSetResolver::new(catalog).with_review_lists(&review_lists);
            let scores = store.get_all_scores(None)?;
            let rows = level_progress(&catalog.levels, &resolver, &scores);

            if args.json {
                print_json(&rows)
            } else {
                print_progress_table(&rows);
                Ok(())
            }
        }
        Command::Decay { command } => run_decay(*command, store),
        Command::Policy { command } => run_policy(*command, store),
        Command::Review { command } => match *command {
            ReviewCommand::List(args) => {
                print_json(&store.review_list_items(args.score_type.into())?)
            }
        },
        Command::Backup { command } => run_backup(*command, store),
        Command::Legacy { command } => match *command {
            LegacyCommand::Import(args) => {
                let entries: BTreeMap<String, String> = read_json_file(&args.input)?;
                print_json(&store.import_legacy_scores(&entries)?)
            }
        },
    }
}

fn run_score(command: ScoreCommand, store: &SqliteScoreStore) -> Result<()> {
    match command {
        ScoreCommand::Show(args) => {
            let key = ScoreKey::new(args.item, args.score_type.into());
            let record = store.get_score(&key)?;
            print_json(&ScoreView::new(key, record))
        }
        ScoreCommand::List(args) => {
            let views: Vec<ScoreView> = store
                .get_all_scores(args.score_type.map(ScoreType::from))?
                .into_iter()
                .map(|(key, record)| ScoreView::new(key, record))
                .collect();

            if args.json {
                print_json(&views)
            } else {
                print_score_table(&views);
                Ok(())
            }
        }
    }
}

fn run_decay(command: DecayCommand, store: &SqliteScoreStore) -> Result<()> {
    match command {
        DecayCommand::Run(args) => {
            let at = parse_optional_utc(args.at.as_deref())?;
            let notifier = LogNotifier;
            let engine = DecayEngine::new(store, &notifier, store.active_policy()?)?;
            let report = engine.run_decay_pass_at(at)?;

            if args.json {
                print_json(&report)
            } else {
                print_decay_report(&report);
                Ok(())
            }
        }
        DecayCommand::Status(args) => {
            let status = store.decay_status()?;
            if args.json {
                print_json(&status)
            } else {
                print_decay_status(&status);
                Ok(())
            }
        }
    }
}

fn run_policy(command: PolicyCommand, store: &SqliteScoreStore) -> Result<()> {
    match command {
        PolicyCommand::Set(args) => {
            let value: serde_json::Value = read_json_file(&args.json_file)?;
            let policy = DecayPolicy::from_json(&value)?;
            store.upsert_policy(&policy)?;
            print_json(&policy)
        }
        PolicyCommand::Show => print_json(&store.active_policy()?),
    }
}

fn run_backup(command: BackupCommand, store: &SqliteScoreStore) -> Result<()> {
    match command {
        BackupCommand::Export(args) => {
            let backup = store.export_backup()?;
            let body = serde_json::to_string_pretty(&backup)?;
            match args.output {
                Some(path) => fs::write(&path, body)
                    .with_context(|| format!("failed to write backup to {}", path.display())),
                None => {
                    println!("{body}");
                    Ok(())
                }
            }
        }
        BackupCommand::Restore(args) => {
            let backup: Backup = read_json_file(&args.input)?;
            print_json(&store.restore_backup(&backup)?)
        }
    }
}

fn load_catalog(path: Option<&Path>) -> Result<StaticCatalog> {
    let Some(path) = path else {
        return Ok(StaticCatalog::default());
    };
    let value: serde_json::Value = read_json_file(path)?;
    StaticCatalog::from_json(&value)
        .with_context(|| format!("invalid catalog {}", path.display()))
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn parse_optional_utc(raw: Option<&str>) -> Result<time::OffsetDateTime> {
    match raw {
        Some(value) => parse_rfc3339_utc(value).map_err(|err| anyhow!("invalid timestamp: {err}")),
        None => Ok(now_utc()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_score_table(views: &[ScoreView]) {
    println!(
        "{:<12} {:<16} {:>9} {:>8} {:>7} last_updated",
        "type", "item", "successes", "failures", "balance"
    );
    println!("{}", "-".repeat(80));
    for view in views {
        println!(
            "{:<12} {:<16} {:>9} {:>8} {:>7} {}",
            view.key.score_type,
            view.key.item_id,
            view.record.successes,
            view.record.failures,
            view.clamped_balance,
            view.record.last_updated
        );
    }
}

fn print_progress_table(rows: &[LevelProgress]) {
    println!(
        "{:<16} {:<24} {:<12} {:<20} {:>8}",
        "section", "level", "type", "data_file", "mastery"
    );
    println!("{}", "-".repeat(84));
    for row in rows {
        println!(
            "{:<16} {:<24} {:<12} {:<20} {:>7.1}%",
            row.section, row.title, row.score_type, row.data_file, row.percentage
        );
    }
}

fn print_decay_report(report: &DecayReport) {
    println!(
        "run_id={} ran_at={} policy={} examined={} decayed={} failed_writes={} notified={}",
        report.run_id,
        report.ran_at,
        report.policy_version,
        report.examined,
        report.decayed,
        report.failed_writes,
        if report.notified { "yes" } else { "no" }
    );
}

fn print_decay_status(status: &DecayStatus) {
    println!(
        "contract={} policy={} tracked_records={} runs={}",
        status.contract_version,
        status.active_policy_version,
        status.tracked_records,
        status.run_count
    );
    match &status.last_run {
        Some(report) => print_decay_report(report),
        None => println!("last_run=n/a"),
    }
}

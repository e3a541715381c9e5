use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::{
    deterministic_bucket, now_utc, truncate_to_millis, MasteryError, ScoreRecord, ScoreStore,
};

/// Forgetting rule applied by [`DecayEngine`].
///
/// A record idle for `k` whole thresholds loses
/// `min(k * decay_percent_per_period, max_decay_percent)` percent of its
/// successes, rounded down. Failures are never touched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecayPolicy {
    pub policy_version: u32,
    pub inactivity_threshold_days: u32,
    pub decay_percent_per_period: u32,
    pub max_decay_percent: u32,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self::v1()
    }
}

impl DecayPolicy {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            policy_version: 1,
            inactivity_threshold_days: 7,
            decay_percent_per_period: 10,
            max_decay_percent: 50,
        }
    }

    /// # Errors
    /// Returns [`MasteryError::Configuration`] when a bound is violated.
    pub fn validate(&self) -> Result<(), MasteryError> {
        if self.policy_version == 0 {
            return Err(MasteryError::Configuration(
                "policy_version MUST be >= 1".to_string(),
            ));
        }

        if self.inactivity_threshold_days == 0 {
            return Err(MasteryError::Configuration(
                "inactivity_threshold_days MUST be >= 1".to_string(),
            ));
        }

        for (name, value) in [
            ("decay_percent_per_period", self.decay_percent_per_period),
            ("max_decay_percent", self.max_decay_percent),
        ] {
            if !(1..=100).contains(&value) {
                return Err(MasteryError::Configuration(format!(
                    "{name} MUST be in [1, 100]"
                )));
            }
        }

        if self.decay_percent_per_period > self.max_decay_percent {
            return Err(MasteryError::Configuration(
                "decay_percent_per_period MUST be <= max_decay_percent".to_string(),
            ));
        }

        Ok(())
    }

    /// Decodes and validates a policy payload.
    ///
    /// # Errors
    /// Returns [`MasteryError::Configuration`] for malformed or out-of-bounds
    /// payloads.
    pub fn from_json(value: &Value) -> Result<Self, MasteryError> {
        let policy: Self = serde_json::from_value(value.clone()).map_err(|err| {
            MasteryError::Configuration(format!("invalid decay policy JSON payload: {err}"))
        })?;
        policy.validate()?;
        Ok(policy)
    }

    #[must_use]
    pub fn inactivity_threshold(&self) -> Duration {
        Duration::days(i64::from(self.inactivity_threshold_days))
    }

    fn percent_for_periods(&self, periods: u64) -> u64 {
        periods
            .saturating_mul(u64::from(self.decay_percent_per_period))
            .min(u64::from(self.max_decay_percent))
    }
}

/// Decayed value of `record` at `now`, or `None` when it is not yet due or has
/// nothing to lose.
#[must_use]
pub fn decay_record(
    record: &ScoreRecord,
    policy: &DecayPolicy,
    now: OffsetDateTime,
) -> Option<ScoreRecord> {
    if record.successes == 0 || now <= record.last_updated {
        return None;
    }

    let threshold = policy.inactivity_threshold().whole_seconds();
    if threshold <= 0 {
        return None;
    }

    let idle = (now - record.last_updated).whole_seconds();
    let periods = u64::try_from(idle / threshold).unwrap_or(0);
    if periods == 0 {
        return None;
    }

    let percent = policy.percent_for_periods(periods);
    let kept = u128::from(record.successes) * u128::from(100 - percent) / 100;

    Some(ScoreRecord {
        successes: u64::try_from(kept).unwrap_or(record.successes),
        failures: record.failures,
        last_updated: truncate_to_millis(now),
    })
}

/// Reminder message selected for a decay pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReminderVariant {
    KeepFresh,
    MissedYou,
    PracticeInvite,
    StretchBrain,
}

impl ReminderVariant {
    pub const ALL: [Self; 4] = [
        Self::KeepFresh,
        Self::MissedYou,
        Self::PracticeInvite,
        Self::StretchBrain,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeepFresh => "keep_fresh",
            Self::MissedYou => "missed_you",
            Self::PracticeInvite => "practice_invite",
            Self::StretchBrain => "stretch_brain",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|variant| variant.as_str() == value)
    }

    /// Stable choice for a run timestamp, so replays pick the same message.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn for_run(ran_at: OffsetDateTime) -> Self {
        let bucket = deterministic_bucket(&ran_at.unix_timestamp().to_string());
        let index = ((bucket * Self::ALL.len() as f32) as usize).min(Self::ALL.len() - 1);
        Self::ALL[index]
    }
}

/// Receives at most one reminder per decay pass.
pub trait ReminderNotifier {
    /// # Errors
    /// Returns [`MasteryError::Notify`] when delivery fails. The engine logs
    /// and drops the error.
    fn notify(&self, variant: ReminderVariant) -> Result<(), MasteryError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecayReport {
    pub run_id: Ulid,
    #[serde(with = "time::serde::rfc3339")]
    pub ran_at: OffsetDateTime,
    pub policy_version: u32,
    pub examined: u64,
    pub decayed: u64,
    pub failed_writes: u64,
    pub notified: bool,
    pub reminder: Option<ReminderVariant>,
}

impl DecayReport {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.decayed > 0
    }
}

/// One decay pass over a store snapshot. Holds no state between passes; the
/// caller's scheduler decides when to run it.
pub struct DecayEngine<'a> {
    store: &'a dyn ScoreStore,
    notifier: &'a dyn ReminderNotifier,
    policy: DecayPolicy,
}

impl<'a> DecayEngine<'a> {
    /// # Errors
    /// Returns [`MasteryError::Configuration`] for an invalid policy.
    pub fn new(
        store: &'a dyn ScoreStore,
        notifier: &'a dyn ReminderNotifier,
        policy: DecayPolicy,
    ) -> Result<Self, MasteryError> {
        policy.validate()?;
        Ok(Self {
            store,
            notifier,
            policy,
        })
    }

    #[must_use]
    pub fn policy(&self) -> &DecayPolicy {
        &self.policy
    }

    /// Scheduler entry point. `true` when at least one record decayed.
    #[must_use]
    pub fn run_decay_pass(&self) -> bool {
        match self.run_decay_pass_at(now_utc()) {
            Ok(report) => report.changed(),
            Err(err) => {
                warn!(error = %err, "decay pass aborted");
                false
            }
        }
    }

    /// Runs a pass as of `now`.
    ///
    /// Per-key write failures leave that record for the next pass and are
    /// counted in [`DecayReport::failed_writes`].
    ///
    /// # Errors
    /// Returns [`MasteryError::Store`] when the snapshot cannot be read.
    pub fn run_decay_pass_at(&self, now: OffsetDateTime) -> Result<DecayReport, MasteryError> {
        let snapshot = self.store.get_all_scores(None)?;

        let mut report = DecayReport {
            run_id: Ulid::new(),
            ran_at: now,
            policy_version: self.policy.policy_version,
            examined: 0,
            decayed: 0,
            failed_writes: 0,
            notified: false,
            reminder: None,
        };

        for (key, record) in &snapshot {
            report.examined += 1;
            let Some(decayed) = decay_record(record, &self.policy, now) else {
                continue;
            };

            match self.store.apply_decay(key, &decayed) {
                Ok(()) => {
                    report.decayed += 1;
                    debug!(
                        key = %key,
                        successes_before = record.successes,
                        successes_after = decayed.successes,
                        "record decayed"
                    );
                }
                Err(err) => {
                    report.failed_writes += 1;
                    warn!(key = %key, error = %err, "decay write failed; record left for next pass");
                }
            }
        }

        if report.changed() {
            let variant = ReminderVariant::for_run(now);
            report.reminder = Some(variant);
            match self.notifier.notify(variant) {
                Ok(()) => report.notified = true,
                Err(err) => warn!(error = %err, "reminder notification failed"),
            }
        }

        if let Err(err) = self.store.record_decay_run(&report) {
            warn!(run_id = %report.run_id, error = %err, "decay run journal write failed");
        }

        info!(
            run_id = %report.run_id,
            policy_version = report.policy_version,
            examined = report.examined,
            decayed = report.decayed,
            failed_writes = report.failed_writes,
            notified = report.notified,
            "decay pass finished"
        );

        Ok(report)
    }
}

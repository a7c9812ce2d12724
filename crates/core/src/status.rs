//! The points ledger shared by both parties.
//!
//! Points are signed: positive means "us" lead, negative means "you" lead.
//! The streak counts consecutive awards to the side that leads. It is zero
//! when nobody leads or when the last award left the other side ahead, and
//! never carries the trailing side's sign.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Us,
    You,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Us, Side::You];

    pub fn sign(self) -> i64 {
        match self {
            Side::Us => 1,
            Side::You => -1,
        }
    }

    pub fn from_sign(value: i64) -> Option<Self> {
        match value.signum() {
            1 => Some(Side::Us),
            -1 => Some(Side::You),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Side::Us => Side::You,
            Side::You => Side::Us,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::Us => 0,
            Side::You => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Us => "us",
            Side::You => "you",
        }
    }

    pub fn subject(self) -> &'static str {
        match self {
            Side::Us => "we",
            Side::You => "you",
        }
    }

    pub fn possessive(self) -> &'static str {
        match self {
            Side::Us => "our",
            Side::You => "your",
        }
    }
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("inconsistent status record: points {points} with streak {streak}")]
    Inconsistent { points: i64, streak: i64 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("status store io error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("status record malformed: {context}")]
    Malformed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Loads and saves the ledger as a whole record.
pub trait StatusStore {
    fn load(&self) -> Result<StatusRecord, StoreError>;
    fn save(&self, record: &StatusRecord) -> Result<(), StoreError>;
}

/// The persisted fields of the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusRecord {
    pub points: i64,
    #[serde(default)]
    pub streak: i64,
    pub last_checkin: NaiveDate,
    pub last_mas: NaiveDate,
    pub perm_until: NaiveDateTime,
    pub ask_blocked_until: NaiveDateTime,
}

impl StatusRecord {
    /// No points, no permission, nothing blocked.
    pub fn fresh(now: NaiveDateTime) -> Self {
        let past = now - Duration::seconds(1);
        Self {
            points: 0,
            streak: 0,
            last_checkin: now.date(),
            last_mas: now.date(),
            perm_until: past,
            ask_blocked_until: past,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimPolicy {
    #[serde(default = "default_one")]
    pub forgive_points: i64,
    #[serde(default = "default_one")]
    pub claim_cost: i64,
    #[serde(default = "default_one")]
    pub unauthorized_penalty: i64,
    #[serde(default = "default_sixty")]
    pub unauthorized_block_minutes: i64,
    #[serde(default = "default_invalidate_hours")]
    pub invalidate_hours: i64,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        Self {
            forgive_points: 1,
            claim_cost: 1,
            unauthorized_penalty: 1,
            unauthorized_block_minutes: 60,
            invalidate_hours: 2,
        }
    }
}

/// Names of the pickers used for each ledger position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoodPickers {
    pub plus: String,
    pub minus: String,
    pub standard: String,
}

impl Default for MoodPickers {
    fn default() -> Self {
        Self {
            plus: "plus".to_string(),
            minus: "minus".to_string(),
            standard: "standard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusParams {
    #[serde(default = "default_sixty")]
    pub permission_minutes: i64,
    #[serde(default = "default_break_minutes")]
    pub break_minutes: i64,
    #[serde(default = "default_one")]
    pub decay_per_day: i64,
    #[serde(default = "default_catch_up")]
    pub catch_up_factor: i64,
    #[serde(default)]
    pub claim: ClaimPolicy,
    #[serde(default)]
    pub mood_pickers: MoodPickers,
}

impl Default for StatusParams {
    fn default() -> Self {
        Self {
            permission_minutes: 60,
            break_minutes: default_break_minutes(),
            decay_per_day: 1,
            catch_up_factor: default_catch_up(),
            claim: ClaimPolicy::default(),
            mood_pickers: MoodPickers::default(),
        }
    }
}

fn default_one() -> i64 {
    1
}

fn default_sixty() -> i64 {
    60
}

fn default_break_minutes() -> i64 {
    30
}

fn default_catch_up() -> i64 {
    2
}

fn default_invalidate_hours() -> i64 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimKind {
    Undecided,
    Forgiven,
    PermissionSpent,
    Unauthorized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub kind: ClaimKind,
    pub leader: Option<Side>,
    pub delta: i64,
    pub points: i64,
}

impl ClaimOutcome {
    pub fn message(&self) -> String {
        let Some(leader) = self.leader else {
            return "Undecided position, you should play".to_string();
        };
        let amount = self.delta.abs();
        let lead = leader.possessive();
        match self.kind {
            ClaimKind::Undecided => "Undecided position, you should play".to_string(),
            ClaimKind::Forgiven => capitalize(&format!(
                "{} removed from {lead} lead",
                plural_points(amount)
            )),
            ClaimKind::PermissionSpent => format!(
                "Permission held, {} removed from {lead} lead",
                plural_points(amount)
            ),
            ClaimKind::Unauthorized => format!(
                "Permission not given, {} added to {lead} lead",
                plural_points(amount)
            ),
        }
    }
}

fn plural_points(amount: i64) -> String {
    if amount == 1 {
        "one point".to_string()
    } else {
        format!("{amount} points")
    }
}

#[derive(Debug, Clone)]
pub struct Status {
    record: StatusRecord,
    params: StatusParams,
}

impl Status {
    pub fn new(params: StatusParams, now: NaiveDateTime) -> Self {
        Self {
            record: StatusRecord::fresh(now),
            params,
        }
    }

    pub fn from_record(record: StatusRecord, params: StatusParams) -> Result<Self, StatusError> {
        let consistent = if record.points == 0 {
            record.streak == 0
        } else {
            record.streak == 0 || record.streak.signum() == record.points.signum()
        };
        if !consistent {
            return Err(StatusError::Inconsistent {
                points: record.points,
                streak: record.streak,
            });
        }
        Ok(Self { record, params })
    }

    pub fn record(&self) -> &StatusRecord {
        &self.record
    }

    pub fn params(&self) -> &StatusParams {
        &self.params
    }

    pub fn points(&self) -> i64 {
        self.record.points
    }

    pub fn streak(&self) -> i64 {
        self.record.streak
    }

    pub fn leader(&self) -> Option<Side> {
        Side::from_sign(self.record.points)
    }

    pub fn perm_until(&self) -> NaiveDateTime {
        self.record.perm_until
    }

    pub fn ask_blocked_until(&self) -> NaiveDateTime {
        self.record.ask_blocked_until
    }

    pub fn last_checkin(&self) -> NaiveDate {
        self.record.last_checkin
    }

    pub fn last_mas(&self) -> NaiveDate {
        self.record.last_mas
    }

    /// Credits points for days without a check-in. A deficit for "us" is
    /// worked off at the catch-up rate but never pushed past zero.
    pub fn apply_daily_decay(&mut self, today: NaiveDate) -> Option<String> {
        let days = (today - self.record.last_checkin).num_days() - 1;
        let mut message = None;
        if days > 0 {
            let before = self.record.points;
            let gain = self.params.decay_per_day.saturating_mul(days);
            if before < 0 {
                let catch_up = gain.saturating_mul(self.params.catch_up_factor);
                self.set_points(before.saturating_add(catch_up).min(0));
            } else {
                self.update_points(gain);
            }
            let delta = self.record.points - before;
            if delta != 0 {
                info!(days, delta, points = self.record.points, "applied daily decay");
                message = Some(format!("Added {delta} points for missing days"));
            }
        }
        self.record.last_checkin = today;
        message
    }

    /// Relative update clamped at zero.
    pub fn update_points(&mut self, delta: i64) -> i64 {
        self.record.points = self.record.points.saturating_add(delta).max(0);
        self.couple_streak();
        self.record.points
    }

    /// Direct signed assignment.
    pub fn set_points(&mut self, value: i64) {
        self.record.points = value;
        self.couple_streak();
    }

    /// Awards `amount` to `side`; a side extending its run also gets the
    /// triangular bonus of its current streak. Returns the total awarded.
    pub fn award_with_streak(&mut self, side: Side, amount: i64) -> i64 {
        let sign = side.sign();
        let bonus = if self.record.streak * sign > 0 {
            let run = self.record.streak.abs();
            self.record.streak += sign;
            run * (run + 1) / 2
        } else {
            self.record.streak = sign;
            0
        };
        let total = amount.max(0).saturating_add(bonus);
        self.record.points = self.record.points.saturating_add(sign * total);
        if self.record.points.signum() != sign {
            // Won the round but still behind: no run to extend.
            self.record.streak = 0;
        }
        info!(
            side = side.label(),
            amount,
            bonus,
            points = self.record.points,
            streak = self.record.streak,
            "awarded points"
        );
        total
    }

    pub fn give_permission(&mut self, granted: bool, reduced_minutes: i64, now: NaiveDateTime) {
        if !granted {
            return;
        }
        let window = self.params.permission_minutes;
        let minutes = window - reduced_minutes.clamp(0, window);
        self.record.perm_until = now + Duration::minutes(minutes);
        info!(until = %self.record.perm_until, "permission granted");
    }

    pub fn block_until(&mut self, extra_minutes: Option<i64>, now: NaiveDateTime) {
        let minutes = extra_minutes.unwrap_or(self.params.break_minutes);
        self.record.ask_blocked_until = now + Duration::minutes(minutes);
        info!(until = %self.record.ask_blocked_until, "permission requests blocked");
    }

    pub fn can_ask_permission(&self, now: NaiveDateTime) -> bool {
        self.record.points > 0 && now > self.record.ask_blocked_until
    }

    pub fn has_permission(&self, now: NaiveDateTime) -> bool {
        self.record.perm_until >= now
    }

    pub fn resolve_claim(
        &mut self,
        claimant: Side,
        now: NaiveDateTime,
        today: NaiveDate,
    ) -> ClaimOutcome {
        let before = self.record.points;
        let Some(leader) = self.leader() else {
            return ClaimOutcome {
                kind: ClaimKind::Undecided,
                leader: None,
                delta: 0,
                points: before,
            };
        };
        let policy = self.params.claim.clone();
        let kind = if leader != claimant {
            self.shift_toward_zero(policy.forgive_points);
            self.record.last_mas = today;
            ClaimKind::Forgiven
        } else if self.has_permission(now) {
            self.shift_toward_zero(policy.claim_cost);
            self.record.perm_until = now - Duration::hours(policy.invalidate_hours);
            self.record.last_mas = today;
            ClaimKind::PermissionSpent
        } else {
            self.set_points(before.saturating_add(leader.sign() * policy.unauthorized_penalty));
            self.record.ask_blocked_until =
                now + Duration::minutes(policy.unauthorized_block_minutes);
            ClaimKind::Unauthorized
        };
        let outcome = ClaimOutcome {
            kind,
            leader: Some(leader),
            delta: self.record.points - before,
            points: self.record.points,
        };
        info!(
            claimant = claimant.label(),
            kind = ?outcome.kind,
            delta = outcome.delta,
            points = outcome.points,
            "resolved claim"
        );
        outcome
    }

    pub fn mood_picker_name(&self) -> &str {
        let names = &self.params.mood_pickers;
        match self.leader() {
            Some(Side::Us) => &names.plus,
            Some(Side::You) => &names.minus,
            None => &names.standard,
        }
    }

    pub fn position_line(&self) -> String {
        match self.leader() {
            Some(leader) => format!(
                "{} lead by {} (streak {})",
                capitalize(leader.label()),
                self.record.points.abs(),
                self.record.streak.abs()
            ),
            None => "Undecided".to_string(),
        }
    }

    pub fn describe(&self, now: NaiveDateTime) -> Vec<String> {
        let mut lines = vec![self.position_line()];
        if self.has_permission(now) {
            lines.push(format!(
                "Permission until {}",
                self.record.perm_until.format("%H:%M")
            ));
        }
        if now <= self.record.ask_blocked_until {
            lines.push(format!(
                "Asking blocked until {}",
                self.record.ask_blocked_until.format("%H:%M")
            ));
        }
        lines.push(format!("Last claim {}", self.record.last_mas));
        lines
    }

    fn shift_toward_zero(&mut self, amount: i64) {
        if self.record.points > 0 {
            self.update_points(-amount);
        } else {
            self.set_points(self.record.points.saturating_add(amount).min(0));
        }
    }

    fn couple_streak(&mut self) {
        let sign = self.record.points.signum();
        if sign == 0 || self.record.streak.signum() == -sign {
            self.record.streak = 0;
        }
    }
}

pub(crate) fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

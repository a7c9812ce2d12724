//! Permission negotiation.
//!
//! "You" draw a fixed number of items, then "us" draw up to an allocation
//! sized so that the chance of "you" still holding the higher maximum stays
//! under a configured bound. Our draws are paced: drawing outside the window
//! computed after the previous draw costs extra mandatory draws.

use crate::{Collection, Picker, RngState, Side, Status, ValueExpr};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Upper limit for any allocation search.
pub const MAX_ALLOCATION: u32 = 1 << 20;
const MAX_SEARCH_STEPS: u32 = 32;
/// Longest pacing offset. Item values are unbounded, the clock is not.
const MAX_PACING_SECONDS: f64 = 24.0 * 60.0 * 60.0;

#[derive(Debug, Error, PartialEq)]
pub enum NegotiationError {
    #[error("{} value distribution is empty", .0.possessive())]
    EmptyDistribution(Side),
    #[error("probability bound {0} must lie strictly between 0 and 1")]
    InvalidBound(f64),
    #[error("your draw count must be positive")]
    NoDraws,
    #[error("no allocation within the draw limit keeps the bound {0}")]
    Unreachable(f64),
    #[error("negotiation is not {0}")]
    WrongPhase(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PacingConfig {
    #[serde(default = "default_seconds_per_point")]
    pub seconds_per_point: f64,
    #[serde(default = "default_early_margin")]
    pub early_margin: f64,
    #[serde(default = "default_late_margin")]
    pub late_margin: f64,
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            seconds_per_point: default_seconds_per_point(),
            early_margin: default_early_margin(),
            late_margin: default_late_margin(),
            grace_seconds: default_grace_seconds(),
        }
    }
}

fn default_seconds_per_point() -> f64 {
    2.0
}

fn default_early_margin() -> f64 {
    0.5
}

fn default_late_margin() -> f64 {
    3.0
}

fn default_grace_seconds() -> f64 {
    5.0
}

fn default_mismatch_minutes() -> i64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionRules {
    #[serde(alias = "num")]
    pub your_draws: u32,
    #[serde(alias = "prob")]
    pub bound: f64,
    #[serde(default = "default_mismatch_minutes")]
    pub mismatch_minutes_per_draw: i64,
    #[serde(default)]
    pub pacing: PacingConfig,
}

/// The pickers each side draws from and how their items are valued.
#[derive(Debug, Clone)]
pub struct PermissionSetup {
    pub rules: PermissionRules,
    pub value: ValueExpr,
    pub ours: Picker,
    pub yours: Picker,
}

impl PermissionSetup {
    pub fn picker(&self, side: Side) -> &Picker {
        match side {
            Side::Us => &self.ours,
            Side::You => &self.yours,
        }
    }

    pub fn values(&self, side: Side, collection: &dyn Collection) -> Vec<i64> {
        self.picker(side)
            .all(collection)
            .into_iter()
            .map(|item| self.value.eval(item))
            .collect()
    }

    /// Allocation against the collection as it is right now.
    pub fn allocate(&self, collection: &dyn Collection) -> Result<Allocation, NegotiationError> {
        allocate(
            &self.values(Side::You, collection),
            &self.values(Side::Us, collection),
            self.rules.your_draws,
            self.rules.bound,
        )
    }
}

/// Empirical distribution of item values.
#[derive(Debug, Clone)]
pub struct Distribution {
    sorted: Vec<i64>,
}

impl Distribution {
    pub fn new(mut values: Vec<i64>) -> Self {
        values.sort_unstable();
        Self { sorted: values }
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Fraction of values `<= value`.
    pub fn cdf(&self, value: i64) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let below = self.sorted.partition_point(|v| *v <= value);
        below as f64 / self.sorted.len() as f64
    }

    pub fn support(&self) -> Vec<i64> {
        let mut support = self.sorted.clone();
        support.dedup();
        support
    }
}

/// Probability that the max of `your_draws` draws from `yours` strictly beats
/// the max of `our_draws` draws from `ours`. Ties go to us.
pub fn you_win_probability(
    yours: &Distribution,
    your_draws: u32,
    ours: &Distribution,
    our_draws: u32,
) -> f64 {
    if our_draws == 0 {
        return 1.0;
    }
    let n = your_draws.min(i32::MAX as u32) as i32;
    let m = our_draws.min(i32::MAX as u32) as i32;
    let mut total = 0.0;
    let mut below = 0.0f64;
    for value in ours.support() {
        let at_or_below = ours.cdf(value).powi(m);
        let our_max_is_value = at_or_below - below;
        below = at_or_below;
        let you_beat = 1.0 - yours.cdf(value).powi(n);
        total += our_max_is_value * you_beat;
    }
    total.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocation {
    pub your_draws: u32,
    pub our_draws: u32,
    pub you_win_probability: f64,
}

/// Smallest `our_draws` keeping `you_win_probability <= bound`: doubling to
/// bracket, then bisection. Both phases are bounded.
pub fn allocate(
    your_values: &[i64],
    our_values: &[i64],
    your_draws: u32,
    bound: f64,
) -> Result<Allocation, NegotiationError> {
    if your_values.is_empty() {
        return Err(NegotiationError::EmptyDistribution(Side::You));
    }
    if our_values.is_empty() {
        return Err(NegotiationError::EmptyDistribution(Side::Us));
    }
    if !(bound > 0.0 && bound < 1.0) {
        return Err(NegotiationError::InvalidBound(bound));
    }
    if your_draws == 0 {
        return Err(NegotiationError::NoDraws);
    }
    let yours = Distribution::new(your_values.to_vec());
    let ours = Distribution::new(our_values.to_vec());
    let chance = |m: u32| you_win_probability(&yours, your_draws, &ours, m);

    // `failing` always violates the bound, `passing` always meets it.
    let mut failing = 0u32;
    let mut passing = None;
    let mut probe = 1u32;
    for _ in 0..MAX_SEARCH_STEPS {
        if chance(probe) <= bound {
            passing = Some(probe);
            break;
        }
        failing = probe;
        if probe >= MAX_ALLOCATION {
            break;
        }
        probe = probe.saturating_mul(2).min(MAX_ALLOCATION);
    }
    let mut passing = passing.ok_or(NegotiationError::Unreachable(bound))?;

    for _ in 0..MAX_SEARCH_STEPS {
        if passing - failing <= 1 {
            break;
        }
        let mid = failing + (passing - failing) / 2;
        if chance(mid) <= bound {
            passing = mid;
        } else {
            failing = mid;
        }
    }

    let allocation = Allocation {
        your_draws,
        our_draws: passing,
        you_win_probability: chance(passing),
    };
    debug!(
        your_draws,
        our_draws = allocation.our_draws,
        p = allocation.you_win_probability,
        bound,
        "allocated draws"
    );
    Ok(allocation)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingWindow {
    pub until: NaiveDateTime,
    pub before: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub granted: bool,
    pub confirmed: bool,
    pub your_max: Option<i64>,
    pub our_max: Option<i64>,
    pub compensation: u32,
    pub elapsed_minutes: i64,
    pub block_minutes: Option<i64>,
}

impl Verdict {
    pub fn apply(&self, status: &mut Status, now: NaiveDateTime) {
        if self.granted {
            status.give_permission(true, self.elapsed_minutes, now);
        } else {
            status.block_until(self.block_minutes, now);
        }
    }

    pub fn message(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Your best {} against our best {}",
            fmt_max(self.your_max),
            fmt_max(self.our_max)
        )];
        if !self.confirmed {
            lines.push("Confirmation failed".to_string());
        }
        if self.granted {
            lines.push("Permission granted".to_string());
        } else {
            lines.push("Permission denied".to_string());
        }
        if let Some(block) = self.block_minutes {
            lines.push(format!("No asking for {block} minutes"));
        }
        lines
    }
}

fn fmt_max(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationPhase {
    YourTurn { remaining: u32 },
    OurTurn { remaining: u32 },
    AwaitingConfirmation { token: char },
    Resolved(Verdict),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawReport {
    pub side: Side,
    pub value: i64,
    pub best: i64,
    pub penalty: u32,
    pub remaining: u32,
    pub window: Option<PacingWindow>,
}

#[derive(Debug, Clone)]
pub struct Negotiation {
    allocation: Allocation,
    pacing: PacingConfig,
    break_minutes: i64,
    mismatch_minutes_per_draw: i64,
    your_max: Option<i64>,
    our_max: Option<i64>,
    decay: i64,
    window: Option<PacingWindow>,
    compensation: u32,
    started_at: NaiveDateTime,
    phase: NegotiationPhase,
}

impl Negotiation {
    pub fn new(
        allocation: Allocation,
        rules: &PermissionRules,
        break_minutes: i64,
        now: NaiveDateTime,
    ) -> Self {
        info!(
            your_draws = allocation.your_draws,
            our_draws = allocation.our_draws,
            "negotiation started"
        );
        Self {
            allocation,
            pacing: rules.pacing.clone(),
            break_minutes,
            mismatch_minutes_per_draw: rules.mismatch_minutes_per_draw,
            your_max: None,
            our_max: None,
            decay: 0,
            window: None,
            compensation: 0,
            started_at: now,
            phase: NegotiationPhase::YourTurn {
                remaining: allocation.your_draws,
            },
        }
    }

    pub fn allocation(&self) -> Allocation {
        self.allocation
    }

    pub fn phase(&self) -> &NegotiationPhase {
        &self.phase
    }

    pub fn window(&self) -> Option<PacingWindow> {
        self.window
    }

    pub fn compensation(&self) -> u32 {
        self.compensation
    }

    pub fn best(&self, side: Side) -> Option<i64> {
        match side {
            Side::Us => self.our_max,
            Side::You => self.your_max,
        }
    }

    /// The side expected to draw next, if any.
    pub fn turn(&self) -> Option<Side> {
        match self.phase {
            NegotiationPhase::YourTurn { .. } => Some(Side::You),
            NegotiationPhase::OurTurn { .. } => Some(Side::Us),
            _ => None,
        }
    }

    /// Records the value of an item just drawn for the side whose turn it is.
    pub fn record_draw(
        &mut self,
        value: i64,
        now: NaiveDateTime,
        rng: &mut RngState,
    ) -> Result<DrawReport, NegotiationError> {
        match self.phase {
            NegotiationPhase::YourTurn { remaining } => {
                let best = self.your_max.map_or(value, |max| max.max(value));
                self.your_max = Some(best);
                let remaining = remaining.saturating_sub(1);
                self.phase = if remaining == 0 {
                    NegotiationPhase::OurTurn {
                        remaining: self.allocation.our_draws,
                    }
                } else {
                    NegotiationPhase::YourTurn { remaining }
                };
                debug!(value, best, remaining, "your draw");
                Ok(DrawReport {
                    side: Side::You,
                    value,
                    best,
                    penalty: 0,
                    remaining,
                    window: None,
                })
            }
            NegotiationPhase::OurTurn { remaining } => {
                let penalty = self.window.map_or(0, |window| pacing_penalty(window, now));
                self.compensation = self.compensation.saturating_add(penalty);
                let remaining = remaining
                    .saturating_sub(1)
                    .saturating_add(penalty)
                    .min(MAX_ALLOCATION);
                let best = self.our_max.map_or(value, |max| max.max(value));
                self.our_max = Some(best);
                self.decay = (self.decay - 1).max(value);
                let window = self.next_window(now);
                self.window = Some(window);

                let beaten = self.your_max.map_or(true, |theirs| best >= theirs);
                self.phase = if beaten || remaining == 0 {
                    NegotiationPhase::AwaitingConfirmation {
                        token: rng.lowercase_letter(),
                    }
                } else {
                    NegotiationPhase::OurTurn { remaining }
                };
                debug!(value, best, penalty, remaining, "our draw");
                Ok(DrawReport {
                    side: Side::Us,
                    value,
                    best,
                    penalty,
                    remaining,
                    window: Some(window),
                })
            }
            _ => Err(NegotiationError::WrongPhase("drawing")),
        }
    }

    pub fn token(&self) -> Option<char> {
        match self.phase {
            NegotiationPhase::AwaitingConfirmation { token } => Some(token),
            _ => None,
        }
    }

    /// Settles the negotiation. A wrong answer is a denial with a block
    /// that grows with the compensation draws consumed.
    pub fn confirm(&mut self, answer: char, now: NaiveDateTime) -> Result<Verdict, NegotiationError> {
        let token = self
            .token()
            .ok_or(NegotiationError::WrongPhase("awaiting confirmation"))?;
        let confirmed = answer.to_ascii_lowercase() == token;
        let won = match (self.our_max, self.your_max) {
            (Some(ours), Some(yours)) => ours >= yours,
            (Some(_), None) => true,
            _ => false,
        };
        let granted = confirmed && won;
        let block_minutes = if granted {
            None
        } else if confirmed {
            Some(self.break_minutes)
        } else {
            Some(
                self.break_minutes
                    + i64::from(self.compensation) * self.mismatch_minutes_per_draw,
            )
        };
        Ok(self.resolve(granted, confirmed, block_minutes, now))
    }

    /// Walking away counts as a denial.
    pub fn abandon(&mut self, now: NaiveDateTime) -> Verdict {
        if let NegotiationPhase::Resolved(verdict) = &self.phase {
            return verdict.clone();
        }
        let block = self.break_minutes
            + i64::from(self.compensation) * self.mismatch_minutes_per_draw;
        self.resolve(false, false, Some(block), now)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.phase, NegotiationPhase::Resolved(_))
    }

    fn resolve(
        &mut self,
        granted: bool,
        confirmed: bool,
        block_minutes: Option<i64>,
        now: NaiveDateTime,
    ) -> Verdict {
        let verdict = Verdict {
            granted,
            confirmed,
            your_max: self.your_max,
            our_max: self.our_max,
            compensation: self.compensation,
            elapsed_minutes: (now - self.started_at).num_minutes().max(0),
            block_minutes,
        };
        info!(
            granted,
            confirmed,
            your_max = ?verdict.your_max,
            our_max = ?verdict.our_max,
            compensation = verdict.compensation,
            "negotiation resolved"
        );
        self.phase = NegotiationPhase::Resolved(verdict.clone());
        verdict
    }

    fn next_window(&self, now: NaiveDateTime) -> PacingWindow {
        let span = self.decay.max(0) as f64 * self.pacing.seconds_per_point;
        let until = offset(now, span * self.pacing.early_margin);
        let before = offset(now, span * self.pacing.late_margin + self.pacing.grace_seconds);
        PacingWindow { until, before }
    }
}

fn offset(now: NaiveDateTime, value: f64) -> NaiveDateTime {
    now.checked_add_signed(seconds(value)).unwrap_or(now)
}

fn seconds(value: f64) -> Duration {
    let clamped = if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, MAX_PACING_SECONDS)
    };
    Duration::milliseconds((clamped * 1000.0).round() as i64)
}

/// Whole seconds (rounded up) by which `now` misses the window.
fn pacing_penalty(window: PacingWindow, now: NaiveDateTime) -> u32 {
    let miss = if now < window.until {
        window.until - now
    } else if now > window.before {
        now - window.before
    } else {
        return 0;
    };
    let millis = miss.num_milliseconds().max(0);
    let secs = (millis + 999) / 1000;
    u32::try_from(secs).unwrap_or(MAX_ALLOCATION).min(MAX_ALLOCATION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 10)
            .and_then(|day| day.and_hms_opt(21, 0, 0))
            .expect("valid time")
    }

    fn rules() -> PermissionRules {
        PermissionRules {
            your_draws: 2,
            bound: 0.3,
            mismatch_minutes_per_draw: 5,
            pacing: PacingConfig {
                seconds_per_point: 1.0,
                early_margin: 1.0,
                late_margin: 2.0,
                grace_seconds: 0.0,
            },
        }
    }

    #[test]
    fn fixed_scenario_allocation() {
        let yours = [1, 1, 2, 3];
        let ours = [1, 2, 2, 4];
        let single = allocate(&yours, &ours, 1, 0.3).expect("allocate");
        assert_eq!(single.our_draws, 1);
        assert!((single.you_win_probability - 0.25).abs() < 1e-12);

        let double = allocate(&yours, &ours, 2, 0.3).expect("allocate");
        assert_eq!(double.our_draws, 2);
        assert!((double.you_win_probability - 0.265625).abs() < 1e-12);
        assert_eq!(allocate(&yours, &ours, 2, 0.3), Ok(double));
    }

    #[test]
    fn allocation_is_tight() {
        let yours: Vec<i64> = (0..40).map(|v| v % 9).collect();
        let ours: Vec<i64> = (0..25).map(|v| v % 10).collect();
        for (draws, bound) in [(1, 0.2), (3, 0.1), (8, 0.05), (20, 0.01)] {
            let alloc = allocate(&yours, &ours, draws, bound).expect("allocate");
            let y = Distribution::new(yours.clone());
            let o = Distribution::new(ours.clone());
            let m = alloc.our_draws;
            assert!(you_win_probability(&y, draws, &o, m) <= bound);
            assert!(you_win_probability(&y, draws, &o, m - 1) > bound);
        }
    }

    #[test]
    fn probability_decreases_with_draws() {
        let y = Distribution::new(vec![1, 4, 4, 6, 9]);
        let o = Distribution::new(vec![0, 2, 5, 7, 10]);
        let mut last = 1.0;
        for m in 1..50 {
            let p = you_win_probability(&y, 3, &o, m);
            assert!(p <= last + 1e-15);
            last = p;
        }
    }

    #[test]
    fn empty_distribution_is_rejected() {
        assert_eq!(
            allocate(&[], &[1], 1, 0.3),
            Err(NegotiationError::EmptyDistribution(Side::You))
        );
        assert_eq!(
            allocate(&[1], &[], 1, 0.3),
            Err(NegotiationError::EmptyDistribution(Side::Us))
        );
        assert_eq!(
            allocate(&[1], &[1], 1, 1.0),
            Err(NegotiationError::InvalidBound(1.0))
        );
    }

    #[test]
    fn unbeatable_pool_is_unreachable() {
        // Our pool never reaches your top value, so you keep winning
        // with probability 1 - 0.5^n no matter how often we draw.
        assert_eq!(
            allocate(&[1, 10], &[1, 2], 3, 0.5),
            Err(NegotiationError::Unreachable(0.5))
        );
    }

    #[test]
    fn setup_reads_values_from_pickers() {
        use crate::{AttrValue, Item, MemoryCollection, Predicate};
        let store = MemoryCollection::from_items((1..=8).map(|id| {
            Item::new(id, "jpg")
                .with_attr("ours", AttrValue::Flag(id > 4))
                .with_attr("num_stars", AttrValue::Count(i64::from(id)))
        }))
        .expect("store");
        let setup = PermissionSetup {
            rules: rules(),
            value: ValueExpr::Attr("num_stars".to_string()),
            ours: Picker::filtered("ours", vec![Predicate::FlagSet("ours".to_string())]),
            yours: Picker::filtered("yours", vec![Predicate::FlagClear("ours".to_string())]),
        };
        let mut yours = setup.values(Side::You, &store);
        yours.sort_unstable();
        assert_eq!(yours, vec![1, 2, 3, 4]);
        // Every one of our values beats every one of yours.
        let alloc = setup.allocate(&store).expect("allocate");
        assert_eq!(alloc.our_draws, 1);
        assert_eq!(alloc.you_win_probability, 0.0);
    }

    #[test]
    fn protocol_grants_when_confirmed() {
        let alloc = Allocation {
            your_draws: 2,
            our_draws: 3,
            you_win_probability: 0.2,
        };
        let mut rng = RngState::from_seed(8);
        let mut neg = Negotiation::new(alloc, &rules(), 30, start());
        neg.record_draw(3, start(), &mut rng).expect("draw");
        neg.record_draw(5, start(), &mut rng).expect("draw");
        assert_eq!(neg.turn(), Some(Side::Us));
        assert_eq!(neg.best(Side::You), Some(5));

        let report = neg.record_draw(2, start(), &mut rng).expect("draw");
        assert_eq!(report.penalty, 0);
        assert_eq!(report.remaining, 2);
        // Window is [now + 2s, now + 4s]; drawing at +3s is on time.
        let on_time = start() + Duration::seconds(3);
        let report = neg.record_draw(6, on_time, &mut rng).expect("draw");
        assert_eq!(report.penalty, 0);
        let token = neg.token().expect("awaiting confirmation");

        let verdict = neg.confirm(token, start() + Duration::minutes(4)).expect("confirm");
        assert!(verdict.granted);
        assert_eq!(verdict.elapsed_minutes, 4);
        assert_eq!(verdict.block_minutes, None);
        assert!(neg.is_resolved());
        assert!(neg.record_draw(1, start(), &mut rng).is_err());
    }

    #[test]
    fn rushing_adds_compensation_draws() {
        let alloc = Allocation {
            your_draws: 1,
            our_draws: 2,
            you_win_probability: 0.2,
        };
        let mut rng = RngState::from_seed(9);
        let mut neg = Negotiation::new(alloc, &rules(), 30, start());
        neg.record_draw(9, start(), &mut rng).expect("draw");
        neg.record_draw(4, start(), &mut rng).expect("draw");
        // Window after a 4 is [now + 4s, now + 8s]; drawing at +1s is 3s early.
        let report = neg
            .record_draw(3, start() + Duration::seconds(1), &mut rng)
            .expect("draw");
        assert_eq!(report.penalty, 3);
        assert_eq!(report.remaining, 3);
        assert_eq!(neg.compensation(), 3);
        // decay fell to 3: window [+4s, +7s]; drawing at +11s is 4s late.
        let report = neg
            .record_draw(1, start() + Duration::seconds(11), &mut rng)
            .expect("draw");
        assert_eq!(report.penalty, 4);
        assert_eq!(neg.compensation(), 7);
    }

    #[test]
    fn wrong_token_is_an_extended_denial() {
        let alloc = Allocation {
            your_draws: 1,
            our_draws: 1,
            you_win_probability: 0.2,
        };
        let mut rng = RngState::from_seed(10);
        let mut neg = Negotiation::new(alloc, &rules(), 30, start());
        neg.record_draw(1, start(), &mut rng).expect("draw");
        neg.record_draw(7, start(), &mut rng).expect("draw");
        let token = neg.token().expect("token");
        let wrong = if token == 'a' { 'b' } else { 'a' };
        let verdict = neg.confirm(wrong, start()).expect("confirm");
        assert!(!verdict.granted);
        assert!(!verdict.confirmed);
        assert_eq!(verdict.block_minutes, Some(30));
    }

    #[test]
    fn losing_draws_end_in_denial() {
        let alloc = Allocation {
            your_draws: 1,
            our_draws: 1,
            you_win_probability: 0.2,
        };
        let mut rng = RngState::from_seed(11);
        let mut neg = Negotiation::new(alloc, &rules(), 30, start());
        neg.record_draw(8, start(), &mut rng).expect("draw");
        neg.record_draw(2, start(), &mut rng).expect("draw");
        let token = neg.token().expect("token");
        let verdict = neg.confirm(token.to_ascii_uppercase(), start()).expect("confirm");
        assert!(verdict.confirmed);
        assert!(!verdict.granted);
        assert_eq!(verdict.block_minutes, Some(30));
    }

    #[test]
    fn huge_values_keep_the_window_on_the_clock() {
        let alloc = Allocation {
            your_draws: 1,
            our_draws: 2,
            you_win_probability: 0.2,
        };
        let mut rng = RngState::from_seed(12);
        let mut neg = Negotiation::new(alloc, &rules(), 30, start());
        neg.record_draw(i64::MAX, start(), &mut rng).expect("draw");
        let report = neg
            .record_draw(5_000_000_000_000, start(), &mut rng)
            .expect("draw");
        let window = report.window.expect("window");
        assert_eq!(window.until, start() + Duration::days(1));
        assert_eq!(window.before, start() + Duration::days(1));
        // Two days late, counted in whole seconds.
        let report = neg
            .record_draw(1, start() + Duration::days(3), &mut rng)
            .expect("draw");
        assert_eq!(report.penalty, 172_800);
        assert_eq!(neg.turn(), Some(Side::Us));
    }

    #[test]
    fn wrong_token_after_rushing_adds_compensation_minutes() {
        let alloc = Allocation {
            your_draws: 1,
            our_draws: 2,
            you_win_probability: 0.2,
        };
        let mut rng = RngState::from_seed(9);
        let mut neg = Negotiation::new(alloc, &rules(), 30, start());
        neg.record_draw(9, start(), &mut rng).expect("draw");
        neg.record_draw(4, start(), &mut rng).expect("draw");
        neg.record_draw(3, start() + Duration::seconds(1), &mut rng)
            .expect("draw");
        assert_eq!(neg.compensation(), 3);
        neg.record_draw(9, start() + Duration::seconds(5), &mut rng)
            .expect("draw");
        let token = neg.token().expect("token");
        let wrong = if token == 'a' { 'b' } else { 'a' };
        let verdict = neg.confirm(wrong, start()).expect("confirm");
        assert!(!verdict.granted);
        assert_eq!(verdict.block_minutes, Some(30 + 3 * 5));
    }

    #[test]
    fn abandoning_after_rushing_adds_compensation_minutes() {
        let alloc = Allocation {
            your_draws: 1,
            our_draws: 2,
            you_win_probability: 0.2,
        };
        let mut rng = RngState::from_seed(9);
        let mut neg = Negotiation::new(alloc, &rules(), 30, start());
        neg.record_draw(9, start(), &mut rng).expect("draw");
        neg.record_draw(4, start(), &mut rng).expect("draw");
        neg.record_draw(3, start() + Duration::seconds(1), &mut rng)
            .expect("draw");
        assert_eq!(neg.compensation(), 3);
        let verdict = neg.abandon(start() + Duration::seconds(2));
        assert!(!verdict.granted);
        assert!(!verdict.confirmed);
        assert_eq!(verdict.block_minutes, Some(30 + 3 * 5));
        // A resolved negotiation reports the same verdict again.
        assert_eq!(neg.abandon(start()).block_minutes, Some(45));
    }
}

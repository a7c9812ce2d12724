//! Best-of match with odometer scoring and momentum bias.

use crate::{Collection, Item, Picker, PickerError, Predicate, RngState, Side, Status, ValueExpr};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const BIAS_BASE: f64 = 1.02;
pub const MIN_WIN_PROBABILITY: f64 = 0.07;
pub const MAX_WIN_PROBABILITY: f64 = 0.93;
/// Largest single-round contribution to the bias.
pub const BIAS_STEP_CAP: i64 = 15;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BestOfError {
    #[error("a match needs an undecided ledger, points are {0}")]
    PointsOutstanding(i64),
    #[error("score caps must be non-empty and positive")]
    InvalidCaps,
    #[error("no item matched the round outcome after {0} draws")]
    NoMatchingItem(u32),
    #[error("the match is already decided")]
    Decided,
    #[error(transparent)]
    Picker(#[from] PickerError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BestOfRules {
    #[serde(default = "default_caps")]
    pub max_points: Vec<u32>,
    #[serde(default = "default_pace")]
    pub pace: f64,
    #[serde(default = "default_attempts")]
    pub max_draw_attempts: u32,
}

impl Default for BestOfRules {
    fn default() -> Self {
        Self {
            max_points: default_caps(),
            pace: default_pace(),
            max_draw_attempts: default_attempts(),
        }
    }
}

fn default_caps() -> Vec<u32> {
    vec![5, 5, 10]
}

fn default_pace() -> f64 {
    1.0
}

fn default_attempts() -> u32 {
    500
}

/// Chance that "us" take the next round.
pub fn win_probability(bias: i64, pace: f64) -> f64 {
    let weight = BIAS_BASE.powf(pace * bias as f64);
    (weight / (weight + 1.0)).clamp(MIN_WIN_PROBABILITY, MAX_WIN_PROBABILITY)
}

/// Per-side multi-level scores. Filling a level carries into the next one
/// and clears the opponent's levels up to it; the top level ends the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scoreboard {
    caps: Vec<u32>,
    scores: [Vec<u32>; 2],
}

impl Scoreboard {
    pub fn new(caps: Vec<u32>) -> Result<Self, BestOfError> {
        if caps.is_empty() || caps.contains(&0) {
            return Err(BestOfError::InvalidCaps);
        }
        let levels = caps.len();
        Ok(Self {
            caps,
            scores: [vec![0; levels], vec![0; levels]],
        })
    }

    pub fn caps(&self) -> &[u32] {
        &self.caps
    }

    pub fn score(&self, side: Side) -> &[u32] {
        &self.scores[side.index()]
    }

    pub fn top(&self, side: Side) -> u32 {
        self.score(side).last().copied().unwrap_or(0)
    }

    fn top_cap(&self) -> u32 {
        self.caps.last().copied().unwrap_or(0)
    }

    pub fn winner(&self) -> Option<Side> {
        let cap = self.top_cap();
        Side::BOTH.into_iter().find(|side| self.top(*side) >= cap)
    }

    /// Returns true once the award decides the match.
    pub fn award(&mut self, side: Side, value: u32) -> bool {
        let own = side.index();
        let opp = side.other().index();
        let top = self.caps.len() - 1;
        let mut carry = value;
        for level in 0..self.caps.len() {
            if carry == 0 {
                break;
            }
            let cap = self.caps[level];
            let total = self.scores[own][level].saturating_add(carry);
            if level == top {
                self.scores[own][level] = total.min(cap);
                break;
            }
            self.scores[own][level] = total % cap;
            carry = total / cap;
            if carry > 0 {
                for lower in 0..=level {
                    self.scores[opp][lower] = 0;
                }
            }
        }
        self.winner().is_some()
    }

    pub fn margin(&self, winner: Side) -> i64 {
        i64::from(self.top_cap()) - i64::from(self.top(winner.other()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub winner: Side,
    pub margin: i64,
    pub awarded: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub turn: Side,
    pub winner: Side,
    pub item: Item,
    pub value: u32,
    pub probability: f64,
    pub result: Option<MatchResult>,
}

/// What a match draws from and how it reads the drawn items.
#[derive(Debug, Clone)]
pub struct BestOfSetup {
    pub picker: Picker,
    pub trigger: Predicate,
    pub value: ValueExpr,
    pub rules: BestOfRules,
}

#[derive(Debug, Clone)]
pub struct BestOfMatch {
    board: Scoreboard,
    turn: Side,
    bias: i64,
    previous_winner: Option<Side>,
    rounds: u32,
    result: Option<MatchResult>,
}

impl BestOfMatch {
    pub fn start(rules: &BestOfRules, status: &Status) -> Result<Self, BestOfError> {
        if status.points() != 0 {
            return Err(BestOfError::PointsOutstanding(status.points()));
        }
        let board = Scoreboard::new(rules.max_points.clone())?;
        info!(caps = ?board.caps(), "best-of match started");
        Ok(Self {
            board,
            turn: Side::Us,
            bias: 0,
            previous_winner: None,
            rounds: 0,
            result: None,
        })
    }

    pub fn board(&self) -> &Scoreboard {
        &self.board
    }

    pub fn turn(&self) -> Side {
        self.turn
    }

    pub fn bias(&self) -> i64 {
        self.bias
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    pub fn is_decided(&self) -> bool {
        self.result.is_some()
    }

    /// Plays one round: rolls the outcome, draws an item whose trigger
    /// agrees with it, and scores the item's value for the winner. The
    /// deciding round commits the margin to the ledger.
    pub fn play_round(
        &mut self,
        setup: &BestOfSetup,
        collection: &dyn Collection,
        rng: &mut RngState,
        status: &mut Status,
    ) -> Result<RoundOutcome, BestOfError> {
        if self.is_decided() {
            return Err(BestOfError::Decided);
        }
        let probability = win_probability(self.bias, setup.rules.pace);
        let winner = if rng.next_f64() < probability {
            Side::Us
        } else {
            Side::You
        };
        let turn = self.turn;
        let item = draw_matching(setup, winner == turn, collection, rng)?;
        let value = u32::try_from(setup.value.eval(&item).max(1)).unwrap_or(u32::MAX);

        if self.previous_winner == Some(winner) {
            self.bias += winner.sign() * i64::from(value).min(BIAS_STEP_CAP);
        } else {
            self.bias = 0;
        }
        self.previous_winner = Some(winner);
        self.rounds += 1;
        self.turn = turn.other();

        let decided = self.board.award(winner, value);
        debug!(
            round = self.rounds,
            winner = winner.label(),
            value,
            probability,
            bias = self.bias,
            "best-of round"
        );
        let result = if decided {
            let margin = self.board.margin(winner);
            let awarded = status.award_with_streak(winner, margin);
            let result = MatchResult {
                winner,
                margin,
                awarded,
            };
            info!(winner = winner.label(), margin, awarded, "best-of match decided");
            self.result = Some(result.clone());
            Some(result)
        } else {
            None
        };
        Ok(RoundOutcome {
            turn,
            winner,
            item,
            value,
            probability,
            result,
        })
    }

    pub fn score_lines(&self) -> Vec<String> {
        Side::BOTH
            .iter()
            .map(|side| {
                let levels: Vec<String> = self
                    .board
                    .score(*side)
                    .iter()
                    .map(|score| score.to_string())
                    .collect();
                format!("{:>4}: {}", side.label(), levels.join(" | "))
            })
            .collect()
    }
}

fn draw_matching(
    setup: &BestOfSetup,
    want_trigger: bool,
    collection: &dyn Collection,
    rng: &mut RngState,
) -> Result<Item, BestOfError> {
    for _ in 0..setup.rules.max_draw_attempts {
        let item = setup.picker.draw(collection, rng)?;
        if setup.trigger.matches(&item) == want_trigger {
            return Ok(item);
        }
    }
    Err(BestOfError::NoMatchingItem(setup.rules.max_draw_attempts))
}

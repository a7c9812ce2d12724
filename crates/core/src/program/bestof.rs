use super::{InputEvent, Key, ModeCtx, ModeResult, Transition};
use crate::status::capitalize;
use crate::{Align, BestOfError, BestOfMatch, Event, RoundOutcome, SessionError};
use tracing::{info, warn};

/// Plays a best-of match one round per key press.
#[derive(Debug, Clone)]
pub struct BestOfMode {
    game: BestOfMatch,
}

impl BestOfMode {
    pub fn new(game: BestOfMatch) -> Self {
        Self { game }
    }

    pub fn game(&self) -> &BestOfMatch {
        &self.game
    }

    pub(super) fn activate(&mut self, ctx: &mut ModeCtx<'_>) -> Result<(), SessionError> {
        ctx.display.set_title("Best of");
        let mut lines = self.game.score_lines();
        lines.push("Press space to play a round, esc to walk away".to_string());
        ctx.display.show_message(&lines, Align::Left);
        Ok(())
    }

    pub(super) fn handle_event(
        &mut self,
        ctx: &mut ModeCtx<'_>,
        event: InputEvent,
    ) -> Result<Transition, SessionError> {
        let InputEvent::Key(key) = event else {
            return Ok(Transition::Stay);
        };
        if let Some(result) = self.game.result() {
            return Ok(Transition::Pop(Some(ModeResult::Match(result.clone()))));
        }
        match key {
            Key::Char(' ' | 'n') => self.play(ctx),
            Key::Esc => {
                info!(rounds = self.game.rounds(), "best-of match abandoned");
                Ok(Transition::Pop(None))
            }
            _ => Ok(Transition::Stay),
        }
    }

    fn play(&mut self, ctx: &mut ModeCtx<'_>) -> Result<Transition, SessionError> {
        let before = ctx.session.status.points();
        let session = &mut *ctx.session;
        let outcome = self.game.play_round(
            &session.config.bestof,
            session.collection.as_ref(),
            &mut session.rng,
            &mut session.status,
        );
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err @ (BestOfError::NoMatchingItem(_) | BestOfError::Picker(_))) => {
                warn!(error = %err, "best-of round could not draw");
                ctx.display.show_message(&[err.to_string()], Align::Center);
                return Ok(Transition::Stay);
            }
            Err(err) => return Err(err.into()),
        };
        ctx.session.events.push(Event::BestOfRound {
            winner: outcome.winner,
            value: outcome.value,
        });
        ctx.display.show_item(&outcome.item);
        let mut lines = self.describe(&outcome);
        if let Some(result) = &outcome.result {
            ctx.session.note_points(before, "best-of match");
            ctx.session.events.push(Event::BestOfDecided {
                winner: result.winner,
                margin: result.margin,
                awarded: result.awarded,
            });
            lines.push(format!(
                "{} take the match, {} points awarded",
                capitalize(result.winner.subject()),
                result.awarded
            ));
            lines.push("Press any key".to_string());
        }
        ctx.display.show_message(&lines, Align::Left);
        Ok(Transition::Stay)
    }

    fn describe(&self, outcome: &RoundOutcome) -> Vec<String> {
        let mut lines = vec![format!(
            "Round {}, {} turn: {} score {} ({:.0}% for us)",
            self.game.rounds(),
            outcome.turn.possessive(),
            outcome.winner.label(),
            outcome.value,
            outcome.probability * 100.0
        )];
        lines.extend(self.game.score_lines());
        lines
    }
}

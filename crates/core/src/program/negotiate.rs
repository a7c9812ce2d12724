use super::{InputEvent, Key, ModeCtx, ModeResult, Transition};
use crate::status::capitalize;
use crate::{
    Align, DrawReport, Event, Negotiation, NegotiationPhase, SessionError, Side, TimerId,
    TimerKind, Verdict,
};

/// Runs one permission negotiation. Space draws for whichever side is due;
/// the final letter typed answers the confirmation token. Escape abandons.
#[derive(Debug, Clone)]
pub struct NegotiateMode {
    negotiation: Negotiation,
    pace_timer: Option<TimerId>,
}

impl NegotiateMode {
    pub fn new(negotiation: Negotiation) -> Self {
        Self {
            negotiation,
            pace_timer: None,
        }
    }

    pub fn negotiation(&self) -> &Negotiation {
        &self.negotiation
    }

    pub(super) fn activate(&mut self, ctx: &mut ModeCtx<'_>) -> Result<(), SessionError> {
        ctx.display.set_title("Permission");
        let allocation = self.negotiation.allocation();
        let lines = vec![
            format!(
                "You draw {}, we may draw up to {}",
                allocation.your_draws, allocation.our_draws
            ),
            format!(
                "Chance you keep the higher value: {:.1}%",
                allocation.you_win_probability * 100.0
            ),
            "Press space to draw".to_string(),
        ];
        ctx.display.show_message(&lines, Align::Center);
        Ok(())
    }

    pub(super) fn handle_event(
        &mut self,
        ctx: &mut ModeCtx<'_>,
        event: InputEvent,
    ) -> Result<Transition, SessionError> {
        let key = match event {
            InputEvent::Timer(timer) => {
                if timer.kind == TimerKind::PaceOpen && Some(timer.id) == self.pace_timer {
                    self.pace_timer = None;
                    ctx.display
                        .show_message(&["Draw now".to_string()], Align::Center);
                }
                return Ok(Transition::Stay);
            }
            InputEvent::Key(key) => key,
        };
        let now = ctx.session.now();
        match key {
            Key::Esc => {
                let verdict = self.negotiation.abandon(now);
                Ok(self.finish(ctx, verdict))
            }
            Key::Char(answer) if self.negotiation.token().is_some() => {
                let verdict = self.negotiation.confirm(answer, now)?;
                Ok(self.finish(ctx, verdict))
            }
            Key::Char(' ' | 'n') if self.negotiation.turn().is_some() => {
                self.draw(ctx)?;
                Ok(Transition::Stay)
            }
            _ => Ok(Transition::Stay),
        }
    }

    fn draw(&mut self, ctx: &mut ModeCtx<'_>) -> Result<(), SessionError> {
        let Some(side) = self.negotiation.turn() else {
            return Ok(());
        };
        let picker = ctx.session.config.permission.picker(side).clone();
        let drawn = ctx.session.draw_with_fallback(&picker)?;
        let value = ctx.session.config.permission.value.eval(&drawn.item);
        let now = ctx.session.now();
        let report = self
            .negotiation
            .record_draw(value, now, &mut ctx.session.rng)?;
        ctx.session.events.push(Event::NegotiationDraw {
            side,
            value,
            penalty: report.penalty,
        });
        ctx.display.show_item(&drawn.item);

        let mut lines = Vec::new();
        if let Some(err) = &drawn.fallback {
            lines.push(format!("{err}, drew from all items"));
        }
        lines.extend(self.describe(&report));
        if let Some(window) = report.window {
            if let Some(previous) = self.pace_timer.take() {
                ctx.session.timers.cancel(previous);
            }
            if self.negotiation.turn() == Some(Side::Us) {
                self.pace_timer =
                    Some(ctx.session.timers.schedule(ctx.id, window.until, TimerKind::PaceOpen));
            }
        }
        ctx.display.show_message(&lines, Align::Center);
        Ok(())
    }

    fn describe(&self, report: &DrawReport) -> Vec<String> {
        let mut lines = vec![format!(
            "{} drew {} (best {})",
            capitalize(report.side.subject()),
            report.value,
            report.best
        )];
        if report.penalty > 0 {
            lines.push(format!("Off pace: {} extra draws", report.penalty));
        }
        match self.negotiation.phase() {
            NegotiationPhase::YourTurn { remaining } => {
                lines.push(format!("{remaining} of your draws left"));
            }
            NegotiationPhase::OurTurn { remaining } => {
                lines.push(format!("{remaining} of our draws left"));
                if let Some(window) = report.window {
                    lines.push(format!(
                        "Next draw between {} and {}",
                        window.until.format("%H:%M:%S"),
                        window.before.format("%H:%M:%S")
                    ));
                }
            }
            NegotiationPhase::AwaitingConfirmation { token } => {
                lines.push(format!("Type '{token}' to confirm"));
            }
            NegotiationPhase::Resolved(_) => {}
        }
        lines
    }

    fn finish(&mut self, ctx: &mut ModeCtx<'_>, verdict: Verdict) -> Transition {
        let now = ctx.session.now();
        verdict.apply(&mut ctx.session.status, now);
        ctx.session.events.push(Event::PermissionDecided {
            granted: verdict.granted,
            confirmed: verdict.confirmed,
            block_minutes: verdict.block_minutes,
        });
        if let Some(timer) = self.pace_timer.take() {
            ctx.session.timers.cancel(timer);
        }
        let mut lines = verdict.message();
        if verdict.granted {
            lines.push(format!(
                "Permission until {}",
                ctx.session.status.perm_until().format("%H:%M")
            ));
        }
        ctx.display.show_message(&lines, Align::Center);
        Transition::Pop(Some(ModeResult::Verdict(verdict)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{session, FakeDisplay};
    use super::super::{BrowseMode, Mode, ProgramStack};
    use super::*;
    use crate::{Clock, Picker};

    fn negotiating(
        session: &mut crate::Session,
        display: &mut FakeDisplay,
    ) -> ProgramStack {
        session.status.set_points(3);
        let mut stack = ProgramStack::new(
            Mode::Browse(BrowseMode::new(Picker::all_items())),
            session,
            display,
        )
        .expect("stack");
        stack
            .handle_key(Key::Char('a'), session, display)
            .expect("ask");
        stack
    }

    fn phase(stack: &ProgramStack) -> Option<NegotiationPhase> {
        match stack.top() {
            Some(Mode::Negotiate(mode)) => Some(mode.negotiation().phase().clone()),
            _ => None,
        }
    }

    #[test]
    fn activation_reports_the_allocation() {
        let (mut session, _clock) = session();
        let mut display = FakeDisplay::default();
        let stack = negotiating(&mut session, &mut display);
        assert_eq!(phase(&stack), Some(NegotiationPhase::YourTurn { remaining: 2 }));
        assert!(display.last_message().starts_with("You draw 2, we may draw up to"));
        assert_eq!(display.title, "Permission");
    }

    #[test]
    fn escape_is_a_denial_with_a_block() {
        let (mut session, clock) = session();
        let mut display = FakeDisplay::default();
        let mut stack = negotiating(&mut session, &mut display);
        stack
            .handle_key(Key::Esc, &mut session, &mut display)
            .expect("abandon");
        assert_eq!(stack.depth(), 1);
        assert!(!session.status.has_permission(clock.now()));
        assert_eq!(
            session.status.ask_blocked_until(),
            clock.now() + chrono::Duration::minutes(30)
        );
        assert!(display.last_message().contains("Permission denied"));
    }

    #[test]
    fn full_negotiation_settles_the_ledger() {
        let (mut session, clock) = session();
        let mut display = FakeDisplay::default();
        let mut stack = negotiating(&mut session, &mut display);
        let mut guard = 0;
        while let Some(current) = phase(&stack) {
            guard += 1;
            assert!(guard < 500, "negotiation did not finish");
            match current {
                NegotiationPhase::YourTurn { .. } | NegotiationPhase::OurTurn { .. } => {
                    if let Some(until) = session.timers.next_due() {
                        clock.set(until);
                        stack
                            .poll_timers(&mut session, &mut display)
                            .expect("poll");
                    }
                    stack
                        .handle_key(Key::Char(' '), &mut session, &mut display)
                        .expect("draw");
                }
                NegotiationPhase::AwaitingConfirmation { token } => {
                    stack
                        .handle_key(Key::Char(token), &mut session, &mut display)
                        .expect("confirm");
                }
                NegotiationPhase::Resolved(_) => unreachable!("resolved modes pop"),
            }
        }
        assert_eq!(stack.depth(), 1);
        let decided = session.events.drain().find_map(|event| match event {
            Event::PermissionDecided {
                granted, confirmed, ..
            } => Some((granted, confirmed)),
            _ => None,
        });
        let (granted, confirmed) = decided.expect("decision event");
        assert!(confirmed);
        assert_eq!(granted, session.status.has_permission(clock.now()));
        assert!(session.timers.is_empty());
    }

    #[test]
    fn wrong_token_is_denied() {
        let (mut session, clock) = session();
        let mut display = FakeDisplay::default();
        let mut stack = negotiating(&mut session, &mut display);
        let mut guard = 0;
        while let Some(NegotiationPhase::YourTurn { .. } | NegotiationPhase::OurTurn { .. }) =
            phase(&stack)
        {
            guard += 1;
            assert!(guard < 500, "never reached confirmation");
            if let Some(until) = session.timers.next_due() {
                clock.set(until);
            }
            stack
                .handle_key(Key::Char(' '), &mut session, &mut display)
                .expect("draw");
        }
        let Some(NegotiationPhase::AwaitingConfirmation { token }) = phase(&stack) else {
            panic!("expected confirmation");
        };
        let wrong = if token == 'a' { 'b' } else { 'a' };
        stack
            .handle_key(Key::Char(wrong), &mut session, &mut display)
            .expect("confirm");
        assert_eq!(stack.depth(), 1);
        assert!(!session.status.has_permission(clock.now()));
        assert!(session.status.ask_blocked_until() >= clock.now() + chrono::Duration::minutes(30));
    }
}

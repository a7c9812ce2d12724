use super::{
    BestOfMode, InputEvent, Key, Mode, ModeCtx, ModeResult, NegotiateMode, PickerSelectMode,
    Transition,
};
use crate::status::capitalize;
use crate::{
    Align, BestOfMatch, Event, ItemId, Negotiation, Picker, SessionError, Side, TimerId,
    TimerKind,
};
use chrono::Duration;
use tracing::{info, warn};

/// The base mode: shows one item at a time from the current picker.
#[derive(Debug, Clone)]
pub struct BrowseMode {
    picker: Picker,
    current: Option<ItemId>,
    auto_advance: Option<TimerId>,
}

impl BrowseMode {
    pub fn new(picker: Picker) -> Self {
        Self {
            picker,
            current: None,
            auto_advance: None,
        }
    }

    pub fn picker(&self) -> &Picker {
        &self.picker
    }

    pub fn current(&self) -> Option<ItemId> {
        self.current
    }

    pub fn auto_advance(&self) -> bool {
        self.auto_advance.is_some()
    }

    pub(super) fn activate(
        &mut self,
        ctx: &mut ModeCtx<'_>,
        resume: Option<ModeResult>,
    ) -> Result<(), SessionError> {
        let show_next = match resume {
            Some(ModeResult::PickerChosen(picker)) => {
                self.set_picker(ctx, picker);
                true
            }
            Some(ModeResult::Verdict(verdict)) => {
                self.reshow(ctx);
                ctx.display.show_message(&verdict.message(), Align::Center);
                false
            }
            Some(ModeResult::Match(result)) => {
                self.reshow(ctx);
                let lines = vec![
                    format!(
                        "{} won the match by {}",
                        capitalize(result.winner.subject()),
                        result.margin
                    ),
                    ctx.session.status.position_line(),
                ];
                ctx.display.show_message(&lines, Align::Center);
                false
            }
            None => {
                if self.current.is_some() {
                    self.reshow(ctx);
                }
                self.current.is_none()
            }
        };
        self.set_title(ctx);
        if self.auto_advance.is_some() {
            self.arm_timer(ctx);
        }
        if show_next {
            self.next(ctx)?;
        }
        Ok(())
    }

    pub(super) fn handle_event(
        &mut self,
        ctx: &mut ModeCtx<'_>,
        event: InputEvent,
    ) -> Result<Transition, SessionError> {
        let key = match event {
            InputEvent::Timer(timer) => {
                if timer.kind == TimerKind::AutoAdvance && Some(timer.id) == self.auto_advance {
                    self.arm_timer(ctx);
                    self.next(ctx)?;
                }
                return Ok(Transition::Stay);
            }
            InputEvent::Key(key) => key,
        };
        match key {
            Key::Char(' ' | 'n') => self.next(ctx)?,
            Key::Char('p') => {
                let mode = PickerSelectMode::new(&ctx.session.config);
                return Ok(Transition::Push(Mode::PickerSelect(mode)));
            }
            Key::Char('m') => {
                let picker = ctx.session.config.mood_picker(&ctx.session.status);
                self.set_picker(ctx, picker);
                self.next(ctx)?;
            }
            Key::Char('d') => self.toggle_deletion(ctx)?,
            Key::Char('t') => self.toggle_auto_advance(ctx),
            Key::Char('s') => {
                let lines = ctx.session.status.describe(ctx.session.now());
                ctx.display.show_message(&lines, Align::Left);
            }
            Key::Char('a') => return Ok(self.ask_permission(ctx)),
            Key::Char('c') => self.claim(ctx, Side::Us),
            Key::Char('C') => self.claim(ctx, Side::You),
            Key::Char('g') => return Ok(self.start_match(ctx)),
            _ => {}
        }
        Ok(Transition::Stay)
    }

    fn set_title(&self, ctx: &mut ModeCtx<'_>) {
        let auto = if self.auto_advance.is_some() { " (auto)" } else { "" };
        ctx.display
            .set_title(&format!("Browse: {}{auto}", self.picker.name()));
    }

    fn set_picker(&mut self, ctx: &mut ModeCtx<'_>, picker: Picker) {
        info!(picker = picker.name(), "browse picker changed");
        ctx.session.events.push(Event::PickerChanged {
            name: picker.name().to_string(),
        });
        self.picker = picker;
        self.set_title(ctx);
    }

    fn next(&mut self, ctx: &mut ModeCtx<'_>) -> Result<(), SessionError> {
        let drawn = ctx.session.draw_with_fallback(&self.picker)?;
        if drawn.fallback.is_some() {
            self.set_picker(ctx, Picker::all_items());
        }
        self.current = Some(drawn.item.id);
        ctx.session.events.push(Event::ItemShown {
            id: drawn.item.id,
            picker: self.picker.name().to_string(),
        });
        ctx.display.show_item(&drawn.item);
        if let Some(err) = &drawn.fallback {
            let lines = vec![err.to_string(), "Showing all items instead".to_string()];
            ctx.display.show_message(&lines, Align::Center);
        }
        Ok(())
    }

    fn reshow(&self, ctx: &mut ModeCtx<'_>) {
        let item = self
            .current
            .and_then(|id| ctx.session.collection.get(id))
            .cloned();
        if let Some(item) = item {
            ctx.display.show_item(&item);
        }
    }

    fn toggle_deletion(&mut self, ctx: &mut ModeCtx<'_>) -> Result<(), SessionError> {
        let Some(id) = self.current else {
            return Ok(());
        };
        let marked = ctx.session.toggle_deletion(id)?;
        self.reshow(ctx);
        let line = if marked {
            "Marked for deletion"
        } else {
            "Deletion mark removed"
        };
        ctx.display.show_message(&[line.to_string()], Align::Center);
        Ok(())
    }

    fn arm_timer(&mut self, ctx: &mut ModeCtx<'_>) {
        if let Some(previous) = self.auto_advance.take() {
            ctx.session.timers.cancel(previous);
        }
        let delay = ctx.session.config.browse.auto_advance_seconds.max(1);
        let due = ctx.session.now() + Duration::seconds(delay as i64);
        self.auto_advance = Some(ctx.session.timers.schedule(ctx.id, due, TimerKind::AutoAdvance));
    }

    fn toggle_auto_advance(&mut self, ctx: &mut ModeCtx<'_>) {
        let line = match self.auto_advance.take() {
            Some(timer) => {
                ctx.session.timers.cancel(timer);
                "Auto-advance off".to_string()
            }
            None => {
                self.arm_timer(ctx);
                format!(
                    "Auto-advance every {}s",
                    ctx.session.config.browse.auto_advance_seconds.max(1)
                )
            }
        };
        self.set_title(ctx);
        ctx.display.show_message(&[line], Align::Center);
    }

    fn ask_permission(&mut self, ctx: &mut ModeCtx<'_>) -> Transition {
        let now = ctx.session.now();
        let status = &ctx.session.status;
        if status.has_permission(now) {
            let line = format!(
                "Permission already given until {}",
                status.perm_until().format("%H:%M")
            );
            ctx.display.show_message(&[line], Align::Center);
            return Transition::Stay;
        }
        if !status.can_ask_permission(now) {
            let line = if status.points() <= 0 {
                "Only our lead allows asking".to_string()
            } else {
                format!(
                    "Asking blocked until {}",
                    status.ask_blocked_until().format("%H:%M")
                )
            };
            ctx.display.show_message(&[line], Align::Center);
            return Transition::Stay;
        }
        let setup = &ctx.session.config.permission;
        match setup.allocate(ctx.session.collection.as_ref()) {
            Ok(allocation) => {
                let negotiation = Negotiation::new(
                    allocation,
                    &setup.rules,
                    status.params().break_minutes,
                    now,
                );
                ctx.session.events.push(Event::NegotiationStarted {
                    your_draws: allocation.your_draws,
                    our_draws: allocation.our_draws,
                });
                Transition::Push(Mode::Negotiate(NegotiateMode::new(negotiation)))
            }
            Err(err) => {
                warn!(error = %err, "cannot start negotiation");
                ctx.display
                    .show_message(&[format!("Cannot negotiate: {err}")], Align::Center);
                Transition::Stay
            }
        }
    }

    fn claim(&mut self, ctx: &mut ModeCtx<'_>, claimant: Side) {
        let before = ctx.session.status.points();
        let now = ctx.session.now();
        let today = ctx.session.today();
        let outcome = ctx.session.status.resolve_claim(claimant, now, today);
        ctx.session.note_points(before, "claim");
        let lines = vec![outcome.message(), ctx.session.status.position_line()];
        ctx.display.show_message(&lines, Align::Center);
    }

    fn start_match(&mut self, ctx: &mut ModeCtx<'_>) -> Transition {
        match BestOfMatch::start(&ctx.session.config.bestof.rules, &ctx.session.status) {
            Ok(game) => Transition::Push(Mode::BestOf(BestOfMode::new(game))),
            Err(err) => {
                ctx.display.show_message(&[err.to_string()], Align::Center);
                Transition::Stay
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{items, session, session_with, FakeDisplay};
    use super::super::ProgramStack;
    use super::*;
    use crate::Collection;

    fn start(
        session: &mut crate::Session,
        display: &mut FakeDisplay,
        picker: Picker,
    ) -> ProgramStack {
        ProgramStack::new(Mode::Browse(BrowseMode::new(picker)), session, display).expect("stack")
    }

    fn browse(stack: &ProgramStack) -> &BrowseMode {
        match stack.top() {
            Some(Mode::Browse(mode)) => mode,
            other => panic!("expected browse on top, got {other:?}"),
        }
    }

    #[test]
    fn next_draws_from_the_current_picker() {
        let (mut session, _clock) = session();
        let mut display = FakeDisplay::default();
        let plus = session.config.picker("plus").cloned().expect("plus");
        let mut stack = start(&mut session, &mut display, plus);
        for _ in 0..10 {
            stack
                .handle_key(Key::Char('n'), &mut session, &mut display)
                .expect("next");
        }
        assert_eq!(display.items.len(), 11);
        assert!(display.items.iter().all(|id| id % 2 == 1));
        assert_eq!(display.title, "Browse: plus");
    }

    #[test]
    fn empty_picker_falls_back_to_all_items() {
        let (mut session, _clock) = session();
        let mut display = FakeDisplay::default();
        let nothing = session.config.picker("nothing").cloned().expect("nothing");
        let stack = start(&mut session, &mut display, nothing);
        assert_eq!(display.items.len(), 1);
        assert!(display.last_message().contains("Showing all items instead"));
        assert_eq!(browse(&stack).picker().name(), "All");
    }

    #[test]
    fn empty_collection_is_an_error() {
        let (mut session, _clock) = session_with(Vec::new(), 1);
        let mut display = FakeDisplay::default();
        let result = ProgramStack::new(
            Mode::Browse(BrowseMode::new(Picker::all_items())),
            &mut session,
            &mut display,
        );
        assert!(matches!(result, Err(SessionError::Picker(_))));
    }

    #[test]
    fn mood_picker_follows_the_ledger() {
        let (mut session, _clock) = session();
        let mut display = FakeDisplay::default();
        let mut stack = start(&mut session, &mut display, Picker::all_items());
        session.status.set_points(-3);
        stack
            .handle_key(Key::Char('m'), &mut session, &mut display)
            .expect("mood");
        assert_eq!(browse(&stack).picker().name(), "minus");
        assert!(display.items.last().is_some_and(|id| id % 2 == 0));
    }

    #[test]
    fn deletion_mark_toggles() {
        let (mut session, _clock) = session();
        let mut display = FakeDisplay::default();
        let mut stack = start(&mut session, &mut display, Picker::all_items());
        let id = browse(&stack).current().expect("current");
        stack
            .handle_key(Key::Char('d'), &mut session, &mut display)
            .expect("mark");
        assert!(session.collection.get(id).is_some_and(|item| item.marked_for_deletion));
        assert_eq!(display.last_message(), "Marked for deletion");
        stack
            .handle_key(Key::Char('d'), &mut session, &mut display)
            .expect("unmark");
        assert!(session.collection.get(id).is_some_and(|item| !item.marked_for_deletion));
    }

    #[test]
    fn auto_advance_fires_on_the_tick() {
        let (mut session, clock) = session();
        let mut display = FakeDisplay::default();
        let mut stack = start(&mut session, &mut display, Picker::all_items());
        stack
            .handle_key(Key::Char('t'), &mut session, &mut display)
            .expect("auto on");
        assert!(browse(&stack).auto_advance());
        assert_eq!(stack.poll_timers(&mut session, &mut display).expect("poll"), 0);
        clock.advance(Duration::seconds(5));
        let shown = display.items.len();
        assert_eq!(stack.poll_timers(&mut session, &mut display).expect("poll"), 1);
        assert_eq!(display.items.len(), shown + 1);
        assert_eq!(session.timers.len(), 1, "rearmed");
        stack
            .handle_key(Key::Char('t'), &mut session, &mut display)
            .expect("auto off");
        assert!(session.timers.is_empty());
    }

    #[test]
    fn asking_needs_our_lead() {
        let (mut session, _clock) = session();
        let mut display = FakeDisplay::default();
        let mut stack = start(&mut session, &mut display, Picker::all_items());
        stack
            .handle_key(Key::Char('a'), &mut session, &mut display)
            .expect("ask");
        assert_eq!(stack.depth(), 1);
        assert_eq!(display.last_message(), "Only our lead allows asking");

        session.status.set_points(4);
        stack
            .handle_key(Key::Char('a'), &mut session, &mut display)
            .expect("ask");
        assert_eq!(stack.top().map(Mode::name), Some("negotiate"));
    }

    #[test]
    fn claim_on_undecided_ledger_changes_nothing() {
        let (mut session, _clock) = session();
        let mut display = FakeDisplay::default();
        let mut stack = start(&mut session, &mut display, Picker::all_items());
        stack
            .handle_key(Key::Char('c'), &mut session, &mut display)
            .expect("claim");
        assert_eq!(session.status.points(), 0);
        assert!(display.last_message().starts_with("Undecided position"));
        assert!(!session
            .events
            .drain()
            .any(|event| matches!(event, Event::PointsChanged { .. })));
    }

    #[test]
    fn game_needs_an_undecided_ledger() {
        let (mut session, _clock) = session();
        let mut display = FakeDisplay::default();
        let mut stack = start(&mut session, &mut display, Picker::all_items());
        session.status.set_points(2);
        stack
            .handle_key(Key::Char('g'), &mut session, &mut display)
            .expect("game");
        assert_eq!(stack.depth(), 1);
        session.status.set_points(0);
        stack
            .handle_key(Key::Char('g'), &mut session, &mut display)
            .expect("game");
        assert_eq!(stack.top().map(Mode::name), Some("best-of"));
    }

    #[test]
    fn picker_selection_replaces_the_picker() {
        let (mut session, _clock) = session_with(items(), 3);
        let mut display = FakeDisplay::default();
        let mut stack = start(&mut session, &mut display, Picker::all_items());
        for key in [Key::Char('p'), Key::Down, Key::Char(' '), Key::Enter] {
            stack
                .handle_key(key, &mut session, &mut display)
                .expect("select");
        }
        assert_eq!(stack.depth(), 1);
        let mode = browse(&stack);
        assert_eq!(mode.picker().name(), "Selection");
        assert!(display.items.last().is_some_and(|id| id % 2 == 1));
    }
}

//! The mode stack. Only the top mode receives input, and the base mode is
//! never popped. Each pushed mode gets a fresh id that owns its timers.

use crate::{DisplaySurface, MatchResult, Picker, Session, SessionError, Timer, Verdict};
use tracing::{debug, warn};

mod bestof;
mod browse;
mod negotiate;
mod picker_select;

pub use bestof::BestOfMode;
pub use browse::BrowseMode;
pub use negotiate::NegotiateMode;
pub use picker_select::PickerSelectMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Esc,
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key(Key),
    Timer(Timer),
}

/// Handed to the mode that becomes top when the one above it pops.
#[derive(Debug, Clone)]
pub enum ModeResult {
    PickerChosen(Picker),
    Verdict(Verdict),
    Match(MatchResult),
}

#[derive(Debug)]
pub enum Transition {
    Stay,
    Push(Mode),
    Pop(Option<ModeResult>),
}

#[derive(Debug)]
pub enum Mode {
    Browse(BrowseMode),
    PickerSelect(PickerSelectMode),
    Negotiate(NegotiateMode),
    BestOf(BestOfMode),
}

/// What a mode sees while it handles an event.
pub struct ModeCtx<'a> {
    pub id: ModeId,
    pub session: &'a mut Session,
    pub display: &'a mut dyn DisplaySurface,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Browse(_) => "browse",
            Mode::PickerSelect(_) => "picker-select",
            Mode::Negotiate(_) => "negotiate",
            Mode::BestOf(_) => "best-of",
        }
    }

    fn activate(
        &mut self,
        ctx: &mut ModeCtx<'_>,
        resume: Option<ModeResult>,
    ) -> Result<(), SessionError> {
        match self {
            Mode::Browse(mode) => mode.activate(ctx, resume),
            Mode::PickerSelect(mode) => mode.activate(ctx),
            Mode::Negotiate(mode) => mode.activate(ctx),
            Mode::BestOf(mode) => mode.activate(ctx),
        }
    }

    fn handle_event(
        &mut self,
        ctx: &mut ModeCtx<'_>,
        event: InputEvent,
    ) -> Result<Transition, SessionError> {
        match self {
            Mode::Browse(mode) => mode.handle_event(ctx, event),
            Mode::PickerSelect(mode) => mode.handle_event(ctx, event),
            Mode::Negotiate(mode) => mode.handle_event(ctx, event),
            Mode::BestOf(mode) => mode.handle_event(ctx, event),
        }
    }
}

#[derive(Debug)]
struct Frame {
    id: ModeId,
    mode: Mode,
}

#[derive(Debug)]
pub struct ProgramStack {
    frames: Vec<Frame>,
    next_id: u64,
}

impl ProgramStack {
    /// Installs and activates the base mode.
    pub fn new(
        base: Mode,
        session: &mut Session,
        display: &mut dyn DisplaySurface,
    ) -> Result<Self, SessionError> {
        let mut stack = Self {
            frames: Vec::new(),
            next_id: 0,
        };
        stack.push(base, session, display)?;
        Ok(stack)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> Option<&Mode> {
        self.frames.last().map(|frame| &frame.mode)
    }

    pub fn top_id(&self) -> Option<ModeId> {
        self.frames.last().map(|frame| frame.id)
    }

    pub fn handle_key(
        &mut self,
        key: Key,
        session: &mut Session,
        display: &mut dyn DisplaySurface,
    ) -> Result<(), SessionError> {
        self.dispatch(InputEvent::Key(key), session, display)
    }

    /// Delivers due timers to the top mode. Timers owned by any other mode
    /// are dropped unseen. Returns how many were delivered.
    pub fn poll_timers(
        &mut self,
        session: &mut Session,
        display: &mut dyn DisplaySurface,
    ) -> Result<usize, SessionError> {
        let fired = session.timers.take_due(session.now());
        let mut delivered = 0;
        for timer in fired {
            if Some(timer.owner) != self.top_id() {
                debug!(timer = timer.id, owner = timer.owner.0, "discarding stale timer");
                continue;
            }
            self.dispatch(InputEvent::Timer(timer), session, display)?;
            delivered += 1;
        }
        Ok(delivered)
    }

    fn dispatch(
        &mut self,
        event: InputEvent,
        session: &mut Session,
        display: &mut dyn DisplaySurface,
    ) -> Result<(), SessionError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let mut ctx = ModeCtx {
            id: frame.id,
            session: &mut *session,
            display: &mut *display,
        };
        let transition = frame.mode.handle_event(&mut ctx, event)?;
        match transition {
            Transition::Stay => Ok(()),
            Transition::Push(mode) => self.push(mode, session, display),
            Transition::Pop(result) => self.pop(result, session, display),
        }
    }

    fn push(
        &mut self,
        mode: Mode,
        session: &mut Session,
        display: &mut dyn DisplaySurface,
    ) -> Result<(), SessionError> {
        self.next_id += 1;
        let id = ModeId(self.next_id);
        debug!(mode = mode.name(), id = id.0, "push mode");
        self.frames.push(Frame { id, mode });
        self.activate_top(None, session, display)
    }

    fn pop(
        &mut self,
        result: Option<ModeResult>,
        session: &mut Session,
        display: &mut dyn DisplaySurface,
    ) -> Result<(), SessionError> {
        if self.frames.len() <= 1 {
            warn!("base mode asked to pop, ignoring");
            return Ok(());
        }
        if let Some(frame) = self.frames.pop() {
            let dropped = session.timers.cancel_owner(frame.id);
            debug!(mode = frame.mode.name(), id = frame.id.0, dropped, "pop mode");
        }
        self.activate_top(result, session, display)
    }

    fn activate_top(
        &mut self,
        resume: Option<ModeResult>,
        session: &mut Session,
        display: &mut dyn DisplaySurface,
    ) -> Result<(), SessionError> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let mut ctx = ModeCtx {
            id: frame.id,
            session,
            display,
        };
        frame.mode.activate(&mut ctx, resume)
    }
}

//! The explicit context every mode works against, and the display surface
//! the modes draw on.

use crate::{
    BestOfError, Clock, Collection, CollectionError, ConfigError, Event, EventBus, Item, ItemId,
    NegotiationError, Picker, PickerError, ResolvedConfig, RngState, Status, StatusError,
    TimerQueue,
};
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("picker error: {0}")]
    Picker(#[from] PickerError),
    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),
    #[error("negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),
    #[error("best-of error: {0}")]
    BestOf(#[from] BestOfError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("status error: {0}")]
    Status(#[from] StatusError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    Left,
    #[default]
    Center,
}

/// Where modes put what the user sees.
pub trait DisplaySurface {
    fn show_item(&mut self, item: &Item);
    fn show_message(&mut self, lines: &[String], align: Align);
    fn set_title(&mut self, title: &str);
}

/// An item drawn for display, and the error that forced the all-items
/// picker when the requested picker came up empty.
#[derive(Debug, Clone)]
pub struct Drawn {
    pub item: Item,
    pub fallback: Option<PickerError>,
}

pub struct Session {
    pub collection: Box<dyn Collection>,
    pub status: Status,
    pub config: ResolvedConfig,
    pub rng: RngState,
    pub clock: Box<dyn Clock>,
    pub timers: TimerQueue,
    pub events: EventBus,
}

impl Session {
    pub fn new(
        collection: Box<dyn Collection>,
        status: Status,
        config: ResolvedConfig,
        rng: RngState,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            collection,
            status,
            config,
            rng,
            clock,
            timers: TimerQueue::new(),
            events: EventBus::default(),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Applies decay for days without a check-in.
    pub fn check_in(&mut self) -> Option<String> {
        let before = self.status.points();
        let today = self.today();
        let message = self.status.apply_daily_decay(today);
        self.note_points(before, "daily decay");
        message
    }

    /// Records a ledger change on the event bus when there was one.
    pub fn note_points(&mut self, before: i64, reason: &str) {
        let after = self.status.points();
        if before != after {
            self.events.push(Event::PointsChanged {
                before,
                after,
                reason: reason.to_string(),
            });
        }
    }

    pub fn draw(&mut self, picker: &Picker) -> Result<Item, PickerError> {
        picker.draw(self.collection.as_ref(), &mut self.rng)
    }

    /// Draws from `picker`, falling back to every item when its selection is
    /// empty. Fails only when the whole collection is empty.
    pub fn draw_with_fallback(&mut self, picker: &Picker) -> Result<Drawn, PickerError> {
        match self.draw(picker) {
            Ok(item) => Ok(Drawn {
                item,
                fallback: None,
            }),
            Err(err) => {
                warn!(picker = picker.name(), error = %err, "falling back to all items");
                self.events.push(Event::PickerFailed {
                    picker: picker.name().to_string(),
                    reason: err.to_string(),
                });
                let item = self.draw(&Picker::all_items())?;
                Ok(Drawn {
                    item,
                    fallback: Some(err),
                })
            }
        }
    }

    pub fn toggle_deletion(&mut self, id: ItemId) -> Result<bool, CollectionError> {
        let marked = !self
            .collection
            .get(id)
            .map(|current| current.marked_for_deletion)
            .ok_or(CollectionError::Missing(id))?;
        self.collection.mark_for_deletion(id, marked)?;
        info!(item = id, marked, "deletion mark changed");
        self.events.push(Event::DeletionMarked { id, marked });
        Ok(marked)
    }
}

use crate::{ItemId, Side};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    ItemShown {
        id: ItemId,
        picker: String,
    },
    PickerChanged {
        name: String,
    },
    PickerFailed {
        picker: String,
        reason: String,
    },
    DeletionMarked {
        id: ItemId,
        marked: bool,
    },
    PointsChanged {
        before: i64,
        after: i64,
        reason: String,
    },
    NegotiationStarted {
        your_draws: u32,
        our_draws: u32,
    },
    NegotiationDraw {
        side: Side,
        value: i64,
        penalty: u32,
    },
    PermissionDecided {
        granted: bool,
        confirmed: bool,
        block_minutes: Option<i64>,
    },
    BestOfRound {
        winner: Side,
        value: u32,
    },
    BestOfDecided {
        winner: Side,
        margin: i64,
        awarded: i64,
    },
}

#[derive(Debug, Default)]
pub struct EventBus {
    queue: Vec<Event>,
}

impl EventBus {
    pub fn push(&mut self, event: Event) {
        self.queue.push(event);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.queue.drain(..)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

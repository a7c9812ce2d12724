//! Picker, ledger and game logic for the picture library. Keep this crate
//! free of IO and platform concerns.

pub mod bestof;
pub mod clock;
pub mod collection;
pub mod config;
pub mod events;
pub mod item;
pub mod negotiation;
pub mod picker;
pub mod predicate;
pub mod program;
pub mod rng;
pub mod session;
pub mod status;
pub mod timer;

pub use bestof::*;
pub use clock::*;
pub use collection::*;
pub use config::*;
pub use events::*;
pub use item::*;
pub use negotiation::*;
pub use picker::*;
pub use predicate::*;
pub use program::*;
pub use rng::*;
pub use session::*;
pub use status::*;
pub use timer::*;

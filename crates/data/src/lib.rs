//! Reading and writing the library directory: configuration, item index
//! and the status record.

pub mod library;
pub mod load;
pub mod store;

pub use library::*;
pub use load::*;
pub use store::*;

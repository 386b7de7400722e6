//! Domain models for realm backup and restore

pub mod element;
pub mod records;
pub mod snapshot;

pub use element::*;
pub use records::*;
pub use snapshot::*;

//! Sarafi Common Types
//!
//! Shared types used across the Sarafi back office. Includes identifiers,
//! monetary types, the common error enum and reporting time ranges.

pub mod identifiers;
pub mod monetary;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
pub use time::*;

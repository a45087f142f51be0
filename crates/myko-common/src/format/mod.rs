//! Entry admission
//!
//! Keeps the aggregation key unambiguous:
//! - [`verify`]: reject entries that collide with the key delimiter
//! - [`escape`]: rewrite delimiter occurrences first (legacy compatibility);
//!   escaped entries are still verified

pub mod escape;
pub mod verify;

pub use escape::escape;
pub use verify::{verify, verify_all};

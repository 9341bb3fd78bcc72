//! Database module.
//!
//! Append-only SQLite log of probe observations.

mod models;
mod store;

pub use models::*;
pub use store::*;

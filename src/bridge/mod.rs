//! The Cascade detector bridge.
//!
//! [`database`] declares the served variables, [`CascadeDriver`] implements
//! the write dispatch and the per-cycle refresh, and [`poll::run`] drives the
//! refresh on a timer.

pub mod database;
pub mod driver;
pub mod poll;
pub mod save;

pub use database::{cascade_database, DetectorState};
pub use driver::CascadeDriver;

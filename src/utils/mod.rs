//! Utility functions shared by storage and services.

pub mod bootstrap;
pub mod clock;
pub mod codes;
pub mod retry;

pub use clock::{format_ts, month_start, parse_ts, Clock, FixedClock, SystemClock};
pub use retry::retry_conflicts;

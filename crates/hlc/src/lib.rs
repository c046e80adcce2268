//! `chronicle-hlc` — hybrid logical clock.
//!
//! Produces timestamps combining physical time with a logical tie-breaking
//! counter, preserving causal order without requiring synchronized clocks.

pub mod clock;
pub mod time;

pub use clock::{ClockError, HybridClock};
pub use time::{ManualTimeProvider, PhysicalTimeProvider, SystemTimeProvider};

//! Small, transport- and game-agnostic helpers shared by the networking layer
//! and its embedding binary.

pub mod log;
pub mod ptr_key;
pub mod watchdog;

pub use ptr_key::PtrKey;
pub use watchdog::{escalate, watch, WatchdogOutcome};

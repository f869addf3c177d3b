//! Sliding-window usage accounting per backend.

mod ledger;
mod window;

pub use ledger::UsageLedger;
pub use window::{UsageSnapshot, UsageWindow, WINDOW};

//! Service modules for berth.
//!
//! - The registry owns the name to supervisor mapping
//! - Each supervisor owns one container and runs its reconcile loop

pub mod registry;
pub mod supervisor;

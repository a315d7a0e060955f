//! Reconciliation of provider state into local call assignments.
//!
//! - [`identity`]: binds provider jobs to assignments
//! - [`status`]: merges terminal call outcomes page by page
//! - [`followup`]: writes exactly one follow-up note per terminal
//!   assignment
//!
//! Every write these services make is guarded in the store, so passes for
//! the same campaign may overlap safely.

mod error;
pub mod followup;
pub mod identity;
pub mod status;

pub use error::{ReconcileError, ReconcileResult};
pub use followup::{DeferReason, FollowUpGenerator, FollowUpOutcome, FollowUpTally, SkipReason};
pub use identity::{IdentityIndex, IdentitySync, Resolution, SyncReport};
pub use status::{ReconcileReport, ReconcileSettings, StatusReconciler};

#[cfg(test)]
mod tests;

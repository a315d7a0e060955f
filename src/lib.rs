//! Outcall: reconciliation engine for outbound voice-bot calling campaigns.
//!
//! A campaign dials a set of leads through an external call provider. This
//! crate keeps the local record of each call in step with the provider,
//! derives one follow-up note per finished call and moves the campaign
//! through `calling`, `completed` and `followed_up` exactly when the
//! aggregate counts allow it.
//!
//! # Architecture
//!
//! Each bounded context follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (database, APIs, etc.)
//!
//! # Modules
//!
//! - [`campaign`]: Campaigns, call assignments, follow-up notes and their
//!   persistence
//! - [`provider`]: Call provider port and adapters
//! - [`classifier`]: Transcript classification port, prompt and analysis
//!   parsing
//! - [`reconcile`]: Identity resolution, status reconciliation and
//!   follow-up generation
//! - [`scheduler`]: Poll passes, decaying schedule and named work queues
//! - [`api`]: Envelope-returning operations for callers

pub mod api;
pub mod cache;
pub mod campaign;
pub mod classifier;
pub mod config;
pub mod provider;
pub mod reconcile;
pub mod retry;
pub mod scheduler;
pub mod telemetry;

#[cfg(test)]
mod test_support;

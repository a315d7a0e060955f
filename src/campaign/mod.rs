//! Campaign records, call assignments and completion tracking.
//!
//! A campaign owns one call assignment per lead; each assignment is
//! correlated to exactly one provider job and, once its call is terminal,
//! to exactly one follow-up note. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;

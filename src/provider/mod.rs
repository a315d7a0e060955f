//! External call provider boundary.
//!
//! - Domain types in [`domain`]: normalized jobs, states and identifiers
//! - Port contract in [`ports`]: the [`ports::CallProvider`] trait
//! - Adapter implementations in [`adapters`]: HTTP and scripted in-memory

pub mod adapters;
pub mod domain;
pub mod ports;

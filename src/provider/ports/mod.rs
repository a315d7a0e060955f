//! Port contracts for the external call provider.

pub mod client;

pub use client::{CallProvider, ProviderError, ProviderResult};

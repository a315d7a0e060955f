//! AI classification of call transcripts.
//!
//! - Domain types in [`domain`]: prompt templates and output parsing
//! - Port contract in [`ports`]: the [`ports::Classifier`] trait
//! - Adapter implementations in [`adapters`]: OpenAI-compatible HTTP and
//!   scripted in-memory

pub mod adapters;
pub mod domain;
pub mod ports;

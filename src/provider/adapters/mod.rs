//! Adapter implementations of the call provider port.

pub mod http;
pub mod memory;

pub use http::HttpCallProvider;
pub use memory::ScriptedCallProvider;

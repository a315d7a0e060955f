//! Adapter implementations of the campaign store ports.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryCampaignStore;
pub use postgres::{CampaignPgPool, PostgresCampaignStore};

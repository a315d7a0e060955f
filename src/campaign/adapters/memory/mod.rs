//! In-memory adapters for campaign persistence.

mod store;

pub use store::InMemoryCampaignStore;

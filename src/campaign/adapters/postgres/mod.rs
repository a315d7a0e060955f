//! `PostgreSQL` adapters for campaign persistence.

mod models;
mod schema;
mod store;

pub use store::{CampaignPgPool, PostgresCampaignStore};

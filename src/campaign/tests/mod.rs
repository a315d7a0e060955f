//! Unit tests for the campaign context.

mod domain_tests;
mod lifecycle_service_tests;

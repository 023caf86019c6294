//! Integration tests for tripsql.
//!
//! Pipeline tests run over the mock generator and engine. The engine tests
//! need a running PostgreSQL database; set DATABASE_URL to run them.

pub mod catalog_test;
pub mod common;
pub mod engine_test;
pub mod scenarios_test;
pub mod validator_test;

//! tripsql - natural-language analytics over a curated trip-data warehouse.
//!
//! This library exposes the pipeline stages for the binary and for
//! integration tests.

pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod query;
pub mod retry;
pub mod safety;
pub mod summary;

//! Alpha Hunter: aggregator-quoted token acquisition with tiered take-profit
//! monitoring.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod aggregator;
pub mod chain;
pub mod config;
pub mod engine;
pub mod quote;
pub mod storage;
pub mod types;
pub mod units;

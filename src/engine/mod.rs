//! Core engine: buy, value, take profit, repeat.

pub mod acquire;
pub mod monitor;
pub mod profit;

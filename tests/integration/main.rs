//! Integration tests: the engine end to end over an in-memory market.

mod lifecycle;
mod mock_chain;

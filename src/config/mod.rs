//! Configuration for the blockchain queue worker.
//!
//! All settings come from environment variables (a `.env` file is honoured by
//! the binary). Nothing here fails: missing or malformed values fall back to
//! the defaults in [`crate::constants`].
mod worker_config;
pub use worker_config::*;

//! This module contains all the constant values used in the worker
mod worker;
pub use worker::*;

mod offchain;
pub use offchain::*;

//! Initialization routines for the worker process
//!
//! - `initialize_app_state`: builds the component graph
//! - `initialize_workers`: startup gate, stats reporter, shutdown
mod initialize_app_state;
pub use initialize_app_state::*;

mod initialize_workers;
pub use initialize_workers::*;

//! # Services Module
//!
//! External collaborators of the worker: the offchain registry API that
//! executes jobs, and the orchestrator webhook that hears about results.

mod offchain;
pub use offchain::*;

mod notification;
pub use notification::*;

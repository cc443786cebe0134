mod queue;
pub use queue::*;

mod job;
pub use job::*;

mod startup;
pub use startup::*;

mod serde;
pub use serde::*;

mod redact;
pub use redact::*;

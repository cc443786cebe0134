mod error;
pub use error::*;

mod job_result;
pub use job_result::*;

mod notification;
pub use notification::*;

mod secret_string;
pub use secret_string::*;

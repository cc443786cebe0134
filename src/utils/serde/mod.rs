mod id_as_string;
pub use id_as_string::*;

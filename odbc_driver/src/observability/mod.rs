pub mod logging;

pub use logging::{log_connection, redact_connection_string};

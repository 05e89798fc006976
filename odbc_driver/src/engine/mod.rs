pub mod connection;
pub mod diagnostics;
pub mod driver;
pub mod environment;

pub use connection::{is_ms_access_connection_string, OdbcConnection};
pub use driver::Driver;
pub use environment::OdbcEnvironment;

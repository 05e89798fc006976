mod async_bridge;
pub mod config;
pub mod engine;
mod error;
mod handles;
pub mod native;
pub mod observability;
pub mod pool;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::{ConnectionPooling, DriverConfig, OdbcVersion, PoolMatch};
pub use engine::{is_ms_access_connection_string, Driver, OdbcConnection, OdbcEnvironment};
pub use error::{
    DiagnosticError, DiagnosticRecord, ErrorCategory, OdbcError, Result,
    COMMUNICATION_LINK_FAILURE,
};
pub use handles::{HandleKind, RawHandle, StatementTracker, Stats, StatsSnapshot};
pub use native::{NativeApi, ReturnCode, SystemOdbc};
pub use pool::{ConnectionPool, OdbcConnectionManager, PoolConfig, PoolState};

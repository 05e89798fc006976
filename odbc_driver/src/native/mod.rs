//! Boundary to the ODBC driver manager.
//!
//! Everything above this module works with [`RawHandle`]s and [`ReturnCode`]s
//! through the [`NativeApi`] trait, so the lifecycle logic can run against the
//! real driver manager ([`SystemOdbc`]) or a scripted stand-in in tests.

mod system;

pub use system::SystemOdbc;

use crate::error::DiagnosticRecord;
use crate::handles::{HandleKind, RawHandle};
use std::fmt;

/// `SQLRETURN` value of a native call.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReturnCode(pub i16);

impl ReturnCode {
    pub const SUCCESS: ReturnCode = ReturnCode(0);
    pub const SUCCESS_WITH_INFO: ReturnCode = ReturnCode(1);
    pub const NO_DATA: ReturnCode = ReturnCode(100);
    pub const ERROR: ReturnCode = ReturnCode(-1);
    pub const INVALID_HANDLE: ReturnCode = ReturnCode(-2);

    /// Anything other than `SQL_SUCCESS` / `SQL_SUCCESS_WITH_INFO`.
    pub fn is_error(self) -> bool {
        !matches!(self, ReturnCode::SUCCESS | ReturnCode::SUCCESS_WITH_INFO)
    }
}

impl fmt::Debug for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            ReturnCode::SUCCESS => "SQL_SUCCESS",
            ReturnCode::SUCCESS_WITH_INFO => "SQL_SUCCESS_WITH_INFO",
            ReturnCode::NO_DATA => "SQL_NO_DATA",
            ReturnCode::ERROR => "SQL_ERROR",
            ReturnCode::INVALID_HANDLE => "SQL_INVALID_HANDLE",
            ReturnCode(other) => return write!(f, "SQLRETURN({})", other),
        };
        f.write_str(name)
    }
}

/// Environment attributes set during initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvAttribute {
    OdbcVersion,
    ConnectionPooling,
    CpMatch,
}

impl EnvAttribute {
    pub fn code(self) -> i32 {
        match self {
            EnvAttribute::OdbcVersion => 200,
            EnvAttribute::ConnectionPooling => 201,
            EnvAttribute::CpMatch => 202,
        }
    }
}

/// Outcome of reading one diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagRead {
    Record(DiagnosticRecord),
    NoData,
    Failed(ReturnCode),
}

/// The subset of the ODBC call API the handle lifecycle needs.
///
/// Implementations must be callable from several threads at once; the driver
/// manager serializes per-handle access itself.
pub trait NativeApi: Send + Sync + 'static {
    /// `SQLAllocHandle`. The returned handle is only meaningful on success.
    fn alloc_handle(&self, kind: HandleKind, parent: RawHandle) -> (ReturnCode, RawHandle);

    /// `SQLSetEnvAttr` with an integer value.
    fn set_env_attr(&self, env: RawHandle, attribute: EnvAttribute, value: usize) -> ReturnCode;

    /// `SQLDriverConnectW` in `SQL_DRIVER_NOPROMPT` mode. `connection_string`
    /// is NUL-terminated UTF-16.
    fn driver_connect(&self, conn: RawHandle, connection_string: &[u16]) -> ReturnCode;

    /// `SQLDisconnect`.
    fn disconnect(&self, conn: RawHandle) -> ReturnCode;

    /// `SQLFreeHandle`.
    fn free_handle(&self, kind: HandleKind, handle: RawHandle) -> ReturnCode;

    /// `SQLGetDiagRecW` for the 1-based `record` number.
    fn diag_record(&self, kind: HandleKind, handle: RawHandle, record: i16) -> DiagRead;
}

use super::{DiagRead, EnvAttribute, NativeApi, ReturnCode};
use crate::error::DiagnosticRecord;
use crate::handles::{HandleKind, RawHandle};
use odbc_api::sys::{
    DriverConnectOption, EnvironmentAttribute, HDbc, HEnv, Handle, HandleType, SQLAllocHandle,
    SQLDisconnect, SQLDriverConnectW, SQLFreeHandle, SQLGetDiagRecW, SQLSetEnvAttr,
};
use std::ffi::c_void;
use std::ptr::null_mut;

const SQL_NTS: i16 = -3;
const SQL_IS_UINTEGER: i32 = -5;
const SQL_MAX_MESSAGE_LENGTH: usize = 512;

/// [`NativeApi`] backed by the system ODBC driver manager (unixODBC, iODBC or
/// the Windows driver manager), using the wide-character entry points.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOdbc;

impl SystemOdbc {
    pub fn new() -> Self {
        Self
    }
}

fn handle_type(kind: HandleKind) -> HandleType {
    match kind {
        HandleKind::Environment => HandleType::Env,
        HandleKind::Connection => HandleType::Dbc,
        HandleKind::Statement => HandleType::Stmt,
    }
}

fn env_attribute(attribute: EnvAttribute) -> EnvironmentAttribute {
    match attribute {
        EnvAttribute::OdbcVersion => EnvironmentAttribute::OdbcVersion,
        EnvAttribute::ConnectionPooling => EnvironmentAttribute::ConnectionPooling,
        EnvAttribute::CpMatch => EnvironmentAttribute::CpMatch,
    }
}

fn as_handle(handle: RawHandle) -> Handle {
    Handle(handle.addr() as *mut c_void)
}

fn from_handle(handle: Handle) -> RawHandle {
    RawHandle::from_addr(handle.0 as usize)
}

fn as_henv(handle: RawHandle) -> HEnv {
    HEnv(handle.addr() as *mut c_void)
}

fn as_hdbc(handle: RawHandle) -> HDbc {
    HDbc(handle.addr() as *mut c_void)
}

fn utf16_until_nul(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}

impl NativeApi for SystemOdbc {
    fn alloc_handle(&self, kind: HandleKind, parent: RawHandle) -> (ReturnCode, RawHandle) {
        let mut out = Handle::null();
        // SAFETY: `parent` is either null (environment) or a live handle owned
        // by the caller; `out` is a valid output location.
        let ret = unsafe { SQLAllocHandle(handle_type(kind), as_handle(parent), &mut out) };
        (ReturnCode(ret.0), from_handle(out))
    }

    fn set_env_attr(&self, env: RawHandle, attribute: EnvAttribute, value: usize) -> ReturnCode {
        // SAFETY: integer attributes are passed by value in the pointer slot.
        let ret = unsafe {
            SQLSetEnvAttr(
                as_henv(env),
                env_attribute(attribute),
                value as *mut c_void,
                SQL_IS_UINTEGER,
            )
        };
        ReturnCode(ret.0)
    }

    fn driver_connect(&self, conn: RawHandle, connection_string: &[u16]) -> ReturnCode {
        if connection_string.last() != Some(&0) {
            return ReturnCode::ERROR;
        }
        // SAFETY: the string is NUL-terminated and outlives the call; no output
        // buffer is requested and no window handle is given, so the driver
        // cannot prompt.
        let ret = unsafe {
            SQLDriverConnectW(
                as_hdbc(conn),
                null_mut(),
                connection_string.as_ptr(),
                SQL_NTS,
                null_mut(),
                0,
                null_mut(),
                DriverConnectOption::NoPrompt,
            )
        };
        ReturnCode(ret.0)
    }

    fn disconnect(&self, conn: RawHandle) -> ReturnCode {
        // SAFETY: `conn` is a connected handle owned by the caller.
        let ret = unsafe { SQLDisconnect(as_hdbc(conn)) };
        ReturnCode(ret.0)
    }

    fn free_handle(&self, kind: HandleKind, handle: RawHandle) -> ReturnCode {
        // SAFETY: the caller gives up ownership of `handle` with this call.
        let ret = unsafe { SQLFreeHandle(handle_type(kind), as_handle(handle)) };
        ReturnCode(ret.0)
    }

    fn diag_record(&self, kind: HandleKind, handle: RawHandle, record: i16) -> DiagRead {
        let mut state = [0u16; 6];
        let mut native_error: i32 = 0;
        let mut message = vec![0u16; SQL_MAX_MESSAGE_LENGTH];

        loop {
            let mut text_length: i16 = 0;
            let capacity = i16::try_from(message.len()).unwrap_or(i16::MAX);
            // SAFETY: all buffers are sized as announced to the driver manager.
            let ret = unsafe {
                SQLGetDiagRecW(
                    handle_type(kind),
                    as_handle(handle),
                    record,
                    state.as_mut_ptr(),
                    &mut native_error,
                    message.as_mut_ptr(),
                    capacity,
                    &mut text_length,
                )
            };
            let ret = ReturnCode(ret.0);
            if ret == ReturnCode::NO_DATA {
                return DiagRead::NoData;
            }
            if ret.is_error() {
                return DiagRead::Failed(ret);
            }

            // Message truncated: retry once the full length is known.
            let needed = usize::try_from(text_length).unwrap_or(0) + 1;
            if needed > message.len() && message.len() < i16::MAX as usize {
                message.resize(needed.min(i16::MAX as usize), 0);
                continue;
            }

            return DiagRead::Record(DiagnosticRecord::new(
                utf16_until_nul(&state),
                native_error,
                utf16_until_nul(&message),
            ));
        }
    }
}

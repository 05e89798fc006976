//! Check-and-translate boundary for native calls.
//!
//! Callers never look at a [`ReturnCode`] beyond passing it to [`check`];
//! failures come back as a [`DiagnosticError`] read from the handle the call
//! failed on.

use crate::error::DiagnosticError;
use crate::handles::{HandleKind, RawHandle};
use crate::native::{DiagRead, NativeApi, ReturnCode};

/// Upper bound on records read from one handle.
const MAX_DIAG_RECORDS: i16 = 64;

/// Reads the diagnostic chain of `handle` into one error.
///
/// Falls back to an operation-only error when nothing can be read.
pub fn translate(
    api: &dyn NativeApi,
    operation: &str,
    kind: HandleKind,
    handle: RawHandle,
) -> DiagnosticError {
    if handle.is_null() {
        return DiagnosticError::unknown(operation);
    }

    let mut records = Vec::new();
    for number in 1..=MAX_DIAG_RECORDS {
        match api.diag_record(kind, handle, number) {
            DiagRead::Record(record) => records.push(record),
            DiagRead::NoData => break,
            DiagRead::Failed(ret) => {
                log::debug!(
                    "SQLGetDiagRecW #{} on {} {:?} returned {:?}",
                    number,
                    kind,
                    handle,
                    ret
                );
                break;
            }
        }
    }
    DiagnosticError::new(operation, records)
}

/// Maps `ret` to `Ok` on success, otherwise translates the diagnostics of
/// `handle`.
pub fn check(
    api: &dyn NativeApi,
    ret: ReturnCode,
    operation: &str,
    kind: HandleKind,
    handle: RawHandle,
) -> Result<(), DiagnosticError> {
    if !ret.is_error() {
        return Ok(());
    }
    if ret == ReturnCode::INVALID_HANDLE {
        // Diagnostics cannot be read from an invalid handle.
        return Err(DiagnosticError::unknown(operation));
    }
    Err(translate(api, operation, kind, handle))
}

/// Allocates a `kind` handle under `parent`; failures are read from the parent.
pub fn allocate(
    api: &dyn NativeApi,
    kind: HandleKind,
    parent_kind: HandleKind,
    parent: RawHandle,
) -> Result<RawHandle, DiagnosticError> {
    let (ret, handle) = api.alloc_handle(kind, parent);
    check(api, ret, "SQLAllocHandle", parent_kind, parent)?;
    if handle.is_null() {
        return Err(DiagnosticError::unknown("SQLAllocHandle"));
    }
    Ok(handle)
}

/// Frees `handle`. Releasing a null handle is a no-op.
pub fn release(
    api: &dyn NativeApi,
    kind: HandleKind,
    handle: RawHandle,
) -> Result<(), DiagnosticError> {
    if handle.is_null() {
        return Ok(());
    }
    let ret = api.free_handle(kind, handle);
    check(api, ret, "SQLFreeHandle", kind, handle)?;
    log::debug!("SQLFreeHandle released {} {:?}", kind, handle);
    Ok(())
}

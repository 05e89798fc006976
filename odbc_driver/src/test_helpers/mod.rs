//! Test support: a scripted [`NativeApi`] and `.env` loading.

use crate::error::DiagnosticRecord;
use crate::handles::{HandleKind, RawHandle};
use crate::native::{DiagRead, EnvAttribute, NativeApi, ReturnCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Load variables from a `.env` file, if present.
#[cfg(feature = "test-helpers")]
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Native entry points, used to script failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeCall {
    AllocHandle(HandleKind),
    SetEnvAttr(EnvAttribute),
    DriverConnect,
    Disconnect,
    FreeHandle(HandleKind),
    DiagRecord,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-memory driver manager.
///
/// Hands out fake handles, records every call, and fails the calls it was
/// told to fail with the given diagnostic records attached to the handle the
/// call ran against.
#[derive(Debug)]
pub struct ScriptedApi {
    next_addr: AtomicUsize,
    live: Mutex<HashMap<RawHandle, HandleKind>>,
    calls: Mutex<Vec<NativeCall>>,
    failures: Mutex<HashMap<NativeCall, Vec<DiagnosticRecord>>>,
    diagnostics: Mutex<HashMap<RawHandle, Vec<DiagnosticRecord>>>,
    env_attrs: Mutex<Vec<(EnvAttribute, usize)>>,
    connect_strings: Mutex<Vec<String>>,
    connect_delay: Mutex<Option<Duration>>,
    diagnostics_unavailable: AtomicBool,
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            next_addr: AtomicUsize::new(0x1000),
            live: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            diagnostics: Mutex::new(HashMap::new()),
            env_attrs: Mutex::new(Vec::new()),
            connect_strings: Mutex::new(Vec::new()),
            connect_delay: Mutex::new(None),
            diagnostics_unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent `call` fail with `records` as its diagnostics.
    pub fn fail_on(&self, call: NativeCall, records: Vec<DiagnosticRecord>) {
        lock(&self.failures).insert(call, records);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Sets the diagnostic chain returned for `handle`.
    pub fn push_diagnostics(&self, handle: RawHandle, records: Vec<DiagnosticRecord>) {
        lock(&self.diagnostics).insert(handle, records);
    }

    /// Makes `SQLGetDiagRecW` itself fail.
    pub fn set_diagnostics_unavailable(&self, unavailable: bool) {
        self.diagnostics_unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    /// Blocks every connect call for `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        *lock(&self.connect_delay) = Some(delay);
    }

    pub fn call_count(&self, call: NativeCall) -> usize {
        lock(&self.calls).iter().filter(|c| **c == call).count()
    }

    pub fn calls(&self) -> Vec<NativeCall> {
        lock(&self.calls).clone()
    }

    pub fn live_handles(&self, kind: HandleKind) -> usize {
        lock(&self.live).values().filter(|k| **k == kind).count()
    }

    pub fn is_live(&self, handle: RawHandle) -> bool {
        lock(&self.live).contains_key(&handle)
    }

    pub fn env_attributes(&self) -> Vec<(EnvAttribute, usize)> {
        lock(&self.env_attrs).clone()
    }

    /// Connection strings as decoded from the wide buffers passed to connect.
    pub fn connect_strings(&self) -> Vec<String> {
        lock(&self.connect_strings).clone()
    }

    fn record(&self, call: NativeCall) {
        lock(&self.calls).push(call);
    }

    /// Returns the scripted failure for `call`, attaching its records to `handle`.
    fn scripted_failure(&self, call: NativeCall, handle: RawHandle) -> Option<ReturnCode> {
        let records = lock(&self.failures).get(&call).cloned()?;
        if !handle.is_null() {
            lock(&self.diagnostics).insert(handle, records);
        }
        Some(ReturnCode::ERROR)
    }

    fn is_live_as(&self, handle: RawHandle, kind: HandleKind) -> bool {
        lock(&self.live).get(&handle) == Some(&kind)
    }
}

impl NativeApi for ScriptedApi {
    fn alloc_handle(&self, kind: HandleKind, parent: RawHandle) -> (ReturnCode, RawHandle) {
        self.record(NativeCall::AllocHandle(kind));
        let parent_ok = match kind {
            HandleKind::Environment => parent.is_null(),
            HandleKind::Connection => self.is_live_as(parent, HandleKind::Environment),
            HandleKind::Statement => self.is_live_as(parent, HandleKind::Connection),
        };
        if !parent_ok {
            return (ReturnCode::INVALID_HANDLE, RawHandle::NULL);
        }
        if let Some(ret) = self.scripted_failure(NativeCall::AllocHandle(kind), parent) {
            return (ret, RawHandle::NULL);
        }
        let handle = RawHandle::from_addr(self.next_addr.fetch_add(0x10, Ordering::SeqCst));
        lock(&self.live).insert(handle, kind);
        (ReturnCode::SUCCESS, handle)
    }

    fn set_env_attr(&self, env: RawHandle, attribute: EnvAttribute, value: usize) -> ReturnCode {
        self.record(NativeCall::SetEnvAttr(attribute));
        if !self.is_live_as(env, HandleKind::Environment) {
            return ReturnCode::INVALID_HANDLE;
        }
        if let Some(ret) = self.scripted_failure(NativeCall::SetEnvAttr(attribute), env) {
            return ret;
        }
        lock(&self.env_attrs).push((attribute, value));
        ReturnCode::SUCCESS
    }

    fn driver_connect(&self, conn: RawHandle, connection_string: &[u16]) -> ReturnCode {
        self.record(NativeCall::DriverConnect);
        if !self.is_live_as(conn, HandleKind::Connection) {
            return ReturnCode::INVALID_HANDLE;
        }
        let delay = *lock(&self.connect_delay);
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let end = connection_string
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(connection_string.len());
        lock(&self.connect_strings).push(String::from_utf16_lossy(&connection_string[..end]));
        if let Some(ret) = self.scripted_failure(NativeCall::DriverConnect, conn) {
            return ret;
        }
        ReturnCode::SUCCESS
    }

    fn disconnect(&self, conn: RawHandle) -> ReturnCode {
        self.record(NativeCall::Disconnect);
        if !self.is_live_as(conn, HandleKind::Connection) {
            return ReturnCode::INVALID_HANDLE;
        }
        if let Some(ret) = self.scripted_failure(NativeCall::Disconnect, conn) {
            return ret;
        }
        ReturnCode::SUCCESS
    }

    fn free_handle(&self, kind: HandleKind, handle: RawHandle) -> ReturnCode {
        self.record(NativeCall::FreeHandle(kind));
        if !self.is_live_as(handle, kind) {
            return ReturnCode::INVALID_HANDLE;
        }
        if let Some(ret) = self.scripted_failure(NativeCall::FreeHandle(kind), handle) {
            return ret;
        }
        lock(&self.live).remove(&handle);
        lock(&self.diagnostics).remove(&handle);
        ReturnCode::SUCCESS
    }

    fn diag_record(&self, _kind: HandleKind, handle: RawHandle, record: i16) -> DiagRead {
        self.record(NativeCall::DiagRecord);
        if self.diagnostics_unavailable.load(Ordering::SeqCst) {
            return DiagRead::Failed(ReturnCode::ERROR);
        }
        let index = match usize::try_from(record) {
            Ok(n) if n >= 1 => n - 1,
            _ => return DiagRead::Failed(ReturnCode::ERROR),
        };
        match lock(&self.diagnostics).get(&handle).and_then(|r| r.get(index)) {
            Some(r) => DiagRead::Record(r.clone()),
            None => DiagRead::NoData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_handles_are_tracked() {
        let api = ScriptedApi::new();
        let (ret, env) = api.alloc_handle(HandleKind::Environment, RawHandle::NULL);
        assert_eq!(ret, ReturnCode::SUCCESS);
        let (ret, conn) = api.alloc_handle(HandleKind::Connection, env);
        assert_eq!(ret, ReturnCode::SUCCESS);
        assert_eq!(api.live_handles(HandleKind::Connection), 1);

        assert_eq!(api.free_handle(HandleKind::Connection, conn), ReturnCode::SUCCESS);
        assert_eq!(api.live_handles(HandleKind::Connection), 0);
        assert_eq!(
            api.free_handle(HandleKind::Connection, conn),
            ReturnCode::INVALID_HANDLE
        );
    }

    #[test]
    fn test_scripted_failure_attaches_diagnostics() {
        let api = ScriptedApi::new();
        let (_, env) = api.alloc_handle(HandleKind::Environment, RawHandle::NULL);
        api.fail_on(
            NativeCall::SetEnvAttr(EnvAttribute::CpMatch),
            vec![DiagnosticRecord::new("HYC00", 0, "Optional feature not implemented")],
        );
        assert_eq!(
            api.set_env_attr(env, EnvAttribute::CpMatch, 1),
            ReturnCode::ERROR
        );
        match api.diag_record(HandleKind::Environment, env, 1) {
            DiagRead::Record(r) => assert_eq!(r.state, "HYC00"),
            other => panic!("Expected record, got {:?}", other),
        }
        assert_eq!(
            api.diag_record(HandleKind::Environment, env, 2),
            DiagRead::NoData
        );
    }

    #[test]
    fn test_connect_requires_live_connection_handle() {
        let api = ScriptedApi::new();
        let wide: Vec<u16> = "DSN=x\0".encode_utf16().collect();
        assert_eq!(
            api.driver_connect(RawHandle::from_addr(0xdead), &wide),
            ReturnCode::INVALID_HANDLE
        );
    }
}

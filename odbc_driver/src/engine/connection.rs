use super::diagnostics;
use super::environment::OdbcEnvironment;
use crate::error::{OdbcError, Result};
use crate::handles::{HandleKind, RawHandle, StatementTracker, Stats};
use crate::native::NativeApi;
use crate::observability::redact_connection_string;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use zeroize::Zeroizing;

/// Normalized prefix of the Microsoft Access ODBC driver name.
const ACCESS_DRIVER_MARKER: &str = "DRIVER={MICROSOFTACCESSDRIVER";

/// True when `conn_str` selects the Microsoft Access driver, ignoring case
/// and whitespace.
pub fn is_ms_access_connection_string(conn_str: &str) -> bool {
    let normalized: String = conn_str
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();
    normalized.contains(ACCESS_DRIVER_MARKER)
}

/// NUL-terminated UTF-16 form expected by `SQLDriverConnectW`.
fn encode_wide(conn_str: &str) -> Zeroizing<Vec<u16>> {
    let mut wide: Vec<u16> = Vec::with_capacity(conn_str.len() + 1);
    wide.extend(conn_str.encode_utf16());
    wide.push(0);
    Zeroizing::new(wide)
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// An open ODBC connection handle.
///
/// Owned by one caller. Closing (explicitly or on drop) disconnects and frees
/// the handle exactly once.
pub struct OdbcConnection {
    env: Arc<OdbcEnvironment>,
    handle: RawHandle,
    is_ms_access: bool,
    connected: bool,
    bad: AtomicBool,
    closing_in_background: AtomicBool,
}

impl OdbcConnection {
    /// Allocates a connection handle under `env` and connects it without
    /// prompting.
    ///
    /// `deadline` is best-effort, not preemptive: it is checked before the
    /// allocation and before the connect call, but a connect already in
    /// progress runs to completion.
    pub fn connect(
        env: &Arc<OdbcEnvironment>,
        conn_str: &str,
        deadline: Option<Instant>,
    ) -> Result<Self> {
        if conn_str.trim().is_empty() {
            return Err(OdbcError::EmptyConnectionString);
        }
        if conn_str.contains('\0') {
            return Err(OdbcError::InvalidConnectionString);
        }
        if deadline_passed(deadline) {
            return Err(OdbcError::Cancelled {
                operation: "SQLAllocHandle",
            });
        }

        let api = env.api();
        let handle = env.allocate_connection()?;

        // The counter keeps this allocation even when connecting fails.
        if deadline_passed(deadline) {
            release_unconnected(api.as_ref(), handle);
            return Err(OdbcError::Cancelled {
                operation: "SQLDriverConnect",
            });
        }

        let wide = encode_wide(conn_str);
        let ret = api.driver_connect(handle, &wide);
        if let Err(diag) = diagnostics::check(
            api.as_ref(),
            ret,
            "SQLDriverConnect",
            HandleKind::Connection,
            handle,
        ) {
            release_unconnected(api.as_ref(), handle);
            return Err(OdbcError::Connect(diag));
        }

        let is_ms_access = is_ms_access_connection_string(conn_str);
        log::debug!(
            "Connected {:?} ({}), access_dialect={}",
            handle,
            redact_connection_string(conn_str),
            is_ms_access
        );

        Ok(Self {
            env: Arc::clone(env),
            handle,
            is_ms_access,
            connected: true,
            bad: AtomicBool::new(false),
            closing_in_background: AtomicBool::new(false),
        })
    }

    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    pub fn api(&self) -> &Arc<dyn NativeApi> {
        self.env.api()
    }

    pub fn environment(&self) -> &Arc<OdbcEnvironment> {
        &self.env
    }

    pub fn stats(&self) -> &Arc<Stats> {
        self.env.stats()
    }

    /// Backend is the Microsoft Access desktop dialect.
    pub fn is_ms_access_driver(&self) -> bool {
        self.is_ms_access
    }

    pub fn is_bad(&self) -> bool {
        self.bad.load(Ordering::Acquire)
    }

    /// Flags the connection unusable, e.g. after a communication link failure.
    pub fn mark_bad(&self) {
        self.bad.store(true, Ordering::Release);
    }

    pub fn is_closing_in_background(&self) -> bool {
        self.closing_in_background.load(Ordering::Acquire)
    }

    /// Claims the background close. Returns false if another caller already
    /// started one.
    pub fn begin_background_close(&self) -> bool {
        self.closing_in_background
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Counts a statement handle allocated on this connection until the
    /// returned tracker is dropped.
    pub fn track_statement(&self) -> StatementTracker {
        StatementTracker::new(Arc::clone(self.env.stats()))
    }

    /// Disconnects and frees the handle.
    ///
    /// The handle is freed even when the disconnect fails; the first error is
    /// returned. If the free itself fails, the drop of `self` tries once more
    /// and logs; use [`close`](Self::close) to keep retrying.
    pub fn disconnect(mut self) -> Result<()> {
        self.close()
    }

    /// Disconnects and frees the handle, keeping the connection around.
    ///
    /// When `SQLFreeHandle` fails the handle is kept, so a later call (or the
    /// drop) can try to free it again. Once it succeeds, further calls are
    /// no-ops.
    pub fn close(&mut self) -> Result<()> {
        if self.handle.is_null() {
            return Ok(());
        }
        let handle = self.handle;
        let api = self.env.api().as_ref();

        let disconnected = if std::mem::replace(&mut self.connected, false) {
            diagnostics::check(
                api,
                api.disconnect(handle),
                "SQLDisconnect",
                HandleKind::Connection,
                handle,
            )
            .map_err(OdbcError::Disconnect)
        } else {
            Ok(())
        };

        let released = diagnostics::release(api, HandleKind::Connection, handle)
            .map_err(OdbcError::Release);
        if released.is_ok() {
            self.handle = RawHandle::NULL;
            self.env.stats().connection_released();
        }

        disconnected.and(released)
    }
}

/// Frees a handle whose connect never succeeded. The connection counter is
/// not rolled back.
fn release_unconnected(api: &dyn NativeApi, handle: RawHandle) {
    if let Err(e) = diagnostics::release(api, HandleKind::Connection, handle) {
        log::warn!("Releasing unconnected handle {:?}: {}", handle, e);
    }
}

impl Drop for OdbcConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Dropping connection {:?}: {}", self.handle, e);
        }
    }
}

impl std::fmt::Debug for OdbcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdbcConnection")
            .field("handle", &self.handle)
            .field("is_ms_access", &self.is_ms_access)
            .field("bad", &self.is_bad())
            .field("closing_in_background", &self.is_closing_in_background())
            .finish()
    }
}

use super::connection::OdbcConnection;
use super::environment::OdbcEnvironment;
use crate::async_bridge;
use crate::config::DriverConfig;
use crate::error::{OdbcError, Result};
use crate::handles::{Stats, StatsSnapshot};
use crate::native::{NativeApi, SystemOdbc};
use crate::observability::log_connection;
use log::Level;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

type EnvironmentSlot = Option<Result<Arc<OdbcEnvironment>>>;

/// Driver context: the environment, its counters and the native API.
///
/// Create one per process and share it (usually behind an `Arc`). The
/// environment is initialized at most once, on the first `initialize` or
/// `open`; concurrent first callers wait for that single attempt and all see
/// its outcome. A failed initialization is remembered and returned by every
/// later `open` without retrying.
pub struct Driver {
    api: Arc<dyn NativeApi>,
    config: DriverConfig,
    stats: Arc<Stats>,
    environment: RwLock<EnvironmentSlot>,
    closed: AtomicBool,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}

impl Driver {
    /// Driver backed by the system driver manager.
    pub fn new(config: DriverConfig) -> Self {
        Self::with_api(Arc::new(SystemOdbc::new()), config)
    }

    pub fn with_api(api: Arc<dyn NativeApi>, config: DriverConfig) -> Self {
        Self {
            api,
            config,
            stats: Arc::new(Stats::new()),
            environment: RwLock::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Runs environment initialization if it has not run yet.
    pub fn initialize(&self) -> Result<()> {
        self.environment().map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        !self.is_closed() && matches!(*self.read_slot(), Some(Ok(_)))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The remembered initialization failure, if any.
    pub fn init_error(&self) -> Option<OdbcError> {
        match &*self.read_slot() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    fn read_slot(&self) -> RwLockReadGuard<'_, EnvironmentSlot> {
        self.environment.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, EnvironmentSlot> {
        self.environment.write().unwrap_or_else(|e| e.into_inner())
    }

    fn environment(&self) -> Result<Arc<OdbcEnvironment>> {
        if self.is_closed() {
            return Err(OdbcError::EnvironmentClosed);
        }
        if let Some(outcome) = &*self.read_slot() {
            return outcome.clone();
        }

        // The write lock is the one-time gate: later callers block here and
        // then find the outcome.
        let mut slot = self.write_slot();
        if self.is_closed() {
            return Err(OdbcError::EnvironmentClosed);
        }
        if let Some(outcome) = &*slot {
            return outcome.clone();
        }
        let outcome =
            OdbcEnvironment::init(Arc::clone(&self.api), Arc::clone(&self.stats), &self.config)
                .map(Arc::new);
        *slot = Some(outcome.clone());
        outcome
    }

    /// Opens a connection.
    ///
    /// See [`OdbcConnection::connect`] for the deadline semantics.
    pub fn open(&self, conn_str: &str, deadline: Option<Instant>) -> Result<OdbcConnection> {
        let env = self.environment()?;
        log_connection(Level::Debug, "open", conn_str);
        OdbcConnection::connect(&env, conn_str, deadline)
    }

    /// Opens a connection on a blocking worker and stops waiting at
    /// `deadline`.
    ///
    /// The worker is abandoned, not interrupted: a connection it completes
    /// after the deadline is dropped there, which disconnects and frees it.
    /// Callable from inside a tokio runtime, where the worker is a plain
    /// thread.
    pub fn open_abandonable(
        self: &Arc<Self>,
        conn_str: &str,
        deadline: Option<Instant>,
    ) -> Result<OdbcConnection> {
        let Some(deadline) = deadline else {
            return self.open(conn_str, None);
        };
        // Fail before spawning when initialization already failed.
        self.environment()?;
        let driver = Arc::clone(self);
        let conn_str = conn_str.to_string();
        async_bridge::run_blocking_until(deadline, "SQLDriverConnect", move || {
            driver.open(&conn_str, Some(deadline))
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Shared counters, for observers that poll.
    pub fn stats_handle(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Tears the environment down.
    ///
    /// Works on a shared driver. Releases the environment handle now when no
    /// connection is left, otherwise when the last connection closes (for a
    /// pool, when the pool drops its members). Succeeds when initialization
    /// never ran or failed. Later opens return `EnvironmentClosed`.
    pub fn close(&self) -> Result<()> {
        let taken = {
            let mut slot = self.write_slot();
            self.closed.store(true, Ordering::Release);
            slot.take()
        };
        match taken {
            Some(Ok(env)) => match Arc::try_unwrap(env) {
                Ok(env) => env.release(),
                Err(shared) => {
                    log::debug!(
                        "Environment {:?} still has {} connection(s); release deferred",
                        shared.handle(),
                        Arc::strong_count(&shared) - 1
                    );
                    Ok(())
                }
            },
            Some(Err(_)) | None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .field("initialized", &self.is_initialized())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticRecord;
    use crate::handles::HandleKind;
    use crate::native::EnvAttribute;
    use crate::test_helpers::{NativeCall, ScriptedApi};
    use std::time::Duration;

    fn driver() -> (Arc<ScriptedApi>, Driver) {
        let api = Arc::new(ScriptedApi::new());
        let driver = Driver::with_api(api.clone(), DriverConfig::default());
        (api, driver)
    }

    #[test]
    fn test_driver_starts_uninitialized() {
        let (api, driver) = driver();
        assert!(!driver.is_initialized());
        assert!(api.calls().is_empty());
        assert_eq!(driver.stats(), StatsSnapshot::default());
    }

    #[test]
    fn test_open_initializes_lazily_once() {
        let (api, driver) = driver();
        let _a = driver.open("DSN=a", None).expect("open a");
        let _b = driver.open("DSN=b", None).expect("open b");

        assert!(driver.is_initialized());
        assert_eq!(api.call_count(NativeCall::AllocHandle(HandleKind::Environment)), 1);
        assert_eq!(driver.stats().environments, 1);
        assert_eq!(driver.stats().connections, 2);
    }

    #[test]
    fn test_init_error_is_remembered() {
        let (api, driver) = driver();
        api.fail_on(
            NativeCall::SetEnvAttr(EnvAttribute::ConnectionPooling),
            vec![DiagnosticRecord::new("HYC00", 0, "Pooling not supported")],
        );

        let first = driver.open("DSN=a", None).expect_err("should fail");
        api.clear_failures();
        let second = driver.open("DSN=a", None).expect_err("should fail");

        assert!(matches!(first, OdbcError::Init(_)));
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(api.call_count(NativeCall::AllocHandle(HandleKind::Environment)), 1);
        assert_eq!(api.call_count(NativeCall::AllocHandle(HandleKind::Connection)), 0);
        assert!(driver.init_error().is_some());
        assert!(!driver.is_initialized());
    }

    #[test]
    fn test_counter_matches_allocations_including_failed_connects() {
        let (api, driver) = driver();
        let mut open = Vec::new();
        for i in 0..6 {
            if i % 2 == 0 {
                api.fail_on(NativeCall::DriverConnect, Vec::new());
            } else {
                api.clear_failures();
            }
            if let Ok(c) = driver.open("DSN=x", None) {
                open.push(c);
            }
        }
        assert_eq!(open.len(), 3);
        assert_eq!(
            driver.stats().connections,
            api.call_count(NativeCall::AllocHandle(HandleKind::Connection)) as u64
        );
        assert_eq!(api.live_handles(HandleKind::Connection), 3);
    }

    #[test]
    fn test_close_without_init() {
        let (api, driver) = driver();
        driver.close().expect("close");
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_close_after_failed_init() {
        let (api, driver) = driver();
        api.fail_on(NativeCall::AllocHandle(HandleKind::Environment), Vec::new());
        assert!(driver.initialize().is_err());
        driver.close().expect("close");
        driver.close().expect("close twice");
    }

    #[test]
    fn test_close_releases_environment() {
        let (api, driver) = driver();
        driver.initialize().expect("init");
        driver.close().expect("close");
        assert_eq!(api.live_handles(HandleKind::Environment), 0);
        assert_eq!(driver.stats().environments, 0);
        assert!(matches!(
            driver.open("DSN=x", None),
            Err(OdbcError::EnvironmentClosed)
        ));
    }

    #[test]
    fn test_close_defers_release_until_last_connection() {
        let (api, driver) = driver();
        let conn = driver.open("DSN=x", None).expect("open");
        driver.close().expect("close");
        assert_eq!(api.live_handles(HandleKind::Environment), 1);

        conn.disconnect().expect("disconnect");
        assert_eq!(api.live_handles(HandleKind::Environment), 0);
        assert_eq!(driver.stats().environments, 0);
        assert_eq!(driver.stats().connections, 0);
    }

    #[test]
    fn test_close_through_shared_reference() {
        let (api, driver) = driver();
        let driver = Arc::new(driver);
        let shared = Arc::clone(&driver);
        let conn = driver.open("DSN=x", None).expect("open");

        shared.close().expect("close");
        assert!(driver.is_closed());
        assert!(!driver.is_initialized());
        assert!(matches!(
            driver.open("DSN=x", None),
            Err(OdbcError::EnvironmentClosed)
        ));

        drop(conn);
        assert_eq!(api.live_handles(HandleKind::Environment), 0);
        assert_eq!(driver.stats().environments, 0);
    }

    #[test]
    fn test_open_abandonable_inside_runtime() {
        let (_api, driver) = driver();
        let driver = Arc::new(driver);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");

        let conn = runtime
            .block_on(async {
                driver.open_abandonable("DSN=x", Some(Instant::now() + Duration::from_secs(1)))
            })
            .expect("open inside runtime");
        conn.disconnect().expect("disconnect");
        assert_eq!(driver.stats().connections, 0);
    }

    #[test]
    fn test_open_abandonable_without_deadline_runs_inline() {
        let (_api, driver) = driver();
        let driver = Arc::new(driver);
        let conn = driver.open_abandonable("DSN=x", None).expect("open");
        assert!(!conn.is_ms_access_driver());
    }

    #[test]
    fn test_open_abandonable_times_out_and_releases_later() {
        let (api, driver) = driver();
        api.set_connect_delay(Duration::from_millis(300));
        let driver = Arc::new(driver);

        let err = driver
            .open_abandonable("DSN=slow", Some(Instant::now() + Duration::from_millis(50)))
            .expect_err("should time out");
        assert!(matches!(err, OdbcError::Cancelled { .. }));

        // The abandoned worker finishes and drops its connection.
        let mut waited = Duration::ZERO;
        while (api.call_count(NativeCall::Disconnect) == 0 || driver.stats().connections != 0)
            && waited < Duration::from_secs(5)
        {
            std::thread::sleep(Duration::from_millis(20));
            waited += Duration::from_millis(20);
        }
        assert_eq!(api.live_handles(HandleKind::Connection), 0);
        assert_eq!(driver.stats().connections, 0);
    }

    #[test]
    fn test_open_abandonable_returns_init_error_before_spawning() {
        let (api, driver) = driver();
        api.fail_on(NativeCall::AllocHandle(HandleKind::Environment), Vec::new());
        let driver = Arc::new(driver);
        let err = driver
            .open_abandonable("DSN=x", Some(Instant::now() + Duration::from_secs(1)))
            .expect_err("should fail");
        assert!(matches!(err, OdbcError::Init(_)));
    }
}

use crate::error::{OdbcError, Result};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::OnceLock;
use std::time::Instant;
use tokio::runtime::{Builder, Runtime};

static RUNTIME: OnceLock<std::result::Result<Runtime, String>> = OnceLock::new();

fn get_runtime() -> Result<&'static Runtime> {
    let runtime = RUNTIME.get_or_init(|| {
        Builder::new_multi_thread()
            .thread_name("odbc-driver-worker")
            .enable_time()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))
    });

    match runtime {
        Ok(rt) => Ok(rt),
        Err(msg) => Err(OdbcError::InternalError(msg.clone())),
    }
}

/// Runs the blocking `f` on a worker thread and waits for it until
/// `deadline`.
///
/// When the deadline fires first this returns `Cancelled` and the worker is
/// left running; whatever it eventually returns is dropped on the worker.
///
/// Inside a tokio runtime the shared runtime cannot be blocked on, so the
/// worker is a plain thread instead.
pub fn run_blocking_until<F, T>(deadline: Instant, operation: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        return run_on_thread_until(deadline, operation, f);
    }
    let runtime = get_runtime()?;
    runtime.block_on(async move {
        let task = tokio::task::spawn_blocking(f);
        match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(OdbcError::InternalError(format!(
                "{} worker failed: {}",
                operation, join_err
            ))),
            Err(_) => {
                log::debug!("{} abandoned after deadline", operation);
                Err(OdbcError::Cancelled { operation })
            }
        }
    })
}

fn run_on_thread_until<F, T>(deadline: Instant, operation: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("odbc-driver-worker".to_string())
        .spawn(move || {
            // After the deadline the receiver is gone and the result is
            // dropped here.
            let _ = tx.send(f());
        })
        .map_err(|e| {
            OdbcError::InternalError(format!("{} worker spawn failed: {}", operation, e))
        })?;

    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            log::debug!("{} abandoned after deadline", operation);
            Err(OdbcError::Cancelled { operation })
        }
        Err(RecvTimeoutError::Disconnected) => Err(OdbcError::InternalError(format!(
            "{} worker exited without a result",
            operation
        ))),
    }
}

use super::diagnostics;
use crate::config::{ConnectionPooling, DriverConfig};
use crate::error::{OdbcError, Result};
use crate::handles::{HandleKind, RawHandle, Stats};
use crate::native::{EnvAttribute, NativeApi};
use std::sync::Arc;

/// Owner of one initialized ODBC environment handle.
///
/// Connections hold an `Arc` to their environment, so the handle is freed
/// only after the last of them is gone.
pub struct OdbcEnvironment {
    api: Arc<dyn NativeApi>,
    stats: Arc<Stats>,
    handle: RawHandle,
}

impl OdbcEnvironment {
    /// Allocates the environment handle and applies `config`.
    ///
    /// On failure the handle is released again and the environment counter is
    /// left untouched.
    pub fn init(api: Arc<dyn NativeApi>, stats: Arc<Stats>, config: &DriverConfig) -> Result<Self> {
        let handle = diagnostics::allocate(
            api.as_ref(),
            HandleKind::Environment,
            HandleKind::Environment,
            RawHandle::NULL,
        )
        .map_err(OdbcError::Init)?;

        let mut attributes = vec![
            (EnvAttribute::OdbcVersion, config.odbc_version.value()),
            (EnvAttribute::ConnectionPooling, config.pooling.value()),
        ];
        if config.pooling != ConnectionPooling::Off {
            attributes.push((EnvAttribute::CpMatch, config.pool_match.value()));
        }

        for (attribute, value) in attributes {
            let ret = api.set_env_attr(handle, attribute, value);
            if let Err(diag) = diagnostics::check(
                api.as_ref(),
                ret,
                "SQLSetEnvAttr",
                HandleKind::Environment,
                handle,
            ) {
                if let Err(release_err) =
                    diagnostics::release(api.as_ref(), HandleKind::Environment, handle)
                {
                    log::warn!("Releasing failed environment: {}", release_err);
                }
                return Err(OdbcError::Init(diag));
            }
        }

        stats.environment_allocated();
        log::debug!(
            "ODBC environment {:?} initialized (version={:?}, pooling={:?}, match={:?})",
            handle,
            config.odbc_version,
            config.pooling,
            config.pool_match
        );
        Ok(Self { api, stats, handle })
    }

    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    pub fn api(&self) -> &Arc<dyn NativeApi> {
        &self.api
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Allocates a connection handle and counts it.
    pub(crate) fn allocate_connection(&self) -> Result<RawHandle> {
        let handle = diagnostics::allocate(
            self.api.as_ref(),
            HandleKind::Connection,
            HandleKind::Environment,
            self.handle,
        )
        .map_err(OdbcError::Alloc)?;
        self.stats.connection_allocated();
        Ok(handle)
    }

    /// Frees the environment handle now instead of on drop.
    ///
    /// If `SQLFreeHandle` fails, the drop of `self` tries once more and logs;
    /// use [`close`](Self::close) to keep retrying.
    pub fn release(mut self) -> Result<()> {
        self.close()
    }

    /// Frees the environment handle, keeping it when the free fails so a
    /// later call (or the drop) can retry. A no-op once freed.
    pub fn close(&mut self) -> Result<()> {
        if self.handle.is_null() {
            return Ok(());
        }
        diagnostics::release(self.api.as_ref(), HandleKind::Environment, self.handle)
            .map_err(OdbcError::Release)?;
        self.handle = RawHandle::NULL;
        self.stats.environment_released();
        Ok(())
    }
}

impl Drop for OdbcEnvironment {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Dropping ODBC environment {:?}: {}", self.handle, e);
        }
    }
}

impl std::fmt::Debug for OdbcEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdbcEnvironment")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

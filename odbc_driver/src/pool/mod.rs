use crate::config::read_env;
use crate::engine::{Driver, OdbcConnection};
use crate::error::{OdbcError, Result};
use r2d2::{Pool, PooledConnection};
use std::sync::Arc;
use std::time::Duration;

const POOL_MAX_SIZE_ENV: &str = "ODBC_POOL_MAX_SIZE";
const POOL_TIMEOUT_SECS_ENV: &str = "ODBC_POOL_TIMEOUT_SECS";
const POOL_TEST_ON_CHECKOUT_ENV: &str = "ODBC_POOL_TEST_ON_CHECKOUT";

fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_size: u32,
    pub connection_timeout: Duration,
    pub test_on_check_out: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            connection_timeout: Duration::from_secs(30),
            test_on_check_out: true,
        }
    }
}

impl PoolConfig {
    /// Defaults, overridden by `ODBC_POOL_MAX_SIZE`, `ODBC_POOL_TIMEOUT_SECS`
    /// and `ODBC_POOL_TEST_ON_CHECKOUT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = read_env(POOL_MAX_SIZE_ENV, |v| {
            v.trim().parse::<u32>().ok().filter(|n| *n > 0)
        }) {
            config.max_size = n;
        }
        if let Some(secs) = read_env(POOL_TIMEOUT_SECS_ENV, |v| v.trim().parse::<u64>().ok()) {
            config.connection_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = read_env(POOL_TEST_ON_CHECKOUT_ENV, parse_bool_flag) {
            config.test_on_check_out = flag;
        }
        config
    }
}

/// Opens pool members through a shared [`Driver`].
pub struct OdbcConnectionManager {
    driver: Arc<Driver>,
    connection_string: String,
}

impl OdbcConnectionManager {
    pub fn new(driver: Arc<Driver>, connection_string: &str) -> Self {
        Self {
            driver,
            connection_string: connection_string.to_string(),
        }
    }
}

impl r2d2::ManageConnection for OdbcConnectionManager {
    type Connection = OdbcConnection;
    type Error = OdbcError;

    fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        self.driver.open(&self.connection_string, None)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        if conn.is_bad() {
            return Err(OdbcError::BadConnection);
        }
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_bad() || conn.is_closing_in_background()
    }
}

/// r2d2 pool of ODBC connections sharing one driver context.
pub struct ConnectionPool {
    pool: Pool<OdbcConnectionManager>,
    driver: Arc<Driver>,
    config: PoolConfig,
}

impl ConnectionPool {
    pub fn new(driver: Arc<Driver>, connection_string: &str, config: PoolConfig) -> Result<Self> {
        // Surface a remembered init error as-is instead of a pool timeout.
        driver.initialize()?;
        let manager = OdbcConnectionManager::new(Arc::clone(&driver), connection_string);
        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .test_on_check_out(config.test_on_check_out)
            .build(manager)
            .map_err(|e| OdbcError::PoolError(format!("Pool creation failed: {}", e)))?;

        Ok(Self {
            pool,
            driver,
            config,
        })
    }

    pub fn get(&self) -> Result<PooledConnection<OdbcConnectionManager>> {
        self.pool.get().map_err(|e| {
            OdbcError::PoolError(format!("Failed to get connection from pool: {}", e))
        })
    }

    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn state(&self) -> PoolState {
        let state = self.pool.state();
        PoolState {
            size: state.connections,
            idle: state.idle_connections,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub size: u32,
    pub idle: u32,
}

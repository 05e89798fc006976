/// Helper functions for E2E tests.
/// Provides utilities to check whether E2E tests can run (connection available).
use super::env::get_test_dsn;
use odbc_driver::test_helpers::load_dotenv;
use odbc_driver::observability::redact_connection_string as redact;
use odbc_driver::{is_ms_access_connection_string, Driver, DriverConfig};

/// Whether the configured DSN targets the Access driver.
#[allow(dead_code)]
pub fn is_access_dsn() -> bool {
    load_dotenv();
    get_test_dsn()
        .map(|dsn| is_ms_access_connection_string(&dsn))
        .unwrap_or(false)
}

/// Checks whether an E2E database connection can be established.
/// Returns `true` when the connection is available and working.
#[allow(dead_code)]
pub fn can_connect() -> bool {
    load_dotenv();

    let conn_str = match get_test_dsn() {
        Some(s) => s,
        None => {
            return false;
        }
    };

    let driver = Driver::new(DriverConfig::from_env());
    match driver.open(&conn_str, None) {
        Ok(conn) => {
            let _ = conn.disconnect();
            eprintln!("[OK] Connection successful with: {}", redact(&conn_str));
            true
        }
        Err(e) => {
            eprintln!("[ERROR] Connection failed: {}", e);
            eprintln!("  Connection string: {}", redact(&conn_str));
            false
        }
    }
}

/// Checks whether E2E tests should run.
/// Runs only when ENABLE_E2E_TESTS is explicitly enabled.
#[allow(dead_code)]
pub fn should_run_e2e_tests() -> bool {
    load_dotenv();

    fn parse_env_bool(raw: &str) -> Option<bool> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        match normalized.as_str() {
            "1" | "true" | "yes" | "y" => Some(true),
            "0" | "false" | "no" | "n" => Some(false),
            _ => None,
        }
    }

    let enabled = std::env::var("ENABLE_E2E_TESTS")
        .ok()
        .as_deref()
        .and_then(parse_env_bool)
        == Some(true);

    if !enabled {
        return false;
    }

    can_connect()
}

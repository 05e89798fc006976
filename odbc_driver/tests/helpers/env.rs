//! Helper functions for reading environment variables in tests

/// Get the ODBC_TEST_DSN connection string from environment
/// Returns None if not set (tests should be ignored in this case)
pub fn get_test_dsn() -> Option<String> {
    std::env::var("ODBC_TEST_DSN")
        .ok()
        .filter(|s| !s.is_empty())
}

/// Path of an Access database file for the Access E2E tests, from
/// ODBC_TEST_ACCESS_FILE.
pub fn get_access_test_file() -> Option<String> {
    std::env::var("ODBC_TEST_ACCESS_FILE")
        .ok()
        .filter(|s| !s.is_empty())
}

/// Build a Microsoft Access connection string for a database file
pub fn build_access_conn_str(path: &str) -> String {
    format!(
        "Driver={{Microsoft Access Driver (*.mdb, *.accdb)}};DBQ={};",
        path
    )
}

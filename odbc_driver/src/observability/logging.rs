use log::Level;

/// Keys whose values never reach the log.
fn is_secret_key(key: &str) -> bool {
    matches!(
        key.trim().to_ascii_lowercase().as_str(),
        "pwd" | "password" | "pass" | "accesstoken" | "access_token" | "token"
    )
}

/// Splits on `;` outside of `{...}` so braced values stay intact.
fn split_connection_string_parts(connection_string: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut brace_depth = 0u32;

    for (idx, ch) in connection_string.char_indices() {
        match ch {
            '{' => brace_depth = brace_depth.saturating_add(1),
            '}' => brace_depth = brace_depth.saturating_sub(1),
            ';' if brace_depth == 0 => {
                parts.push(&connection_string[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&connection_string[start..]);
    parts
}

/// Copy of `connection_string` with credential values replaced by `***`.
pub fn redact_connection_string(connection_string: &str) -> String {
    split_connection_string_parts(connection_string)
        .into_iter()
        .map(|part| match part.split_once('=') {
            Some((key, _)) if is_secret_key(key) => format!("{}=***", key),
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Logs a connection lifecycle event without leaking credentials.
pub fn log_connection(level: Level, action: &str, connection_string: &str) {
    if log::log_enabled!(level) {
        log::log!(
            level,
            "Connection {}: {}",
            action,
            redact_connection_string(connection_string)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_password() {
        assert_eq!(
            redact_connection_string("DSN=Main;UID=sa;PWD=secret;"),
            "DSN=Main;UID=sa;PWD=***;"
        );
    }

    #[test]
    fn test_redacts_braced_password_with_semicolon() {
        assert_eq!(
            redact_connection_string("Server=host;Password={ab;c};Database=db"),
            "Server=host;Password=***;Database=db"
        );
    }

    #[test]
    fn test_key_match_is_case_insensitive() {
        assert_eq!(redact_connection_string(" pwd =x"), " pwd =***");
    }

    #[test]
    fn test_no_secrets_unchanged() {
        let s = "DRIVER={Microsoft Access Driver (*.mdb)};DBQ=test.mdb";
        assert_eq!(redact_connection_string(s), s);
    }

    #[test]
    fn test_log_connection_all_levels() {
        let _ = env_logger::builder().is_test(true).try_init();
        log_connection(Level::Error, "open", "DSN=x;PWD=y");
        log_connection(Level::Debug, "open", "DSN=x;PWD=y");
        log_connection(Level::Trace, "close", "DSN=x");
    }
}

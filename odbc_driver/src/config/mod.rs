use serde::Deserialize;

const ODBC_VERSION_ENV: &str = "ODBC_VERSION";
const CONNECTION_POOLING_ENV: &str = "ODBC_CONNECTION_POOLING";
const CP_MATCH_ENV: &str = "ODBC_CP_MATCH";

/// `SQL_ATTR_ODBC_VERSION` value negotiated on the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum OdbcVersion {
    #[default]
    #[serde(rename = "3")]
    V3,
    #[serde(rename = "3.80")]
    V3_80,
}

impl OdbcVersion {
    pub fn value(self) -> usize {
        match self {
            OdbcVersion::V3 => 3,
            OdbcVersion::V3_80 => 380,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "3" | "3.0" => Some(OdbcVersion::V3),
            "3.8" | "3.80" => Some(OdbcVersion::V3_80),
            _ => None,
        }
    }
}

/// `SQL_ATTR_CONNECTION_POOLING` scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPooling {
    Off,
    OnePerDriver,
    #[default]
    #[serde(alias = "one_per_henv")]
    OnePerEnv,
}

impl ConnectionPooling {
    pub fn value(self) -> usize {
        match self {
            ConnectionPooling::Off => 0,
            ConnectionPooling::OnePerDriver => 1,
            ConnectionPooling::OnePerEnv => 2,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "0" | "false" | "no" => Some(ConnectionPooling::Off),
            "one_per_driver" | "driver" => Some(ConnectionPooling::OnePerDriver),
            "one_per_env" | "one_per_henv" | "env" | "1" | "true" | "yes" => {
                Some(ConnectionPooling::OnePerEnv)
            }
            _ => None,
        }
    }
}

/// `SQL_ATTR_CP_MATCH`: how strictly a pooled connection must match a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolMatch {
    Strict,
    #[default]
    Relaxed,
}

impl PoolMatch {
    pub fn value(self) -> usize {
        match self {
            PoolMatch::Strict => 0,
            PoolMatch::Relaxed => 1,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(PoolMatch::Strict),
            "relaxed" => Some(PoolMatch::Relaxed),
            _ => None,
        }
    }
}

/// Environment attributes applied once at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub odbc_version: OdbcVersion,
    pub pooling: ConnectionPooling,
    pub pool_match: PoolMatch,
}

impl DriverConfig {
    /// Defaults, overridden by `ODBC_VERSION`, `ODBC_CONNECTION_POOLING` and
    /// `ODBC_CP_MATCH` when set to a recognized value.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = read_env(ODBC_VERSION_ENV, OdbcVersion::parse) {
            config.odbc_version = v;
        }
        if let Some(p) = read_env(CONNECTION_POOLING_ENV, ConnectionPooling::parse) {
            config.pooling = p;
        }
        if let Some(m) = read_env(CP_MATCH_ENV, PoolMatch::parse) {
            config.pool_match = m;
        }
        config
    }
}

pub(crate) fn read_env<T>(name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        log::warn!("Ignoring unrecognized value {:?} for {}", raw, name);
    }
    parsed
}

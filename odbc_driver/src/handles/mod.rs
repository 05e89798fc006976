mod stats;

pub use stats::{Stats, StatsSnapshot, StatementTracker};

use std::fmt;

/// Level of a native handle in the environment → connection → statement tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Environment,
    Connection,
    Statement,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleKind::Environment => "SQL_HANDLE_ENV",
            HandleKind::Connection => "SQL_HANDLE_DBC",
            HandleKind::Statement => "SQL_HANDLE_STMT",
        };
        f.write_str(name)
    }
}

/// Opaque, pointer-sized native handle.
///
/// Stored as an address so it can cross threads; only the native API layer
/// turns it back into a pointer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(usize);

impl RawHandle {
    pub const NULL: RawHandle = RawHandle(0);

    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn addr(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:#x})", self.0)
    }
}

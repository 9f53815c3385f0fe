//! Error types for the storage layer and the layout engine.

use thiserror::Error;

/// SQLSTATE for a missing relation.
pub const UNDEFINED_TABLE: &str = "42P01";

/// SQLSTATE for a unique constraint violation.
pub const UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE for a foreign key violation.
pub const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Sentinel code for a write attempted without a backing datastore.
pub const MOCK_MODE_WRITE: &str = "MOCK_MODE_WRITE";

/// Why a connection-level failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFailure {
    Refused,
    Reset,
    TimedOut,
    Other,
}

/// Errors reported by the query executor.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("relation does not exist: {0}")]
    UndefinedTable(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    /// Raised for every write or DDL statement while running without a datastore.
    #[error("write attempted in mock mode ({0}); configure DATABASE_URL to persist data")]
    MockModeWrite(String),

    #[error("database connection failed ({kind:?}): {message}")]
    Connection {
        kind: ConnectionFailure,
        message: String,
    },

    #[error("database error{}: {message}", code_suffix(.code))]
    Query {
        code: Option<String>,
        message: String,
    },
}

impl DbError {
    /// Stable code for this error: the SQLSTATE when there is one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::UndefinedTable(_) => Some(UNDEFINED_TABLE),
            Self::UniqueViolation(_) => Some(UNIQUE_VIOLATION),
            Self::ForeignKeyViolation(_) => Some(FOREIGN_KEY_VIOLATION),
            Self::MockModeWrite(_) => Some(MOCK_MODE_WRITE),
            Self::Connection { .. } => None,
            Self::Query { code, .. } => code.as_deref(),
        }
    }

    /// Whether the retry layer may run the statement again.
    ///
    /// Connection failures are retried. Server errors are retried only for
    /// SQLSTATE classes that describe transient conditions: connection
    /// exceptions (08), transaction rollbacks (40), insufficient resources
    /// (53) and operator intervention (57).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Query { code: Some(code), .. } => {
                ["08", "40", "53", "57"].iter().any(|class| code.starts_with(class))
            }
            _ => false,
        }
    }

    /// Whether this is a refused connection (slower backoff on loopback targets).
    pub fn is_connection_refused(&self) -> bool {
        matches!(
            self,
            Self::Connection {
                kind: ConnectionFailure::Refused,
                ..
            }
        )
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    pub fn is_mock_mode(&self) -> bool {
        matches!(self, Self::MockModeWrite(_))
    }

    /// Build an error from a SQLSTATE code and message.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            UNDEFINED_TABLE => Self::UndefinedTable(message),
            UNIQUE_VIOLATION => Self::UniqueViolation(message),
            FOREIGN_KEY_VIOLATION => Self::ForeignKeyViolation(message),
            MOCK_MODE_WRITE => Self::MockModeWrite(message),
            _ => Self::Query {
                code: Some(code.to_string()),
                message,
            },
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => match db.code() {
                Some(code) => Self::from_code(&code, db.message()),
                None => Self::Query {
                    code: None,
                    message: db.message().to_string(),
                },
            },
            sqlx::Error::Io(io) => {
                let kind = match io.kind() {
                    std::io::ErrorKind::ConnectionRefused => ConnectionFailure::Refused,
                    std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe => ConnectionFailure::Reset,
                    std::io::ErrorKind::TimedOut => ConnectionFailure::TimedOut,
                    _ => ConnectionFailure::Other,
                };
                Self::Connection {
                    kind,
                    message: io.to_string(),
                }
            }
            sqlx::Error::PoolTimedOut => Self::Connection {
                kind: ConnectionFailure::TimedOut,
                message: "timed out waiting for a pooled connection".to_string(),
            },
            sqlx::Error::PoolClosed | sqlx::Error::Tls(_) => Self::Connection {
                kind: ConnectionFailure::Other,
                message: err.to_string(),
            },
            other => Self::Query {
                code: None,
                message: other.to_string(),
            },
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default()
}

/// Errors returned by the layout engine.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("tenant id is required")]
    MissingTenant,

    #[error("page {0} not found")]
    PageNotFound(String),

    #[error("page {0} is a master page and cannot be modified by tenants")]
    MasterPageImmutable(i64),

    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    #[error("layout upsert for page {page_id} ({language}) did not affect any row")]
    UpsertFailed { page_id: String, language: String },

    #[error("layout for page {page_id} ({language}) could not be read back after saving")]
    VerificationFailed { page_id: String, language: String },

    #[error("could not allocate a version number for page {page_id} after {attempts} attempts")]
    VersionConflict { page_id: i64, attempts: u32 },

    #[error(transparent)]
    Database(#[from] DbError),
}

/// Result type alias using LayoutError.
pub type LayoutResult<T> = Result<T, LayoutError>;

use std::{fmt, io};

/// Crate-wide `Result` type using [`ExportError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for export operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum ExportError {
    /// Data source connection and query errors.
    Connection(ConnectionError),

    /// Connection parameter resolution errors.
    Resolve(ResolveError),

    /// Export execution errors.
    Execution(ExecutionError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// Spreadsheet writer errors.
    Spreadsheet(rust_xlsxwriter::XlsxError),

    /// JSON decoding errors.
    Json(serde_json::Error),

    /// An export job stopped on an unrecoverable failure.
    ///
    /// The job has already been marked `Failed` and removed from the
    /// registry when this error reaches the caller.
    ExportFailed(Box<ExportError>),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Data source connection errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// Malformed connection string.
    InvalidConnectionString(String),

    /// The requested database (catalog) does not exist.
    DatabaseNotFound(String),

    /// The requested table does not exist.
    TableNotFound(String),

    /// Query text was rejected by the data source.
    InvalidQuery(String),

    /// Query execution failed.
    QueryFailed(String),

    /// Row cursor failed while fetching.
    CursorError(String),
}

/// Errors raised while resolving connection parameters for a source.
#[derive(Debug)]
pub enum ResolveError {
    /// The source entity does not carry a server name.
    MissingServerName,

    /// The source entity does not carry a database name.
    MissingDatabaseName,

    /// A cloud source was used without an access token.
    SignInRequired,
}

/// Export execution errors.
#[derive(Debug)]
pub enum ExecutionError {
    /// Export settings were rejected before any job was created.
    InvalidSettings(String),

    /// A table was added to a job that is no longer running.
    JobNotRunning(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl ExportError {
    /// Wrap an error raised inside the pipeline as an export failure.
    pub fn export_failed(cause: ExportError) -> Self {
        match cause {
            already @ ExportError::ExportFailed(_) => already,
            other => ExportError::ExportFailed(Box::new(other)),
        }
    }

    /// Whether this is an export failure reported for a job.
    pub fn is_export_failed(&self) -> bool {
        matches!(self, ExportError::ExportFailed(_))
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Connection(e) => write!(f, "Connection error: {e}"),
            ExportError::Resolve(e) => write!(f, "Cannot resolve connection parameters: {e}"),
            ExportError::Execution(e) => write!(f, "Execution error: {e}"),
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Io(e) => write!(f, "I/O error: {e}"),
            ExportError::Spreadsheet(e) => write!(f, "Spreadsheet error: {e}"),
            ExportError::Json(e) => write!(f, "JSON error: {e}"),
            ExportError::ExportFailed(e) => write!(f, "Export failed: {e}"),
            ExportError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::InvalidConnectionString(msg) => {
                write!(f, "Invalid connection string: {msg}")
            }
            ConnectionError::DatabaseNotFound(name) => write!(f, "Database not found: {name}"),
            ConnectionError::TableNotFound(name) => write!(f, "Table not found: {name}"),
            ConnectionError::InvalidQuery(query) => write!(f, "Invalid query: {query}"),
            ConnectionError::QueryFailed(msg) => write!(f, "Query failed: {msg}"),
            ConnectionError::CursorError(msg) => write!(f, "Cursor error: {msg}"),
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::MissingServerName => write!(f, "server name is missing"),
            ResolveError::MissingDatabaseName => write!(f, "database name is missing"),
            ResolveError::SignInRequired => write!(f, "sign-in required"),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::InvalidSettings(msg) => write!(f, "Invalid export settings: {msg}"),
            ExecutionError::JobNotRunning(key) => {
                write!(f, "Export job for {key} is no longer running")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io(e) => Some(e),
            ExportError::Spreadsheet(e) => Some(e),
            ExportError::Json(e) => Some(e),
            ExportError::ExportFailed(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
impl std::error::Error for ConnectionError {}
impl std::error::Error for ResolveError {}
impl std::error::Error for ExecutionError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to ExportError ========================= */

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<rust_xlsxwriter::XlsxError> for ExportError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ExportError::Spreadsheet(err)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Json(err)
    }
}

impl From<ConnectionError> for ExportError {
    fn from(err: ConnectionError) -> Self {
        ExportError::Connection(err)
    }
}

impl From<ResolveError> for ExportError {
    fn from(err: ResolveError) -> Self {
        ExportError::Resolve(err)
    }
}

impl From<ExecutionError> for ExportError {
    fn from(err: ExecutionError) -> Self {
        ExportError::Execution(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}

impl From<String> for ExportError {
    fn from(msg: String) -> Self {
        ExportError::Generic(msg)
    }
}

impl From<&str> for ExportError {
    fn from(msg: &str) -> Self {
        ExportError::Generic(msg.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_export_failed_wraps_once() {
        let io = io::Error::new(io::ErrorKind::PermissionDenied, "locked");
        let failed = ExportError::export_failed(ExportError::Io(io));
        let twice = ExportError::export_failed(failed);

        assert!(twice.is_export_failed());
        let source = twice.source().unwrap();
        assert!(source.to_string().contains("locked"));
        assert!(!source.to_string().starts_with("Export failed"));
    }

    #[test]
    fn test_display_messages() {
        let err: ExportError = ResolveError::MissingDatabaseName.into();
        assert_eq!(
            err.to_string(),
            "Cannot resolve connection parameters: database name is missing"
        );

        let err: ExportError = ConnectionError::TableNotFound("Sales".into()).into();
        assert_eq!(err.to_string(), "Connection error: Table not found: Sales");
    }
}

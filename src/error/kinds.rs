use std::{fmt, io};

/// Crate-wide `Result` type using [`ExtractError`] as the error.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Top-level error type for an extraction run.
///
/// Only the first failure of a run is kept; whichever stage fails first
/// decides the variant the caller sees.
#[derive(Debug)]
pub enum ExtractError {
    /// The cursor source failed to count, open or page.
    Source(SourceError),

    /// A record payload could not be decoded.
    Decode(DecodeError),

    /// The stage observed cancellation before finishing its work.
    Cancelled,

    /// Writing the finalized result set failed.
    Persist(PersistError),

    /// Configuration errors.
    Config(ConfigError),

    /// Connection-related errors.
    Connection(ConnectionError),

    /// A pipeline task panicked or was aborted.
    Task(String),

    /// I/O errors.
    Io(io::Error),
}

/// Failures of the remote cursor source.
#[derive(Debug)]
pub enum SourceError {
    /// Counting the matching records failed.
    CountFailed(String),

    /// The server-side cursor could not be opened.
    OpenFailed(String),

    /// Fetching a page failed. Pages are numbered from 1.
    FetchFailed { page: u64, reason: String },

    /// The source returned a record that cannot be turned into a raw record.
    MalformedRecord(String),
}

/// A raw record whose payload does not match the expected schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// Identifier of the offending record.
    pub id: String,

    /// Why decoding failed.
    pub reason: String,
}

/// Persistence sink errors.
#[derive(Debug)]
pub enum PersistError {
    /// Output path cannot be written to.
    InvalidPath(String),

    /// Serializing the result set failed.
    Serialize(String),

    /// Writing or renaming the output file failed.
    WriteFailed(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Invalid connection URI.
    InvalidUri(String),

    /// Failed to establish a connection.
    ConnectionFailed(String),
}

impl DecodeError {
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

impl ExtractError {
    /// True when this error is only the echo of some other failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ExtractError::Cancelled)
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::Source(e) => write!(f, "Source error: {e}"),
            ExtractError::Decode(e) => write!(f, "Decode error: {e}"),
            ExtractError::Cancelled => write!(f, "Extraction cancelled"),
            ExtractError::Persist(e) => write!(f, "Persistence error: {e}"),
            ExtractError::Config(e) => write!(f, "Configuration error: {e}"),
            ExtractError::Connection(e) => write!(f, "Connection error: {e}"),
            ExtractError::Task(msg) => write!(f, "Pipeline task failed: {msg}"),
            ExtractError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::CountFailed(msg) => write!(f, "Count failed: {msg}"),
            SourceError::OpenFailed(msg) => write!(f, "Failed to open cursor: {msg}"),
            SourceError::FetchFailed { page, reason } => {
                write!(f, "Failed to fetch page {page}: {reason}")
            }
            SourceError::MalformedRecord(msg) => write!(f, "Malformed record: {msg}"),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record '{}': {}", self.id, self.reason)
    }
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::InvalidPath(msg) => write!(f, "Invalid output path: {msg}"),
            PersistError::Serialize(msg) => write!(f, "Failed to serialize results: {msg}"),
            PersistError::WriteFailed(msg) => write!(f, "Failed to write output: {msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::InvalidUri(uri) => write!(f, "Invalid connection URI: {uri}"),
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::Source(e) => Some(e),
            ExtractError::Decode(e) => Some(e),
            ExtractError::Persist(e) => Some(e),
            ExtractError::Config(e) => Some(e),
            ExtractError::Connection(e) => Some(e),
            ExtractError::Io(e) => Some(e),
            ExtractError::Cancelled | ExtractError::Task(_) => None,
        }
    }
}
impl std::error::Error for SourceError {}
impl std::error::Error for DecodeError {}
impl std::error::Error for PersistError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for ConnectionError {}

/* ========================= Conversions to ExtractError ========================= */

impl From<io::Error> for ExtractError {
    fn from(err: io::Error) -> Self {
        ExtractError::Io(err)
    }
}

impl From<SourceError> for ExtractError {
    fn from(err: SourceError) -> Self {
        ExtractError::Source(err)
    }
}

impl From<DecodeError> for ExtractError {
    fn from(err: DecodeError) -> Self {
        ExtractError::Decode(err)
    }
}

impl From<PersistError> for ExtractError {
    fn from(err: PersistError) -> Self {
        ExtractError::Persist(err)
    }
}

impl From<ConfigError> for ExtractError {
    fn from(err: ConfigError) -> Self {
        ExtractError::Config(err)
    }
}

impl From<ConnectionError> for ExtractError {
    fn from(err: ConnectionError) -> Self {
        ExtractError::Connection(err)
    }
}

impl From<tokio::task::JoinError> for ExtractError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            ExtractError::Task("task aborted".to_string())
        } else {
            ExtractError::Task(format!("task panicked: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_source_error_display() {
        let err: ExtractError = SourceError::FetchFailed {
            page: 2,
            reason: "connection reset".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Source error: Failed to fetch page 2: connection reset"
        );
    }

    #[test]
    fn test_decode_error_keeps_source() {
        let err: ExtractError = DecodeError::new("abc", "missing field `code`").into();
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "Decode error: record 'abc': missing field `code`"
        );
    }

    #[test]
    fn test_cancellation_flag() {
        assert!(ExtractError::Cancelled.is_cancellation());
        assert!(!ExtractError::Task("boom".to_string()).is_cancellation());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "extraction.page_size".to_string(),
            value: "0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value '0' for field 'extraction.page_size'"
        );
    }
}

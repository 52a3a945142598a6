use thiserror::Error;

/// Errors raised by the identifier/literal safety layer.
///
/// Every builder in this crate routes names and literal values through that
/// layer, so these errors are the first line of defense against malformed
/// (or hostile) configuration reaching emitted SQL.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EscapeError {
    /// Empty identifier or literal value
    #[error("value cannot be empty")]
    Empty,
    /// Control characters (0x00-0x1F, 0x7F) are never allowed
    #[error("control characters are not allowed")]
    ControlCharacter,
    /// PostgreSQL truncates identifiers longer than 63 bytes
    #[error("identifier is too long (max {max} bytes)")]
    TooLong { max: usize },
    /// Table names must start with a letter and contain only letters,
    /// digits and underscores, optionally schema-qualified with one dot
    #[error("table names must start with a letter and can only contain letters, numbers, and underscores")]
    InvalidTableName,
}

/// Errors raised while validating configuration shapes, before any SQL
/// is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("hypertable name is required")]
    NameRequired,
    #[error("hypertable options are required")]
    OptionsRequired,
    #[error("invalid hypertable name: {0}")]
    InvalidName(#[source] EscapeError),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

/// Errors raised by the statement builders.
///
/// `Display`/`Error`/`From` are implemented by hand because the
/// `MultiLevelRollup { source: String }` field name collides with
/// thiserror's source-field inference.
#[derive(Debug)]
pub enum BuildError {
    /// An aggregate or metric kind needs a column that was not configured
    MissingColumn(&'static str),
    /// Candlestick aggregation needs both a time and a price column
    MissingCandlestickColumns,
    UnsupportedAggregate(String),
    UnsupportedMetricType(String),
    /// Time-bucket queries are unbounded without a range
    RangeRequired,
    InvalidConfiguration(String),
    /// The rollup's bucket column must reference the source aggregate's
    /// bucket column exactly
    BucketColumnMismatch { expected: String, found: String },
    /// Rollups over rollups are not supported by the engine
    MultiLevelRollup { rollup: String, source: String },
    Escape(EscapeError),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::MissingColumn(kind) => {
                write!(f, "column is required for {kind} aggregate")
            }
            BuildError::MissingCandlestickColumns => write!(
                f,
                "time_column and price_column must be specified for candlestick aggregation"
            ),
            BuildError::UnsupportedAggregate(kind) => {
                write!(f, "unsupported aggregate type: {kind}")
            }
            BuildError::UnsupportedMetricType(kind) => {
                write!(f, "unsupported metric type: {kind}")
            }
            BuildError::RangeRequired => {
                write!(f, "a time range is required to build this query")
            }
            BuildError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {message}")
            }
            BuildError::BucketColumnMismatch { expected, found } => write!(
                f,
                "rollup bucket column '{found}' does not match source bucket column '{expected}'"
            ),
            BuildError::MultiLevelRollup { rollup, source } => write!(
                f,
                "rollup '{rollup}' sources '{source}', which is itself a rollup"
            ),
            BuildError::Escape(err) => std::fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Escape(err) => err.source(),
            _ => None,
        }
    }
}

impl From<EscapeError> for BuildError {
    fn from(err: EscapeError) -> Self {
        BuildError::Escape(err)
    }
}

/// Failure reported by the query-execution collaborator.
#[derive(Debug, Error)]
#[error("query execution failed: {0}")]
pub struct ExecuteError(#[from] pub anyhow::Error);

impl ExecuteError {
    /// Wraps a plain message, mainly for test doubles and engines that
    /// only surface error text.
    pub fn message(msg: impl Into<String>) -> Self {
        ExecuteError(anyhow::anyhow!(msg.into()))
    }
}

/// Errors surfaced by the schema orchestrator and the read-side helpers.
///
/// "Object already exists" engine errors are recognized and swallowed
/// inside the orchestrator; everything else propagates through here and
/// aborts the remaining pipeline steps.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Escape(#[from] EscapeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Execution(#[from] ExecuteError),
    /// A result row did not have the shape the builder promised
    #[error("failed to decode row: {0}")]
    Decode(String),
}

use thiserror::Error;

/// Top-level error type for wacast.
#[derive(Debug, Error)]
pub enum WacastError {
    /// Malformed input: bad phone number, empty item list, unparseable command argument.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// A single work item failed (network or protocol error for one number).
    #[error("item failed: {0}")]
    PerItem(String),

    /// Checkpoint or ledger read/write error.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A job of the same kind is already running in this process.
    #[error("a {0} job is already running")]
    AlreadyRunning(String),

    /// Resume requested but there is no active checkpoint for the job kind.
    #[error("no saved {0} job to resume")]
    NoSavedJob(String),

    /// Error from a messaging channel or the WhatsApp bridge.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Outbound HTTP error (downloads, keepalive pings).
    #[error("http error: {0}")]
    Http(String),

    /// CSV decode/encode error.
    #[error("csv error: {0}")]
    Csv(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<csv::Error> for WacastError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}

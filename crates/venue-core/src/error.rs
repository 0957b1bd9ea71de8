//! Error type shared by every venue service.

/// All errors surfaced by the venue coordinator.
#[derive(Debug, thiserror::Error)]
pub enum VenueError {
    /// The user asked for something the current situation does not allow
    /// (e.g. starting registration while not standing on a plot).
    #[error("{0}")]
    UserInput(String),

    /// RPC timeout or transport fault. Callers log and retry on the next trigger.
    #[error("Network error: {0}")]
    Network(String),

    /// The venue service answered but refused the operation.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No async runtime available: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl VenueError {
    /// True for faults worth retrying by re-triggering the originating event.
    pub fn is_transient(&self) -> bool {
        matches!(self, VenueError::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, VenueError>;

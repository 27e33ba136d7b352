use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// The run has no usable target. Raised while resolving the config file.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to connect to datastore at {location}: {message}")]
    Connection { location: String, message: String },

    /// A single record could not be built or validated.
    #[error("{0}")]
    Record(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EcoError {
    /// Catalog or settings are inconsistent at startup (e.g. duplicate ids).
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Classroom operation for a user who has not joined.
    #[error("User {0} is not a member of this classroom")]
    NotAMember(String),

    #[error("Invalid PIN for classroom {0}")]
    InvalidPin(String),

    /// The persistence collaborator failed. In-memory state is still valid.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<rusqlite::Error> for EcoError {
    fn from(err: rusqlite::Error) -> Self {
        EcoError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for EcoError {
    fn from(err: serde_json::Error) -> Self {
        EcoError::Persistence(format!("JSON error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, EcoError>;

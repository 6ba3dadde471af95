//! Error types for the Quib backend.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuibError>;

#[derive(Error, Debug)]
pub enum QuibError {
    #[error("User not found")]
    UserNotFound,

    #[error("Creature not found")]
    CreatureNotFound,

    #[error("Evolution requirements not met")]
    RequirementsNotMet,

    #[error("Creature is already at maximum evolution stage")]
    AlreadyMaxStage,

    #[error("Creature was modified concurrently, re-read and retry")]
    ConcurrentModification,

    #[error("Token claim not found")]
    ClaimNotFound,

    #[error("Token claim already processed")]
    ClaimAlreadyProcessed,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Duplicate account: {0}")]
    DuplicateAccount(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for QuibError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => QuibError::UserNotFound,
            other => QuibError::Storage(other.to_string()),
        }
    }
}

impl QuibError {
    /// Whether a caller may safely retry the failed operation without
    /// re-reading state first. Mutations behind a stage CAS must be
    /// re-evaluated from fresh state instead.
    pub fn retryable(&self) -> bool {
        matches!(self, QuibError::Upstream(_))
    }
}

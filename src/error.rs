use thiserror::Error;

/// Failure taxonomy carried from the data layer into the screen state
/// machines. Always travels inside an [`Outcome`](crate::outcome::Outcome)
/// or a `Result`, never as a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoteError {
    #[error("note {0} not found or deleted")]
    NotFound(String),
    #[error("{0}")]
    StorageFault(String),
    #[error("{0}")]
    Unknown(String),
}

impl NoteError {
    pub fn storage<S: Into<String>>(message: S) -> Self {
        NoteError::StorageFault(message.into())
    }

    pub fn unknown<S: Into<String>>(message: S) -> Self {
        NoteError::Unknown(message.into())
    }
}

impl From<rusqlite::Error> for NoteError {
    fn from(err: rusqlite::Error) -> Self {
        NoteError::StorageFault(err.to_string())
    }
}

impl From<tokio::task::JoinError> for NoteError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            NoteError::Unknown("storage task cancelled".to_string())
        } else {
            NoteError::Unknown(crate::tasks::panic_message(err))
        }
    }
}

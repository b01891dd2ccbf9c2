use thiserror::Error;

pub type TxnLogResult<T, E = TxnLogError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum TxnLogError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Corrupted log: {0}")]
    Corrupted(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl TxnLogError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TxnLogError::Cancelled)
    }
}

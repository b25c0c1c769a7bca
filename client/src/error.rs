//! Ways a client run can end other than a normal leave.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("Usage: client name authfile port")]
    Usage,
    #[error("Communications error")]
    Communications,
    #[error("Kicked")]
    Kicked,
    #[error("Authentication error")]
    Authentication,
}

impl ClientError {
    /// Process exit status for this outcome. A normal leave exits 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Usage => 1,
            ClientError::Communications => 2,
            ClientError::Kicked => 3,
            ClientError::Authentication => 4,
        }
    }
}

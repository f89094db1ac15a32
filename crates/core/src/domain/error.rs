// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid job status transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Unknown lock context: {0}")]
    UnknownLockContext(String),

    #[error("Unknown retry origin: {0}")]
    UnknownRetryOrigin(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;

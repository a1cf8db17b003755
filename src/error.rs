use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GenebaseError {
    #[error("invalid term: {0:?}")]
    InvalidTerm(String),

    #[error("invalid accession: {0}")]
    InvalidAccession(String),

    #[error("failed to read input file at {0}")]
    InputRead(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("uniprot request failed: {0}")]
    UniprotHttp(String),

    #[error("uniprot request interrupted: {0}")]
    UniprotTransient(String),

    #[error("uniprot returned status {status}: {message}")]
    UniprotStatus { status: u16, message: String },

    #[error("uniprot returned an unreadable payload: {0}")]
    UniprotPayload(String),

    #[error("fetch of {url} failed after {attempts} attempt(s): {reason}")]
    Fetch {
        url: String,
        attempts: usize,
        reason: String,
    },

    #[error("run cancelled")]
    Cancelled,
}

impl GenebaseError {
    /// Failures worth another attempt under the backoff policy.
    pub fn is_transient(&self) -> bool {
        match self {
            GenebaseError::UniprotTransient(_) => true,
            GenebaseError::UniprotStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

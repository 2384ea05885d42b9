//! Error taxonomy for the evidence ledger
//!
//! Every failure surfaced by the vault maps onto one [`ErrorKind`] so calling
//! layers can decide between retry, abort and alert without string matching.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::EvidenceStatus;

/// Result alias used throughout the crate
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors returned by the evidence store, ledger and service
#[derive(Error, Debug)]
pub enum VaultError {
    /// Unknown evidence id
    #[error("evidence not found: {0}")]
    NotFound(String),

    /// A record with this id already exists
    #[error("duplicate evidence id: {0}")]
    DuplicateId(String),

    /// Current content hash disagrees with the canonical hash
    #[error("integrity violation on {id}: expected {expected}, computed {actual}")]
    IntegrityViolation {
        id: String,
        expected: String,
        actual: String,
    },

    /// Byte read/write failure from the storage collaborator
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A case-scoped operation found nothing to work on
    #[error("no evidence found for case {0}")]
    NoEvidenceForCase(String),

    /// Status change refused by the configured transition policy
    #[error("status transition {from} -> {to} rejected: {reason}")]
    InvalidTransition {
        from: EvidenceStatus,
        to: EvidenceStatus,
        reason: String,
    },

    /// Export document could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistent store failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Coarse classification of a [`VaultError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    DuplicateId,
    IntegrityViolation,
    Io,
    NoEvidenceForCase,
    InvalidTransition,
}

impl VaultError {
    /// Wrap an io error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        VaultError::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error. Serialization and database failures are
    /// storage infrastructure and report as [`ErrorKind::Io`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::NotFound(_) => ErrorKind::NotFound,
            VaultError::DuplicateId(_) => ErrorKind::DuplicateId,
            VaultError::IntegrityViolation { .. } => ErrorKind::IntegrityViolation,
            VaultError::Io { .. } | VaultError::Serialization(_) | VaultError::Database(_) => {
                ErrorKind::Io
            }
            VaultError::NoEvidenceForCase(_) => ErrorKind::NoEvidenceForCase,
            VaultError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

pub mod config;
pub mod error;
pub mod forensics;
pub mod report;
pub mod service;
pub mod storage;
pub mod store;

pub use config::{IdScheme, TransitionPolicyKind, VaultConfig};
pub use error::{ErrorKind, VaultError, VaultResult};
pub use forensics::{
    calculate_file_hash, calculate_hash, AuditAction, AuditEntry, AuditLog, AuditStatistics,
    CaseVerification, ForwardOnly, HashAlgorithm, TransitionPolicy, Unrestricted,
    VerificationSummary,
};
pub use report::{CaseReport, ReportItem};
pub use service::{EvidenceService, IngestRequest};
pub use storage::{FileStorage, LocalFileStorage, MemoryFileStorage};
pub use store::{EvidenceFilter, EvidenceStore, MemoryEvidenceStore, SqliteEvidenceStore};

/// Officer id recorded for actions the vault performs on its own behalf
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// Lifecycle tag of an evidence item
///
/// Advisory only: which transitions are allowed is decided by the
/// configured [`TransitionPolicy`], and the default accepts all of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceStatus {
    Collected,
    Processing,
    Analyzed,
    Archived,
    Deleted,
}

impl EvidenceStatus {
    /// All statuses in typical lifecycle order
    pub fn all() -> [Self; 5] {
        [
            Self::Collected,
            Self::Processing,
            Self::Analyzed,
            Self::Archived,
            Self::Deleted,
        ]
    }

    /// Wire label used in export documents and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collected => "COLLECTED",
            Self::Processing => "PROCESSING",
            Self::Analyzed => "ANALYZED",
            Self::Archived => "ARCHIVED",
            Self::Deleted => "DELETED",
        }
    }

    /// Position along the typical lifecycle path
    pub fn rank(&self) -> u8 {
        match self {
            Self::Collected => 0,
            Self::Processing => 1,
            Self::Analyzed => 2,
            Self::Archived => 3,
            Self::Deleted => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl std::fmt::Display for EvidenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown evidence status: {}", s))
    }
}

/// Kind of custody event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustodyAction {
    Ingested,
    Transferred,
}

impl std::fmt::Display for CustodyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CustodyAction::Ingested => write!(f, "INGESTED"),
            CustodyAction::Transferred => write!(f, "TRANSFERRED"),
        }
    }
}

/// One handoff in the chain of custody. Never modified once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyEntry {
    pub timestamp: DateTime<Utc>,
    pub from_officer: String,
    pub to_officer: String,
    pub action: CustodyAction,
    pub purpose: String,
    /// Fingerprint confirmed at the moment of the handoff
    pub verified_hash: String,
}

/// One integrity verification. Never modified once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityCheck {
    pub timestamp: DateTime<Utc>,
    pub checked_by: String,
    /// Fingerprint computed during this check
    pub hash_value: String,
    pub is_valid: bool,
    pub notes: String,
}

/// An ingested evidence file and its forensic history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub case_number: String,
    pub officer_id: String,
    pub officer_name: String,
    /// When the recording was captured
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    pub location: String,

    /// Stored copy, owned by the file storage layer
    pub file_path: PathBuf,

    /// Canonical hash captured at ingestion; later checks compare against it
    pub file_hash: String,
    pub hash_algorithm: HashAlgorithm,
    pub file_size: u64,

    pub status: EvidenceStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,

    pub chain_of_custody: Vec<CustodyEntry>,
    pub integrity_checks: Vec<IntegrityCheck>,

    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Evidence {
    /// Officer currently holding the evidence
    pub fn current_custodian(&self) -> Option<&str> {
        self.chain_of_custody
            .last()
            .map(|entry| entry.to_officer.as_str())
    }

    /// Most recent integrity check, if any
    pub fn last_check(&self) -> Option<&IntegrityCheck> {
        self.integrity_checks.last()
    }

    /// True when the most recent check raised a tamper alert
    pub fn is_flagged(&self) -> bool {
        self.last_check().map(|check| !check.is_valid).unwrap_or(false)
    }
}

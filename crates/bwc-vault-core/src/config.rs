//! Vault configuration
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{VaultError, VaultResult};
use crate::forensics::{ForwardOnly, HashAlgorithm, TransitionPolicy, Unrestricted};

/// How new evidence ids are generated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdScheme {
    /// `BWC-<case>-<officer>-<UTC timestamp with nanoseconds>`
    #[default]
    Timestamp,
    /// `BWC-<case>-<random uuid>`
    Uuid,
}

/// Built-in status transition policies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicyKind {
    #[default]
    Unrestricted,
    ForwardOnly,
}

impl TransitionPolicyKind {
    pub fn build(&self) -> Box<dyn TransitionPolicy> {
        match self {
            TransitionPolicyKind::Unrestricted => Box::new(Unrestricted),
            TransitionPolicyKind::ForwardOnly => Box::new(ForwardOnly),
        }
    }
}

/// Configuration for an evidence vault
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory holding stored evidence copies
    pub storage_path: PathBuf,

    /// Algorithm used to fingerprint newly ingested evidence
    pub hash_algorithm: HashAlgorithm,

    /// JSONL audit trail; in-memory only when unset
    pub audit_log_path: Option<PathBuf>,

    pub id_scheme: IdScheme,

    pub transition_policy: TransitionPolicyKind,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./bwc_storage"),
            hash_algorithm: HashAlgorithm::SHA256,
            audit_log_path: None,
            id_scheme: IdScheme::Timestamp,
            transition_policy: TransitionPolicyKind::Unrestricted,
        }
    }
}

impl VaultConfig {
    /// Config storing evidence under `storage_path` with an in-memory audit log
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ..Default::default()
        }
    }

    /// Config with the audit trail persisted next to the evidence
    pub fn persistent(storage_path: impl Into<PathBuf>) -> Self {
        let storage_path = storage_path.into();
        Self {
            audit_log_path: Some(storage_path.join("audit.jsonl")),
            storage_path,
            ..Default::default()
        }
    }

    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn with_id_scheme(mut self, scheme: IdScheme) -> Self {
        self.id_scheme = scheme;
        self
    }

    pub fn with_transition_policy(mut self, policy: TransitionPolicyKind) -> Self {
        self.transition_policy = policy;
        self
    }

    /// Location of the evidence database inside the storage directory
    pub fn database_path(&self) -> PathBuf {
        self.storage_path.join("evidence.db")
    }

    /// Default vault directory (~/.bwcvault)
    pub fn default_storage_dir() -> VaultResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| {
            VaultError::io(
                "~",
                io::Error::new(io::ErrorKind::NotFound, "could not determine home directory"),
            )
        })?;
        Ok(home.join(".bwcvault"))
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> VaultResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| VaultError::io(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }
}

//! Evidence service
//!
//! Orchestrates the ledger: bytes are read and hashed outside the store's
//! exclusive section, the record is changed through [`EvidenceStore::mutate`],
//! and the audit entry is written only after the store lock is released.
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::config::{IdScheme, VaultConfig};
use crate::error::{VaultError, VaultResult};
use crate::forensics::custody::{self, TransitionPolicy};
use crate::forensics::{
    calculate_hash, AuditAction, AuditEntry, AuditLog, CaseVerification, ItemVerification,
};
use crate::report::CaseReport;
use crate::storage::{FileStorage, LocalFileStorage, MemoryFileStorage};
use crate::store::{EvidenceFilter, EvidenceStore, MemoryEvidenceStore, SqliteEvidenceStore};
use crate::{CustodyEntry, Evidence, EvidenceStatus, IntegrityCheck, SYSTEM_ACTOR};

/// Descriptive metadata supplied at ingestion
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub case_number: String,
    pub officer_id: String,
    pub officer_name: String,
    pub location: String,
    pub tags: Vec<String>,
    /// Original file name; its extension is kept on the stored copy
    pub file_name: Option<String>,
    /// Capture time; defaults to the ingestion time
    pub recorded_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u32>,
}

impl IngestRequest {
    pub fn new(
        case_number: impl Into<String>,
        officer_id: impl Into<String>,
        officer_name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            case_number: case_number.into(),
            officer_id: officer_id.into(),
            officer_name: officer_name.into(),
            location: location.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }
}

/// Issues evidence ids
struct IdGenerator {
    scheme: IdScheme,
    last_nanos: Mutex<i64>,
}

impl IdGenerator {
    fn new(scheme: IdScheme) -> Self {
        Self {
            scheme,
            last_nanos: Mutex::new(0),
        }
    }

    fn next(&self, case_number: &str, officer_id: &str) -> String {
        match self.scheme {
            IdScheme::Timestamp => {
                let now = Utc::now();
                let nanos = now.timestamp() * 1_000_000_000 + i64::from(now.timestamp_subsec_nanos());

                // strictly increasing even when the clock is coarse or steps back
                let mut last = self.last_nanos.lock().unwrap_or_else(PoisonError::into_inner);
                let stamp = nanos.max(*last + 1);
                *last = stamp;

                format!("BWC-{}-{}-{}", case_number, officer_id, stamp)
            }
            IdScheme::Uuid => format!("BWC-{}-{}", case_number, Uuid::new_v4().simple()),
        }
    }
}

/// Name of the stored copy: the id made filesystem-safe, plus the original extension
fn stored_file_name(id: &str, original_name: Option<&str>) -> String {
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let extension = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();

    format!("{}{}", stem, extension)
}

/// Evidence integrity and custody service
pub struct EvidenceService {
    config: VaultConfig,
    store: Arc<dyn EvidenceStore>,
    storage: Arc<dyn FileStorage>,
    audit: Arc<AuditLog>,
    policy: Box<dyn TransitionPolicy>,
    ids: IdGenerator,
}

impl EvidenceService {
    /// In-memory store and audit log over a local storage directory, which
    /// is created if missing
    pub fn init(config: VaultConfig) -> VaultResult<Self> {
        let storage = LocalFileStorage::open(&config.storage_path)
            .map_err(|e| VaultError::io(&config.storage_path, e))?;
        let audit = match &config.audit_log_path {
            Some(path) => AuditLog::open(path).map_err(|e| VaultError::io(path, e))?,
            None => AuditLog::new(),
        };

        let service = Self::with_backends(
            config,
            Arc::new(MemoryEvidenceStore::new()),
            Arc::new(storage),
            Arc::new(audit),
        );
        service.record_startup();
        Ok(service)
    }

    /// SQLite store, local storage and JSONL audit trail, all under the
    /// configured storage directory unless configured otherwise
    pub fn open_persistent(config: VaultConfig) -> VaultResult<Self> {
        let storage = LocalFileStorage::open(&config.storage_path)
            .map_err(|e| VaultError::io(&config.storage_path, e))?;
        let store = SqliteEvidenceStore::open(config.database_path())?;
        let audit_path = config
            .audit_log_path
            .clone()
            .unwrap_or_else(|| config.storage_path.join("audit.jsonl"));
        let audit = AuditLog::open(&audit_path).map_err(|e| VaultError::io(&audit_path, e))?;

        let service = Self::with_backends(
            config,
            Arc::new(store),
            Arc::new(storage),
            Arc::new(audit),
        );
        service.record_startup();
        Ok(service)
    }

    fn record_startup(&self) {
        self.audit.append(
            SYSTEM_ACTOR,
            AuditAction::SystemInit,
            "",
            format!(
                "Evidence vault initialised at {}",
                self.config.storage_path.display()
            ),
            None,
        );
    }

    /// Fully in-memory vault
    pub fn in_memory(config: VaultConfig) -> Self {
        Self::with_backends(
            config,
            Arc::new(MemoryEvidenceStore::new()),
            Arc::new(MemoryFileStorage::new()),
            Arc::new(AuditLog::new()),
        )
    }

    /// Assemble a service from injected collaborators
    pub fn with_backends(
        config: VaultConfig,
        store: Arc<dyn EvidenceStore>,
        storage: Arc<dyn FileStorage>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            policy: config.transition_policy.build(),
            ids: IdGenerator::new(config.id_scheme),
            config,
            store,
            storage,
            audit,
        }
    }

    /// Replace the status transition policy with a custom hook
    pub fn with_transition_policy(mut self, policy: Box<dyn TransitionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn storage(&self) -> &dyn FileStorage {
        self.storage.as_ref()
    }

    /// Fingerprint, store and register a new evidence file
    pub fn ingest(&self, bytes: &[u8], request: IngestRequest) -> VaultResult<Evidence> {
        let algorithm = self.config.hash_algorithm;
        let file_hash = calculate_hash(bytes, algorithm);
        let id = self.ids.next(&request.case_number, &request.officer_id);
        let file_path = self
            .storage
            .resolve(&stored_file_name(&id, request.file_name.as_deref()));

        // never overwrite another record's stored copy
        match self.store.get(&id) {
            Ok(_) => return Err(VaultError::DuplicateId(id)),
            Err(VaultError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        match self.storage.write_new(&file_path, bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(VaultError::DuplicateId(id));
            }
            Err(e) => return Err(VaultError::io(&file_path, e)),
        }

        let chain_of_custody = vec![custody::ingestion_entry(&request.officer_id, &file_hash)];
        let integrity_checks = vec![custody::ingestion_check(&file_hash)];

        let now = Utc::now();
        let evidence = Evidence {
            id: id.clone(),
            case_number: request.case_number,
            officer_id: request.officer_id,
            officer_name: request.officer_name,
            recorded_at: request.recorded_at.unwrap_or(now),
            duration_seconds: request.duration_seconds,
            location: request.location,
            file_path,
            file_hash,
            hash_algorithm: algorithm,
            file_size: bytes.len() as u64,
            status: EvidenceStatus::Collected,
            tags: request.tags,
            notes: String::new(),
            chain_of_custody,
            integrity_checks,
            created_at: now,
            last_modified: now,
        };
        if let Err(err) = self.store.put(evidence.clone()) {
            // the copy was written by this call, so nothing else refers to it
            if let Err(e) = self.storage.remove(&evidence.file_path) {
                tracing::warn!(
                    "Could not remove orphaned copy {}: {}",
                    evidence.file_path.display(),
                    e
                );
            }
            return Err(err);
        }

        tracing::info!(
            "Ingested {} for case {} ({} bytes, {} {})",
            evidence.id,
            evidence.case_number,
            evidence.file_size,
            algorithm,
            evidence.file_hash
        );
        self.audit.append(
            &evidence.officer_id,
            AuditAction::IngestEvidence,
            &evidence.id,
            format!("Evidence ingested from case {}", evidence.case_number),
            None,
        );

        Ok(evidence)
    }

    /// Read a file from disk and ingest it, keeping its name
    pub fn ingest_file(&self, source: &Path, mut request: IngestRequest) -> VaultResult<Evidence> {
        let bytes = std::fs::read(source).map_err(|e| VaultError::io(source, e))?;
        if request.file_name.is_none() {
            request.file_name = source
                .file_name()
                .and_then(|name| name.to_str())
                .map(String::from);
        }
        self.ingest(&bytes, request)
    }

    /// Hash of the stored copy as it is now
    fn current_hash(&self, evidence: &Evidence) -> VaultResult<String> {
        let bytes = self
            .storage
            .read_bytes(&evidence.file_path)
            .map_err(|e| VaultError::io(&evidence.file_path, e))?;
        Ok(calculate_hash(&bytes, evidence.hash_algorithm))
    }

    fn verify_record(&self, id: &str, checked_by: &str) -> VaultResult<(bool, String)> {
        let evidence = self.store.get(id)?;
        let current_hash = self.current_hash(&evidence)?;

        let mut is_valid = false;
        self.store.mutate(id, &mut |ev| {
            is_valid = custody::record_integrity_check(ev, checked_by, &current_hash);
            Ok(())
        })?;

        if is_valid {
            tracing::debug!("Integrity check passed for {}", id);
        } else {
            tracing::warn!(
                "Tamper alert on {}: expected {}, computed {}",
                id,
                evidence.file_hash,
                current_hash
            );
        }
        self.audit.append(
            checked_by,
            AuditAction::VerifyIntegrity,
            id,
            format!("Integrity check {}", if is_valid { "PASSED" } else { "FAILED" }),
            None,
        );

        Ok((is_valid, current_hash))
    }

    /// Recompute the stored copy's hash and record the outcome.
    ///
    /// `Ok(false)` means the check ran and the evidence is compromised.
    pub fn verify_integrity(&self, id: &str, checked_by: &str) -> VaultResult<bool> {
        self.verify_record(id, checked_by).map(|(is_valid, _)| is_valid)
    }

    /// Verify every item of a case in parallel
    pub fn verify_case(&self, case_number: &str, checked_by: &str) -> VaultResult<CaseVerification> {
        let mut ids: Vec<String> = self
            .search(case_number, "", None)?
            .into_iter()
            .map(|evidence| evidence.id)
            .collect();
        if ids.is_empty() {
            return Err(VaultError::NoEvidenceForCase(case_number.to_string()));
        }
        ids.sort();

        let items: Vec<ItemVerification> = ids
            .par_iter()
            .map(|id| match self.verify_record(id, checked_by) {
                Ok((is_valid, hash_value)) => ItemVerification {
                    evidence_id: id.clone(),
                    is_valid,
                    hash_value,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!("Could not verify {}: {}", id, e);
                    ItemVerification {
                        evidence_id: id.clone(),
                        is_valid: false,
                        hash_value: String::new(),
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect();

        let result = CaseVerification::from_items(case_number, items);
        tracing::info!(
            "Verified case {}: {}/{} intact, {} compromised, {} unreadable",
            case_number,
            result.summary.verified,
            result.summary.total_items,
            result.summary.compromised,
            result.summary.unreadable
        );
        Ok(result)
    }

    /// Hand custody to another officer. Refused with `IntegrityViolation`,
    /// and nothing appended, if the stored copy no longer matches.
    pub fn transfer_custody(
        &self,
        id: &str,
        from_officer: &str,
        to_officer: &str,
        purpose: &str,
    ) -> VaultResult<()> {
        let evidence = self.store.get(id)?;
        let current_hash = self.current_hash(&evidence)?;

        let result = self.store.mutate(id, &mut |ev| {
            custody::record_transfer(ev, from_officer, to_officer, purpose, &current_hash)
        });

        match result {
            Ok(_) => {
                tracing::info!("Custody of {} moved {} -> {}", id, from_officer, to_officer);
                self.audit.append(
                    from_officer,
                    AuditAction::TransferCustody,
                    id,
                    format!("Transferred to {} - {}", to_officer, purpose),
                    None,
                );
                Ok(())
            }
            Err(err @ VaultError::IntegrityViolation { .. }) => {
                tracing::warn!("Refused custody transfer of {}: {}", id, err);
                self.audit.append(
                    from_officer,
                    AuditAction::TransferRejected,
                    id,
                    format!(
                        "Transfer to {} refused - integrity check failed (computed {})",
                        to_officer, current_hash
                    ),
                    None,
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Overwrite status and notes, subject to the transition policy
    pub fn update_status(
        &self,
        id: &str,
        acting_user: &str,
        new_status: EvidenceStatus,
        notes: &str,
    ) -> VaultResult<()> {
        let policy = self.policy.as_ref();
        let mut old_status = new_status;
        self.store.mutate(id, &mut |ev| {
            old_status = custody::apply_status(ev, new_status, notes, policy)?;
            Ok(())
        })?;

        tracing::info!("Status of {} changed {} -> {}", id, old_status, new_status);
        self.audit.append(
            acting_user,
            AuditAction::UpdateStatus,
            id,
            format!("Status changed from {} to {}", old_status, new_status),
            None,
        );
        Ok(())
    }

    /// Replace the descriptive tags
    pub fn update_tags(&self, id: &str, acting_user: &str, tags: Vec<String>) -> VaultResult<()> {
        let details = format!("Tags set to [{}]", tags.join(", "));
        let mut pending = Some(tags);
        self.store.mutate(id, &mut |ev| {
            if let Some(tags) = pending.take() {
                ev.tags = tags;
            }
            Ok(())
        })?;

        self.audit
            .append(acting_user, AuditAction::UpdateTags, id, details, None);
        Ok(())
    }

    /// Records matching every non-empty filter
    pub fn search(
        &self,
        case_number: &str,
        officer_id: &str,
        status: Option<EvidenceStatus>,
    ) -> VaultResult<Vec<Evidence>> {
        self.store
            .query(&EvidenceFilter::new(case_number, officer_id, status))
    }

    pub fn get_evidence(&self, id: &str) -> VaultResult<Evidence> {
        self.store.get(id)
    }

    pub fn chain_of_custody(&self, id: &str) -> VaultResult<Vec<CustodyEntry>> {
        Ok(self.store.get(id)?.chain_of_custody)
    }

    pub fn integrity_history(&self, id: &str) -> VaultResult<Vec<IntegrityCheck>> {
        Ok(self.store.get(id)?.integrity_checks)
    }

    /// Write the full record as a JSON document
    pub fn export_evidence(&self, id: &str, destination: &Path, exported_by: &str) -> VaultResult<()> {
        let evidence = self.store.get(id)?;
        let document = serde_json::to_vec_pretty(&evidence)?;
        self.storage
            .write_bytes(destination, &document)
            .map_err(|e| VaultError::io(destination, e))?;

        tracing::info!("Exported {} to {}", id, destination.display());
        self.audit.append(
            exported_by,
            AuditAction::ExportEvidence,
            id,
            format!("Evidence exported to {}", destination.display()),
            None,
        );
        Ok(())
    }

    /// Register a record from an export document, exactly as exported
    pub fn import_evidence(&self, source: &Path, imported_by: &str) -> VaultResult<Evidence> {
        let document = self
            .storage
            .read_bytes(source)
            .map_err(|e| VaultError::io(source, e))?;
        let evidence: Evidence = serde_json::from_slice(&document)?;
        validate_document(&evidence)?;

        self.store.put(evidence.clone())?;

        tracing::info!("Imported {} from {}", evidence.id, source.display());
        self.audit.append(
            imported_by,
            AuditAction::ImportEvidence,
            &evidence.id,
            format!("Evidence imported from {}", source.display()),
            None,
        );
        Ok(evidence)
    }

    /// Aggregate all evidence of a case
    pub fn case_report(&self, case_number: &str) -> VaultResult<CaseReport> {
        let evidence = self.search(case_number, "", None)?;
        if evidence.is_empty() {
            return Err(VaultError::NoEvidenceForCase(case_number.to_string()));
        }

        let report = CaseReport::from_evidence(case_number, evidence);
        self.audit.append(
            SYSTEM_ACTOR,
            AuditAction::GenerateReport,
            "",
            format!(
                "Report generated for case {} ({} items)",
                case_number, report.total_items
            ),
            None,
        );
        Ok(report)
    }

    /// Text report for a case
    pub fn generate_report(&self, case_number: &str) -> VaultResult<String> {
        Ok(self.case_report(case_number)?.render())
    }

    /// Audit entries filtered by evidence and/or user; empty matches all
    pub fn audit_logs(&self, evidence_id: &str, user_id: &str) -> Vec<AuditEntry> {
        self.audit.query(evidence_id, user_id)
    }
}

/// Structural checks an imported record must pass
fn validate_document(evidence: &Evidence) -> VaultResult<()> {
    use serde::de::Error as _;

    if evidence.chain_of_custody.is_empty() {
        return Err(serde_json::Error::custom(format!(
            "evidence {} has an empty chain of custody",
            evidence.id
        ))
        .into());
    }
    if !evidence.hash_algorithm.is_well_formed(&evidence.file_hash) {
        return Err(serde_json::Error::custom(format!(
            "evidence {} carries a malformed {} hash",
            evidence.id, evidence.hash_algorithm
        ))
        .into());
    }
    Ok(())
}

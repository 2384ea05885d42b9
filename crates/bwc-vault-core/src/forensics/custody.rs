//! Chain of custody and integrity history
//!
//! These functions are the only code that appends to an evidence record's
//! history. They run inside the store's exclusive section, on a working copy
//! that is written back only when they succeed, so a rejected transfer or a
//! refused status change leaves the record untouched.

use chrono::Utc;

use crate::error::{VaultError, VaultResult};
use crate::forensics::verification::digests_match;
use crate::{CustodyAction, CustodyEntry, Evidence, EvidenceStatus, IntegrityCheck, SYSTEM_ACTOR};

pub const INITIAL_CUSTODY_PURPOSE: &str = "Initial evidence collection";
pub const INITIAL_CHECK_NOTE: &str = "Initial integrity check";
pub const TAMPER_ALERT: &str = "ALERT: File hash mismatch detected - possible tampering";

/// First custody entry of a freshly ingested record
pub fn ingestion_entry(officer_id: &str, file_hash: &str) -> CustodyEntry {
    CustodyEntry {
        timestamp: Utc::now(),
        from_officer: SYSTEM_ACTOR.to_string(),
        to_officer: officer_id.to_string(),
        action: CustodyAction::Ingested,
        purpose: INITIAL_CUSTODY_PURPOSE.to_string(),
        verified_hash: file_hash.to_string(),
    }
}

/// Passing check recorded at ingestion
pub fn ingestion_check(file_hash: &str) -> IntegrityCheck {
    IntegrityCheck {
        timestamp: Utc::now(),
        checked_by: SYSTEM_ACTOR.to_string(),
        hash_value: file_hash.to_string(),
        is_valid: true,
        notes: INITIAL_CHECK_NOTE.to_string(),
    }
}

/// Append the result of comparing `current_hash` with the canonical hash.
///
/// Always compares with `file_hash`, never with an earlier check.
pub fn record_integrity_check(evidence: &mut Evidence, checked_by: &str, current_hash: &str) -> bool {
    let is_valid = digests_match(&evidence.file_hash, current_hash);

    evidence.integrity_checks.push(IntegrityCheck {
        timestamp: Utc::now(),
        checked_by: checked_by.to_string(),
        hash_value: current_hash.to_string(),
        is_valid,
        notes: if is_valid {
            String::new()
        } else {
            TAMPER_ALERT.to_string()
        },
    });

    is_valid
}

/// Append a custody handoff, refusing it when the content no longer matches
/// the canonical hash.
pub fn record_transfer(
    evidence: &mut Evidence,
    from_officer: &str,
    to_officer: &str,
    purpose: &str,
    current_hash: &str,
) -> VaultResult<()> {
    if !digests_match(&evidence.file_hash, current_hash) {
        return Err(VaultError::IntegrityViolation {
            id: evidence.id.clone(),
            expected: evidence.file_hash.clone(),
            actual: current_hash.to_string(),
        });
    }

    evidence.chain_of_custody.push(CustodyEntry {
        timestamp: Utc::now(),
        from_officer: from_officer.to_string(),
        to_officer: to_officer.to_string(),
        action: CustodyAction::Transferred,
        purpose: purpose.to_string(),
        verified_hash: current_hash.to_string(),
    });

    Ok(())
}

/// Hook deciding which status changes are legal
pub trait TransitionPolicy: Send + Sync {
    /// Return `Err(reason)` to refuse the change
    fn check(&self, from: EvidenceStatus, to: EvidenceStatus) -> Result<(), String>;
}

/// Accepts every transition
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

impl TransitionPolicy for Unrestricted {
    fn check(&self, _from: EvidenceStatus, _to: EvidenceStatus) -> Result<(), String> {
        Ok(())
    }
}

/// Only moves forward along COLLECTED → PROCESSING → ANALYZED → ARCHIVED →
/// DELETED. Steps may be skipped; DELETED is terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardOnly;

impl TransitionPolicy for ForwardOnly {
    fn check(&self, from: EvidenceStatus, to: EvidenceStatus) -> Result<(), String> {
        if from == to {
            return Ok(());
        }
        if from.is_terminal() {
            return Err(format!("{} is terminal", from));
        }
        if to.rank() < from.rank() {
            return Err(format!("cannot move back from {} to {}", from, to));
        }
        Ok(())
    }
}

/// Overwrite status and notes after consulting the policy. Returns the
/// previous status.
pub fn apply_status(
    evidence: &mut Evidence,
    new_status: EvidenceStatus,
    notes: &str,
    policy: &dyn TransitionPolicy,
) -> VaultResult<EvidenceStatus> {
    let old_status = evidence.status;
    policy
        .check(old_status, new_status)
        .map_err(|reason| VaultError::InvalidTransition {
            from: old_status,
            to: new_status,
            reason,
        })?;

    evidence.status = new_status;
    evidence.notes = notes.to_string();
    Ok(old_status)
}

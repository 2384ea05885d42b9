/// Case-level evidence reports
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::forensics::HashAlgorithm;
use crate::{Evidence, EvidenceStatus};

/// Summary of one evidence item within a case report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportItem {
    pub id: String,
    pub officer_id: String,
    pub officer_name: String,
    pub recorded_at: DateTime<Utc>,
    pub location: String,
    pub status: EvidenceStatus,
    pub file_hash: String,
    pub hash_algorithm: HashAlgorithm,
    pub file_size: u64,
    pub integrity_checks: usize,
    pub custody_entries: usize,
    pub current_custodian: Option<String>,
    /// Latest integrity check raised a tamper alert
    pub flagged: bool,
}

impl From<&Evidence> for ReportItem {
    fn from(evidence: &Evidence) -> Self {
        Self {
            id: evidence.id.clone(),
            officer_id: evidence.officer_id.clone(),
            officer_name: evidence.officer_name.clone(),
            recorded_at: evidence.recorded_at,
            location: evidence.location.clone(),
            status: evidence.status,
            file_hash: evidence.file_hash.clone(),
            hash_algorithm: evidence.hash_algorithm,
            file_size: evidence.file_size,
            integrity_checks: evidence.integrity_checks.len(),
            custody_entries: evidence.chain_of_custody.len(),
            current_custodian: evidence.current_custodian().map(String::from),
            flagged: evidence.is_flagged(),
        }
    }
}

/// Aggregated view of all evidence for a case
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseReport {
    pub case_number: String,
    pub generated_at: DateTime<Utc>,
    pub total_items: usize,
    pub total_bytes: u64,
    /// Item count per status, in lifecycle order, omitting zeros
    pub status_counts: Vec<(EvidenceStatus, usize)>,
    pub flagged_items: usize,
    pub items: Vec<ReportItem>,
}

impl CaseReport {
    /// Build a report; items are ordered by creation time, then id
    pub fn from_evidence(case_number: impl Into<String>, mut evidence: Vec<Evidence>) -> Self {
        evidence.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let items: Vec<ReportItem> = evidence.iter().map(ReportItem::from).collect();
        let status_counts = EvidenceStatus::all()
            .into_iter()
            .map(|status| (status, items.iter().filter(|i| i.status == status).count()))
            .filter(|(_, count)| *count > 0)
            .collect();

        Self {
            case_number: case_number.into(),
            generated_at: Utc::now(),
            total_items: items.len(),
            total_bytes: items.iter().map(|i| i.file_size).sum(),
            status_counts,
            flagged_items: items.iter().filter(|i| i.flagged).count(),
            items,
        }
    }

    /// Human-readable text rendering
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rfc3339 = |t: &DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);

        // writing into a String cannot fail
        let _ = writeln!(out, "FORENSIC BWC EVIDENCE REPORT");
        let _ = writeln!(out, "Case Number: {}", self.case_number);
        let _ = writeln!(out, "Report Generated: {}", rfc3339(&self.generated_at));
        let _ = writeln!(out, "Total Evidence Items: {}", self.total_items);
        let _ = writeln!(out, "Total Size: {} bytes", self.total_bytes);
        let breakdown: Vec<String> = self
            .status_counts
            .iter()
            .map(|(status, count)| format!("{}={}", status, count))
            .collect();
        let _ = writeln!(out, "Status Breakdown: {}", breakdown.join(", "));
        let _ = writeln!(out, "Flagged Items: {}", self.flagged_items);
        out.push('\n');

        for item in &self.items {
            let _ = writeln!(out, "Evidence ID: {}", item.id);
            let _ = writeln!(out, "  Officer: {} ({})", item.officer_name, item.officer_id);
            let _ = writeln!(out, "  Timestamp: {}", rfc3339(&item.recorded_at));
            let _ = writeln!(out, "  Location: {}", item.location);
            let _ = writeln!(out, "  Status: {}", item.status);
            let _ = writeln!(out, "  File Hash: {} ({})", item.file_hash, item.hash_algorithm);
            let _ = writeln!(out, "  File Size: {} bytes", item.file_size);
            let _ = writeln!(out, "  Integrity Checks: {}", item.integrity_checks);
            let _ = writeln!(out, "  Chain of Custody Entries: {}", item.custody_entries);
            if let Some(custodian) = &item.current_custodian {
                let _ = writeln!(out, "  Current Custodian: {}", custodian);
            }
            if item.flagged {
                let _ = writeln!(out, "  ALERT: latest integrity check failed");
            }
            out.push('\n');
        }

        out
    }
}

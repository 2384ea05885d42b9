/// Audit trail for evidence handling
///
/// Every state-changing or sensitive-read operation on the vault leaves one
/// entry here. The log is append-only: entries are never edited or removed.
/// When opened against a file, entries are mirrored to it as JSON lines so the
/// trail survives restarts.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Types of auditable actions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Evidence file ingested and fingerprinted
    IngestEvidence,
    /// Integrity check performed
    VerifyIntegrity,
    /// Custody handed to another officer
    TransferCustody,
    /// Custody handoff refused because the content hash changed
    TransferRejected,
    /// Lifecycle status changed
    UpdateStatus,
    /// Tags replaced
    UpdateTags,
    /// Record exported to a document
    ExportEvidence,
    /// Record restored from an export document
    ImportEvidence,
    /// Case report generated
    GenerateReport,
    /// Vault initialised
    SystemInit,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IngestEvidence => "INGEST_EVIDENCE",
            Self::VerifyIntegrity => "VERIFY_INTEGRITY",
            Self::TransferCustody => "TRANSFER_CUSTODY",
            Self::TransferRejected => "TRANSFER_REJECTED",
            Self::UpdateStatus => "UPDATE_STATUS",
            Self::UpdateTags => "UPDATE_TAGS",
            Self::ExportEvidence => "EXPORT_EVIDENCE",
            Self::ImportEvidence => "IMPORT_EVIDENCE",
            Self::GenerateReport => "GENERATE_REPORT",
            Self::SystemInit => "SYSTEM_INIT",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single audit log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the log, starting at 1
    pub id: u64,

    /// Timestamp (UTC)
    pub timestamp: DateTime<Utc>,

    /// Officer or system identity that acted
    pub user_id: String,

    pub action: AuditAction,

    /// Affected evidence; empty for system-wide actions
    #[serde(default)]
    pub evidence_id: String,

    pub details: String,

    /// Network address the request came from, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
}

#[derive(Debug)]
struct AuditState {
    entries: Vec<AuditEntry>,
    next_id: u64,
    sink: Option<File>,
}

/// Append-only audit log
#[derive(Debug)]
pub struct AuditLog {
    log_path: Option<PathBuf>,
    state: Mutex<AuditState>,
}

impl AuditLog {
    /// Create an in-memory audit log
    pub fn new() -> Self {
        Self {
            log_path: None,
            state: Mutex::new(AuditState {
                entries: Vec::new(),
                next_id: 1,
                sink: None,
            }),
        }
    }

    /// Open a JSONL-backed audit log, reloading any entries already on disk
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let log_path = path.as_ref().to_path_buf();

        // Create log directory if needed
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = Vec::new();
        let mut torn_tail = None;
        let mut missing_newline = false;
        if log_path.exists() {
            let raw = std::fs::read(&log_path)?;
            let mut offset = 0;
            for line in raw.split_inclusive(|b| *b == b'\n') {
                let start = offset;
                offset += line.len();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match serde_json::from_slice::<AuditEntry>(line) {
                    Ok(entry) => entries.push(entry),
                    // an interrupted append can only damage the last line
                    Err(e) if raw[offset..].iter().all(u8::is_ascii_whitespace) => {
                        tracing::warn!(
                            "Dropping partial trailing entry in audit log {}: {}",
                            log_path.display(),
                            e
                        );
                        torn_tail = Some(start as u64);
                        break;
                    }
                    Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
                }
            }
            missing_newline = torn_tail.is_none() && raw.last().map_or(false, |b| *b != b'\n');
        }
        let next_id = entries.last().map(|e| e.id + 1).unwrap_or(1);

        if let Some(len) = torn_tail {
            OpenOptions::new().write(true).open(&log_path)?.set_len(len)?;
        }

        let mut sink = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        if missing_newline {
            writeln!(sink)?;
        }

        tracing::info!(
            "Opened audit log {} ({} existing entries)",
            log_path.display(),
            entries.len()
        );

        Ok(Self {
            log_path: Some(log_path),
            state: Mutex::new(AuditState {
                entries,
                next_id,
                sink: Some(sink),
            }),
        })
    }

    // Entries are only ever pushed whole, so a poisoned guard still holds a
    // consistent log.
    fn state(&self) -> MutexGuard<'_, AuditState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry and return its id
    pub fn append(
        &self,
        user_id: &str,
        action: AuditAction,
        evidence_id: &str,
        details: impl Into<String>,
        source_address: Option<&str>,
    ) -> u64 {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;

        let entry = AuditEntry {
            id,
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            action,
            evidence_id: evidence_id.to_string(),
            details: details.into(),
            source_address: source_address.map(String::from),
        };

        if let Some(sink) = state.sink.as_mut() {
            if let Err(e) = write_line(sink, &entry) {
                tracing::error!("Failed to persist audit entry {} ({}): {}", id, action, e);
            }
        }

        state.entries.push(entry);
        id
    }

    /// Entries matching both filters; an empty filter matches everything
    pub fn query(&self, evidence_id: &str, user_id: &str) -> Vec<AuditEntry> {
        self.state()
            .entries
            .iter()
            .filter(|e| evidence_id.is_empty() || e.evidence_id == evidence_id)
            .filter(|e| user_id.is_empty() || e.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Get all entries
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.state().entries.clone()
    }

    /// Get entries by action
    pub fn entries_by_action(&self, action: AuditAction) -> Vec<AuditEntry> {
        self.state()
            .entries
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backing file, if any
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Export to JSON
    pub fn export_json(&self, output_path: impl AsRef<Path>) -> io::Result<()> {
        let entries = self.entries();
        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        std::fs::write(output_path, json)
    }

    /// Export to CSV
    pub fn export_csv(&self, output_path: impl AsRef<Path>) -> io::Result<()> {
        let entries = self.entries();
        let mut csv = String::new();

        csv.push_str("ID,Timestamp,UserID,Action,EvidenceID,Details,SourceAddress\n");

        for entry in entries {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                entry.id,
                entry.timestamp.to_rfc3339(),
                csv_field(&entry.user_id),
                entry.action,
                csv_field(&entry.evidence_id),
                csv_field(&entry.details),
                csv_field(entry.source_address.as_deref().unwrap_or("")),
            ));
        }

        std::fs::write(output_path, csv)
    }

    /// Get statistics
    pub fn statistics(&self) -> AuditStatistics {
        let state = self.state();

        let mut action_counts = HashMap::new();
        for entry in state.entries.iter() {
            *action_counts.entry(entry.action).or_insert(0) += 1;
        }

        AuditStatistics {
            total_entries: state.entries.len(),
            action_counts,
            first_entry_time: state.entries.first().map(|e| e.timestamp),
            last_entry_time: state.entries.last().map(|e| e.timestamp),
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

fn write_line(sink: &mut File, entry: &AuditEntry) -> io::Result<()> {
    let json =
        serde_json::to_string(entry).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(sink, "{}", json)?;
    sink.flush()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Audit statistics
#[derive(Debug, Clone, Serialize)]
pub struct AuditStatistics {
    pub total_entries: usize,
    pub action_counts: HashMap<AuditAction, usize>,
    pub first_entry_time: Option<DateTime<Utc>>,
    pub last_entry_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_assigns_sequential_ids() {
        let log = AuditLog::new();

        let first = log.append("OFF-1", AuditAction::IngestEvidence, "BWC-1", "ingested", None);
        let second = log.append("OFF-1", AuditAction::VerifyIntegrity, "BWC-1", "ok", None);

        assert_eq!((first, second), (1, 2));
        assert_eq!(log.len(), 2);
        assert!(log.log_path().is_none());
    }

    #[test]
    fn test_query_filters() {
        let log = AuditLog::new();
        log.append("OFF-1", AuditAction::IngestEvidence, "BWC-1", "a", None);
        log.append("OFF-2", AuditAction::IngestEvidence, "BWC-2", "b", None);
        log.append("OFF-1", AuditAction::TransferCustody, "BWC-2", "c", Some("10.0.0.7"));
        log.append("SYSTEM", AuditAction::SystemInit, "", "d", None);

        assert_eq!(log.query("", "").len(), 4);
        assert_eq!(log.query("BWC-2", "").len(), 2);
        assert_eq!(log.query("", "OFF-1").len(), 2);

        let both = log.query("BWC-2", "OFF-1");
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].details, "c");
        assert_eq!(both[0].source_address.as_deref(), Some("10.0.0.7"));

        // insertion order survives filtering
        let details: Vec<String> = log.query("", "OFF-1").into_iter().map(|e| e.details).collect();
        assert_eq!(details, vec!["a", "c"]);
    }

    #[test]
    fn test_action_labels() {
        assert_eq!(
            serde_json::to_string(&AuditAction::VerifyIntegrity).unwrap(),
            "\"VERIFY_INTEGRITY\""
        );
        assert_eq!(AuditAction::TransferRejected.to_string(), "TRANSFER_REJECTED");
    }

    #[test]
    fn test_jsonl_persistence_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit").join("audit.jsonl");

        {
            let log = AuditLog::open(&path).unwrap();
            log.append("OFF-1", AuditAction::IngestEvidence, "BWC-1", "first", None);
            log.append("OFF-1", AuditAction::UpdateStatus, "BWC-1", "second", None);
            assert_eq!(log.log_path(), Some(path.as_path()));
        }

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let reopened = AuditLog::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        let id = reopened.append("OFF-2", AuditAction::VerifyIntegrity, "BWC-1", "third", None);
        assert_eq!(id, 3);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_reopen_drops_partial_trailing_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit.jsonl");

        {
            let log = AuditLog::open(&path).unwrap();
            log.append("OFF-1", AuditAction::IngestEvidence, "BWC-1", "first", None);
        }
        let intact = std::fs::read_to_string(&path).unwrap();

        // interrupted append
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"id":2,"timestamp":"2026-"#).unwrap();
        drop(file);

        let reopened = AuditLog::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), intact);

        let id = reopened.append("OFF-2", AuditAction::VerifyIntegrity, "BWC-1", "second", None);
        assert_eq!(id, 2);
        drop(reopened);

        let again = AuditLog::open(&path).unwrap();
        let details: Vec<String> = again.entries().into_iter().map(|e| e.details).collect();
        assert_eq!(details, vec!["first", "second"]);
    }

    #[test]
    fn test_reopen_restores_missing_final_newline() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit.jsonl");

        {
            let log = AuditLog::open(&path).unwrap();
            log.append("OFF-1", AuditAction::IngestEvidence, "BWC-1", "first", None);
        }
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, raw.trim_end()).unwrap();

        let log = AuditLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        log.append("OFF-1", AuditAction::UpdateTags, "BWC-1", "second", None);
        drop(log);

        assert_eq!(AuditLog::open(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_reopen_rejects_corruption_before_last_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit.jsonl");

        {
            let log = AuditLog::open(&path).unwrap();
            log.append("OFF-1", AuditAction::IngestEvidence, "BWC-1", "first", None);
            log.append("OFF-1", AuditAction::UpdateStatus, "BWC-1", "second", None);
        }
        let raw = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, format!("not json\n{}", raw)).unwrap();

        let err = AuditLog::open(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        // nothing was truncated
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("not json\n{}", raw)
        );
    }

    #[test]
    fn test_export_json_and_csv() {
        let temp_dir = TempDir::new().unwrap();
        let log = AuditLog::new();
        log.append(
            "OFF-1",
            AuditAction::TransferCustody,
            "BWC-1",
            "Transferred to DET-2 - Analysis, urgent",
            None,
        );

        let json_path = temp_dir.path().join("audit.json");
        log.export_json(&json_path).unwrap();
        let parsed: Vec<AuditEntry> =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed, log.entries());

        let csv_path = temp_dir.path().join("audit.csv");
        log.export_csv(&csv_path).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.starts_with("ID,Timestamp"));
        assert!(csv.contains("\"Transferred to DET-2 - Analysis, urgent\""));
    }

    #[test]
    fn test_statistics() {
        let log = AuditLog::new();
        log.append("OFF-1", AuditAction::VerifyIntegrity, "BWC-1", "PASSED", None);
        log.append("OFF-1", AuditAction::VerifyIntegrity, "BWC-1", "FAILED", None);
        log.append("OFF-1", AuditAction::TransferRejected, "BWC-1", "blocked", None);

        let stats = log.statistics();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.action_counts.get(&AuditAction::VerifyIntegrity), Some(&2));
        assert!(stats.first_entry_time <= stats.last_entry_time);
        assert_eq!(log.entries_by_action(AuditAction::TransferRejected).len(), 1);
    }
}

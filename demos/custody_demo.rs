/// Walkthrough of the evidence ledger: ingestion, verification, custody
/// transfer, tamper detection, reporting and the audit trail.
use anyhow::Result;
use bwc_vault_core::{EvidenceService, EvidenceStatus, IngestRequest, VaultConfig};
use std::fs::{self, OpenOptions};
use std::io::Write;
use tempfile::TempDir;

fn main() -> Result<()> {
    println!("🎥 BWC Vault Custody Demo");
    println!("=========================\n");

    // Create temporary workspace
    let temp_dir = TempDir::new()?;
    let workspace = temp_dir.path();
    let service = EvidenceService::init(VaultConfig::persistent(workspace.join("vault")))?;

    // ===================================================================
    // PART 1: INGESTION
    // ===================================================================
    println!("📥 Part 1: Ingestion");
    println!("--------------------\n");

    let recording = workspace.join("test_video.mp4");
    fs::write(&recording, b"This is test video content for BWC system testing")?;

    let evidence = service.ingest_file(
        &recording,
        IngestRequest::new("CASE-2024-001", "OFF-12345", "Officer Smith", "Main St & 5th Ave")
            .with_tags(["traffic-stop", "routine"])
            .with_duration(312),
    )?;
    println!("✅ Evidence ingested: {}", evidence.id);
    println!("   Hash ({}): {}", evidence.hash_algorithm, evidence.file_hash);
    println!("   Stored at: {}\n", evidence.file_path.display());

    // ===================================================================
    // PART 2: VERIFICATION AND CUSTODY
    // ===================================================================
    println!("🔗 Part 2: Verification and Custody");
    println!("-----------------------------------\n");

    let intact = service.verify_integrity(&evidence.id, "OFF-12345")?;
    println!("🔍 Integrity check: {}", if intact { "PASSED" } else { "FAILED" });

    service.transfer_custody(&evidence.id, "OFF-12345", "DET-67890", "Forensic analysis")?;
    println!("📌 Custody transferred OFF-12345 -> DET-67890");

    service.update_status(
        &evidence.id,
        "DET-67890",
        EvidenceStatus::Analyzed,
        "Analysis complete - no anomalies",
    )?;
    println!("📌 Status set to {}\n", EvidenceStatus::Analyzed);

    println!("Chain of custody:");
    for (i, entry) in service.chain_of_custody(&evidence.id)?.iter().enumerate() {
        println!(
            "   {}. {} -> {} ({}): {}",
            i + 1,
            entry.from_officer,
            entry.to_officer,
            entry.action,
            entry.purpose
        );
    }
    println!();

    // ===================================================================
    // PART 3: TAMPER DETECTION
    // ===================================================================
    println!("🚨 Part 3: Tamper Detection");
    println!("---------------------------\n");

    let mut stored = OpenOptions::new().append(true).open(&evidence.file_path)?;
    stored.write_all(b"TAMPERED")?;
    drop(stored);
    println!("✏️  Appended bytes to the stored copy");

    let intact = service.verify_integrity(&evidence.id, "DET-67890")?;
    println!("🔍 Integrity check: {}", if intact { "PASSED" } else { "FAILED" });

    match service.transfer_custody(&evidence.id, "DET-67890", "PROS-111", "Court") {
        Ok(()) => println!("⚠️  Transfer unexpectedly accepted"),
        Err(e) => println!("⛔ Transfer refused: {}", e),
    }
    println!();

    // ===================================================================
    // PART 4: REPORT, AUDIT TRAIL AND EXPORT
    // ===================================================================
    println!("📋 Part 4: Report, Audit Trail and Export");
    println!("-----------------------------------------\n");

    print!("{}", service.generate_report("CASE-2024-001")?);

    println!("Audit trail for {}:", evidence.id);
    for entry in service.audit_logs(&evidence.id, "") {
        println!("   [{}] {} by {}: {}", entry.id, entry.action, entry.user_id, entry.details);
    }
    println!();

    let export_path = workspace.join("evidence_export.json");
    service.export_evidence(&evidence.id, &export_path, "DET-67890")?;
    println!("✅ Evidence exported to {}", export_path.display());

    let audit_csv = workspace.join("audit_log.csv");
    service.audit_log().export_csv(&audit_csv)?;
    println!("✅ Audit log exported to {}", audit_csv.display());

    Ok(())
}

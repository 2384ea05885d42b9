/// Concurrency tests for the evidence service
///
/// Many threads share one service. No appended entry may be lost and no two
/// ingestions may receive the same id.
use bwc_vault_core::{
    AuditAction, EvidenceService, IdScheme, IngestRequest, VaultConfig,
};
use std::collections::HashSet;
use std::thread;
use tempfile::TempDir;

const THREADS: usize = 8;
const ROUNDS: usize = 25;

fn request(case_number: &str, officer_id: &str) -> IngestRequest {
    IngestRequest::new(case_number, officer_id, "Officer Test", "Test Location")
        .with_file_name("clip.mp4")
}

#[test]
fn test_concurrent_verifications_are_all_recorded() {
    let service = EvidenceService::in_memory(VaultConfig::default());
    let evidence = service.ingest(b"footage", request("C1", "O1")).unwrap();

    thread::scope(|scope| {
        for t in 0..THREADS {
            let service = &service;
            let id = evidence.id.as_str();
            scope.spawn(move || {
                for _ in 0..ROUNDS {
                    assert!(service.verify_integrity(id, &format!("AUD-{}", t)).unwrap());
                }
            });
        }
    });

    let checks = service.integrity_history(&evidence.id).unwrap();
    assert_eq!(checks.len(), THREADS * ROUNDS + 1);
    assert!(checks.iter().all(|check| check.is_valid));
    assert_eq!(
        service
            .audit_log()
            .entries_by_action(AuditAction::VerifyIntegrity)
            .len(),
        THREADS * ROUNDS
    );
}

#[test]
fn test_concurrent_transfers_keep_every_entry() {
    let service = EvidenceService::in_memory(VaultConfig::default());
    let evidence = service.ingest(b"footage", request("C1", "O1")).unwrap();

    thread::scope(|scope| {
        for t in 0..THREADS {
            let service = &service;
            let id = evidence.id.as_str();
            scope.spawn(move || {
                for round in 0..ROUNDS {
                    service
                        .transfer_custody(id, "O1", &format!("DET-{}-{}", t, round), "Review")
                        .unwrap();
                }
            });
        }
    });

    let chain = service.chain_of_custody(&evidence.id).unwrap();
    assert_eq!(chain.len(), THREADS * ROUNDS + 1);

    let recipients: HashSet<&str> = chain[1..].iter().map(|e| e.to_officer.as_str()).collect();
    assert_eq!(recipients.len(), THREADS * ROUNDS);
}

#[test]
fn test_concurrent_ingestion_yields_unique_ids() {
    let temp_dir = TempDir::new().unwrap();
    let service = EvidenceService::init(VaultConfig::new(temp_dir.path())).unwrap();

    let ids: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let service = &service;
                scope.spawn(move || {
                    (0..ROUNDS)
                        .map(|round| {
                            let bytes = format!("clip {} {}", t, round);
                            service
                                .ingest(bytes.as_bytes(), request("C-SAME", "O-SAME"))
                                .unwrap()
                                .id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), THREADS * ROUNDS);
    assert_eq!(
        service.search("C-SAME", "", None).unwrap().len(),
        THREADS * ROUNDS
    );
    for id in &ids {
        assert!(service.verify_integrity(id, "AUDITOR").unwrap());
    }
}

#[test]
fn test_concurrent_ingestion_with_uuid_ids() {
    let config = VaultConfig::default().with_id_scheme(IdScheme::Uuid);
    let service = EvidenceService::in_memory(config);

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let service = &service;
            scope.spawn(move || {
                for _ in 0..ROUNDS {
                    service.ingest(b"same bytes", request("C1", "O1")).unwrap();
                }
            });
        }
    });

    assert_eq!(service.search("C1", "", None).unwrap().len(), THREADS * ROUNDS);
}

#[test]
fn test_parallel_case_verification_against_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let service =
        EvidenceService::open_persistent(VaultConfig::persistent(temp_dir.path())).unwrap();

    for i in 0..20 {
        service
            .ingest(format!("clip {}", i).as_bytes(), request("C-BULK", "O1"))
            .unwrap();
    }

    let result = service.verify_case("C-BULK", "AUDITOR").unwrap();
    assert_eq!(result.summary.total_items, 20);
    assert_eq!(result.summary.verified, 20);
    assert_eq!(result.summary.compromised, 0);

    let ids: Vec<&str> = result.items.iter().map(|i| i.evidence_id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

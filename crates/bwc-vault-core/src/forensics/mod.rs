/// Forensic building blocks: fingerprinting, custody history, audit trail
pub mod audit;
pub mod custody;
pub mod verification;

pub use audit::{AuditAction, AuditEntry, AuditLog, AuditStatistics};

pub use custody::{ForwardOnly, TransitionPolicy, Unrestricted, TAMPER_ALERT};

pub use verification::{
    calculate_file_hash, calculate_hash, digests_match, hash_reader, CaseVerification,
    HashAlgorithm, ItemVerification, VerificationSummary,
};

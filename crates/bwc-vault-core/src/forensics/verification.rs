/// Content fingerprinting for evidence integrity
///
/// Hashes are lowercase hex strings. The canonical hash of an evidence item is
/// produced here at ingestion and every later check recomputes it the same way.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

const READ_BUFFER_SIZE: usize = 8192;

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    MD5,
    SHA1,
    #[default]
    SHA256,
    SHA512,
}

impl HashAlgorithm {
    /// Get all algorithms
    pub fn all() -> Vec<Self> {
        vec![Self::MD5, Self::SHA1, Self::SHA256, Self::SHA512]
    }

    /// Get algorithm name
    pub fn name(&self) -> &'static str {
        match self {
            Self::MD5 => "MD5",
            Self::SHA1 => "SHA1",
            Self::SHA256 => "SHA256",
            Self::SHA512 => "SHA512",
        }
    }

    /// Raw digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            Self::MD5 => 16,
            Self::SHA1 => 20,
            Self::SHA256 => 32,
            Self::SHA512 => 64,
        }
    }

    /// Length of the hex encoding
    pub fn hex_len(&self) -> usize {
        self.digest_len() * 2
    }

    /// Whether `hash` is shaped like a digest of this algorithm
    pub fn is_well_formed(&self, hash: &str) -> bool {
        hash.len() == self.hex_len() && hash.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "").to_ascii_uppercase();
        Self::all()
            .into_iter()
            .find(|algorithm| algorithm.name() == normalized)
            .ok_or_else(|| format!("unsupported hash algorithm: {}", s))
    }
}

/// Incremental hasher over any supported algorithm
enum StreamHasher {
    Md5(md5::Context),
    Sha1(sha1::Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl StreamHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::MD5 => Self::Md5(md5::Context::new()),
            HashAlgorithm::SHA1 => Self::Sha1(sha1::Sha1::new()),
            HashAlgorithm::SHA256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::SHA512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(data),
            Self::Sha1(hasher) => hasher.update(data),
            Self::Sha256(hasher) => hasher.update(data),
            Self::Sha512(hasher) => hasher.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(ctx) => format!("{:x}", ctx.compute()),
            Self::Sha1(hasher) => format!("{:x}", hasher.finalize()),
            Self::Sha256(hasher) => format!("{:x}", hasher.finalize()),
            Self::Sha512(hasher) => format!("{:x}", hasher.finalize()),
        }
    }
}

/// Calculate hash from byte slice
pub fn calculate_hash(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = StreamHasher::new(algorithm);
    hasher.update(data);
    hasher.finalize_hex()
}

/// Hash everything a reader yields, returning the digest and byte count
pub fn hash_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> io::Result<(String, u64)> {
    let mut hasher = StreamHasher::new(algorithm);
    let mut buffer = vec![0; READ_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        total += n as u64;
    }
    Ok((hasher.finalize_hex(), total))
}

/// Calculate hash for a file without loading it into memory
pub fn calculate_file_hash(path: impl AsRef<Path>, algorithm: HashAlgorithm) -> io::Result<String> {
    let file = File::open(path.as_ref())?;
    let (hash, size) = hash_reader(file, algorithm)?;
    tracing::debug!(
        "{} of {} ({} bytes): {}",
        algorithm,
        path.as_ref().display(),
        size,
        hash
    );
    Ok(hash)
}

/// Compare two hex digests
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

/// Outcome of verifying one evidence item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemVerification {
    pub evidence_id: String,
    pub is_valid: bool,
    /// Hash computed during the check; empty when the check could not run
    pub hash_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a case-wide verification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationSummary {
    pub total_items: usize,
    pub verified: usize,
    pub compromised: usize,
    /// Items whose bytes could not be read
    pub unreadable: usize,
    pub success_rate: f32,
}

/// Result of verifying every item of a case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseVerification {
    pub case_number: String,
    pub items: Vec<ItemVerification>,
    pub summary: VerificationSummary,
}

impl CaseVerification {
    pub fn from_items(case_number: impl Into<String>, items: Vec<ItemVerification>) -> Self {
        let total_items = items.len();
        let verified = items.iter().filter(|i| i.is_valid).count();
        let unreadable = items.iter().filter(|i| i.error.is_some()).count();
        let compromised = total_items - verified - unreadable;

        let success_rate = if total_items > 0 {
            verified as f32 / total_items as f32
        } else {
            0.0
        };

        Self {
            case_number: case_number.into(),
            items,
            summary: VerificationSummary {
                total_items,
                verified,
                compromised,
                unreadable,
                success_rate,
            },
        }
    }

    /// Ids of items whose current bytes disagree with the canonical hash
    pub fn compromised_ids(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| !i.is_valid && i.error.is_none())
            .map(|i| i.evidence_id.as_str())
            .collect()
    }
}

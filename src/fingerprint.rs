//! Visitor fingerprints used as deduplication keys.
//!
//! A fingerprint is the SHA-256 of the client address and user-agent, or an
//! HMAC-SHA256 of the same input when a salt is configured. Only the hex
//! digest ever leaves this module.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Stand-in for an absent address or user-agent
pub const UNKNOWN: &str = "unknown";

/// Opaque, fixed-length deduplication key (64 lowercase hex chars)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VisitFingerprint(String);

impl VisitFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VisitFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough to correlate in test output
        write!(f, "VisitFingerprint({}..)", &self.0[..8])
    }
}

/// Derives fingerprints, optionally keyed by a salt
#[derive(Clone, Default)]
pub struct FingerprintGenerator {
    keyed: Option<HmacSha256>,
}

impl FingerprintGenerator {
    pub fn new(salt: Option<&str>) -> Result<Self, InvalidLength> {
        let keyed = salt
            .map(|s| HmacSha256::new_from_slice(s.as_bytes()))
            .transpose()?;
        Ok(Self { keyed })
    }

    pub fn generate(&self, address: &str, user_agent: &str) -> VisitFingerprint {
        let address = non_empty_or_unknown(address);
        let user_agent = non_empty_or_unknown(user_agent);

        let digest = match &self.keyed {
            Some(keyed) => {
                let mut mac = keyed.clone();
                feed(&mut mac, address, user_agent);
                hex::encode(mac.finalize().into_bytes())
            }
            None => {
                let mut hasher = Sha256::new();
                feed(&mut hasher, address, user_agent);
                hex::encode(hasher.finalize())
            }
        };

        VisitFingerprint(digest)
    }
}

fn non_empty_or_unknown(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNKNOWN
    } else {
        trimmed
    }
}

/// Length-prefix the address so ("1.2.3.45", "x") and ("1.2.3.4", "5x") differ
fn feed(state: &mut impl sha2::digest::Update, address: &str, user_agent: &str) {
    state.update(&(address.len() as u64).to_be_bytes());
    state.update(address.as_bytes());
    state.update(user_agent.as_bytes());
}

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::MAX_ENDPOINT_BYTES;
use crate::error::VigilError;

/// Reporter standing as reported by the external stake/balance oracle.
pub type Standing = u128;

/// Unix timestamp (seconds, UTC) carried by the ordering log.
pub type Timestamp = i64;

/// Block height (or log sequence number) of the ordering log.
pub type BlockHeight = u64;

/// Per-report severity. Profiles accumulate it with 16-bit saturation.
pub type Severity = u16;

/// Ban length in seconds.
pub type DurationSecs = i64;

// ── LogicalTime ──────────────────────────────────────────────────────────────

/// The clock supplied by the ordering log for one applied operation.
///
/// `height` drives the reveal delay; `timestamp` is what profiles, verdicts
/// and ban windows record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalTime {
    pub height: BlockHeight,
    pub timestamp: Timestamp,
}

impl LogicalTime {
    pub fn new(height: BlockHeight, timestamp: Timestamp) -> Self {
        Self { height, timestamp }
    }
}

// ── ReporterId ───────────────────────────────────────────────────────────────

/// 32-byte identity of a reporter or operator, authenticated by the
/// transport layer before an operation reaches the engine.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReporterId(pub [u8; 32]);

impl ReporterId {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Base-58 encoded string representation.
    pub fn to_b58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn from_b58(s: &str) -> Result<Self, VigilError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| VigilError::InvalidIdentity(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| VigilError::InvalidIdentity(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ReporterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_b58())
    }
}

impl fmt::Debug for ReporterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b58 = self.to_b58();
        write!(f, "ReporterId({})", &b58[..b58.len().min(8)])
    }
}

// ── EndpointId ───────────────────────────────────────────────────────────────

/// The subject being judged. Observed as an IP address string, but any
/// identifier works.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(pub String);

impl EndpointId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Reject identifiers that are empty, too long, or padded with whitespace.
    pub fn validate(&self) -> Result<(), VigilError> {
        if self.0.is_empty() || self.0.len() > MAX_ENDPOINT_BYTES || self.0.trim() != self.0 {
            return Err(VigilError::InvalidEndpoint(self.0.clone()));
        }
        Ok(())
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EndpointId({})", self.0)
    }
}

// ── EvidenceHash ─────────────────────────────────────────────────────────────

/// 32-byte hash of a not-yet-disclosed endpoint identifier.
/// The protocol does not learn the endpoint until the reveal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceHash(pub [u8; 32]);

impl EvidenceHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for EvidenceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvidenceHash({}…)", &self.to_hex()[..16])
    }
}

// ── CommitmentKey ────────────────────────────────────────────────────────────

/// Storage key of a commitment: BLAKE3(domain || evidence_hash || nonce || reporter).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitmentKey(pub [u8; 32]);

impl CommitmentKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for CommitmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for CommitmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitmentKey({}…)", &self.to_hex()[..16])
    }
}

// ── OpId ─────────────────────────────────────────────────────────────────────

/// 32-byte operation identifier: BLAKE3 of the canonical serialized operation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(pub [u8; 32]);

impl OpId {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpId({}…)", &self.to_hex()[..16])
    }
}

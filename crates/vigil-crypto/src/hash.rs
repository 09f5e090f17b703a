use vigil_core::constants::{COMMITMENT_DOMAIN, OPERATION_DOMAIN};
use vigil_core::operation::{Operation, Submission};
use vigil_core::types::{CommitmentKey, EndpointId, EvidenceHash, OpId, ReporterId};

/// Compute BLAKE3 hash of arbitrary bytes → 32-byte array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hash of an endpoint identifier, as committed to before disclosure.
/// Also used as the fixed-width storage prefix for the endpoint's reports.
pub fn evidence_hash(endpoint: &EndpointId) -> EvidenceHash {
    EvidenceHash(blake3_hash(endpoint.as_bytes()))
}

/// Derive the commitment key binding evidence, nonce and reporter identity.
///
/// The nonce is length-prefixed so `(hash, "ab", id)` and a different split
/// of the same bytes cannot collide.
pub fn commitment_key(evidence: &EvidenceHash, nonce: &str, reporter: &ReporterId) -> CommitmentKey {
    let mut h = blake3::Hasher::new();
    h.update(COMMITMENT_DOMAIN);
    h.update(evidence.as_bytes());
    h.update(&(nonce.len() as u64).to_le_bytes());
    h.update(nonce.as_bytes());
    h.update(reporter.as_bytes());
    CommitmentKey(*h.finalize().as_bytes())
}

/// Derive an OpId from the canonical submission body bytes.
pub fn op_id_from_body(body_bytes: &[u8]) -> OpId {
    let mut h = blake3::Hasher::new();
    h.update(OPERATION_DOMAIN);
    h.update(body_bytes);
    OpId::from_bytes(*h.finalize().as_bytes())
}

/// Wrap an operation for submission, computing its id.
pub fn seal_submission(caller: ReporterId, client_ref: u64, operation: Operation) -> Submission {
    let mut sub = Submission {
        op_id: OpId::from_bytes([0u8; 32]),
        caller,
        client_ref,
        operation,
    };
    sub.op_id = op_id_from_body(&sub.body_bytes());
    sub
}

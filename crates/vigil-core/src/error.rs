use thiserror::Error;

use crate::types::BlockHeight;

#[derive(Debug, Error)]
pub enum VigilError {
    // ── Reporter standing ────────────────────────────────────────────────────
    #[error("insufficient standing: need {need}, have {have}")]
    InsufficientStanding { need: u128, have: u128 },

    // ── Commit / reveal ──────────────────────────────────────────────────────
    #[error("commitment already exists: {0}")]
    DuplicateCommitment(String),

    #[error("no matching commitment: {0}")]
    CommitmentNotFound(String),

    #[error("commitment already revealed")]
    AlreadyRevealed,

    #[error("reveal delay not reached (revealable at height {ready_at})")]
    RevealTooEarly { ready_at: BlockHeight },

    #[error("nonce exceeds maximum length of {max} bytes")]
    NonceTooLong { max: usize },

    // ── Whitelist ────────────────────────────────────────────────────────────
    #[error("endpoint is whitelisted: {0}")]
    ProtectedEndpoint(String),

    // ── Evidence ─────────────────────────────────────────────────────────────
    #[error("invalid endpoint identifier: {0}")]
    InvalidEndpoint(String),

    #[error("invalid evidence: {0}")]
    InvalidEvidence(String),

    #[error("no report from this reporter for endpoint {0}")]
    ReportNotFound(String),

    #[error("threat already confirmed: {0}")]
    ThreatAlreadyConfirmed(String),

    // ── Batch ingestion ──────────────────────────────────────────────────────
    #[error("malformed batch: {endpoints} endpoints, {severities} severities")]
    MalformedBatch { endpoints: usize, severities: usize },

    #[error("batch too large: maximum {max} entries, got {got}")]
    BatchTooLarge { max: usize, got: usize },

    #[error("batch is empty")]
    EmptyBatch,

    // ── Ban policy ───────────────────────────────────────────────────────────
    #[error("invalid ban tier table: {0}")]
    InvalidBanTiers(String),

    // ── Authority ────────────────────────────────────────────────────────────
    #[error("caller is not a protocol operator")]
    Unauthorized,

    #[error("invalid identity encoding: {0}")]
    InvalidIdentity(String),

    #[error("operation id does not match its body: {0}")]
    OperationIdMismatch(String),

    #[error("operation already applied: {0}")]
    DuplicateOperation(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("genesis not applied")]
    GenesisMissing,

    #[error("genesis already applied")]
    GenesisAlreadyApplied,

    #[error("{0}")]
    Other(String),
}

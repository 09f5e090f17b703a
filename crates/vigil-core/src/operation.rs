use serde::{Deserialize, Serialize};

use crate::ban::BanTier;
use crate::event::EventRecord;
use crate::records::EvidencePayload;
use crate::types::{
    BlockHeight, CommitmentKey, EndpointId, EvidenceHash, LogicalTime, OpId, ReporterId, Severity,
};

// ── Operation ────────────────────────────────────────────────────────────────

/// Every state-changing request accepted by the engine is one of these.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Operation {
    // ── Adversarial reporting path ───────────────────────────────────────────

    /// Record a blind commitment to evidence about `hash(endpoint)`.
    /// Gated by the reporter's standing.
    Commit {
        evidence_hash: EvidenceHash,
        nonce: String,
    },

    /// Disclose the endpoint and evidence behind an earlier commitment.
    Reveal {
        endpoint: EndpointId,
        nonce: String,
        evidence: EvidencePayload,
    },

    /// Withdraw the caller's own report for an endpoint that is not yet
    /// confirmed.
    RevokeReport {
        endpoint: EndpointId,
    },

    // ── Privileged operator path ─────────────────────────────────────────────

    /// Bulk profile resynchronization. Bypasses commit-reveal and quorum.
    ReportBatch {
        endpoints: Vec<EndpointId>,
        severities: Vec<Severity>,
    },

    AddToWhitelist {
        endpoints: Vec<EndpointId>,
    },

    RemoveFromWhitelist {
        endpoints: Vec<EndpointId>,
    },

    /// Governance verdict without quorum.
    ForceConfirm {
        endpoint: EndpointId,
    },

    UpdateBanTiers {
        tiers: Vec<BanTier>,
    },
}

impl Operation {
    /// Operations only a protocol operator may submit.
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            Operation::ReportBatch { .. }
                | Operation::AddToWhitelist { .. }
                | Operation::RemoveFromWhitelist { .. }
                | Operation::ForceConfirm { .. }
                | Operation::UpdateBanTiers { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Commit { .. } => "commit",
            Operation::Reveal { .. } => "reveal",
            Operation::RevokeReport { .. } => "revoke_report",
            Operation::ReportBatch { .. } => "report_batch",
            Operation::AddToWhitelist { .. } => "add_to_whitelist",
            Operation::RemoveFromWhitelist { .. } => "remove_from_whitelist",
            Operation::ForceConfirm { .. } => "force_confirm",
            Operation::UpdateBanTiers { .. } => "update_ban_tiers",
        }
    }
}

// ── Submission ───────────────────────────────────────────────────────────────

/// An operation as delivered by the transport layer, with the caller
/// identity it authenticated.
///
/// `op_id` is BLAKE3 of the canonical bincode serialization of the body
/// (`caller`, `client_ref`, `operation`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Submission {
    pub op_id: OpId,
    pub caller: ReporterId,
    /// Caller-chosen value that distinguishes otherwise identical operations.
    pub client_ref: u64,
    pub operation: Operation,
}

/// The bytes hashed to produce `op_id`. Excludes `op_id` itself.
#[derive(Serialize)]
pub struct SubmissionBody<'a> {
    pub caller: &'a ReporterId,
    pub client_ref: u64,
    pub operation: &'a Operation,
}

impl Submission {
    pub fn body(&self) -> SubmissionBody<'_> {
        SubmissionBody {
            caller: &self.caller,
            client_ref: self.client_ref,
            operation: &self.operation,
        }
    }

    /// Serialize the body to canonical bytes (bincode).
    pub fn body_bytes(&self) -> Vec<u8> {
        bincode::serialize(&self.body()).expect("body serialization is infallible")
    }
}

/// An entry of the append-only operation log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggedOperation {
    pub sequence: u64,
    pub at: LogicalTime,
    pub submission: Submission,
}

// ── Receipts ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitReceipt {
    pub key: CommitmentKey,
    pub commit_height: BlockHeight,
    pub revealable_at: BlockHeight,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevealReceipt {
    pub endpoint: EndpointId,
    pub key: CommitmentKey,
    /// False when the reporter already contributed in this window.
    pub counted: bool,
    pub report_count: u32,
    pub total_risk_score: u64,
    /// True only for the reveal that reached quorum.
    pub confirmed_now: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Receipt {
    Committed(CommitReceipt),
    Revealed(RevealReceipt),
    ReportRevoked { endpoint: EndpointId, report_count: u32 },
    BatchApplied { endpoints: usize },
    WhitelistUpdated { changed: usize },
    ForceConfirmed { endpoint: EndpointId, offense_count: u32 },
    BanTiersUpdated,
}

/// Result of applying one submission: its place in the log, the
/// operation-specific receipt, and the events it emitted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Applied {
    pub sequence: u64,
    pub op_id: OpId,
    pub receipt: Receipt,
    pub events: Vec<EventRecord>,
}

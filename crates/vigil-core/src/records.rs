//! vigil-core::records
//!
//! Records persisted in the state tables.
//!
//! - `commitments[CommitmentKey]`      → `Commitment`
//! - `profiles[EndpointId]`            → `ThreatProfile`
//! - `status[EndpointId]`              → `ThreatStatus`
//! - `reports[endpoint ‖ reporter]`    → `ReportRecord`
//!
//! All records are serde-round-trippable for storage in sled trees.

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_CATEGORY_BYTES, MAX_CPU_LOAD};
use crate::error::VigilError;
use crate::types::{
    BlockHeight, CommitmentKey, DurationSecs, EndpointId, EvidenceHash, ReporterId, Severity,
    Timestamp,
};

// ── Commitment ───────────────────────────────────────────────────────────────

/// A blind claim that `reporter` holds evidence against some endpoint.
///
/// Never deleted: a revealed commitment stays in the table for audit and
/// replay protection, an unrevealed one simply stays `revealed = false`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub key: CommitmentKey,
    pub evidence_hash: EvidenceHash,
    pub reporter: ReporterId,
    pub commit_height: BlockHeight,
    pub commit_time: Timestamp,
    /// One-way false → true.
    pub revealed: bool,
    pub revealed_height: Option<BlockHeight>,
}

impl Commitment {
    /// First height at which the commitment may be revealed.
    pub fn revealable_at(&self, reveal_delay: BlockHeight) -> BlockHeight {
        self.commit_height.saturating_add(reveal_delay)
    }
}

// ── EvidencePayload ──────────────────────────────────────────────────────────

/// Evidence disclosed alongside a reveal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePayload {
    /// Observed CPU load on the reporting host (percent).
    pub cpu_load: u8,
    /// Digest of the supporting log bundle; opaque to the protocol.
    pub log_hash: String,
    /// Offense category, e.g. "DDoS", "PortScan".
    pub attack_type: String,
    /// Severity this reporter assigns to the offense.
    pub risk_score: Severity,
}

impl EvidencePayload {
    pub fn validate(&self, max_cpu_load: u8) -> Result<(), VigilError> {
        let max_cpu_load = max_cpu_load.min(MAX_CPU_LOAD);
        if self.cpu_load > max_cpu_load {
            return Err(VigilError::InvalidEvidence(format!(
                "cpu load {} out of range 0..={}",
                self.cpu_load, max_cpu_load
            )));
        }
        if self.attack_type.trim().is_empty() {
            return Err(VigilError::InvalidEvidence("empty attack type".into()));
        }
        if self.attack_type.len() > MAX_CATEGORY_BYTES {
            return Err(VigilError::InvalidEvidence(format!(
                "attack type exceeds {MAX_CATEGORY_BYTES} bytes"
            )));
        }
        Ok(())
    }
}

// ── ReportRecord ─────────────────────────────────────────────────────────────

/// One reporter's revealed evidence against one endpoint.
///
/// The set of report records for an endpoint is the set of contributing
/// identities; it is what guarantees exactly-once counting toward quorum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub endpoint: EndpointId,
    pub reporter: ReporterId,
    pub commitment: CommitmentKey,
    pub severity: Severity,
    pub attack_type: String,
    pub cpu_load: u8,
    pub log_hash: String,
    /// Timestamp of the first reveal by this reporter in the current window.
    pub first_reported_at: Timestamp,
    /// Timestamp of the latest reveal by this reporter.
    pub reported_at: Timestamp,
    /// Log sequence of the first reveal; orders contributors.
    pub sequence: u64,
}

// ── ThreatProfile ────────────────────────────────────────────────────────────

/// Per-endpoint offense history that drives ban escalation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatProfile {
    /// Latest reported activity, counted or not.
    pub last_offense_time: Timestamp,
    /// Time of the latest counted offense; the ban window starts here.
    #[serde(default)]
    pub last_punished_at: Timestamp,
    /// Never decreases.
    pub offense_count: u32,
    /// Accumulated severity, saturating at `u16::MAX`.
    pub risk_score: Severity,
}

impl ThreatProfile {
    /// Count a confirmed offense: bump the counter, accumulate severity
    /// without overflowing, stamp the time.
    pub fn record_offense(&mut self, severity: Severity, at: Timestamp) {
        self.offense_count = self.offense_count.saturating_add(1);
        self.risk_score = self.risk_score.saturating_add(severity);
        self.last_punished_at = self.last_punished_at.max(at);
        self.touch(at);
    }

    /// Refresh the last-offense time without counting an offense.
    pub fn touch(&mut self, at: Timestamp) {
        self.last_offense_time = self.last_offense_time.max(at);
    }
}

// ── ThreatStatus ─────────────────────────────────────────────────────────────

/// Consensus state for one endpoint. `Unseen` endpoints have no record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatStatus {
    pub is_confirmed: bool,
    /// Distinct contributing reporters in the open evidence window.
    pub report_count: u32,
    pub total_risk_score: u64,
    /// Zero until confirmation.
    pub confirmed_at: Timestamp,
    /// Dominant category at the moment of confirmation.
    pub verdict_category: Option<String>,
}

/// Coarse consensus phase of an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreatPhase {
    Unseen,
    Reporting,
    /// Terminal.
    Confirmed,
}

impl ThreatStatus {
    pub fn phase(&self) -> ThreatPhase {
        if self.is_confirmed {
            ThreatPhase::Confirmed
        } else if self.report_count > 0 {
            ThreatPhase::Reporting
        } else {
            ThreatPhase::Unseen
        }
    }
}

// ── BanWindow ────────────────────────────────────────────────────────────────

/// The currently active ban for an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanWindow {
    pub starts_at: Timestamp,
    pub duration_secs: DurationSecs,
    pub expires_at: Timestamp,
    pub offense_count: u32,
}

use serde::{Deserialize, Serialize};

use crate::ban::BanTier;
use crate::types::{CommitmentKey, DurationSecs, EndpointId, LogicalTime, ReporterId};

/// Observable side effects of applied operations, appended to the event log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    EvidenceCommitted {
        key: CommitmentKey,
        reporter: ReporterId,
    },
    ThreatRevealed {
        endpoint: EndpointId,
        reporter: ReporterId,
        nonce: String,
    },
    /// The reporter's own host is defending against the endpoint.
    LocalDefenseActive {
        endpoint: EndpointId,
        reporter: ReporterId,
    },
    /// Binding verdict. Fires exactly once per endpoint.
    GlobalThreatConfirmed {
        endpoint: EndpointId,
        category: String,
        report_count: u32,
        total_risk_score: u64,
        offense_count: u32,
        ban_duration_secs: DurationSecs,
    },
    ReportRevoked {
        endpoint: EndpointId,
        reporter: ReporterId,
    },
    ReportsExpired {
        endpoint: EndpointId,
        reporters: Vec<ReporterId>,
    },
    PunishBatch {
        endpoints: Vec<EndpointId>,
        ban_durations: Vec<DurationSecs>,
    },
    WhitelistUpdated {
        endpoint: EndpointId,
        whitelisted: bool,
    },
    BanTiersUpdated {
        tiers: Vec<BanTier>,
    },
}

/// An event as stored: the log sequence of the operation that emitted it,
/// its position within that operation, and the logical time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    pub sequence: u64,
    pub index: u32,
    pub at: LogicalTime,
    pub event: Event,
}

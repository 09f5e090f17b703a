use serde::{Deserialize, Serialize};
use std::sync::Arc;

use vigil_core::ban::BanTiers;
use vigil_core::error::VigilError;
use vigil_core::event::EventRecord;
use vigil_core::operation::LoggedOperation;
use vigil_core::records::{BanWindow, Commitment, ThreatProfile, ThreatStatus};
use vigil_core::types::{
    CommitmentKey, DurationSecs, EndpointId, ReporterId, Severity, Timestamp,
};

use crate::db::StateDb;

/// Profiles for a list of endpoints as parallel arrays, index-aligned with
/// the request. Unknown endpoints read as zeroes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilesBatch {
    pub last_offense_times: Vec<Timestamp>,
    pub offense_counts: Vec<u32>,
    pub risk_scores: Vec<Severity>,
}

/// Read-only view over the state tables.
///
/// Every read goes to sled directly; since each operation lands in one
/// transaction, a read never observes half of one.
#[derive(Clone)]
pub struct ThreatQuery {
    db: Arc<StateDb>,
}

impl ThreatQuery {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self { db }
    }

    pub fn threat_status(&self, endpoint: &EndpointId) -> Result<ThreatStatus, VigilError> {
        Ok(self.db.get_status(endpoint)?.unwrap_or_default())
    }

    pub fn profile(&self, endpoint: &EndpointId) -> Result<ThreatProfile, VigilError> {
        Ok(self.db.get_profile(endpoint)?.unwrap_or_default())
    }

    pub fn profiles_batch(&self, endpoints: &[EndpointId]) -> Result<ProfilesBatch, VigilError> {
        let mut out = ProfilesBatch {
            last_offense_times: Vec::with_capacity(endpoints.len()),
            offense_counts: Vec::with_capacity(endpoints.len()),
            risk_scores: Vec::with_capacity(endpoints.len()),
        };
        for e in endpoints {
            let p = self.profile(e)?;
            out.last_offense_times.push(p.last_offense_time);
            out.offense_counts.push(p.offense_count);
            out.risk_scores.push(p.risk_score);
        }
        Ok(out)
    }

    /// Ban length for `offense_count` under the current tier table.
    pub fn ban_duration(&self, offense_count: u32) -> Result<DurationSecs, VigilError> {
        Ok(self.db.ban_tiers()?.duration_for(offense_count))
    }

    pub fn ban_tiers(&self) -> Result<BanTiers, VigilError> {
        self.db.ban_tiers()
    }

    pub fn is_whitelisted(&self, endpoint: &EndpointId) -> Result<bool, VigilError> {
        self.db.is_whitelisted(endpoint)
    }

    pub fn whitelist(&self) -> Result<Vec<EndpointId>, VigilError> {
        self.db.whitelist_entries()
    }

    /// Number of report records stored for `endpoint`.
    pub fn evidence_count(&self, endpoint: &EndpointId) -> Result<usize, VigilError> {
        Ok(self.db.reports_for(endpoint)?.len())
    }

    pub fn has_reported(&self, reporter: &ReporterId, endpoint: &EndpointId) -> Result<bool, VigilError> {
        Ok(self.db.get_report(endpoint, reporter)?.is_some())
    }

    pub fn commitment(&self, key: &CommitmentKey) -> Result<Option<Commitment>, VigilError> {
        self.db.get_commitment(key)
    }

    pub fn is_commitment_revealed(&self, key: &CommitmentKey) -> Result<bool, VigilError> {
        Ok(self.db.get_commitment(key)?.map(|c| c.revealed).unwrap_or(false))
    }

    /// The ban in force at `now`, if any.
    ///
    /// The window opens at the latest counted offense, so reveals that do
    /// not reach a verdict never extend it. Whitelisted endpoints never
    /// have one, whatever their history.
    pub fn active_ban(&self, endpoint: &EndpointId, now: Timestamp) -> Result<Option<BanWindow>, VigilError> {
        if self.db.is_whitelisted(endpoint)? {
            return Ok(None);
        }
        let Some(profile) = self.db.get_profile(endpoint)? else {
            return Ok(None);
        };
        let duration_secs = self.ban_duration(profile.offense_count)?;
        if duration_secs == 0 {
            return Ok(None);
        }
        let expires_at = profile.last_punished_at.saturating_add(duration_secs);
        if now >= expires_at {
            return Ok(None);
        }
        Ok(Some(BanWindow {
            starts_at: profile.last_punished_at,
            duration_secs,
            expires_at,
            offense_count: profile.offense_count,
        }))
    }

    pub fn events(&self, from: u64, to: u64) -> Result<Vec<EventRecord>, VigilError> {
        self.db.events_range(from, to)
    }

    pub fn oplog_from(&self, from: u64) -> Result<Vec<LoggedOperation>, VigilError> {
        self.db.logged_ops_from(from)
    }

    pub fn head(&self) -> Result<u64, VigilError> {
        self.db.head()
    }
}

use std::collections::HashMap;
use tracing::{debug, info};

use vigil_core::ban::BanTiers;
use vigil_core::constants::GOVERNANCE_FORCE_CATEGORY;
use vigil_core::error::VigilError;
use vigil_core::event::Event;
use vigil_core::params::ProtocolParams;
use vigil_core::records::{EvidencePayload, ReportRecord, ThreatProfile, ThreatStatus};
use vigil_core::types::{CommitmentKey, EndpointId, LogicalTime, ReporterId, Severity, Timestamp};

use crate::profile::punish;

/// Everything stored about one endpoint, as loaded before a transition.
#[derive(Debug, Clone, Default)]
pub struct EndpointView {
    pub status: Option<ThreatStatus>,
    pub profile: Option<ThreatProfile>,
    /// The contributing set: one record per reporter.
    pub reports: Vec<ReportRecord>,
}

/// A validated, whitelist-cleared reveal.
#[derive(Debug, Clone, Copy)]
pub struct RevealInput<'a> {
    pub endpoint: &'a EndpointId,
    pub reporter: &'a ReporterId,
    pub commitment: CommitmentKey,
    pub nonce: &'a str,
    pub evidence: &'a EvidencePayload,
    /// Log sequence of the operation carrying the reveal.
    pub sequence: u64,
    pub now: LogicalTime,
}

/// New state for one endpoint. The caller writes it back atomically.
#[derive(Debug, Clone, Default)]
pub struct Transition {
    pub status: ThreatStatus,
    /// `None` leaves the stored profile untouched.
    pub profile: Option<ThreatProfile>,
    /// Reports to delete. Applied before `put_reports`.
    pub removed_reporters: Vec<ReporterId>,
    pub put_reports: Vec<ReportRecord>,
    pub events: Vec<Event>,
    /// The reveal added a new identity to the contributing set.
    pub counted: bool,
    /// This transition produced the verdict.
    pub confirmed_now: bool,
}

/// Per-endpoint quorum state machine: `Unseen -> Reporting -> Confirmed`.
///
/// Pure: it sees an `EndpointView` and returns a `Transition`; storage is
/// the caller's job.
pub struct ConsensusAggregator<'a> {
    params: &'a ProtocolParams,
    tiers: &'a BanTiers,
}

impl<'a> ConsensusAggregator<'a> {
    pub fn new(params: &'a ProtocolParams, tiers: &'a BanTiers) -> Self {
        Self { params, tiers }
    }

    /// Fold one reveal into the endpoint's state.
    ///
    /// Unconfirmed endpoints first drop reports that fell out of the
    /// evidence window. A reporter already in the contributing set has its
    /// record replaced and does not count again.
    pub fn on_reveal(&self, view: EndpointView, input: RevealInput<'_>) -> Transition {
        let mut status = view.status.unwrap_or_default();
        let mut profile = view.profile.unwrap_or_default();
        let mut reports = view.reports;
        let mut events = Vec::new();
        let ts = input.now.timestamp;

        let mut removed_reporters = Vec::new();
        if !status.is_confirmed {
            if let Some(window) = self.params.evidence_window_secs {
                let (stale, live): (Vec<_>, Vec<_>) =
                    reports.into_iter().partition(|r| is_stale(r, ts, window));
                reports = live;
                if !stale.is_empty() {
                    removed_reporters = stale.into_iter().map(|r| r.reporter).collect();
                    debug!(
                        endpoint = %input.endpoint,
                        expired = removed_reporters.len(),
                        "reports fell out of the evidence window"
                    );
                    events.push(Event::ReportsExpired {
                        endpoint: input.endpoint.clone(),
                        reporters: removed_reporters.clone(),
                    });
                }
            }
        }

        let evidence = input.evidence;
        let existing = reports.iter().position(|r| &r.reporter == input.reporter);
        let counted = existing.is_none();
        let record = match existing {
            Some(i) => {
                let r = &mut reports[i];
                r.commitment = input.commitment;
                r.severity = evidence.risk_score;
                r.attack_type = evidence.attack_type.clone();
                r.cpu_load = evidence.cpu_load;
                r.log_hash = evidence.log_hash.clone();
                r.reported_at = ts;
                r.clone()
            }
            None => {
                let fresh = ReportRecord {
                    endpoint: input.endpoint.clone(),
                    reporter: input.reporter.clone(),
                    commitment: input.commitment,
                    severity: evidence.risk_score,
                    attack_type: evidence.attack_type.clone(),
                    cpu_load: evidence.cpu_load,
                    log_hash: evidence.log_hash.clone(),
                    first_reported_at: ts,
                    reported_at: ts,
                    sequence: input.sequence,
                };
                reports.push(fresh.clone());
                fresh
            }
        };

        tally(&mut status, &reports);
        profile.touch(ts);

        events.push(Event::ThreatRevealed {
            endpoint: input.endpoint.clone(),
            reporter: input.reporter.clone(),
            nonce: input.nonce.to_string(),
        });
        if counted {
            events.push(Event::LocalDefenseActive {
                endpoint: input.endpoint.clone(),
                reporter: input.reporter.clone(),
            });
        }

        let mut confirmed_now = false;
        if !status.is_confirmed && status.report_count >= self.params.consensus_threshold {
            let category = dominant_category(&reports).unwrap_or_default();
            events.push(self.confirm(&mut status, &mut profile, input.endpoint, category, ts));
            confirmed_now = true;
        }

        Transition {
            status,
            profile: Some(profile),
            removed_reporters,
            put_reports: vec![record],
            events,
            counted,
            confirmed_now,
        }
    }

    /// Withdraw `reporter`'s report from an unconfirmed endpoint.
    pub fn on_revoke(
        &self,
        endpoint: &EndpointId,
        view: EndpointView,
        reporter: &ReporterId,
    ) -> Result<Transition, VigilError> {
        let mut status = view
            .status
            .ok_or_else(|| VigilError::ReportNotFound(endpoint.to_string()))?;
        if status.is_confirmed {
            return Err(VigilError::ThreatAlreadyConfirmed(endpoint.to_string()));
        }
        let mut reports = view.reports;
        let before = reports.len();
        reports.retain(|r| &r.reporter != reporter);
        if reports.len() == before {
            return Err(VigilError::ReportNotFound(endpoint.to_string()));
        }
        tally(&mut status, &reports);

        Ok(Transition {
            status,
            profile: None,
            removed_reporters: vec![reporter.clone()],
            events: vec![Event::ReportRevoked {
                endpoint: endpoint.clone(),
                reporter: reporter.clone(),
            }],
            ..Default::default()
        })
    }

    /// Governance verdict: confirm without quorum.
    pub fn force_confirm(
        &self,
        endpoint: &EndpointId,
        view: EndpointView,
        now: LogicalTime,
    ) -> Result<Transition, VigilError> {
        let mut status = view.status.unwrap_or_default();
        if status.is_confirmed {
            return Err(VigilError::ThreatAlreadyConfirmed(endpoint.to_string()));
        }
        let mut profile = view.profile.unwrap_or_default();
        let event = self.confirm(
            &mut status,
            &mut profile,
            endpoint,
            GOVERNANCE_FORCE_CATEGORY.to_string(),
            now.timestamp,
        );
        Ok(Transition {
            status,
            profile: Some(profile),
            events: vec![event],
            confirmed_now: true,
            ..Default::default()
        })
    }

    fn confirm(
        &self,
        status: &mut ThreatStatus,
        profile: &mut ThreatProfile,
        endpoint: &EndpointId,
        category: String,
        at: Timestamp,
    ) -> Event {
        status.is_confirmed = true;
        status.confirmed_at = at;
        status.verdict_category = Some(category.clone());

        let severity = Severity::try_from(status.total_risk_score).unwrap_or(Severity::MAX);
        let ban_duration_secs = punish(profile, severity, at, self.tiers);

        info!(
            endpoint = %endpoint,
            category = %category,
            reports = status.report_count,
            offense_count = profile.offense_count,
            ban_secs = ban_duration_secs,
            "threat confirmed"
        );

        Event::GlobalThreatConfirmed {
            endpoint: endpoint.clone(),
            category,
            report_count: status.report_count,
            total_risk_score: status.total_risk_score,
            offense_count: profile.offense_count,
            ban_duration_secs,
        }
    }
}

fn is_stale(report: &ReportRecord, now: Timestamp, window: i64) -> bool {
    now.saturating_sub(report.reported_at) >= window
}

fn tally(status: &mut ThreatStatus, reports: &[ReportRecord]) {
    status.report_count = reports.len() as u32;
    status.total_risk_score = reports.iter().map(|r| u64::from(r.severity)).sum();
}

/// Most frequent `attack_type` among `reports`; ties go to the category
/// whose first report came earliest in the log.
pub fn dominant_category(reports: &[ReportRecord]) -> Option<String> {
    let mut tally: HashMap<&str, (usize, u64)> = HashMap::new();
    for r in reports {
        let entry = tally.entry(r.attack_type.as_str()).or_insert((0, r.sequence));
        entry.0 += 1;
        entry.1 = entry.1.min(r.sequence);
    }
    tally
        .into_iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
        .map(|(category, _)| category.to_string())
}

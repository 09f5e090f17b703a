use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use vigil_consensus::{
    punish, ConsensusAggregator, EndpointView, ReputationGate, RevealInput, StandingOracle,
    Transition, WhitelistGuard,
};
use vigil_core::ban::{BanTier, BanTiers};
use vigil_core::constants::MAX_NONCE_BYTES;
use vigil_core::error::VigilError;
use vigil_core::event::{Event, EventRecord};
use vigil_core::operation::{
    Applied, CommitReceipt, LoggedOperation, Operation, Receipt, RevealReceipt, Submission,
};
use vigil_core::params::ProtocolParams;
use vigil_core::records::{Commitment, EvidencePayload, ThreatProfile};
use vigil_core::types::{EndpointId, EvidenceHash, LogicalTime, ReporterId, Severity};
use vigil_crypto::{commitment_key, evidence_hash, op_id_from_body};

use crate::db::{StagedWrites, StateDb, META_BAN_TIERS};

// ── Context ───────────────────────────────────────────────────────────────────

/// Per-operation inputs shared by every handler.
struct OpContext<'a> {
    caller: &'a ReporterId,
    sequence: u64,
    now: LogicalTime,
    params: &'a ProtocolParams,
    tiers: &'a BanTiers,
}

// ── StateEngine ───────────────────────────────────────────────────────────────

/// The state transition engine.
///
/// Validates one submission, stages every resulting write, and commits them
/// in a single sled transaction. A rejected submission leaves the database
/// untouched.
pub struct StateEngine {
    pub db: Arc<StateDb>,
    gate: ReputationGate,
}

impl StateEngine {
    /// Build an engine over a database that already holds genesis.
    pub fn new(
        db: Arc<StateDb>,
        oracle: Arc<dyn StandingOracle + Send + Sync>,
    ) -> Result<Self, VigilError> {
        let params = db.params()?;
        let gate = ReputationGate::new(oracle, params.min_standing);
        Ok(Self { db, gate })
    }

    /// Validate and apply a submission at logical time `now`.
    pub fn apply(&self, sub: &Submission, now: LogicalTime) -> Result<Applied, VigilError> {
        // ── Integrity ─────────────────────────────────────────────────────────
        if op_id_from_body(&sub.body_bytes()) != sub.op_id {
            return Err(VigilError::OperationIdMismatch(sub.op_id.to_hex()));
        }

        // ── Duplicate check ───────────────────────────────────────────────────
        if self.db.op_sequence(&sub.op_id)?.is_some() {
            return Err(VigilError::DuplicateOperation(sub.op_id.to_hex()));
        }

        // ── Authority ─────────────────────────────────────────────────────────
        if sub.operation.is_privileged() && !self.db.operators()?.contains(&sub.caller) {
            warn!(caller = %sub.caller, op = sub.operation.name(), "privileged operation from non-operator");
            return Err(VigilError::Unauthorized);
        }

        let params = self.db.params()?;
        let tiers = self.db.ban_tiers()?;
        let ctx = OpContext {
            caller: &sub.caller,
            sequence: self.db.head()? + 1,
            now,
            params: &params,
            tiers: &tiers,
        };

        // ── Dispatch ──────────────────────────────────────────────────────────
        let mut staged = StagedWrites::new();
        let (receipt, events) = match &sub.operation {
            Operation::Commit { evidence_hash, nonce } => {
                self.apply_commit(&ctx, evidence_hash, nonce, &mut staged)?
            }
            Operation::Reveal { endpoint, nonce, evidence } => {
                self.apply_reveal(&ctx, endpoint, nonce, evidence, &mut staged)?
            }
            Operation::RevokeReport { endpoint } => {
                self.apply_revoke(&ctx, endpoint, &mut staged)?
            }
            Operation::ReportBatch { endpoints, severities } => {
                self.apply_report_batch(&ctx, endpoints, severities, &mut staged)?
            }
            Operation::AddToWhitelist { endpoints } => {
                self.apply_whitelist(&ctx, endpoints, true, &mut staged)?
            }
            Operation::RemoveFromWhitelist { endpoints } => {
                self.apply_whitelist(&ctx, endpoints, false, &mut staged)?
            }
            Operation::ForceConfirm { endpoint } => {
                self.apply_force_confirm(&ctx, endpoint, &mut staged)?
            }
            Operation::UpdateBanTiers { tiers } => {
                self.apply_update_tiers(tiers, &mut staged)?
            }
        };

        // ── Log ───────────────────────────────────────────────────────────────
        let records: Vec<EventRecord> = events
            .into_iter()
            .enumerate()
            .map(|(i, event)| EventRecord {
                sequence: ctx.sequence,
                index: i as u32,
                at: now,
                event,
            })
            .collect();
        for r in &records {
            staged.put_event(r)?;
        }
        staged.log_operation(&LoggedOperation {
            sequence: ctx.sequence,
            at: now,
            submission: sub.clone(),
        })?;

        // ── Commit ────────────────────────────────────────────────────────────
        self.db.commit(&staged)?;

        info!(
            op = sub.operation.name(),
            op_id = %sub.op_id,
            sequence = ctx.sequence,
            height = now.height,
            events = records.len(),
            "applied operation"
        );
        Ok(Applied {
            sequence: ctx.sequence,
            op_id: sub.op_id.clone(),
            receipt,
            events: records,
        })
    }

    /// Re-apply logged operations in order, at their logged times.
    ///
    /// Each entry must land at the sequence it was logged with; a gap or a
    /// rejection means the log does not match this database.
    pub fn replay<I>(&self, entries: I) -> Result<u64, VigilError>
    where
        I: IntoIterator<Item = LoggedOperation>,
    {
        let mut applied = 0u64;
        for entry in entries {
            let result = self.apply(&entry.submission, entry.at)?;
            if result.sequence != entry.sequence {
                return Err(VigilError::Other(format!(
                    "replay diverged: logged sequence {}, applied at {}",
                    entry.sequence, result.sequence
                )));
            }
            applied += 1;
        }
        debug!(applied, "replay complete");
        Ok(applied)
    }

    // ── Commit / reveal ───────────────────────────────────────────────────────

    fn apply_commit(
        &self,
        ctx: &OpContext<'_>,
        evidence: &EvidenceHash,
        nonce: &str,
        staged: &mut StagedWrites,
    ) -> Result<(Receipt, Vec<Event>), VigilError> {
        self.gate.authorize(ctx.caller)?;

        if nonce.len() > MAX_NONCE_BYTES {
            return Err(VigilError::NonceTooLong { max: MAX_NONCE_BYTES });
        }

        let key = commitment_key(evidence, nonce, ctx.caller);
        if self.db.get_commitment(&key)?.is_some() {
            return Err(VigilError::DuplicateCommitment(key.to_hex()));
        }

        let commitment = Commitment {
            key,
            evidence_hash: *evidence,
            reporter: ctx.caller.clone(),
            commit_height: ctx.now.height,
            commit_time: ctx.now.timestamp,
            revealed: false,
            revealed_height: None,
        };
        staged.put_commitment(&commitment)?;

        debug!(key = %key, reporter = %ctx.caller, height = ctx.now.height, "evidence committed");
        Ok((
            Receipt::Committed(CommitReceipt {
                key,
                commit_height: commitment.commit_height,
                revealable_at: commitment.revealable_at(ctx.params.reveal_delay_blocks),
            }),
            vec![Event::EvidenceCommitted {
                key,
                reporter: ctx.caller.clone(),
            }],
        ))
    }

    fn apply_reveal(
        &self,
        ctx: &OpContext<'_>,
        endpoint: &EndpointId,
        nonce: &str,
        evidence: &EvidencePayload,
        staged: &mut StagedWrites,
    ) -> Result<(Receipt, Vec<Event>), VigilError> {
        let key = commitment_key(&evidence_hash(endpoint), nonce, ctx.caller);
        let mut commitment = self
            .db
            .get_commitment(&key)?
            .ok_or_else(|| VigilError::CommitmentNotFound(key.to_hex()))?;
        if commitment.revealed {
            return Err(VigilError::AlreadyRevealed);
        }
        let ready_at = commitment.revealable_at(ctx.params.reveal_delay_blocks);
        if ctx.now.height < ready_at {
            return Err(VigilError::RevealTooEarly { ready_at });
        }

        endpoint.validate()?;
        evidence.validate(ctx.params.max_cpu_load)?;

        // Vetoed before any profile or consensus state is read.
        WhitelistGuard::new(self.db.as_ref()).ensure_unprotected(endpoint)?;

        let aggregator = ConsensusAggregator::new(ctx.params, ctx.tiers);
        let transition = aggregator.on_reveal(
            self.load_view(endpoint)?,
            RevealInput {
                endpoint,
                reporter: ctx.caller,
                commitment: key,
                nonce,
                evidence,
                sequence: ctx.sequence,
                now: ctx.now,
            },
        );

        commitment.revealed = true;
        commitment.revealed_height = Some(ctx.now.height);
        staged.put_commitment(&commitment)?;

        debug!(
            endpoint = %endpoint,
            reporter = %ctx.caller,
            counted = transition.counted,
            reports = transition.status.report_count,
            "evidence revealed"
        );
        let receipt = Receipt::Revealed(RevealReceipt {
            endpoint: endpoint.clone(),
            key,
            counted: transition.counted,
            report_count: transition.status.report_count,
            total_risk_score: transition.status.total_risk_score,
            confirmed_now: transition.confirmed_now,
        });
        let events = stage_transition(endpoint, transition, staged)?;
        Ok((receipt, events))
    }

    fn apply_revoke(
        &self,
        ctx: &OpContext<'_>,
        endpoint: &EndpointId,
        staged: &mut StagedWrites,
    ) -> Result<(Receipt, Vec<Event>), VigilError> {
        let aggregator = ConsensusAggregator::new(ctx.params, ctx.tiers);
        let transition = aggregator.on_revoke(endpoint, self.load_view(endpoint)?, ctx.caller)?;
        let report_count = transition.status.report_count;

        debug!(endpoint = %endpoint, reporter = %ctx.caller, report_count, "report revoked");
        let events = stage_transition(endpoint, transition, staged)?;
        Ok((
            Receipt::ReportRevoked {
                endpoint: endpoint.clone(),
                report_count,
            },
            events,
        ))
    }

    // ── Privileged operations ─────────────────────────────────────────────────

    fn apply_report_batch(
        &self,
        ctx: &OpContext<'_>,
        endpoints: &[EndpointId],
        severities: &[Severity],
        staged: &mut StagedWrites,
    ) -> Result<(Receipt, Vec<Event>), VigilError> {
        if endpoints.len() != severities.len() {
            return Err(VigilError::MalformedBatch {
                endpoints: endpoints.len(),
                severities: severities.len(),
            });
        }
        check_batch_size(endpoints.len(), ctx.params.max_batch_size)?;
        for e in endpoints {
            e.validate()?;
        }
        WhitelistGuard::new(self.db.as_ref()).ensure_none_protected(endpoints)?;

        // An endpoint listed twice is punished twice, in order.
        let mut profiles: BTreeMap<&EndpointId, ThreatProfile> = BTreeMap::new();
        let mut ban_durations = Vec::with_capacity(endpoints.len());
        for (endpoint, &severity) in endpoints.iter().zip(severities) {
            let profile = match profiles.entry(endpoint) {
                Entry::Occupied(o) => o.into_mut(),
                Entry::Vacant(v) => v.insert(self.db.get_profile(endpoint)?.unwrap_or_default()),
            };
            ban_durations.push(punish(profile, severity, ctx.now.timestamp, ctx.tiers));
        }
        for (endpoint, profile) in &profiles {
            staged.put_profile(endpoint, profile)?;
        }

        info!(endpoints = endpoints.len(), "batch punishment applied");
        Ok((
            Receipt::BatchApplied {
                endpoints: endpoints.len(),
            },
            vec![Event::PunishBatch {
                endpoints: endpoints.to_vec(),
                ban_durations,
            }],
        ))
    }

    fn apply_whitelist(
        &self,
        ctx: &OpContext<'_>,
        endpoints: &[EndpointId],
        listed: bool,
        staged: &mut StagedWrites,
    ) -> Result<(Receipt, Vec<Event>), VigilError> {
        check_batch_size(endpoints.len(), ctx.params.max_batch_size)?;
        for e in endpoints {
            e.validate()?;
        }

        let mut seen = HashSet::new();
        let mut events = Vec::new();
        for endpoint in endpoints {
            if !seen.insert(endpoint) || self.db.is_whitelisted(endpoint)? == listed {
                continue;
            }
            staged.set_whitelisted(endpoint, listed);
            events.push(Event::WhitelistUpdated {
                endpoint: endpoint.clone(),
                whitelisted: listed,
            });
        }

        info!(listed, requested = endpoints.len(), changed = events.len(), "whitelist updated");
        Ok((Receipt::WhitelistUpdated { changed: events.len() }, events))
    }

    fn apply_force_confirm(
        &self,
        ctx: &OpContext<'_>,
        endpoint: &EndpointId,
        staged: &mut StagedWrites,
    ) -> Result<(Receipt, Vec<Event>), VigilError> {
        endpoint.validate()?;
        WhitelistGuard::new(self.db.as_ref()).ensure_unprotected(endpoint)?;

        let aggregator = ConsensusAggregator::new(ctx.params, ctx.tiers);
        let transition = aggregator.force_confirm(endpoint, self.load_view(endpoint)?, ctx.now)?;
        let offense_count = transition
            .profile
            .as_ref()
            .map(|p| p.offense_count)
            .unwrap_or_default();

        let events = stage_transition(endpoint, transition, staged)?;
        Ok((
            Receipt::ForceConfirmed {
                endpoint: endpoint.clone(),
                offense_count,
            },
            events,
        ))
    }

    fn apply_update_tiers(
        &self,
        tiers: &[BanTier],
        staged: &mut StagedWrites,
    ) -> Result<(Receipt, Vec<Event>), VigilError> {
        let table = BanTiers::new(tiers.to_vec())?;
        staged.put_meta(META_BAN_TIERS, &table)?;
        info!(tiers = tiers.len(), "ban tiers updated");
        Ok((
            Receipt::BanTiersUpdated,
            vec![Event::BanTiersUpdated {
                tiers: tiers.to_vec(),
            }],
        ))
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn load_view(&self, endpoint: &EndpointId) -> Result<EndpointView, VigilError> {
        Ok(EndpointView {
            status: self.db.get_status(endpoint)?,
            profile: self.db.get_profile(endpoint)?,
            reports: self.db.reports_for(endpoint)?,
        })
    }
}

fn check_batch_size(len: usize, max: usize) -> Result<(), VigilError> {
    if len == 0 {
        return Err(VigilError::EmptyBatch);
    }
    if len > max {
        return Err(VigilError::BatchTooLarge { max, got: len });
    }
    Ok(())
}

/// Stage an aggregator transition and hand back its events.
fn stage_transition(
    endpoint: &EndpointId,
    transition: Transition,
    staged: &mut StagedWrites,
) -> Result<Vec<Event>, VigilError> {
    staged.put_status(endpoint, &transition.status)?;
    if let Some(profile) = &transition.profile {
        staged.put_profile(endpoint, profile)?;
    }
    for reporter in &transition.removed_reporters {
        staged.delete_report(endpoint, reporter);
    }
    for report in &transition.put_reports {
        staged.put_report(report)?;
    }
    Ok(transition.events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_consensus::StaticStandingOracle;
    use vigil_core::constants::{BAN_TIER_1_SECS, GOVERNANCE_FORCE_CATEGORY, MAX_BATCH_SIZE};
    use vigil_core::records::ThreatPhase;
    use vigil_crypto::seal_submission;

    use crate::db::{META_OPERATORS, META_PARAMS};

    const T0: i64 = 1_700_000_000;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn temp_db(name: &str) -> Arc<StateDb> {
        let dir = std::env::temp_dir().join(format!("vigil_engine_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        Arc::new(StateDb::open(&dir).expect("open temp db"))
    }

    fn id(b: u8) -> ReporterId {
        ReporterId::from_bytes([b; 32])
    }

    fn operator() -> ReporterId {
        id(0xEE)
    }

    /// Seed params/tiers/operators the way genesis does, plus "8.8.8.8".
    fn engine(name: &str) -> StateEngine {
        let db = temp_db(name);
        let mut staged = StagedWrites::new();
        staged.put_meta(META_PARAMS, &ProtocolParams::default()).unwrap();
        staged.put_meta(META_BAN_TIERS, &BanTiers::default()).unwrap();
        staged.put_meta(META_OPERATORS, &vec![operator()]).unwrap();
        staged.set_whitelisted(&"8.8.8.8".into(), true);
        db.commit(&staged).unwrap();

        let oracle: StaticStandingOracle = (1..=10u8).map(|b| (id(b), 5_000)).collect();
        StateEngine::new(db, Arc::new(oracle)).unwrap()
    }

    fn at(height: u64) -> LogicalTime {
        LogicalTime::new(height, T0 + height as i64 * 10)
    }

    fn payload(severity: Severity, attack: &str) -> EvidencePayload {
        EvidencePayload {
            cpu_load: 87,
            log_hash: "QmEvidence".into(),
            attack_type: attack.into(),
            risk_score: severity,
        }
    }

    fn submit(eng: &StateEngine, who: &ReporterId, op: Operation, now: LogicalTime) -> Result<Applied, VigilError> {
        let client_ref = eng.db.head().unwrap() * 1_000 + now.height;
        eng.apply(&seal_submission(who.clone(), client_ref, op), now)
    }

    fn commit(eng: &StateEngine, who: u8, endpoint: &str, nonce: &str, height: u64) -> Result<Applied, VigilError> {
        let op = Operation::Commit {
            evidence_hash: evidence_hash(&endpoint.into()),
            nonce: nonce.into(),
        };
        submit(eng, &id(who), op, at(height))
    }

    fn reveal(
        eng: &StateEngine,
        who: u8,
        endpoint: &str,
        nonce: &str,
        ev: EvidencePayload,
        height: u64,
    ) -> Result<Applied, VigilError> {
        let op = Operation::Reveal {
            endpoint: endpoint.into(),
            nonce: nonce.into(),
            evidence: ev,
        };
        submit(eng, &id(who), op, at(height))
    }

    fn batch(eng: &StateEngine, endpoints: &[&str], severities: &[Severity], height: u64) -> Result<Applied, VigilError> {
        let op = Operation::ReportBatch {
            endpoints: endpoints.iter().map(|e| EndpointId::from(*e)).collect(),
            severities: severities.to_vec(),
        };
        submit(eng, &operator(), op, at(height))
    }

    fn confirmations(applied: &Applied) -> usize {
        applied
            .events
            .iter()
            .filter(|r| matches!(r.event, Event::GlobalThreatConfirmed { .. }))
            .count()
    }

    // ── Commit / reveal ───────────────────────────────────────────────────────

    #[test]
    fn commit_then_reveal_once() {
        let eng = engine("commit_reveal_once");
        let c = commit(&eng, 1, "203.0.113.5", "n1", 1).unwrap();
        let Receipt::Committed(r) = c.receipt else { panic!("expected commit receipt") };
        assert_eq!(r.revealable_at, 11);

        let ok = reveal(&eng, 1, "203.0.113.5", "n1", payload(50, "DDoS"), 11).unwrap();
        assert!(matches!(ok.receipt, Receipt::Revealed(RevealReceipt { report_count: 1, .. })));

        let again = reveal(&eng, 1, "203.0.113.5", "n1", payload(50, "DDoS"), 12).unwrap_err();
        assert!(matches!(again, VigilError::AlreadyRevealed));

        // Only the status moves before quorum.
        let ep: EndpointId = "203.0.113.5".into();
        assert_eq!(eng.db.get_status(&ep).unwrap().unwrap().report_count, 1);
        assert_eq!(eng.db.get_profile(&ep).unwrap().unwrap().offense_count, 0);
    }

    #[test]
    fn reveal_before_delay_rejected() {
        let eng = engine("reveal_early");
        commit(&eng, 1, "203.0.113.5", "n1", 100).unwrap();

        for h in [100, 105, 109] {
            let err = reveal(&eng, 1, "203.0.113.5", "n1", payload(50, "DDoS"), h).unwrap_err();
            assert!(matches!(err, VigilError::RevealTooEarly { ready_at: 110 }));
        }
        // Bad payload still reports the delay first.
        let err = reveal(&eng, 1, "203.0.113.5", "n1", payload(50, ""), 101).unwrap_err();
        assert!(matches!(err, VigilError::RevealTooEarly { .. }));

        assert!(reveal(&eng, 1, "203.0.113.5", "n1", payload(50, "DDoS"), 110).is_ok());
    }

    #[test]
    fn duplicate_commitment_rejected() {
        let eng = engine("dup_commitment");
        commit(&eng, 1, "203.0.113.5", "n1", 1).unwrap();
        let err = commit(&eng, 1, "203.0.113.5", "n1", 2).unwrap_err();
        assert!(matches!(err, VigilError::DuplicateCommitment(_)));
        // Same evidence and nonce under another identity is a different key.
        assert!(commit(&eng, 2, "203.0.113.5", "n1", 2).is_ok());
    }

    #[test]
    fn copied_commitment_cannot_be_revealed_by_another_reporter() {
        let eng = engine("front_run");
        commit(&eng, 1, "203.0.113.5", "n1", 1).unwrap();
        let err = reveal(&eng, 2, "203.0.113.5", "n1", payload(50, "DDoS"), 20).unwrap_err();
        assert!(matches!(err, VigilError::CommitmentNotFound(_)));
    }

    #[test]
    fn low_standing_never_stores_commitment() {
        let eng = engine("low_standing");
        let err = commit(&eng, 99, "203.0.113.5", "n1", 1).unwrap_err();
        assert!(matches!(err, VigilError::InsufficientStanding { need: 1_000, have: 0 }));
        assert_eq!(eng.db.commitment_count(), 0);
        assert_eq!(eng.db.head().unwrap(), 0);
    }

    #[test]
    fn oversized_nonce_rejected() {
        let eng = engine("long_nonce");
        let nonce = "x".repeat(MAX_NONCE_BYTES + 1);
        assert!(matches!(
            commit(&eng, 1, "203.0.113.5", &nonce, 1),
            Err(VigilError::NonceTooLong { .. })
        ));
    }

    #[test]
    fn invalid_evidence_leaves_commitment_unrevealed() {
        let eng = engine("bad_evidence");
        commit(&eng, 1, "203.0.113.5", "n1", 1).unwrap();
        let mut ev = payload(50, "DDoS");
        ev.cpu_load = 101;
        let err = reveal(&eng, 1, "203.0.113.5", "n1", ev, 11).unwrap_err();
        assert!(matches!(err, VigilError::InvalidEvidence(_)));
        assert!(reveal(&eng, 1, "203.0.113.5", "n1", payload(50, "DDoS"), 12).is_ok());
    }

    // ── Consensus ─────────────────────────────────────────────────────────────

    #[test]
    fn three_reporters_confirm() {
        let eng = engine("three_confirm");
        for who in 1..=3u8 {
            commit(&eng, who, "203.0.113.5", "n1", who as u64).unwrap();
        }
        let r1 = reveal(&eng, 1, "203.0.113.5", "n1", payload(50, "DDoS"), 20).unwrap();
        let r2 = reveal(&eng, 2, "203.0.113.5", "n1", payload(60, "DDoS"), 21).unwrap();
        assert_eq!(confirmations(&r1) + confirmations(&r2), 0);
        let r3 = reveal(&eng, 3, "203.0.113.5", "n1", payload(70, "PortScan"), 22).unwrap();
        assert_eq!(confirmations(&r3), 1);

        let ep: EndpointId = "203.0.113.5".into();
        let status = eng.db.get_status(&ep).unwrap().unwrap();
        assert!(status.is_confirmed);
        assert_eq!(status.report_count, 3);
        assert_eq!(status.total_risk_score, 180);
        assert_eq!(status.confirmed_at, at(22).timestamp);
        assert_eq!(status.verdict_category.as_deref(), Some("DDoS"));
        assert_eq!(status.phase(), ThreatPhase::Confirmed);
        assert_eq!(eng.db.get_profile(&ep).unwrap().unwrap().offense_count, 1);

        let Event::GlobalThreatConfirmed { ban_duration_secs, .. } = &r3.events.last().unwrap().event else {
            panic!("expected verdict last");
        };
        assert_eq!(*ban_duration_secs, BAN_TIER_1_SECS);
    }

    #[test]
    fn later_reveals_do_not_repeat_verdict() {
        let eng = engine("no_dup_verdict");
        for who in 1..=5u8 {
            commit(&eng, who, "203.0.113.5", "n1", 1).unwrap();
        }
        let mut verdicts = 0;
        for who in 1..=5u8 {
            let r = reveal(&eng, who, "203.0.113.5", "n1", payload(10, "DDoS"), 20 + who as u64).unwrap();
            verdicts += confirmations(&r);
        }
        assert_eq!(verdicts, 1);
        let ep: EndpointId = "203.0.113.5".into();
        assert_eq!(eng.db.get_status(&ep).unwrap().unwrap().report_count, 5);
        assert_eq!(eng.db.get_profile(&ep).unwrap().unwrap().offense_count, 1);
    }

    #[test]
    fn same_reporter_with_two_commitments_counts_once() {
        let eng = engine("repeat_reporter");
        commit(&eng, 1, "203.0.113.5", "a", 1).unwrap();
        commit(&eng, 1, "203.0.113.5", "b", 1).unwrap();
        commit(&eng, 2, "203.0.113.5", "a", 1).unwrap();
        reveal(&eng, 1, "203.0.113.5", "a", payload(50, "DDoS"), 20).unwrap();
        let again = reveal(&eng, 1, "203.0.113.5", "b", payload(90, "DDoS"), 21).unwrap();
        assert!(matches!(again.receipt, Receipt::Revealed(RevealReceipt { counted: false, report_count: 1, .. })));
        let r = reveal(&eng, 2, "203.0.113.5", "a", payload(10, "DDoS"), 22).unwrap();
        assert_eq!(confirmations(&r), 0);

        let status = eng.db.get_status(&"203.0.113.5".into()).unwrap().unwrap();
        assert_eq!(status.report_count, 2);
        assert_eq!(status.total_risk_score, 100);
    }

    #[test]
    fn revoke_before_confirmation() {
        let eng = engine("revoke");
        commit(&eng, 1, "203.0.113.5", "n1", 1).unwrap();
        reveal(&eng, 1, "203.0.113.5", "n1", payload(50, "DDoS"), 20).unwrap();
        let applied = submit(
            &eng,
            &id(1),
            Operation::RevokeReport { endpoint: "203.0.113.5".into() },
            at(21),
        )
        .unwrap();
        assert!(matches!(applied.receipt, Receipt::ReportRevoked { report_count: 0, .. }));
        assert!(eng.db.reports_for(&"203.0.113.5".into()).unwrap().is_empty());

        let err = submit(
            &eng,
            &id(1),
            Operation::RevokeReport { endpoint: "203.0.113.5".into() },
            at(22),
        )
        .unwrap_err();
        assert!(matches!(err, VigilError::ReportNotFound(_)));
    }

    // ── Whitelist ─────────────────────────────────────────────────────────────

    #[test]
    fn whitelisted_endpoint_reveal_rejected() {
        let eng = engine("whitelist_reveal");
        for who in 1..=3u8 {
            commit(&eng, who, "8.8.8.8", "n1", 1).unwrap();
        }
        for who in 1..=3u8 {
            let err = reveal(&eng, who, "8.8.8.8", "n1", payload(90, "DDoS"), 20).unwrap_err();
            assert!(matches!(err, VigilError::ProtectedEndpoint(_)));
        }
        let ep: EndpointId = "8.8.8.8".into();
        assert!(eng.db.get_status(&ep).unwrap().is_none());
        assert!(eng.db.get_profile(&ep).unwrap().is_none());
        assert!(eng.db.reports_for(&ep).unwrap().is_empty());

        let err = submit(&eng, &operator(), Operation::ForceConfirm { endpoint: ep.clone() }, at(30)).unwrap_err();
        assert!(matches!(err, VigilError::ProtectedEndpoint(_)));
        assert!(matches!(batch(&eng, &["8.8.8.8"], &[10], 31), Err(VigilError::ProtectedEndpoint(_))));
    }

    #[test]
    fn removing_whitelist_entry_does_not_confirm_vetoed_reports() {
        let eng = engine("whitelist_remove");
        for who in 1..=3u8 {
            commit(&eng, who, "8.8.8.8", "n1", 1).unwrap();
            let _ = reveal(&eng, who, "8.8.8.8", "n1", payload(90, "DDoS"), 20);
        }
        submit(
            &eng,
            &operator(),
            Operation::RemoveFromWhitelist { endpoints: vec!["8.8.8.8".into()] },
            at(30),
        )
        .unwrap();
        assert!(!eng.db.is_whitelisted(&"8.8.8.8".into()).unwrap());
        assert!(eng.db.get_status(&"8.8.8.8".into()).unwrap().is_none());

        // The vetoed commitments are still unrevealed and now count normally.
        let r = reveal(&eng, 1, "8.8.8.8", "n1", payload(90, "DDoS"), 31).unwrap();
        assert!(matches!(r.receipt, Receipt::Revealed(RevealReceipt { report_count: 1, confirmed_now: false, .. })));
    }

    #[test]
    fn whitelist_updates_are_idempotent() {
        let eng = engine("whitelist_idem");
        let add = |h| {
            submit(
                &eng,
                &operator(),
                Operation::AddToWhitelist { endpoints: vec!["9.9.9.9".into(), "9.9.9.9".into(), "8.8.8.8".into()] },
                at(h),
            )
        };
        let first = add(1).unwrap();
        assert!(matches!(first.receipt, Receipt::WhitelistUpdated { changed: 1 }));
        let second = add(2).unwrap();
        assert!(matches!(second.receipt, Receipt::WhitelistUpdated { changed: 0 }));
        assert!(second.events.is_empty());
    }

    #[test]
    fn privileged_ops_require_operator() {
        let eng = engine("unauthorized");
        let ops = vec![
            Operation::AddToWhitelist { endpoints: vec!["9.9.9.9".into()] },
            Operation::RemoveFromWhitelist { endpoints: vec!["8.8.8.8".into()] },
            Operation::ReportBatch { endpoints: vec!["10.0.0.1".into()], severities: vec![1] },
            Operation::ForceConfirm { endpoint: "10.0.0.1".into() },
            Operation::UpdateBanTiers { tiers: BanTiers::default().tiers().to_vec() },
        ];
        for op in ops {
            assert!(matches!(submit(&eng, &id(1), op, at(1)), Err(VigilError::Unauthorized)));
        }
        assert_eq!(eng.db.head().unwrap(), 0);
    }

    // ── Batch ingestion ───────────────────────────────────────────────────────

    #[test]
    fn mismatched_batch_mutates_nothing() {
        let eng = engine("batch_mismatch");
        let err = batch(&eng, &["1.2.3.4", "5.6.7.8"], &[100], 1).unwrap_err();
        assert!(matches!(err, VigilError::MalformedBatch { endpoints: 2, severities: 1 }));
        assert!(eng.db.get_profile(&"1.2.3.4".into()).unwrap().is_none());
        assert!(eng.db.get_profile(&"5.6.7.8".into()).unwrap().is_none());
        assert_eq!(eng.db.head().unwrap(), 0);
    }

    #[test]
    fn batch_updates_each_endpoint_once() {
        let eng = engine("batch_apply");
        let applied = batch(&eng, &["1.2.3.4", "5.6.7.8"], &[100, 40], 1).unwrap();
        assert!(matches!(applied.receipt, Receipt::BatchApplied { endpoints: 2 }));

        let p1 = eng.db.get_profile(&"1.2.3.4".into()).unwrap().unwrap();
        let p2 = eng.db.get_profile(&"5.6.7.8".into()).unwrap().unwrap();
        assert_eq!((p1.offense_count, p1.risk_score), (1, 100));
        assert_eq!((p2.offense_count, p2.risk_score), (1, 40));

        batch(&eng, &["1.2.3.4"], &[10], 2).unwrap();
        let escalated = batch(&eng, &["1.2.3.4", "1.2.3.4"], &[10, 10], 3).unwrap();
        let Event::PunishBatch { ban_durations, .. } = &escalated.events[0].event else {
            panic!("expected PunishBatch");
        };
        assert_eq!(ban_durations, &vec![604_800, 604_800]);
        assert_eq!(eng.db.get_profile(&"1.2.3.4".into()).unwrap().unwrap().offense_count, 4);
    }

    #[test]
    fn batch_size_limits() {
        let eng = engine("batch_limits");
        assert!(matches!(batch(&eng, &[], &[], 1), Err(VigilError::EmptyBatch)));

        let many: Vec<String> = (0..=MAX_BATCH_SIZE).map(|i| format!("10.1.{}.{}", i / 256, i % 256)).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let sev = vec![1; refs.len()];
        assert!(matches!(batch(&eng, &refs, &sev, 2), Err(VigilError::BatchTooLarge { .. })));
    }

    #[test]
    fn risk_score_saturates_through_batch() {
        let eng = engine("batch_saturate");
        batch(&eng, &["1.2.3.4", "1.2.3.4"], &[u16::MAX, 5], 1).unwrap();
        assert_eq!(eng.db.get_profile(&"1.2.3.4".into()).unwrap().unwrap().risk_score, u16::MAX);
    }

    // ── Governance ────────────────────────────────────────────────────────────

    #[test]
    fn force_confirm_then_terminal() {
        let eng = engine("force_confirm");
        let ep: EndpointId = "198.51.100.1".into();
        let r = submit(&eng, &operator(), Operation::ForceConfirm { endpoint: ep.clone() }, at(5)).unwrap();
        assert!(matches!(r.receipt, Receipt::ForceConfirmed { offense_count: 1, .. }));
        let status = eng.db.get_status(&ep).unwrap().unwrap();
        assert_eq!(status.verdict_category.as_deref(), Some(GOVERNANCE_FORCE_CATEGORY));

        let err = submit(&eng, &operator(), Operation::ForceConfirm { endpoint: ep }, at(6)).unwrap_err();
        assert!(matches!(err, VigilError::ThreatAlreadyConfirmed(_)));
    }

    #[test]
    fn ban_tier_update_validated() {
        let eng = engine("tier_update");
        let bad = vec![
            BanTier { from_offense: 1, duration_secs: 100_000 },
            BanTier { from_offense: 2, duration_secs: 50_000 },
        ];
        let err = submit(&eng, &operator(), Operation::UpdateBanTiers { tiers: bad }, at(1)).unwrap_err();
        assert!(matches!(err, VigilError::InvalidBanTiers(_)));
        assert_eq!(eng.db.ban_tiers().unwrap(), BanTiers::default());

        let good = vec![
            BanTier { from_offense: 1, duration_secs: 3_600 },
            BanTier { from_offense: 3, duration_secs: 7_200 },
        ];
        submit(&eng, &operator(), Operation::UpdateBanTiers { tiers: good }, at(2)).unwrap();
        assert_eq!(eng.db.ban_tiers().unwrap().duration_for(2), 3_600);
    }

    // ── Log ───────────────────────────────────────────────────────────────────

    #[test]
    fn duplicate_submission_rejected() {
        let eng = engine("dup_submission");
        let sub = seal_submission(
            id(1),
            7,
            Operation::Commit {
                evidence_hash: evidence_hash(&"203.0.113.5".into()),
                nonce: "n1".into(),
            },
        );
        eng.apply(&sub, at(1)).unwrap();
        assert!(matches!(eng.apply(&sub, at(2)), Err(VigilError::DuplicateOperation(_))));
    }

    #[test]
    fn tampered_submission_rejected() {
        let eng = engine("tampered");
        let mut sub = seal_submission(
            id(1),
            7,
            Operation::Commit {
                evidence_hash: evidence_hash(&"203.0.113.5".into()),
                nonce: "n1".into(),
            },
        );
        sub.caller = id(2);
        assert!(matches!(eng.apply(&sub, at(1)), Err(VigilError::OperationIdMismatch(_))));
    }

    #[test]
    fn events_and_oplog_sequenced() {
        let eng = engine("sequenced");
        commit(&eng, 1, "203.0.113.5", "n1", 1).unwrap();
        let _ = commit(&eng, 99, "203.0.113.5", "n1", 2);
        commit(&eng, 2, "203.0.113.5", "n1", 3).unwrap();

        assert_eq!(eng.db.head().unwrap(), 2);
        let log = eng.db.logged_ops_from(1).unwrap();
        assert_eq!(log.iter().map(|l| l.sequence).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(log[1].at, at(3));
        let events = eng.db.events_range(1, 2).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e.event, Event::EvidenceCommitted { .. })));
    }
}

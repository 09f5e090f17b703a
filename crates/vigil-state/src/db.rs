use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{TransactionResult, TransactionalTree, UnabortableTransactionError};
use sled::Transactional;
use std::path::Path;

use vigil_consensus::WhitelistSource;
use vigil_core::ban::BanTiers;
use vigil_core::error::VigilError;
use vigil_core::event::EventRecord;
use vigil_core::operation::LoggedOperation;
use vigil_core::params::ProtocolParams;
use vigil_core::records::{Commitment, ReportRecord, ThreatProfile, ThreatStatus};
use vigil_core::types::{CommitmentKey, EndpointId, OpId, ReporterId};
use vigil_crypto::evidence_hash;

// ── Meta keys ─────────────────────────────────────────────────────────────────

pub const META_PARAMS: &str = "params";
pub const META_BAN_TIERS: &str = "ban_tiers";
pub const META_OPERATORS: &str = "operators";
pub const META_HEAD: &str = "head";
pub const META_GENESIS: &str = "genesis";

/// Persistent state database backed by sled.
///
/// Named trees:
///   commitments : CommitmentKey bytes              → bincode(Commitment)
///   profiles    : endpoint utf8                    → bincode(ThreatProfile)
///   status      : endpoint utf8                    → bincode(ThreatStatus)
///   reports     : blake3(endpoint) ‖ reporter      → bincode(ReportRecord)
///   whitelist   : endpoint utf8                    → [] (membership set)
///   ops         : OpId bytes                       → sequence (u64 BE)
///   oplog       : sequence (u64 BE)                → bincode(LoggedOperation)
///   events      : sequence (u64 BE) ‖ index (u32 BE) → bincode(EventRecord)
///   meta        : utf8 key bytes                   → raw bytes
pub struct StateDb {
    _db: sled::Db,
    commitments: sled::Tree,
    profiles: sled::Tree,
    status: sled::Tree,
    reports: sled::Tree,
    whitelist: sled::Tree,
    ops: sled::Tree,
    oplog: sled::Tree,
    events: sled::Tree,
    meta: sled::Tree,
}

fn storage(e: sled::Error) -> VigilError {
    VigilError::Storage(e.to_string())
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, VigilError> {
    bincode::deserialize(bytes).map_err(|e| VigilError::Serialization(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, VigilError> {
    bincode::serialize(value).map_err(|e| VigilError::Serialization(e.to_string()))
}

fn report_key(endpoint: &EndpointId, reporter: &ReporterId) -> Vec<u8> {
    let mut key = Vec::with_capacity(64);
    key.extend_from_slice(evidence_hash(endpoint).as_bytes());
    key.extend_from_slice(reporter.as_bytes());
    key
}

fn event_key(sequence: u64, index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(12);
    key.extend_from_slice(&sequence.to_be_bytes());
    key.extend_from_slice(&index.to_be_bytes());
    key
}

fn sequence_from(bytes: &[u8]) -> Result<u64, VigilError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| VigilError::Serialization(format!("bad sequence length {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VigilError> {
        let db = sled::open(path).map_err(storage)?;
        let commitments = db.open_tree("commitments").map_err(storage)?;
        let profiles    = db.open_tree("profiles").map_err(storage)?;
        let status      = db.open_tree("status").map_err(storage)?;
        let reports     = db.open_tree("reports").map_err(storage)?;
        let whitelist   = db.open_tree("whitelist").map_err(storage)?;
        let ops         = db.open_tree("ops").map_err(storage)?;
        let oplog       = db.open_tree("oplog").map_err(storage)?;
        let events      = db.open_tree("events").map_err(storage)?;
        let meta        = db.open_tree("meta").map_err(storage)?;
        Ok(Self {
            _db: db,
            commitments,
            profiles,
            status,
            reports,
            whitelist,
            ops,
            oplog,
            events,
            meta,
        })
    }

    fn get_decoded<T: DeserializeOwned>(tree: &sled::Tree, key: &[u8]) -> Result<Option<T>, VigilError> {
        match tree.get(key).map_err(storage)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // ── Commitments ──────────────────────────────────────────────────────────

    pub fn get_commitment(&self, key: &CommitmentKey) -> Result<Option<Commitment>, VigilError> {
        Self::get_decoded(&self.commitments, key.as_bytes())
    }

    pub fn commitment_count(&self) -> usize {
        self.commitments.len()
    }

    // ── Profiles / status ────────────────────────────────────────────────────

    pub fn get_profile(&self, endpoint: &EndpointId) -> Result<Option<ThreatProfile>, VigilError> {
        Self::get_decoded(&self.profiles, endpoint.as_bytes())
    }

    pub fn get_status(&self, endpoint: &EndpointId) -> Result<Option<ThreatStatus>, VigilError> {
        Self::get_decoded(&self.status, endpoint.as_bytes())
    }

    // ── Reports ──────────────────────────────────────────────────────────────

    pub fn get_report(
        &self,
        endpoint: &EndpointId,
        reporter: &ReporterId,
    ) -> Result<Option<ReportRecord>, VigilError> {
        Self::get_decoded(&self.reports, &report_key(endpoint, reporter))
    }

    /// All report records for `endpoint`, ordered by first-reveal sequence.
    pub fn reports_for(&self, endpoint: &EndpointId) -> Result<Vec<ReportRecord>, VigilError> {
        let prefix = evidence_hash(endpoint);
        let mut out: Vec<ReportRecord> = Vec::new();
        for item in self.reports.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item.map_err(storage)?;
            out.push(decode(&bytes)?);
        }
        out.sort_by_key(|r| r.sequence);
        Ok(out)
    }

    // ── Whitelist ────────────────────────────────────────────────────────────

    pub fn is_whitelisted(&self, endpoint: &EndpointId) -> Result<bool, VigilError> {
        self.whitelist.contains_key(endpoint.as_bytes()).map_err(storage)
    }

    pub fn whitelist_entries(&self) -> Result<Vec<EndpointId>, VigilError> {
        let mut out = Vec::new();
        for item in self.whitelist.iter() {
            let (key, _) = item.map_err(storage)?;
            let s = String::from_utf8(key.to_vec())
                .map_err(|e| VigilError::Serialization(e.to_string()))?;
            out.push(EndpointId::new(s));
        }
        Ok(out)
    }

    // ── Operation log ────────────────────────────────────────────────────────

    /// Sequence at which `op_id` was applied, if it was.
    pub fn op_sequence(&self, op_id: &OpId) -> Result<Option<u64>, VigilError> {
        match self.ops.get(op_id.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(sequence_from(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_logged_op(&self, sequence: u64) -> Result<Option<LoggedOperation>, VigilError> {
        Self::get_decoded(&self.oplog, &sequence.to_be_bytes())
    }

    /// Logged operations with `sequence >= from`, in order.
    pub fn logged_ops_from(&self, from: u64) -> Result<Vec<LoggedOperation>, VigilError> {
        let mut out = Vec::new();
        for item in self.oplog.range(from.to_be_bytes()..) {
            let (_, bytes) = item.map_err(storage)?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    /// Sequence of the last applied operation; zero on an empty log.
    pub fn head(&self) -> Result<u64, VigilError> {
        match self.get_meta(META_HEAD)? {
            Some(bytes) => sequence_from(&bytes),
            None => Ok(0),
        }
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Events emitted by operations with sequence in `from..=to`.
    pub fn events_range(&self, from: u64, to: u64) -> Result<Vec<EventRecord>, VigilError> {
        if from > to {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for item in self.events.range(event_key(from, 0)..=event_key(to, u32::MAX)) {
            let (_, bytes) = item.map_err(storage)?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), VigilError> {
        self.meta.insert(key.as_bytes(), value).map_err(storage)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, VigilError> {
        self.meta
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(storage)
    }

    pub fn params(&self) -> Result<ProtocolParams, VigilError> {
        Self::get_decoded(&self.meta, META_PARAMS.as_bytes())?.ok_or(VigilError::GenesisMissing)
    }

    pub fn ban_tiers(&self) -> Result<BanTiers, VigilError> {
        Self::get_decoded(&self.meta, META_BAN_TIERS.as_bytes())?.ok_or(VigilError::GenesisMissing)
    }

    pub fn operators(&self) -> Result<Vec<ReporterId>, VigilError> {
        Ok(Self::get_decoded(&self.meta, META_OPERATORS.as_bytes())?.unwrap_or_default())
    }

    pub fn genesis_applied(&self) -> Result<bool, VigilError> {
        self.meta.contains_key(META_GENESIS.as_bytes()).map_err(storage)
    }

    // ── Atomic commit ────────────────────────────────────────────────────────

    /// Write every staged change in one multi-tree transaction.
    pub fn commit(&self, staged: &StagedWrites) -> Result<(), VigilError> {
        let result: TransactionResult<(), ()> = (
            &self.commitments,
            &self.profiles,
            &self.status,
            &self.reports,
            &self.whitelist,
            &self.ops,
            &self.oplog,
            &self.events,
            &self.meta,
        )
            .transaction(|(tc, tp, ts, tr, tw, to, tl, te, tm)| {
                staged.commitments.apply(tc)?;
                staged.profiles.apply(tp)?;
                staged.status.apply(ts)?;
                staged.reports.apply(tr)?;
                staged.whitelist.apply(tw)?;
                staged.ops.apply(to)?;
                staged.oplog.apply(tl)?;
                staged.events.apply(te)?;
                staged.meta.apply(tm)?;
                Ok(())
            });
        result.map_err(|e| VigilError::Storage(format!("{e:?}")))
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), VigilError> {
        self._db.flush().map_err(storage)?;
        Ok(())
    }
}

impl WhitelistSource for StateDb {
    fn is_listed(&self, endpoint: &EndpointId) -> Result<bool, VigilError> {
        self.is_whitelisted(endpoint)
    }
}

// ── Staged writes ─────────────────────────────────────────────────────────────

/// Ordered puts and deletes against one tree. `None` deletes.
#[derive(Default, Debug)]
struct TreeWrites(Vec<(Vec<u8>, Option<Vec<u8>>)>);

impl TreeWrites {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.0.push((key, Some(value)));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.0.push((key, None));
    }

    fn apply(&self, tree: &TransactionalTree) -> Result<(), UnabortableTransactionError> {
        for (key, value) in &self.0 {
            match value {
                Some(v) => {
                    tree.insert(key.as_slice(), v.as_slice())?;
                }
                None => {
                    tree.remove(key.as_slice())?;
                }
            }
        }
        Ok(())
    }
}

/// All state changes of one operation, serialized up front and committed
/// by [`StateDb::commit`].
#[derive(Default, Debug)]
pub struct StagedWrites {
    commitments: TreeWrites,
    profiles: TreeWrites,
    status: TreeWrites,
    reports: TreeWrites,
    whitelist: TreeWrites,
    ops: TreeWrites,
    oplog: TreeWrites,
    events: TreeWrites,
    meta: TreeWrites,
}

impl StagedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_commitment(&mut self, c: &Commitment) -> Result<(), VigilError> {
        self.commitments.put(c.key.as_bytes().to_vec(), encode(c)?);
        Ok(())
    }

    pub fn put_profile(&mut self, endpoint: &EndpointId, p: &ThreatProfile) -> Result<(), VigilError> {
        self.profiles.put(endpoint.as_bytes().to_vec(), encode(p)?);
        Ok(())
    }

    pub fn put_status(&mut self, endpoint: &EndpointId, s: &ThreatStatus) -> Result<(), VigilError> {
        self.status.put(endpoint.as_bytes().to_vec(), encode(s)?);
        Ok(())
    }

    pub fn put_report(&mut self, r: &ReportRecord) -> Result<(), VigilError> {
        self.reports.put(report_key(&r.endpoint, &r.reporter), encode(r)?);
        Ok(())
    }

    pub fn delete_report(&mut self, endpoint: &EndpointId, reporter: &ReporterId) {
        self.reports.delete(report_key(endpoint, reporter));
    }

    pub fn set_whitelisted(&mut self, endpoint: &EndpointId, listed: bool) {
        let key = endpoint.as_bytes().to_vec();
        if listed {
            self.whitelist.put(key, Vec::new());
        } else {
            self.whitelist.delete(key);
        }
    }

    pub fn put_meta<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), VigilError> {
        self.meta.put(key.as_bytes().to_vec(), encode(value)?);
        Ok(())
    }

    /// Append the operation to the log, index its id, and advance the head.
    pub fn log_operation(&mut self, entry: &LoggedOperation) -> Result<(), VigilError> {
        let seq = entry.sequence.to_be_bytes().to_vec();
        self.ops.put(entry.submission.op_id.as_bytes().to_vec(), seq.clone());
        self.oplog.put(seq.clone(), encode(entry)?);
        self.meta.put(META_HEAD.as_bytes().to_vec(), seq);
        Ok(())
    }

    pub fn put_event(&mut self, record: &EventRecord) -> Result<(), VigilError> {
        self.events.put(event_key(record.sequence, record.index), encode(record)?);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        [
            &self.commitments,
            &self.profiles,
            &self.status,
            &self.reports,
            &self.whitelist,
            &self.ops,
            &self.oplog,
            &self.events,
            &self.meta,
        ]
        .iter()
        .all(|t| t.0.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(name: &str) -> StateDb {
        let dir = std::env::temp_dir().join(format!("vigil_db_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        StateDb::open(&dir).expect("open temp db")
    }

    fn report(endpoint: &str, who: u8, seq: u64) -> ReportRecord {
        ReportRecord {
            endpoint: endpoint.into(),
            reporter: ReporterId::from_bytes([who; 32]),
            commitment: CommitmentKey([who; 32]),
            severity: 10,
            attack_type: "DDoS".into(),
            cpu_load: 50,
            log_hash: "h".into(),
            first_reported_at: 0,
            reported_at: 0,
            sequence: seq,
        }
    }

    #[test]
    fn reports_scoped_to_endpoint_and_ordered() {
        let db = temp_db("reports_scoped");
        let mut staged = StagedWrites::new();
        staged.put_report(&report("10.0.0.1", 3, 7)).unwrap();
        staged.put_report(&report("10.0.0.1", 1, 9)).unwrap();
        staged.put_report(&report("10.0.0.2", 2, 1)).unwrap();
        db.commit(&staged).unwrap();

        let rs = db.reports_for(&"10.0.0.1".into()).unwrap();
        assert_eq!(rs.len(), 2);
        assert_eq!(rs[0].sequence, 7);
        assert_eq!(rs[1].sequence, 9);
        assert_eq!(db.reports_for(&"10.0.0.3".into()).unwrap().len(), 0);
    }

    #[test]
    fn staged_delete_after_put_removes() {
        let db = temp_db("delete_after_put");
        let ep: EndpointId = "10.0.0.1".into();
        let mut staged = StagedWrites::new();
        staged.put_report(&report("10.0.0.1", 1, 1)).unwrap();
        staged.set_whitelisted(&ep, true);
        db.commit(&staged).unwrap();
        assert!(db.is_whitelisted(&ep).unwrap());

        let mut staged = StagedWrites::new();
        staged.delete_report(&ep, &ReporterId::from_bytes([1; 32]));
        staged.set_whitelisted(&ep, false);
        db.commit(&staged).unwrap();
        assert!(db.reports_for(&ep).unwrap().is_empty());
        assert!(!db.is_whitelisted(&ep).unwrap());
    }

    #[test]
    fn empty_commit_is_noop() {
        let db = temp_db("empty_commit");
        let staged = StagedWrites::new();
        assert!(staged.is_empty());
        db.commit(&staged).unwrap();
        assert_eq!(db.head().unwrap(), 0);
        assert!(db.get_profile(&"1.2.3.4".into()).unwrap().is_none());
    }

    #[test]
    fn profile_round_trips_through_commit() {
        let db = temp_db("profile_commit");
        let ep: EndpointId = "192.0.2.1".into();
        let p = ThreatProfile { last_offense_time: 5, last_punished_at: 5, offense_count: 2, risk_score: 40 };
        let mut staged = StagedWrites::new();
        staged.put_profile(&ep, &p).unwrap();
        db.commit(&staged).unwrap();
        assert_eq!(db.get_profile(&ep).unwrap(), Some(p));
    }

    #[test]
    fn missing_params_reports_genesis_missing() {
        let db = temp_db("no_genesis");
        assert!(matches!(db.params(), Err(VigilError::GenesisMissing)));
        assert!(db.operators().unwrap().is_empty());
    }
}

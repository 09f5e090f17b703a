/// ─── Vigil Protocol Constants ───────────────────────────────────────────────
///
/// Decision logic for decentralized threat consensus: commit-reveal
/// reporting, quorum verdicts, and escalating bans.
///
/// All values here are genesis defaults. Running networks read the active
/// values from the `ProtocolParams` and `BanTiers` stored at genesis.

// ── Commit / reveal ──────────────────────────────────────────────────────────

/// Minimum number of blocks between a commitment and its reveal.
/// Prevents same-block copy-reveal of an observed commitment.
pub const REVEAL_DELAY_BLOCKS: u64 = 10;

/// Domain separator mixed into every commitment key.
pub const COMMITMENT_DOMAIN: &[u8] = b"vigil/commitment/v1";

/// Domain separator mixed into every operation id.
pub const OPERATION_DOMAIN: &[u8] = b"vigil/operation/v1";

// ── Consensus ────────────────────────────────────────────────────────────────

/// Distinct reporters required before an endpoint is confirmed.
pub const CONSENSUS_THRESHOLD: u32 = 3;

/// Reports older than this (seconds) no longer count toward quorum.
/// Default: 7 days.
pub const EVIDENCE_WINDOW_SECS: i64 = 7 * 24 * 3600;

/// Verdict category used when governance confirms an endpoint directly.
pub const GOVERNANCE_FORCE_CATEGORY: &str = "Governance Force Block";

// ── Reporter standing ────────────────────────────────────────────────────────

/// Minimum standing (stake / balance units) needed to commit evidence.
pub const MIN_REPORTER_STANDING: u128 = 1_000;

// ── Evidence payload limits ──────────────────────────────────────────────────

/// CPU load is reported as a percentage.
pub const MAX_CPU_LOAD: u8 = 100;

/// Maximum length of an attack category label (bytes).
pub const MAX_CATEGORY_BYTES: usize = 64;

/// Maximum length of an endpoint identifier (bytes). Long enough for a
/// fully qualified host name.
pub const MAX_ENDPOINT_BYTES: usize = 253;

/// Maximum length of a commitment nonce (bytes).
pub const MAX_NONCE_BYTES: usize = 128;

// ── Batch ingestion ──────────────────────────────────────────────────────────

/// Largest batch accepted by `ReportBatch` and the whitelist operations.
pub const MAX_BATCH_SIZE: usize = 100;

// ── Ban tiers (seconds) ──────────────────────────────────────────────────────

/// First offense: 24 hours.
pub const BAN_TIER_1_SECS: i64 = 24 * 3600;

/// Second offense: 3 days.
pub const BAN_TIER_2_SECS: i64 = 3 * 24 * 3600;

/// Third and later offenses: 7 days.
pub const BAN_TIER_3_SECS: i64 = 7 * 24 * 3600;

// ── Genesis whitelist ────────────────────────────────────────────────────────

/// Public resolvers that can never be judged malicious.
pub const DEFAULT_WHITELIST: [&str; 4] = ["8.8.8.8", "8.8.4.4", "1.1.1.1", "1.0.0.1"];

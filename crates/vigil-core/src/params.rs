use serde::{Deserialize, Serialize};

use crate::constants::{
    CONSENSUS_THRESHOLD, EVIDENCE_WINDOW_SECS, MAX_BATCH_SIZE, MAX_CPU_LOAD,
    MIN_REPORTER_STANDING, REVEAL_DELAY_BLOCKS,
};
use crate::error::VigilError;
use crate::types::{BlockHeight, Standing};

fn default_reveal_delay() -> BlockHeight { REVEAL_DELAY_BLOCKS }
fn default_threshold() -> u32 { CONSENSUS_THRESHOLD }
fn default_min_standing() -> Standing { MIN_REPORTER_STANDING }
fn default_evidence_window() -> Option<i64> { Some(EVIDENCE_WINDOW_SECS) }
fn default_max_batch() -> usize { MAX_BATCH_SIZE }
fn default_max_cpu() -> u8 { MAX_CPU_LOAD }

/// Tunable protocol parameters, fixed at genesis and stored in `meta`.
///
/// Every field has a serde default so partial JSON configs work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    #[serde(default = "default_reveal_delay")]
    pub reveal_delay_blocks: BlockHeight,
    #[serde(default = "default_threshold")]
    pub consensus_threshold: u32,
    #[serde(default = "default_min_standing")]
    pub min_standing: Standing,
    /// `None` keeps unconfirmed reports forever.
    #[serde(default = "default_evidence_window")]
    pub evidence_window_secs: Option<i64>,
    #[serde(default = "default_max_batch")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_cpu")]
    pub max_cpu_load: u8,
}

impl ProtocolParams {
    pub fn validate(&self) -> Result<(), VigilError> {
        if self.consensus_threshold == 0 {
            return Err(VigilError::Other("consensus threshold must be at least 1".into()));
        }
        if self.max_batch_size == 0 {
            return Err(VigilError::Other("max batch size must be at least 1".into()));
        }
        if matches!(self.evidence_window_secs, Some(w) if w <= 0) {
            return Err(VigilError::Other("evidence window must be positive".into()));
        }
        Ok(())
    }
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            reveal_delay_blocks: REVEAL_DELAY_BLOCKS,
            consensus_threshold: CONSENSUS_THRESHOLD,
            min_standing: MIN_REPORTER_STANDING,
            evidence_window_secs: Some(EVIDENCE_WINDOW_SECS),
            max_batch_size: MAX_BATCH_SIZE,
            max_cpu_load: MAX_CPU_LOAD,
        }
    }
}

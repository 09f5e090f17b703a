//! Ban duration policy.
//!
//! A small ordered table mapping offense counts to ban lengths. Lookup is a
//! pure function of the offense count; where each tier begins is data, not
//! code, so operators can move the boundaries with `UpdateBanTiers`.

use serde::{Deserialize, Serialize};

use crate::constants::{BAN_TIER_1_SECS, BAN_TIER_2_SECS, BAN_TIER_3_SECS};
use crate::error::VigilError;
use crate::types::DurationSecs;

/// Offense counts `>= from_offense` (up to the next tier) are banned for
/// `duration_secs`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanTier {
    pub from_offense: u32,
    pub duration_secs: DurationSecs,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanTiers {
    tiers: Vec<BanTier>,
}

impl BanTiers {
    /// Build a validated table.
    ///
    /// Rules: non-empty; first tier starts at offense >= 1; boundaries strictly
    /// increasing; durations positive and non-decreasing.
    pub fn new(tiers: Vec<BanTier>) -> Result<Self, VigilError> {
        let first = tiers
            .first()
            .ok_or_else(|| VigilError::InvalidBanTiers("table is empty".into()))?;
        if first.from_offense == 0 {
            return Err(VigilError::InvalidBanTiers(
                "first tier must start at offense 1 or later".into(),
            ));
        }
        if tiers.iter().any(|t| t.duration_secs <= 0) {
            return Err(VigilError::InvalidBanTiers("durations must be positive".into()));
        }
        for pair in tiers.windows(2) {
            if pair[1].from_offense <= pair[0].from_offense {
                return Err(VigilError::InvalidBanTiers(
                    "offense boundaries must be strictly increasing".into(),
                ));
            }
            if pair[1].duration_secs < pair[0].duration_secs {
                return Err(VigilError::InvalidBanTiers("invalid duration sequence".into()));
            }
        }
        Ok(Self { tiers })
    }

    /// Three-tier table with one tier per offense: 24h, 3d, 7d.
    pub fn three_tier(tier1: DurationSecs, tier2: DurationSecs, tier3: DurationSecs) -> Result<Self, VigilError> {
        Self::new(vec![
            BanTier { from_offense: 1, duration_secs: tier1 },
            BanTier { from_offense: 2, duration_secs: tier2 },
            BanTier { from_offense: 3, duration_secs: tier3 },
        ])
    }

    pub fn tiers(&self) -> &[BanTier] {
        &self.tiers
    }

    /// Ban duration for an endpoint with `offense_count` confirmed offenses.
    ///
    /// Zero before the first tier; clamps to the longest tier past the end.
    pub fn duration_for(&self, offense_count: u32) -> DurationSecs {
        self.tiers
            .iter()
            .rev()
            .find(|t| offense_count >= t.from_offense)
            .map(|t| t.duration_secs)
            .unwrap_or(0)
    }
}

impl Default for BanTiers {
    fn default() -> Self {
        Self {
            tiers: vec![
                BanTier { from_offense: 1, duration_secs: BAN_TIER_1_SECS },
                BanTier { from_offense: 2, duration_secs: BAN_TIER_2_SECS },
                BanTier { from_offense: 3, duration_secs: BAN_TIER_3_SECS },
            ],
        }
    }
}

use serde::{Deserialize, Serialize};

use vigil_core::ban::{BanTier, BanTiers};
use vigil_core::constants::DEFAULT_WHITELIST;
use vigil_core::error::VigilError;
use vigil_core::params::ProtocolParams;
use vigil_core::types::{EndpointId, ReporterId};

fn default_ban_tiers() -> Vec<BanTier> {
    BanTiers::default().tiers().to_vec()
}

fn default_whitelist() -> Vec<String> {
    DEFAULT_WHITELIST.iter().map(|s| s.to_string()).collect()
}

/// Founding configuration of a Vigil database.
///
/// Loaded from JSON; every field except `operators` has a default.
/// Operators are base-58 identities allowed to submit privileged operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisParams {
    #[serde(default)]
    pub protocol: ProtocolParams,
    #[serde(default = "default_ban_tiers")]
    pub ban_tiers: Vec<BanTier>,
    #[serde(default)]
    pub operators: Vec<String>,
    #[serde(default = "default_whitelist")]
    pub whitelist: Vec<String>,
}

impl GenesisParams {
    pub fn with_operators(operators: &[ReporterId]) -> Self {
        Self {
            operators: operators.iter().map(ReporterId::to_b58).collect(),
            ..Default::default()
        }
    }

    pub fn operator_ids(&self) -> Result<Vec<ReporterId>, VigilError> {
        self.operators.iter().map(|s| ReporterId::from_b58(s)).collect()
    }

    pub fn whitelist_ids(&self) -> Result<Vec<EndpointId>, VigilError> {
        self.whitelist
            .iter()
            .map(|s| {
                let e = EndpointId::new(s.as_str());
                e.validate().map(|_| e)
            })
            .collect()
    }

    pub fn tier_table(&self) -> Result<BanTiers, VigilError> {
        BanTiers::new(self.ban_tiers.clone())
    }
}

impl Default for GenesisParams {
    fn default() -> Self {
        Self {
            protocol: ProtocolParams::default(),
            ban_tiers: default_ban_tiers(),
            operators: Vec::new(),
            whitelist: default_whitelist(),
        }
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use vigil_core::error::VigilError;
use vigil_core::types::{ReporterId, Standing};

/// External source of reporter standing (stake, token balance, ...).
///
/// The engine never talks to a ledger directly; whatever node embeds it
/// supplies an implementation.
pub trait StandingOracle {
    fn standing_of(&self, reporter: &ReporterId) -> Standing;
}

/// Fixed table of standings, loaded from config or built in tests.
/// Unknown identities have zero standing.
#[derive(Debug, Clone, Default)]
pub struct StaticStandingOracle {
    standings: HashMap<ReporterId, Standing>,
}

impl StaticStandingOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, reporter: ReporterId, standing: Standing) {
        self.standings.insert(reporter, standing);
    }

    pub fn remove(&mut self, reporter: &ReporterId) {
        self.standings.remove(reporter);
    }

    pub fn len(&self) -> usize {
        self.standings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.standings.is_empty()
    }
}

impl FromIterator<(ReporterId, Standing)> for StaticStandingOracle {
    fn from_iter<I: IntoIterator<Item = (ReporterId, Standing)>>(iter: I) -> Self {
        Self {
            standings: iter.into_iter().collect(),
        }
    }
}

impl StandingOracle for StaticStandingOracle {
    fn standing_of(&self, reporter: &ReporterId) -> Standing {
        self.standings.get(reporter).copied().unwrap_or(0)
    }
}

/// Admission check in front of the commitment store.
///
/// Takes nothing but the caller identity, so the outcome cannot depend on
/// the evidence being committed.
#[derive(Clone)]
pub struct ReputationGate {
    oracle: Arc<dyn StandingOracle + Send + Sync>,
    min_standing: Standing,
}

impl ReputationGate {
    pub fn new(oracle: Arc<dyn StandingOracle + Send + Sync>, min_standing: Standing) -> Self {
        Self { oracle, min_standing }
    }

    pub fn min_standing(&self) -> Standing {
        self.min_standing
    }

    pub fn authorize(&self, reporter: &ReporterId) -> Result<(), VigilError> {
        let have = self.oracle.standing_of(reporter);
        if have < self.min_standing {
            debug!(reporter = %reporter, have, need = self.min_standing, "standing below minimum");
            return Err(VigilError::InsufficientStanding {
                need: self.min_standing,
                have,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ReputationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReputationGate")
            .field("min_standing", &self.min_standing)
            .finish_non_exhaustive()
    }
}

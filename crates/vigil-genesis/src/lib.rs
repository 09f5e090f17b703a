//! vigil-genesis
//!
//! Seeds an empty `StateDb` with the founding configuration: protocol
//! parameters, the ban tier table, the operator set and the initial
//! whitelist. Written in one transaction, outside the operation log, so
//! replaying the log onto a fresh genesis reproduces the same state.

pub mod params;

pub use params::GenesisParams;

use tracing::info;

use vigil_core::error::VigilError;
use vigil_core::types::{EndpointId, ReporterId};
use vigil_state::db::{META_BAN_TIERS, META_GENESIS, META_OPERATORS, META_PARAMS};
use vigil_state::{StagedWrites, StateDb};

/// What genesis wrote.
#[derive(Debug, Clone)]
pub struct GenesisSummary {
    pub operators: Vec<ReporterId>,
    pub whitelist: Vec<EndpointId>,
}

/// Apply genesis to an empty `StateDb`.
///
/// Fails with `GenesisAlreadyApplied` on a database that already has one.
pub fn apply_genesis(db: &StateDb, params: &GenesisParams) -> Result<GenesisSummary, VigilError> {
    if db.genesis_applied()? {
        return Err(VigilError::GenesisAlreadyApplied);
    }
    info!("applying Vigil genesis state");

    params.protocol.validate()?;
    let tiers = params.tier_table()?;
    let operators = params.operator_ids()?;
    let whitelist = params.whitelist_ids()?;

    let mut staged = StagedWrites::new();
    staged.put_meta(META_PARAMS, &params.protocol)?;
    staged.put_meta(META_BAN_TIERS, &tiers)?;
    staged.put_meta(META_OPERATORS, &operators)?;
    for endpoint in &whitelist {
        staged.set_whitelisted(endpoint, true);
    }
    staged.put_meta(META_GENESIS, &true)?;
    db.commit(&staged)?;

    info!(
        threshold = params.protocol.consensus_threshold,
        reveal_delay = params.protocol.reveal_delay_blocks,
        tiers = tiers.tiers().len(),
        "genesis: protocol parameters stored"
    );
    info!(
        operators = operators.len(),
        whitelist = whitelist.len(),
        "genesis: operators and whitelist seeded"
    );

    Ok(GenesisSummary { operators, whitelist })
}

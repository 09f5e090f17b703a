pub mod aggregator;
pub mod gate;
pub mod profile;
pub mod whitelist;

pub use aggregator::{dominant_category, ConsensusAggregator, EndpointView, RevealInput, Transition};
pub use gate::{ReputationGate, StandingOracle, StaticStandingOracle};
pub use profile::punish;
pub use whitelist::{WhitelistGuard, WhitelistSet, WhitelistSource};

use tracing::debug;

use vigil_core::ban::BanTiers;
use vigil_core::records::ThreatProfile;
use vigil_core::types::{DurationSecs, Severity, Timestamp};

/// Record one confirmed offense on `profile` and return the ban duration
/// that now applies to it.
pub fn punish(
    profile: &mut ThreatProfile,
    severity: Severity,
    at: Timestamp,
    tiers: &BanTiers,
) -> DurationSecs {
    profile.record_offense(severity, at);
    let duration = tiers.duration_for(profile.offense_count);
    debug!(
        offense_count = profile.offense_count,
        risk_score = profile.risk_score,
        duration,
        "offense recorded"
    );
    duration
}

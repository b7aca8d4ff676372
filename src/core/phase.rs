use chrono::NaiveDate;
use serde::Serialize;

use super::income::PersonProfile;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Accumulation,
    Transition,
    Distribution,
    Survivor,
}

// Phase is re-derived from the calendar every period instead of being stored,
// so staggered households (one spouse working while the other draws down)
// stay consistent without per-person special cases.
pub fn derive_phase(month: NaiveDate, profiles: &[PersonProfile]) -> Phase {
    let alive: Vec<&PersonProfile> = profiles.iter().filter(|p| p.is_alive(month)).collect();
    let any_deceased = profiles.len() > alive.len();

    if any_deceased && !profiles.is_empty() {
        return Phase::Survivor;
    }
    if alive.iter().any(|p| p.withdrawal_start_date <= month) {
        return Phase::Distribution;
    }
    if !alive.is_empty() && alive.iter().all(|p| p.retirement_date <= month) {
        return Phase::Transition;
    }
    Phase::Accumulation
}

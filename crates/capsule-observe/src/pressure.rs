//! Memory-pressure advisor.
//!
//! A stateless helper for embedders that want to react to memory trends
//! before the hard cap fires. It sits alongside the sandbox core and is not
//! consulted by it.

use serde::{Deserialize, Serialize};

/// Advisory pressure levels.
///
/// Thresholds as a fraction of the limit: below 70% is normal, 70–85%
/// warning, 85–95% pressure, 95–100% critical, at or above 100% out of
/// memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PressureLevel {
    /// Below 70% of the limit.
    Normal,
    /// In `[70%, 85%)`.
    Warning,
    /// In `[85%, 95%)`.
    Pressure,
    /// In `[95%, 100%)`.
    Critical,
    /// At or above the limit.
    Oom,
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PressureLevel::Normal => "NORMAL",
            PressureLevel::Warning => "WARNING",
            PressureLevel::Pressure => "PRESSURE",
            PressureLevel::Critical => "CRITICAL",
            PressureLevel::Oom => "OOM",
        };
        write!(f, "{name}")
    }
}

/// Assess pressure for `used` bytes against `limit` bytes.
///
/// Integer arithmetic keeps the threshold boundaries exact.
pub fn assess_pressure(used: u64, limit: u64) -> PressureLevel {
    if limit == 0 {
        return if used == 0 {
            PressureLevel::Normal
        } else {
            PressureLevel::Oom
        };
    }

    let scaled = used as u128 * 100;
    let limit = limit as u128;

    if scaled >= limit * 100 {
        PressureLevel::Oom
    } else if scaled >= limit * 95 {
        PressureLevel::Critical
    } else if scaled >= limit * 85 {
        PressureLevel::Pressure
    } else if scaled >= limit * 70 {
        PressureLevel::Warning
    } else {
        PressureLevel::Normal
    }
}

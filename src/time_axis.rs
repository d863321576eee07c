// Bunch-crossing <-> picosecond conversions

use crate::constants::{BC_DURATION_PS, MAX_BUNCHES_PER_ORBIT};
use crate::error::ConfigError;

/// Shared discrete/continuous time axis of both detectors.
///
/// Times are picoseconds relative to the start of the timeframe's first orbit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeAxis {
    bc_duration_ps: f64,
    max_bunches: u32,
}

impl TimeAxis {
    pub fn new(bc_duration_ps: f64, max_bunches: u32) -> Result<Self, ConfigError> {
        if !bc_duration_ps.is_finite() || bc_duration_ps <= 0.0 {
            return Err(ConfigError::InvalidBcDuration(bc_duration_ps));
        }
        if max_bunches == 0 {
            return Err(ConfigError::EmptyOrbit);
        }
        Ok(TimeAxis {
            bc_duration_ps,
            max_bunches,
        })
    }

    /// LHC defaults: 3564 crossings of ~24.95 ns per orbit.
    pub fn lhc() -> Self {
        TimeAxis {
            bc_duration_ps: BC_DURATION_PS,
            max_bunches: MAX_BUNCHES_PER_ORBIT,
        }
    }

    pub fn bc_duration_ps(&self) -> f64 {
        self.bc_duration_ps
    }

    pub fn max_bunches(&self) -> u32 {
        self.max_bunches
    }

    /// Continuous time of `bc` in `orbit` (orbit relative to the timeframe start).
    pub fn bc_time(&self, orbit: i64, bc: u32) -> f64 {
        (orbit * i64::from(self.max_bunches) + i64::from(bc)) as f64 * self.bc_duration_ps
    }

    /// Global BC number containing `time_ps`, shifted by `half_offset_ps` before flooring.
    pub fn bc_number(&self, time_ps: f64, half_offset_ps: f64) -> i64 {
        ((time_ps + half_offset_ps) / self.bc_duration_ps).floor() as i64
    }

    /// Position of a global BC number within its orbit, always in `[0, max_bunches)`.
    pub fn bc_in_orbit(&self, n_bc: i64) -> u32 {
        n_bc.rem_euclid(i64::from(self.max_bunches)) as u32
    }

    /// Time relative to the start of BC `n_bc`.
    pub fn time_in_bc(&self, time_ps: f64, n_bc: i64) -> f64 {
        time_ps - n_bc as f64 * self.bc_duration_ps
    }
}

impl Default for TimeAxis {
    fn default() -> Self {
        Self::lhc()
    }
}

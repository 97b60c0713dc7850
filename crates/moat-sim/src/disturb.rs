use moat_core::constants::{
    DISTURB_EDGE_MARGIN, DISTURB_INTERVAL_S, DISTURB_MAX_MAGNITUDE, DISTURB_MIN_MAGNITUDE,
};
use moat_core::{ConfigError, PreconditionError};
use serde::{Deserialize, Serialize};

use crate::rng::SimRng;
use crate::waves::WaveField;

/// Timing and range of the random surface disturbances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisturbParams {
    /// Simulated seconds between two disturbances.
    pub interval: f32,
    pub min_magnitude: f32,
    pub max_magnitude: f32,
    /// Cells kept clear of the grid edge when picking a location. At least 1.
    pub margin: usize,
    pub seed: u64,
}

impl Default for DisturbParams {
    fn default() -> Self {
        Self {
            interval: DISTURB_INTERVAL_S,
            min_magnitude: DISTURB_MIN_MAGNITUDE,
            max_magnitude: DISTURB_MAX_MAGNITUDE,
            margin: DISTURB_EDGE_MARGIN,
            seed: 42,
        }
    }
}

/// One disturbance applied to the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disturbance {
    pub row: usize,
    pub col: usize,
    pub magnitude: f32,
}

/// Fires disturbances on a fixed cadence of simulated time.
///
/// The clock only moves when [`tick`](Self::tick) is called, and locations and
/// magnitudes come from a seeded [`SimRng`], so the same seed and the same
/// sequence of `dt` values replay the same disturbances.
pub struct DisturbSchedule {
    params: DisturbParams,
    rng: SimRng,
    clock: f32,
    last_fired: f32,
    fired: u64,
    largest: f32,
}

impl DisturbSchedule {
    /// Validates the parameters against the grid the schedule will drive.
    pub fn new(params: DisturbParams, rows: usize, cols: usize) -> Result<Self, ConfigError> {
        if !(params.interval.is_finite() && params.interval > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "disturb.interval",
                value: params.interval,
            });
        }
        if !(params.min_magnitude.is_finite()
            && params.max_magnitude.is_finite()
            && params.min_magnitude <= params.max_magnitude)
        {
            return Err(ConfigError::InvalidParameter {
                name: "disturb.max_magnitude",
                value: params.max_magnitude,
            });
        }
        let fits = |n: usize| n >= 2 * params.margin + 1;
        if params.margin == 0 || !fits(rows) || !fits(cols) {
            return Err(ConfigError::DisturbMargin {
                margin: params.margin,
                rows,
                cols,
            });
        }

        Ok(Self {
            params,
            rng: SimRng::new(params.seed),
            clock: 0.0,
            last_fired: 0.0,
            fired: 0,
            largest: 0.0,
        })
    }

    pub fn params(&self) -> &DisturbParams {
        &self.params
    }

    /// Disturbances fired so far.
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Largest absolute magnitude fired so far.
    pub fn largest_magnitude(&self) -> f32 {
        self.largest
    }

    /// Advance the schedule clock by `dt` and apply every disturbance that
    /// became due to `field`. Returns how many fired.
    pub fn tick(&mut self, dt: f32, field: &mut WaveField) -> Result<u32, PreconditionError> {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(PreconditionError::InvalidTimeStep(dt));
        }
        self.clock += dt;

        let mut count = 0;
        while self.clock - self.last_fired >= self.params.interval {
            self.last_fired += self.params.interval;
            let d = self.draw(field.row_count(), field.column_count());
            field.disturb(d.row, d.col, d.magnitude)?;
            log::trace!(
                "disturbance #{} at ({}, {}) magnitude {:.3}",
                self.fired,
                d.row,
                d.col,
                d.magnitude
            );
            self.fired += 1;
            self.largest = self.largest.max(d.magnitude.abs());
            count += 1;
        }
        Ok(count)
    }

    fn draw(&mut self, rows: usize, cols: usize) -> Disturbance {
        let margin = self.params.margin;
        let row = self.rng.range_usize(margin, rows - 1 - margin);
        let col = self.rng.range_usize(margin, cols - 1 - margin);
        let magnitude = self
            .rng
            .range_f32(self.params.min_magnitude, self.params.max_magnitude);
        Disturbance {
            row,
            col,
            magnitude,
        }
    }
}

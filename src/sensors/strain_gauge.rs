//! Simulated load cell behind an HX711-style amplifier.
//!
//! Each read averages several raw conversions, removes the tare offset and
//! applies the calibration scale.

use super::{SensorSample, SensorSource};
use crate::error::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct SimulatedStrainGauge {
    offset: f64,
    scale: f64,
    /// Raw conversions averaged per read.
    samples_per_read: u32,
    rng: StdRng,
}

impl SimulatedStrainGauge {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic gauge for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            offset: 50_000.0,
            scale: 0.00001,
            samples_per_read: 5,
            rng,
        }
    }

    fn raw_conversion(&mut self) -> f64 {
        // Idle load with occasional strikes on the blade.
        let load = if self.rng.gen_bool(0.05) {
            self.rng.gen_range(20_000.0..80_000.0)
        } else {
            0.0
        };
        self.offset + load + self.rng.gen_range(-150.0..150.0)
    }
}

impl Default for SimulatedStrainGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for SimulatedStrainGauge {
    fn name(&self) -> &str {
        "strain"
    }

    fn read(&mut self) -> Result<SensorSample> {
        let total: f64 = (0..self.samples_per_read)
            .map(|_| self.raw_conversion())
            .sum();
        let mean = total / f64::from(self.samples_per_read);
        Ok(SensorSample::scalar((mean - self.offset) * self.scale))
    }
}

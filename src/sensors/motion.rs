//! Simulated 6-axis IMU (accelerometer + gyroscope).

use super::{SensorSample, SensorSource};
use crate::error::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Axis labels in the order they are produced.
pub const AXES: [&str; 6] = [
    "accel_x", "accel_y", "accel_z", "gyro_x", "gyro_y", "gyro_z",
];

pub struct SimulatedMotionSensor {
    rng: StdRng,
}

impl SimulatedMotionSensor {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SimulatedMotionSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for SimulatedMotionSensor {
    fn name(&self) -> &str {
        "motion"
    }

    fn read(&mut self) -> Result<SensorSample> {
        // Acceleration in g with gravity on z, angular rate in deg/s.
        let values = [
            self.rng.gen_range(-0.05..0.05),
            self.rng.gen_range(-0.05..0.05),
            1.0 + self.rng.gen_range(-0.05..0.05),
            self.rng.gen_range(-2.0..2.0),
            self.rng.gen_range(-2.0..2.0),
            self.rng.gen_range(-2.0..2.0),
        ];
        Ok(SensorSample::vector(AXES.into_iter().zip(values)))
    }
}

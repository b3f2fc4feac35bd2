//! Sensor sources sampled by the node.
//!
//! Hardware drivers stay behind [`SensorSource`]: one blocking-free pull
//! returning a sample or an error. The simulated sources stand in for the
//! load cell and the IMU on development hosts.

pub mod motion;
pub mod strain_gauge;

pub use motion::SimulatedMotionSensor;
pub use strain_gauge::SimulatedStrainGauge;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Numeric reading: a single value or an axis-labelled vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SampleValue {
    Scalar(f64),
    Vector(BTreeMap<String, f64>),
}

/// One reading, timestamped when it was taken.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSample {
    #[serde(rename = "values")]
    pub value: SampleValue,
    pub timestamp: DateTime<Utc>,
}

impl SensorSample {
    pub fn scalar(value: f64) -> Self {
        Self {
            value: SampleValue::Scalar(value),
            timestamp: Utc::now(),
        }
    }

    pub fn vector<I, K>(axes: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            value: SampleValue::Vector(axes.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            timestamp: Utc::now(),
        }
    }

    /// Wire payload for `deviceData`.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for SensorSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            SampleValue::Scalar(v) => write!(f, "{:.4}", v),
            SampleValue::Vector(axes) => {
                let mut first = true;
                for (axis, v) in axes {
                    if !first {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}={:.3}", axis, v)?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

/// Pull-based access to one hardware sensor.
///
/// `read` may block on the driver; samplers call it on the blocking pool and
/// never hold a runtime thread while it runs.
pub trait SensorSource: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn read(&mut self) -> Result<SensorSample>;
}

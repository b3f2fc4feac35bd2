//! Local device concerns: who this node is and how it gives physical feedback.

pub mod identity;
pub mod indicator;

pub use identity::{DeviceIdentity, DeviceRole};
pub use indicator::{Actuator, Indicator, LogActuator};

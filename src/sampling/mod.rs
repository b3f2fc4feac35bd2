//! Sensor sampling loops and the stream gate.

pub mod sampler;
pub mod toggle;

pub use sampler::{SampleSink, Sampler, SamplingRegime};
pub use toggle::StreamToggle;

//! Digital hit and trigger inputs.
//!
//! Edges arrive from the GPIO driver, are debounced per input and reported
//! as presses.

pub mod debounce;
pub mod simulation;
pub mod watcher;

pub use debounce::{Debouncer, Edge};
pub use watcher::{DigitalInputWatcher, EdgeSender, InputEvent, InputKind, InputSink, InputSource};

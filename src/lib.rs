//! Device gateway library.
//!
//! A device node runs on each piece of game hardware (gun, sword, armor),
//! keeps a persistent link to the central coordinator, forwards debounced
//! hit inputs and sensor samples to it, and drives local feedback in
//! response to coordinator messages.

pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod http;
pub mod input;
pub mod node;
pub mod router;
pub mod sampling;
pub mod sensors;

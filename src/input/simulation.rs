//! Simulated button presses for development hosts.
//!
//! Periodically picks one input and replays a bouncy press on it, so the
//! whole path from debounce to coordinator can be exercised without GPIO.

use super::debounce::Edge;
use super::watcher::EdgeSender;
use log::info;
use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};

/// Raw transitions making up one simulated press.
const BOUNCE: [Edge; 5] = [
    Edge::Rising,
    Edge::Falling,
    Edge::Rising,
    Edge::Falling,
    Edge::Rising,
];

/// Spawn a task that presses a random input every `period`.
pub fn run_input_simulation(inputs: Vec<EdgeSender>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        if inputs.is_empty() {
            return;
        }
        let mut ticker = interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let index = rand::thread_rng().gen_range(0..inputs.len());
            let input = &inputs[index];
            info!("[Sim] Pressing {}", input.source());
            for edge in BOUNCE {
                input.edge(edge);
                sleep(Duration::from_millis(2)).await;
            }
        }
    })
}

//! Process-wide gate for the high-rate sensor stream.
//!
//! The flag is flipped by coordinator commands and read by the streaming
//! loop. The toggle also records whether a loop is alive, so that a start
//! command racing with a loop that is just exiting never ends up with zero
//! or two loops.

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct ToggleState {
    enabled: bool,
    loop_running: bool,
}

#[derive(Debug, Default)]
pub struct StreamToggle {
    state: Mutex<ToggleState>,
}

impl StreamToggle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Turn streaming on.
    ///
    /// Returns `true` when no loop is alive and the caller must start one;
    /// the loop is then considered running.
    pub fn enable(&self) -> bool {
        let mut state = self.state.lock();
        state.enabled = true;
        if state.loop_running {
            false
        } else {
            state.loop_running = true;
            true
        }
    }

    /// Turn streaming off. The running loop exits at its next check.
    pub fn disable(&self) {
        self.state.lock().enabled = false;
    }

    /// Per-iteration check made by the streaming loop.
    ///
    /// Returns `false` when the loop must exit; the loop is then already
    /// recorded as stopped.
    pub fn keep_streaming(&self) -> bool {
        let mut state = self.state.lock();
        if !state.enabled {
            state.loop_running = false;
        }
        state.enabled
    }

    /// Record that the loop ended for another reason (shutdown).
    pub fn loop_stopped(&self) {
        self.state.lock().loop_running = false;
    }

    pub fn is_loop_running(&self) -> bool {
        self.state.lock().loop_running
    }
}

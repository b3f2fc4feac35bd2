//! Per-input debounce state machine.
//!
//! `Idle --rising edge--> Suppressed --window elapsed--> Idle`
//!
//! A rising edge seen while idle is a press and opens the suppression
//! window. Any edge inside the window is ignored and does not extend it.
//! The machine is driven purely by edge timestamps, so it never sleeps and
//! concurrent inputs never wait on each other.

use std::time::Duration;
use tokio::time::Instant;

/// Default suppression window after a detected press.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Suppressed { until: Instant },
}

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    state: DebounceState,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// State as of `now`.
    pub fn state(&self, now: Instant) -> DebounceState {
        match self.state {
            DebounceState::Suppressed { until } if now >= until => DebounceState::Idle,
            state => state,
        }
    }

    /// Feed one raw edge. Returns `true` when it counts as a press.
    pub fn on_edge(&mut self, edge: Edge, at: Instant) -> bool {
        self.state = self.state(at);
        if let DebounceState::Suppressed { .. } = self.state {
            return false;
        }
        if edge != Edge::Rising {
            return false;
        }
        self.state = DebounceState::Suppressed {
            until: at + self.window,
        };
        true
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

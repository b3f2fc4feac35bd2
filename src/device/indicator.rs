//! Local physical feedback (the indicator light).
//!
//! Actuation is independent of the coordinator link: a press lights the
//! indicator whether or not the matching event could be delivered.

use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// How long a blink keeps the indicator lit.
pub const DEFAULT_PULSE: Duration = Duration::from_secs(1);

/// Output line driving a physical indicator.
///
/// Implementations must return promptly; `set` is called from async tasks.
pub trait Actuator: Send + Sync {
    fn set(&self, on: bool);
}

/// Actuator that records its state and logs transitions.
///
/// Stands in for the GPIO line on development hosts.
pub struct LogActuator {
    name: String,
    on: AtomicBool,
    activations: AtomicU32,
}

impl LogActuator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on: AtomicBool::new(false),
            activations: AtomicU32::new(0),
        }
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    /// Number of off → on transitions so far.
    pub fn activations(&self) -> u32 {
        self.activations.load(Ordering::SeqCst)
    }
}

impl Actuator for LogActuator {
    fn set(&self, on: bool) {
        let was_on = self.on.swap(on, Ordering::SeqCst);
        if on && !was_on {
            self.activations.fetch_add(1, Ordering::SeqCst);
        }
        if on != was_on {
            debug!("[LED] {} {}", self.name, if on { "on" } else { "off" });
        }
    }
}

/// Non-blocking blink controller on top of an [`Actuator`].
///
/// Overlapping blinks extend the lit period: only the most recent blink
/// turns the light off. After [`Indicator::force_off`] further blinks are
/// ignored.
pub struct Indicator {
    actuator: Arc<dyn Actuator>,
    pulse: Duration,
    generation: Arc<AtomicU64>,
    disabled: Arc<AtomicBool>,
}

impl Indicator {
    pub fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self::with_pulse(actuator, DEFAULT_PULSE)
    }

    pub fn with_pulse(actuator: Arc<dyn Actuator>, pulse: Duration) -> Self {
        Self {
            actuator,
            pulse,
            generation: Arc::new(AtomicU64::new(0)),
            disabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Light the indicator now and schedule it off after the pulse.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn blink(&self) {
        if self.disabled.load(Ordering::SeqCst) {
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.actuator.set(true);

        let actuator = self.actuator.clone();
        let current = self.generation.clone();
        let disabled = self.disabled.clone();
        let pulse = self.pulse;
        tokio::spawn(async move {
            tokio::time::sleep(pulse).await;
            if current.load(Ordering::SeqCst) == generation && !disabled.load(Ordering::SeqCst) {
                actuator.set(false);
            }
        });
    }

    /// Drive the actuator to its safe state and keep it there.
    pub fn force_off(&self) {
        self.disabled.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.actuator.set(false);
        info!("[LED] Indicator switched off");
    }
}

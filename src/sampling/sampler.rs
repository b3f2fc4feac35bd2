//! Periodic sampling of one sensor source.
//!
//! Both regimes run the same task: read, hand the sample to the sink, wait
//! the interval, repeat until the stop condition holds. Polling runs until
//! shutdown; streaming additionally stops as soon as the [`StreamToggle`] is
//! off. Read failures are logged and never end the schedule. Reads run on
//! the blocking pool.

use super::toggle::StreamToggle;
use crate::error::{GatewayError, Result};
use crate::sensors::{SensorSample, SensorSource};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_STREAM_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingRegime {
    /// Low-rate local diagnostics, always on once started.
    Polling { interval: Duration },
    /// High-rate forwarding gated by the stream toggle.
    Streaming { interval: Duration },
}

impl SamplingRegime {
    pub fn polling() -> Self {
        SamplingRegime::Polling {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn streaming() -> Self {
        SamplingRegime::Streaming {
            interval: DEFAULT_STREAM_INTERVAL,
        }
    }

    pub fn interval(&self) -> Duration {
        match self {
            SamplingRegime::Polling { interval } | SamplingRegime::Streaming { interval } => {
                *interval
            }
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, SamplingRegime::Streaming { .. })
    }
}

/// Receiver of samples produced by a [`Sampler`].
pub trait SampleSink: Send + Sync + 'static {
    /// Low-rate reading, for local diagnostics only.
    fn diagnostic(&self, sample: SensorSample);

    /// High-rate reading to forward outward.
    fn stream(&self, sample: SensorSample) -> Result<()>;
}

pub struct Sampler {
    source: Arc<Mutex<Box<dyn SensorSource>>>,
    regime: SamplingRegime,
    toggle: Arc<StreamToggle>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    reads: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl Sampler {
    pub fn new(
        source: Box<dyn SensorSource>,
        regime: SamplingRegime,
        toggle: Arc<StreamToggle>,
    ) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            regime,
            toggle,
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
            reads: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn regime(&self) -> SamplingRegime {
        self.regime
    }

    /// Successful reads so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Failed reads so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Spawn the sampling task.
    ///
    /// For the streaming regime the caller must have won
    /// [`StreamToggle::enable`] first.
    pub fn spawn(&self, sink: Arc<dyn SampleSink>) {
        if self.shutdown.is_cancelled() {
            if self.regime.is_streaming() {
                self.toggle.loop_stopped();
            }
            return;
        }

        let mut task = self.task.lock();
        if !self.regime.is_streaming() && task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("[Sampler] Polling loop already running");
            return;
        }

        let source = self.source.clone();
        let regime = self.regime;
        let toggle = self.toggle.clone();
        let shutdown = self.shutdown.clone();
        let reads = self.reads.clone();
        let failures = self.failures.clone();

        *task = Some(tokio::spawn(async move {
            run(source, regime, toggle, shutdown, sink, reads, failures).await;
        }));
    }

    /// Stop sampling and wait for the task to finish its iteration.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.toggle.disable();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

async fn run(
    source: Arc<Mutex<Box<dyn SensorSource>>>,
    regime: SamplingRegime,
    toggle: Arc<StreamToggle>,
    shutdown: CancellationToken,
    sink: Arc<dyn SampleSink>,
    reads: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
) {
    let interval = regime.interval();
    let name = source.lock().name().to_string();
    info!("[Sampler] {} sampling {} every {:?}", regime_label(regime), name, interval);

    loop {
        if shutdown.is_cancelled() {
            break;
        }
        if regime.is_streaming() && !toggle.keep_streaming() {
            info!("[Sampler] Stream of {} stopped", name);
            return;
        }

        let reading = read_blocking(&source).await;
        match reading {
            Ok(sample) => {
                reads.fetch_add(1, Ordering::Relaxed);
                if regime.is_streaming() {
                    if let Err(e) = sink.stream(sample) {
                        debug!("[Sampler] Sample from {} not delivered: {}", name, e);
                    }
                } else {
                    sink.diagnostic(sample);
                }
            }
            Err(e) => {
                failures.fetch_add(1, Ordering::Relaxed);
                warn!("[Sampler] Error reading {}: {}", name, e);
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    if regime.is_streaming() {
        toggle.loop_stopped();
    }
    info!("[Sampler] {} sampling of {} stopped", regime_label(regime), name);
}

/// One read on the blocking pool.
async fn read_blocking(source: &Arc<Mutex<Box<dyn SensorSource>>>) -> Result<SensorSample> {
    let source = source.clone();
    tokio::task::spawn_blocking(move || source.lock().read())
        .await
        .unwrap_or_else(|e| Err(GatewayError::SensorRead(format!("read task failed: {}", e))))
}

fn regime_label(regime: SamplingRegime) -> &'static str {
    if regime.is_streaming() {
        "Streaming"
    } else {
        "Polling"
    }
}

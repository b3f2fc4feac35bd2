//! Process context of one device node.
//!
//! `DeviceNode` builds every component from the [`Config`], owns the shared
//! [`StreamToggle`] and runs the shutdown sequence in a fixed order:
//! sampling, actuator, coordinator link, then the local HTTP server.

use crate::config::{Config, SamplingMode, SensorKind};
use crate::connection::{ConnectionManager, Connector};
use crate::device::{Actuator, Indicator};
use crate::error::{GatewayError, Result};
use crate::http::{self, HttpState};
use crate::input::simulation::run_input_simulation;
use crate::input::{DigitalInputWatcher, EdgeSender, InputSource};
use crate::router::EventRouter;
use crate::sampling::{Sampler, SamplingRegime, StreamToggle};
use crate::sensors::SensorSource;
use crate::sensors::motion::SimulatedMotionSensor;
use crate::sensors::strain_gauge::SimulatedStrainGauge;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Time allowed for one connect plus handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between simulated presses.
pub const SIMULATION_PERIOD: Duration = Duration::from_secs(5);

/// Simulated sensor for the configured kind.
pub fn simulated_sensor(kind: SensorKind) -> Option<Box<dyn SensorSource>> {
    match kind {
        SensorKind::None => None,
        SensorKind::Strain => Some(Box::new(SimulatedStrainGauge::new())),
        SensorKind::Motion => Some(Box::new(SimulatedMotionSensor::new())),
    }
}

pub struct DeviceNode {
    endpoint: String,
    asset_path: PathBuf,
    simulate_inputs: bool,
    manager: Arc<ConnectionManager>,
    router: Arc<EventRouter>,
    indicator: Arc<Indicator>,
    toggle: Arc<StreamToggle>,
    sampler: Option<Arc<Sampler>>,
    watchers: Mutex<Vec<DigitalInputWatcher>>,
    edges: Vec<EdgeSender>,
    input_shutdown: CancellationToken,
    http_shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    connection: Mutex<Option<JoinHandle<Result<()>>>>,
    http: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl DeviceNode {
    pub fn new(
        config: &Config,
        connector: Arc<dyn Connector>,
        actuator: Arc<dyn Actuator>,
        sensor: Option<Box<dyn SensorSource>>,
    ) -> Self {
        let identity = config.identity();
        let manager = Arc::new(ConnectionManager::new(
            connector,
            config.retry_policy(),
            HANDSHAKE_TIMEOUT,
        ));
        let indicator = Arc::new(Indicator::new(actuator));
        let toggle = Arc::new(StreamToggle::new());

        let sampler = sensor.map(|source| {
            let regime = match config.sampling {
                SamplingMode::Poll => SamplingRegime::polling(),
                SamplingMode::Stream => SamplingRegime::streaming(),
            };
            Arc::new(Sampler::new(source, regime, toggle.clone()))
        });

        let mut router = EventRouter::new(
            identity.clone(),
            manager.clone(),
            indicator.clone(),
            toggle.clone(),
        )
        .with_hit_actuation(config.actuate_on_hit())
        .with_test_shot(config.test_shot_delay());
        if let Some(sampler) = sampler.as_ref().filter(|s| s.regime().is_streaming()) {
            router = router.with_stream_sampler(sampler.clone());
        }
        let router = Arc::new(router);
        router.register(&manager);

        let mut watchers = Vec::new();
        let mut edges = Vec::new();
        if identity.role.has_hit_inputs() {
            for source in InputSource::iter() {
                let (watcher, sender) = DigitalInputWatcher::new(source, config.debounce_window());
                watchers.push(watcher);
                edges.push(sender);
            }
        }

        Self {
            endpoint: config.endpoint(),
            asset_path: config.http.asset_path.clone(),
            simulate_inputs: config.simulate_inputs,
            manager,
            router,
            indicator,
            toggle,
            sampler,
            watchers: Mutex::new(watchers),
            edges,
            input_shutdown: CancellationToken::new(),
            http_shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            connection: Mutex::new(None),
            http: Mutex::new(None),
        }
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn toggle(&self) -> &Arc<StreamToggle> {
        &self.toggle
    }

    /// Edge feeds for the input watchers, one per wired input.
    pub fn inputs(&self) -> &[EdgeSender] {
        &self.edges
    }

    /// Start inputs, polling and the coordinator link.
    pub fn start(&self) {
        info!(
            "[Node] Starting {} #{}",
            self.router.identity().role,
            self.router.identity().device_number
        );

        let mut tasks = self.tasks.lock();
        for watcher in self.watchers.lock().drain(..) {
            tasks.push(watcher.spawn(self.router.clone(), self.input_shutdown.clone()));
        }

        if self.simulate_inputs && !self.edges.is_empty() {
            info!("[Node] Simulating input presses every {:?}", SIMULATION_PERIOD);
            tasks.push(run_input_simulation(self.edges.clone(), SIMULATION_PERIOD));
        }

        if let Some(sampler) = self.sampler.as_ref().filter(|s| !s.regime().is_streaming()) {
            sampler.spawn(self.router.clone());
        }

        *self.connection.lock() = Some(self.manager.connect(self.endpoint.clone()));
    }

    /// Serve the local status endpoint on `listener` until shutdown.
    pub fn serve_http(&self, listener: TcpListener) {
        let state = HttpState::new(self.router.clone(), self.asset_path.clone());
        *self.http.lock() = Some(http::spawn(listener, state, self.http_shutdown.clone()));
    }

    /// Ordered shutdown. Safe to call once the node has started or not.
    pub async fn shutdown(&self) {
        info!("[Node] Shutting down");
        self.router.shutdown();

        if let Some(sampler) = &self.sampler {
            sampler.stop().await;
        }
        self.toggle.disable();

        self.indicator.force_off();

        self.manager.shutdown();
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            match connection.await {
                Ok(Ok(())) => {}
                Ok(Err(GatewayError::RetriesExhausted { attempts })) => {
                    warn!("[Node] Coordinator link was down after {} attempts", attempts)
                }
                Ok(Err(e)) => error!("[Node] Connection task failed: {}", e),
                Err(e) => error!("[Node] Connection task panicked: {}", e),
            }
        }

        self.input_shutdown.cancel();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }

        self.http_shutdown.cancel();
        let server = self.http.lock().take();
        if let Some(server) = server {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("[Node] HTTP server failed: {}", e),
                Err(e) => error!("[Node] HTTP task panicked: {}", e),
            }
        }

        info!("[Node] Stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::manager::ConnectionState;
    use crate::connection::memory::MemoryConnector;
    use crate::connection::{Emitter, InboundMessage, OutboundMessage};
    use crate::error::Result;
    use crate::input::Edge;
    use crate::sensors::SensorSample;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::OnceLock;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let mut map: HashMap<String, String> = [
            ("DEVICE_TYPE", "armor"),
            ("PI_DEVICE_NUMBER", "6"),
            ("SERVER", "coordinator.local"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        Config::from_lookup(move |key| map.get(key).cloned()).unwrap()
    }

    /// One actuator call with the stream loop and link state seen at that time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Switch {
        on: bool,
        loop_running: bool,
        link: Option<ConnectionState>,
    }

    #[derive(Default)]
    struct RecordingActuator {
        toggle: OnceLock<Arc<StreamToggle>>,
        manager: OnceLock<Arc<ConnectionManager>>,
        calls: parking_lot::Mutex<Vec<Switch>>,
    }

    impl RecordingActuator {
        fn observe(&self, node: &DeviceNode) {
            let _ = self.toggle.set(node.toggle().clone());
            let _ = self.manager.set(node.manager().clone());
        }
    }

    impl Actuator for RecordingActuator {
        fn set(&self, on: bool) {
            let loop_running = self
                .toggle
                .get()
                .map(|t| t.is_loop_running())
                .unwrap_or(false);
            let link = self.manager.get().map(|m| m.state());
            self.calls.lock().push(Switch {
                on,
                loop_running,
                link,
            });
        }
    }

    struct Ramp(f64);

    impl SensorSource for Ramp {
        fn name(&self) -> &str {
            "ramp"
        }

        fn read(&mut self) -> Result<SensorSample> {
            self.0 += 1.0;
            Ok(SensorSample::scalar(self.0))
        }
    }

    #[tokio::test]
    async fn test_sword_has_no_inputs() {
        let (connector, _remotes) = MemoryConnector::new();
        let node = DeviceNode::new(
            &config(&[("DEVICE_TYPE", "sword")]),
            connector,
            Arc::new(RecordingActuator::default()),
            None,
        );
        assert!(node.inputs().is_empty());

        let (connector, _remotes) = MemoryConnector::new();
        let node = DeviceNode::new(
            &config(&[]),
            connector,
            Arc::new(RecordingActuator::default()),
            None,
        );
        let sources: Vec<_> = node.inputs().iter().map(|e| e.source()).collect();
        assert_eq!(
            sources,
            vec![
                InputSource::Mask,
                InputSource::Chest,
                InputSource::Back,
                InputSource::Trigger
            ]
        );
    }

    #[tokio::test]
    async fn test_press_reaches_coordinator_after_announcement() {
        let (connector, mut remotes) = MemoryConnector::new();
        let node = DeviceNode::new(
            &config(&[]),
            connector,
            Arc::new(RecordingActuator::default()),
            None,
        );
        node.start();

        let mut remote = remotes.recv().await.unwrap();
        let first = remote.received.recv().await.unwrap();
        assert_eq!(first.topic, "initializeDevice");
        assert_eq!(first.payload["device_number"], json!("6"));

        let chest = node.inputs()[1].clone();
        chest.edge(Edge::Rising);
        chest.edge(Edge::Falling);
        chest.edge(Edge::Rising);

        let next = remote.received.recv().await.unwrap();
        assert_eq!(next, OutboundMessage::new("chest_hit", "6"));

        drop(remote);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_order() {
        let (connector, mut remotes) = MemoryConnector::new();
        let actuator = Arc::new(RecordingActuator::default());
        let node = DeviceNode::new(
            &config(&[("DEVICE_TYPE", "sword"), ("SAMPLING_MODE", "stream")]),
            connector,
            actuator.clone(),
            Some(Box::new(Ramp(0.0))),
        );
        actuator.observe(&node);
        node.start();

        let remote = remotes.recv().await.unwrap();
        let mut received = remote.received;
        remote
            .inject
            .send(InboundMessage {
                topic: "dataOn".into(),
                payload: Value::Null,
            })
            .await
            .unwrap();

        // Announcement, then samples.
        assert_eq!(received.recv().await.unwrap().topic, "initializeDevice");
        assert_eq!(received.recv().await.unwrap().topic, "deviceData");
        assert!(node.toggle().is_loop_running());

        // The coordinator side closes once the node lets go of the session.
        let inject = remote.inject;
        let closed = tokio::spawn(async move {
            while received.recv().await.is_some() {}
            drop(inject);
        });

        node.shutdown().await;
        closed.await.unwrap();

        // The actuator went off after the stream loop stopped and before the
        // link was closed.
        assert_eq!(
            actuator.calls.lock().as_slice(),
            &[Switch {
                on: false,
                loop_running: false,
                link: Some(ConnectionState::Connected),
            }]
        );
        assert_eq!(node.manager().state(), ConnectionState::Disconnected);
        assert!(!node.toggle().is_enabled());
        assert!(node.manager().send(OutboundMessage::new("hit", "6")).is_err());
    }

    #[tokio::test]
    async fn test_poll_mode_starts_without_coordinator_command() {
        let (connector, mut remotes) = MemoryConnector::new();
        let node = DeviceNode::new(
            &config(&[("DEVICE_TYPE", "sword")]),
            connector,
            Arc::new(RecordingActuator::default()),
            Some(Box::new(Ramp(0.0))),
        );
        node.start();
        let remote = remotes.recv().await.unwrap();

        // Diagnostics stay local: only the announcement goes out.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut received = remote.received;
        assert_eq!(received.recv().await.unwrap().topic, "initializeDevice");
        assert!(received.try_recv().is_err());

        drop(received);
        drop(remote.inject);
        node.shutdown().await;
    }
}

//! Event routing between local sources, the coordinator link and actuation.
//!
//! The router owns no I/O. Local events (HTTP hits, debounced presses,
//! sensor samples) and inbound coordinator messages come in; outward
//! messages leave through an [`Emitter`] and physical feedback through the
//! [`Indicator`]. All entry points take `&self` and may be called from any
//! task at the same time.
//!
//! | Input | Outward | Local |
//! |-------|---------|-------|
//! | `GET /` | `shooting` (gun) or `hit` | |
//! | mask / chest / back / trigger press | `mask_hit` / `chest_hit` / `back_hit` / `shooting` | blink |
//! | inbound `hit` | `serverEvent` ack | blink when actuation is enabled |
//! | inbound `dataOn` / `dataOff` | `deviceData` stream on / off | |

use crate::connection::manager::{ConnectionManager, Emitter};
use crate::connection::protocol::OutboundMessage;
use crate::device::{DeviceIdentity, DeviceRole, Indicator};
use crate::error::Result;
use crate::input::{InputEvent, InputSink, InputSource};
use crate::sampling::{SampleSink, Sampler, StreamToggle};
use crate::sensors::SensorSample;
use log::{debug, info};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod topics {
    pub const INITIALIZE_DEVICE: &str = "initializeDevice";
    pub const SHOOTING: &str = "shooting";
    pub const HIT: &str = "hit";
    pub const MASK_HIT: &str = "mask_hit";
    pub const CHEST_HIT: &str = "chest_hit";
    pub const BACK_HIT: &str = "back_hit";
    pub const SERVER_EVENT: &str = "serverEvent";
    pub const DEVICE_DATA: &str = "deviceData";
    pub const DATA_ON: &str = "dataOn";
    pub const DATA_OFF: &str = "dataOff";
}

/// Events raised on the node itself.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    /// A request reached the local status endpoint.
    HttpRequest,
    Input(InputEvent),
    /// Low-rate reading, logged only.
    Diagnostic(SensorSample),
    /// High-rate reading for the coordinator.
    StreamSample(SensorSample),
}

pub struct EventRouter {
    identity: DeviceIdentity,
    emitter: Arc<dyn Emitter>,
    indicator: Arc<Indicator>,
    toggle: Arc<StreamToggle>,
    stream: Option<Arc<Sampler>>,
    actuate_on_hit: bool,
    test_shot_delay: Option<Duration>,
    shutdown: CancellationToken,
    pending_shot: Mutex<Option<CancellationToken>>,
}

impl EventRouter {
    pub fn new(
        identity: DeviceIdentity,
        emitter: Arc<dyn Emitter>,
        indicator: Arc<Indicator>,
        toggle: Arc<StreamToggle>,
    ) -> Self {
        Self {
            identity,
            emitter,
            indicator,
            toggle,
            stream: None,
            actuate_on_hit: false,
            test_shot_delay: None,
            shutdown: CancellationToken::new(),
            pending_shot: Mutex::new(None),
        }
    }

    /// Sampler started by `dataOn`.
    pub fn with_stream_sampler(mut self, sampler: Arc<Sampler>) -> Self {
        self.stream = Some(sampler);
        self
    }

    /// Blink on inbound `hit` messages.
    pub fn with_hit_actuation(mut self, enabled: bool) -> Self {
        self.actuate_on_hit = enabled;
        self
    }

    /// Fire a test `shooting` event this long after every connect.
    pub fn with_test_shot(mut self, delay: Option<Duration>) -> Self {
        self.test_shot_delay = delay;
        self
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// The `initializeDevice` message for this node.
    pub fn announcement(&self) -> OutboundMessage {
        OutboundMessage::new(
            topics::INITIALIZE_DEVICE,
            self.identity.announcement_payload(),
        )
    }

    /// Wire inbound topics and the connect hook into `manager`.
    ///
    /// Handlers hold the router weakly so the manager does not keep it alive.
    pub fn register(self: &Arc<Self>, manager: &ConnectionManager) {
        for topic in [topics::HIT, topics::DATA_ON, topics::DATA_OFF] {
            let router = Arc::downgrade(self);
            manager.on_message(topic, move |payload| {
                if let Some(router) = router.upgrade() {
                    router.handle_inbound_message(topic, payload);
                }
            });
        }

        let router: Weak<Self> = Arc::downgrade(self);
        manager.on_connected(move || {
            router
                .upgrade()
                .map(|router| router.on_connected())
                .unwrap_or_default()
        });
    }

    /// Called on every transition into `Connected`; returns the messages
    /// that must open the session.
    pub fn on_connected(self: &Arc<Self>) -> Vec<OutboundMessage> {
        info!(
            "[Router] Announcing {} #{}",
            self.identity.role, self.identity.device_number
        );

        if let Some(delay) = self.test_shot_delay {
            // A reconnect supersedes the shot scheduled by the previous connect.
            let cancel = self.shutdown.child_token();
            if let Some(previous) = self.pending_shot.lock().replace(cancel.clone()) {
                previous.cancel();
            }
            let router = self.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        info!("[Router] Firing test shot");
                        let _ = router.emit(topics::SHOOTING, router.device_number());
                    }
                }
            });
        }

        vec![self.announcement()]
    }

    /// Cancel scheduled work. Events routed afterwards are still handled.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn handle_local_event(&self, event: LocalEvent) -> Result<()> {
        match event {
            LocalEvent::HttpRequest => {
                let topic = match self.identity.role {
                    DeviceRole::Gun => topics::SHOOTING,
                    _ => topics::HIT,
                };
                self.emit(topic, self.device_number())
            }
            LocalEvent::Input(event) => {
                info!("[Router] {} pressed", event.source);
                // Feedback first: it must not depend on delivery.
                self.indicator.blink();
                self.emit(input_topic(event.source), self.device_number())
            }
            LocalEvent::Diagnostic(sample) => {
                info!("[Router] Sensor data: {}", sample);
                Ok(())
            }
            LocalEvent::StreamSample(sample) => {
                self.emit(topics::DEVICE_DATA, sample.to_payload())
            }
        }
    }

    pub fn handle_inbound_message(self: &Arc<Self>, topic: &str, payload: Value) {
        match topic {
            topics::HIT => {
                let data = describe(&payload);
                info!("[Router] Message from the server: {}", data);
                if self.actuate_on_hit {
                    self.indicator.blink();
                }
                let _ = self.emit(
                    topics::SERVER_EVENT,
                    format!("thanks server! for sending '{}'", data),
                );
            }
            topics::DATA_ON => {
                if !self.toggle.enable() {
                    debug!("[Router] Stream already running");
                    return;
                }
                match &self.stream {
                    Some(sampler) => {
                        info!("[Router] Starting sensor stream");
                        sampler.spawn(self.clone());
                    }
                    None => {
                        self.toggle.loop_stopped();
                        info!("[Router] dataOn ignored: no streaming sensor configured");
                    }
                }
            }
            topics::DATA_OFF => {
                info!("[Router] Stopping sensor stream");
                self.toggle.disable();
            }
            other => debug!("[Router] Ignoring inbound '{}'", other),
        }
    }

    fn device_number(&self) -> String {
        self.identity.device_number.clone()
    }

    fn emit(&self, topic: &str, payload: impl Into<Value>) -> Result<()> {
        let result = self.emitter.send(OutboundMessage::new(topic, payload));
        if let Err(e) = &result {
            debug!("[Router] '{}' not delivered: {}", topic, e);
        }
        result
    }
}

impl InputSink for EventRouter {
    fn on_input(&self, event: InputEvent) {
        let _ = self.handle_local_event(LocalEvent::Input(event));
    }
}

impl SampleSink for EventRouter {
    fn diagnostic(&self, sample: SensorSample) {
        let _ = self.handle_local_event(LocalEvent::Diagnostic(sample));
    }

    fn stream(&self, sample: SensorSample) -> Result<()> {
        self.handle_local_event(LocalEvent::StreamSample(sample))
    }
}

fn input_topic(source: InputSource) -> &'static str {
    match source {
        InputSource::Mask => topics::MASK_HIT,
        InputSource::Chest => topics::CHEST_HIT,
        InputSource::Back => topics::BACK_HIT,
        InputSource::Trigger => topics::SHOOTING,
    }
}

/// Text form of an inbound payload for acknowledgements.
fn describe(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

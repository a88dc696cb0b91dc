//! The UI-side façade over every device in the room.
//!
//! Commands issued through the hub are applied to the local simulation first
//! and then published, so the room keeps reacting while the bus is down.
//! Inbound traffic goes through [`DeviceHub::handle_inbound`].

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use serde_json::Value;

use crate::{
    assets::{ModelCache, ModelLoader},
    config::{
        schema::{stool_schema, wallflower_schema},
        DiscoKnobSchema, FlipDiscSchema, PartialAudioConfig,
    },
    disco::{DiscoKnobManager, DiscoMessage},
    flipdisc::{CameraFrame, DrawingRequest, FlipDiscManager, PatternRequest, DEFAULT_COLS, DEFAULT_ROWS},
    neon::{ManualMessage, NeonManager, ProfileRequest},
    persistence::{DiscoKnobConfig, PortfolioDocument},
    transport::{Device, InboundCommand, Publisher, Topic},
    Result,
};

pub const WALLFLOWER_CONTROLLERS: usize = 3;
pub const STOOL_CONTROLLERS: usize = 1;
pub const SUPPLIES_PER_CONTROLLER: usize = 2;

pub struct DeviceHub<P: Publisher> {
    client_id: String,
    publisher: P,
    wallflower: NeonManager,
    stool: NeonManager,
    flip: FlipDiscManager,
    disco: DiscoKnobManager,
    lights_on: bool,
}

impl<P: Publisher> DeviceHub<P> {
    pub fn new(publisher: P) -> Self {
        Self::with_rng(publisher, StdRng::from_entropy())
    }

    /// Builds the room with every random source derived from `rng`.
    pub fn with_rng(publisher: P, mut rng: StdRng) -> Self {
        let client_id = format!("neon-room-{:08x}", rng.gen::<u32>());
        let wallflower = NeonManager::with_rng(
            "wallflower",
            wallflower_schema(),
            WALLFLOWER_CONTROLLERS,
            SUPPLIES_PER_CONTROLLER,
            StdRng::seed_from_u64(rng.gen()),
        );
        let stool = NeonManager::with_rng(
            "stool",
            stool_schema(),
            STOOL_CONTROLLERS,
            SUPPLIES_PER_CONTROLLER,
            StdRng::seed_from_u64(rng.gen()),
        );
        let flip = FlipDiscManager::with_rng(
            FlipDiscSchema::default(),
            DEFAULT_ROWS,
            DEFAULT_COLS,
            StdRng::seed_from_u64(rng.gen()),
        );

        Self {
            client_id,
            publisher,
            wallflower,
            stool,
            flip,
            disco: DiscoKnobManager::new(DiscoKnobSchema::default()),
            lights_on: true,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }

    pub fn wallflower(&self) -> &NeonManager {
        &self.wallflower
    }

    pub fn stool(&self) -> &NeonManager {
        &self.stool
    }

    pub fn flip(&self) -> &FlipDiscManager {
        &self.flip
    }

    pub fn flip_mut(&mut self) -> &mut FlipDiscManager {
        &mut self.flip
    }

    pub fn disco(&self) -> &DiscoKnobManager {
        &self.disco
    }

    pub fn lights_on(&self) -> bool {
        self.lights_on
    }

    pub fn set_lights_on(&mut self, on: bool) {
        self.lights_on = on;
    }

    /// The neon installation behind `device`, if it is one.
    pub fn neon(&self, device: Device) -> Option<&NeonManager> {
        match device {
            Device::Wallflower => Some(&self.wallflower),
            Device::Stool => Some(&self.stool),
            Device::Flip | Device::Smartknob => None,
        }
    }

    pub fn neon_mut(&mut self, device: Device) -> Option<&mut NeonManager> {
        match device {
            Device::Wallflower => Some(&mut self.wallflower),
            Device::Stool => Some(&mut self.stool),
            Device::Flip | Device::Smartknob => None,
        }
    }

    /// Loads every device's models through one shared cache. Devices that
    /// fail stay usable without visuals.
    pub fn load_models(&mut self, loader: &mut dyn ModelLoader, cache: &mut ModelCache) -> bool {
        let wallflower = self.wallflower.load_models(loader, cache);
        let stool = self.stool.load_models(loader, cache);
        let flip = self.flip.load_models(loader, cache);
        let disco = self.disco.load_models(loader, cache);
        tracing::info!(wallflower, stool, flip, disco, cached = cache.len(), "room models loaded");
        wallflower && stool && flip && disco
    }

    /// Publishes `payload` on `topic`, stamping object payloads with the
    /// client id. Returns whether the bus accepted the message.
    pub fn publish(&mut self, topic: &Topic, mut payload: Value) -> bool {
        if let Value::Object(map) = &mut payload {
            map.insert("clientId".into(), Value::String(self.client_id.clone()));
        }
        let topic = topic.to_string();
        let sent = self.publisher.publish(&topic, &payload);
        if !sent {
            tracing::warn!(%topic, "publish failed, local state updated only");
        }
        sent
    }

    fn publish_serialized<T: Serialize>(&mut self, topic: &Topic, value: &T) -> bool {
        match serde_json::to_value(value) {
            Ok(payload) => self.publish(topic, payload),
            Err(error) => {
                tracing::warn!(%topic, %error, "failed to encode outbound payload");
                false
            }
        }
    }

    pub fn send_manual(&mut self, device: Device, index: usize, message: &ManualMessage) -> bool {
        let Some(manager) = self.neon_mut(device) else {
            return false;
        };
        manager.handle_manual_request(message, index);
        self.publish_serialized(&Topic::Manual { device, index }, message)
    }

    pub fn send_profile(&mut self, device: Device, request: &ProfileRequest) -> bool {
        let Some(manager) = self.neon_mut(device) else {
            return false;
        };
        manager.handle_profile_request(request, false);
        self.publish(&Topic::Profile(device), request.to_value())
    }

    pub fn send_audio_config(&mut self, device: Device, config: &PartialAudioConfig) -> bool {
        let Some(manager) = self.neon_mut(device) else {
            return false;
        };
        manager.handle_audio_config_request(config);
        self.publish_serialized(&Topic::AudioConfig(device), config)
    }

    /// Grids that do not match the display are rejected without publishing.
    pub fn send_drawing(&mut self, request: &DrawingRequest) -> bool {
        if !self.flip.set_drawing_grid(request) {
            return false;
        }
        self.publish_serialized(&Topic::FlipDraw, request)
    }

    pub fn send_pattern(&mut self, request: &PatternRequest) -> bool {
        self.flip.set_pattern(request);
        self.publish_serialized(&Topic::FlipPattern, request)
    }

    pub fn send_disco(&mut self, message: &DiscoMessage) -> bool {
        self.disco.set_disco_data(message);
        self.publish_serialized(&Topic::Disco, message)
    }

    /// Camera frames only feed the local display.
    pub fn set_camera_data(&mut self, frame: CameraFrame) {
        self.flip.set_camera_data(frame);
    }

    /// Parses and applies a message received on `topic`.
    pub fn handle_inbound(&mut self, topic: &str, payload: &Value) -> Result<()> {
        let command = InboundCommand::parse(topic, payload)?;
        tracing::debug!(topic, "inbound message");
        self.dispatch(command);
        Ok(())
    }

    pub fn dispatch(&mut self, command: InboundCommand) {
        match command {
            InboundCommand::Manual { device, index, message } => {
                if let Some(manager) = self.neon_mut(device) {
                    manager.handle_manual_request(&message, index);
                }
            }
            InboundCommand::Profile { device, request } => {
                if let Some(manager) = self.neon_mut(device) {
                    manager.handle_profile_request(&request, false);
                }
            }
            InboundCommand::AudioConfig { device, config } => {
                if let Some(manager) = self.neon_mut(device) {
                    manager.handle_audio_config_request(&config);
                }
            }
            InboundCommand::Draw(request) => {
                self.flip.set_drawing_grid(&request);
            }
            InboundCommand::Pattern(request) => self.flip.set_pattern(&request),
            InboundCommand::Camera(frame) => self.flip.set_camera_data(frame),
            InboundCommand::Disco(message) => self.disco.set_disco_data(&message),
            InboundCommand::Ignored(topic) => tracing::debug!(%topic, "left to the UI layer"),
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.wallflower.update(dt);
        self.stool.update(dt);
        self.flip.update(dt);
        self.disco.update(dt);
    }

    /// Restores every section present in `document`.
    pub fn load_document(&mut self, document: &PortfolioDocument) {
        if let Some(client_id) = &document.client_id {
            self.client_id = client_id.clone();
        }
        if let Some(saved) = &document.wallflower {
            self.wallflower.apply_saved_state(saved);
        }
        if let Some(saved) = &document.stool {
            self.stool.apply_saved_state(saved);
        }
        if let Some(saved) = &document.flip_disc {
            self.flip.apply_config(saved);
        }
        if let Some(saved) = &document.disco_knob {
            self.disco.set_disco_data(&DiscoMessage {
                rotation: saved.rotation.clone(),
                spotlights: saved.spotlights.clone(),
            });
        }
        if let Some(lights_on) = document.lights_on {
            self.lights_on = lights_on;
        }
        tracing::info!(client_id = %self.client_id, "saved room state applied");
    }

    /// Current room state as a document, without a session id.
    pub fn snapshot(&self) -> PortfolioDocument {
        PortfolioDocument {
            session_id: None,
            client_id: Some(self.client_id.clone()),
            stool: Some(self.stool.to_installation_config()),
            wallflower: Some(self.wallflower.to_installation_config()),
            flip_disc: Some(self.flip.to_config()),
            disco_knob: Some(DiscoKnobConfig {
                rotation: Some(self.disco.rotation().clone()),
                spotlights: Some(self.disco.spotlights().clone()),
            }),
            lights_on: Some(self.lights_on),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        flipdisc::{DisplayMode, PatternKind},
        neon::{Authority, DirectControl},
        transport::MemoryBus,
    };
    use serde_json::json;

    fn hub(bus: MemoryBus) -> DeviceHub<MemoryBus> {
        DeviceHub::with_rng(bus, StdRng::seed_from_u64(7)).with_client_id("test-client")
    }

    #[test]
    fn builds_the_room() {
        let hub = hub(MemoryBus::new());
        assert_eq!(hub.wallflower().controllers().len(), 3);
        assert_eq!(hub.stool().controllers().len(), 1);
        assert_eq!(hub.flip().state().len(), DEFAULT_ROWS * DEFAULT_COLS);
        assert!(hub.neon(Device::Flip).is_none());
        assert!(hub.lights_on());
    }

    #[test]
    fn stamps_object_payloads_only() {
        let mut hub = hub(MemoryBus::new());
        assert!(hub.publish(&Topic::FlipPattern, json!({"id": 2})));
        assert!(hub.publish(&Topic::FlipDraw, json!([[1, 0]])));

        let messages = hub.publisher().messages();
        assert_eq!(messages[0].topic, "flip/pattern");
        assert_eq!(messages[0].payload["clientId"], "test-client");
        assert_eq!(messages[1].payload, json!([[1, 0]]));
    }

    #[test]
    fn disconnected_bus_still_updates_locally() {
        let mut hub = hub(MemoryBus::disconnected());
        let sent = hub.send_pattern(&PatternRequest::new(PatternKind::Wave, 1.0));
        assert!(!sent);
        assert_eq!(hub.flip().mode(), DisplayMode::Pattern);
        assert!(hub.publisher().messages().is_empty());

        let manual = ManualMessage {
            motor_enable: true,
            motor_speed: 0.5,
            ..ManualMessage::default()
        };
        assert!(!hub.send_manual(Device::Stool, 0, &manual));
        assert_eq!(hub.stool().authority(), Authority::Direct(DirectControl::Manual));
    }

    #[test]
    fn sends_publish_on_device_topics() {
        let mut hub = hub(MemoryBus::new());
        assert!(hub.send_profile(Device::Wallflower, &ProfileRequest::Stop));
        assert!(!hub.send_manual(Device::Smartknob, 0, &ManualMessage::default()));
        assert!(!hub.send_drawing(&DrawingRequest {
            grid: vec![vec![1]],
            invert: false,
        }));

        let messages = hub.publisher_mut().take_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "wallflower/profile");
        assert_eq!(messages[0].payload["stopProfile"], true);
        assert_eq!(messages[0].payload["clientId"], "test-client");
    }

    #[test]
    fn routes_inbound_messages() {
        let mut hub = hub(MemoryBus::new());
        hub.handle_inbound("wallflower/manual/1", &json!({"motorEnable": true, "motorSpeed": 0.3}))
            .unwrap();
        assert_eq!(hub.wallflower().authority(), Authority::Direct(DirectControl::Manual));
        assert_eq!(hub.stool().authority(), Authority::Idle);

        hub.handle_inbound("smartknob/disco", &json!({"rotation": {"speed": 1.0}}))
            .unwrap();
        assert_eq!(hub.disco().rotation().speed, 1.0);

        hub.handle_inbound("flip/pattern", &json!({"id": 7})).unwrap();
        assert_eq!(hub.flip().pattern().map(PatternRequest::kind), Some(Some(PatternKind::Square)));

        hub.handle_inbound("stool/lock/request", &json!({})).unwrap();
        assert!(hub.handle_inbound("lamp/manual/0", &json!({})).is_err());
    }

    #[test]
    fn update_ticks_every_device() {
        let mut hub = hub(MemoryBus::new());
        hub.update(1.0);
        assert!(hub.disco().angle() > 0.0);
        assert!(hub.wallflower().clock() > 0.0);
        assert!(hub.stool().clock() > 0.0);
    }

    #[test]
    fn document_round_trip() {
        let mut source = hub(MemoryBus::new());
        source.send_pattern(&PatternRequest::new(PatternKind::Spiral, 2.0));
        source.send_disco(&DiscoMessage {
            rotation: None,
            spotlights: Some(crate::disco::Spotlights {
                color: "#00ff00".into(),
                ..Default::default()
            }),
        });
        source.set_lights_on(false);
        let document = source.snapshot();
        assert_eq!(document.client_id.as_deref(), Some("test-client"));
        assert_eq!(document.wallflower.as_ref().map(|saved| saved.controllers.len()), Some(3));

        let mut restored = DeviceHub::with_rng(MemoryBus::new(), StdRng::seed_from_u64(8));
        restored.load_document(&document);
        assert_eq!(restored.client_id(), "test-client");
        assert!(!restored.lights_on());
        assert_eq!(restored.flip().mode(), DisplayMode::Pattern);
        assert_eq!(restored.disco().spotlights().color, "#00ff00");
        assert!(restored.publisher().messages().is_empty());
    }
}

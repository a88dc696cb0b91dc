//! Disco knob: a mirror ball turning on its mount, and the spotlight
//! settings handed on to whatever drives the room lights.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::{
    assets::{load_part, ModelCache, ModelLoader, SceneNode},
    config::{lenient, DiscoKnobSchema, PartSchema},
    render::{MaterialState, Rgb},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoRotation {
    pub enabled: bool,
    /// Half-turns per second.
    pub speed: f32,
    /// Positive rotation when true.
    pub direction: bool,
}

impl Default for DiscoRotation {
    fn default() -> Self {
        Self {
            enabled: true,
            speed: 0.1,
            direction: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum SpotlightMode {
    #[default]
    Off,
    Static,
    Breathe,
    Gradual,
    Jump,
}

impl From<u8> for SpotlightMode {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::Static,
            2 => Self::Breathe,
            3 => Self::Gradual,
            4 => Self::Jump,
            _ => Self::Off,
        }
    }
}

impl From<SpotlightMode> for u8 {
    fn from(mode: SpotlightMode) -> Self {
        mode as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spotlights {
    pub enabled: bool,
    pub color: String,
    pub mode: SpotlightMode,
    pub mode_speed: f32,
}

impl Default for Spotlights {
    fn default() -> Self {
        Self {
            enabled: true,
            color: "#ffffff".into(),
            mode: SpotlightMode::Off,
            mode_speed: 0.5,
        }
    }
}

impl Spotlights {
    pub fn rgb(&self) -> Rgb {
        Rgb::from_hex(&self.color).unwrap_or(Rgb::WHITE)
    }
}

/// Payload of `smartknob/disco`. Sections that are missing or malformed
/// leave the current setting alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoMessage {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub rotation: Option<DiscoRotation>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub spotlights: Option<Spotlights>,
}

#[derive(Debug)]
pub struct DiscoKnobManager {
    schema: DiscoKnobSchema,
    rotation: DiscoRotation,
    spotlights: Spotlights,
    angle: f32,
    knob: Option<SceneNode>,
    mount: Option<SceneNode>,
    materials: Vec<MaterialState>,
}

impl DiscoKnobManager {
    pub fn new(schema: DiscoKnobSchema) -> Self {
        Self {
            schema,
            rotation: DiscoRotation::default(),
            spotlights: Spotlights::default(),
            angle: 0.0,
            knob: None,
            mount: None,
            materials: Vec::new(),
        }
    }

    pub fn rotation(&self) -> &DiscoRotation {
        &self.rotation
    }

    pub fn spotlights(&self) -> &Spotlights {
        &self.spotlights
    }

    /// Accumulated Y rotation of the knob in radians.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn knob(&self) -> Option<&SceneNode> {
        self.knob.as_ref()
    }

    pub fn mount(&self) -> Option<&SceneNode> {
        self.mount.as_ref()
    }

    pub fn materials(&self) -> &[MaterialState] {
        &self.materials
    }

    /// Loads the knob, then the mount. Returns `false` if either fails.
    pub fn load_models(&mut self, loader: &mut dyn ModelLoader, cache: &mut ModelCache) -> bool {
        let mut materials = Vec::new();
        let mut load = |part: &PartSchema| match load_part(part, loader, cache) {
            Ok((node, bound)) => {
                materials.extend(bound);
                Some(node)
            }
            Err(error) => {
                tracing::warn!(%error, "failed to load disco knob model");
                None
            }
        };
        let knob = load(&self.schema.knob);
        let mount = load(&self.schema.mount);
        let loaded = knob.is_some() && mount.is_some();
        if loaded {
            tracing::info!("disco knob models loaded");
        }
        self.knob = knob;
        self.mount = mount;
        self.materials = materials;
        loaded
    }

    pub fn set_disco_data(&mut self, message: &DiscoMessage) {
        if let Some(rotation) = &message.rotation {
            self.rotation = rotation.clone();
        }
        if let Some(spotlights) = &message.spotlights {
            self.spotlights = spotlights.clone();
        }
        tracing::debug!(
            rotating = self.rotation.enabled,
            speed = self.rotation.speed,
            spotlight_mode = ?self.spotlights.mode,
            "disco settings applied"
        );
    }

    pub fn update(&mut self, dt: f32) {
        if !self.rotation.enabled {
            return;
        }
        let direction = if self.rotation.direction { 1.0 } else { -1.0 };
        self.angle += dt * PI * self.rotation.speed * direction;
        if let Some(knob) = &mut self.knob {
            knob.rotation.y = self.angle;
        }
    }

    pub fn to_message(&self) -> DiscoMessage {
        DiscoMessage {
            rotation: Some(self.rotation.clone()),
            spotlights: Some(self.spotlights.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::StaticLoader;

    fn loader() -> StaticLoader {
        StaticLoader::new()
            .with_materials("/models/discoknob_ball.glb", &["Mirror"])
            .with_materials("/models/discoknob_mount.glb", &["Mount"])
    }

    #[test]
    fn rotates_half_turns_per_second() {
        let mut manager = DiscoKnobManager::new(DiscoKnobSchema::default());
        let mut loader = loader();
        assert!(manager.load_models(&mut loader, &mut ModelCache::new()));

        manager.update(1.0);
        assert!((manager.angle() - PI * 0.1).abs() < 1e-6);
        assert_eq!(manager.knob().unwrap().rotation.y, manager.angle());
    }

    #[test]
    fn direction_and_enable_apply() {
        let mut manager = DiscoKnobManager::new(DiscoKnobSchema::default());
        let message: DiscoMessage = serde_json::from_value(serde_json::json!({
            "rotation": {"enabled": true, "speed": 1.0, "direction": false}
        }))
        .unwrap();
        manager.set_disco_data(&message);
        manager.update(0.5);
        assert!((manager.angle() + PI * 0.5).abs() < 1e-6);

        manager.set_disco_data(&DiscoMessage {
            rotation: Some(DiscoRotation {
                enabled: false,
                ..DiscoRotation::default()
            }),
            spotlights: None,
        });
        let before = manager.angle();
        manager.update(1.0);
        assert_eq!(manager.angle(), before);
    }

    #[test]
    fn spotlight_payload_is_lenient() {
        let message: DiscoMessage = serde_json::from_value(serde_json::json!({
            "spotlights": {"color": "#ff0000", "mode": 2, "mode_speed": 0.9},
            "rotation": "spin"
        }))
        .unwrap();
        assert!(message.rotation.is_none());
        let spotlights = message.spotlights.unwrap();
        assert!(spotlights.enabled);
        assert_eq!(spotlights.mode, SpotlightMode::Breathe);
        assert_eq!(spotlights.rgb(), Rgb::new(1.0, 0.0, 0.0));
        assert_eq!(SpotlightMode::from(9), SpotlightMode::Off);
    }

    #[test]
    fn missing_mount_fails_loading() {
        let mut manager = DiscoKnobManager::new(DiscoKnobSchema::default());
        let mut loader = StaticLoader::new().with_materials("/models/discoknob_ball.glb", &["Mirror"]);
        assert!(!manager.load_models(&mut loader, &mut ModelCache::new()));
        assert!(manager.knob().is_some());
        assert!(manager.mount().is_none());
    }
}

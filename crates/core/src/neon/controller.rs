use std::collections::HashMap;
use std::f32::consts::PI;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::{
    assets::{ModelCache, ModelLoader, SceneNode},
    config::{Band, ControllerSchema, MaterialBinding},
    neon::{
        messages::{AudioMessage, ManualMessage, ProfileMessage, SupplyState},
        AUDIO_REACTIVITY_TIMEOUT, DISTANCE_OVERRIDE_THRESHOLD, TRANSITION_DURATION,
    },
    profile::{Profile, ProfileExecutor, ProfileValues},
    render::{MaterialState, Rgb},
};

/// Slack on the audio timeout for frame times that do not sum to it exactly.
const AUDIO_TIMEOUT_TOLERANCE: f64 = 1e-4;

/// Source that decided supply and motor values on a tick, highest priority
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlSource {
    Manual,
    Audio,
    Profile,
    Passive,
}

/// One independently dimmable output channel.
#[derive(Debug, Clone)]
pub struct Supply {
    pub id: usize,
    pub kind: String,
    pub can_rotate: bool,
    pub enabled: bool,
    pub brightness: f32,
    pub audio_active: bool,
    pub target_magnitude: f32,
    /// Accumulated spin around the model's own axis, in radians.
    pub rotation: f32,
    pub model: Option<SceneNode>,
    pub materials: Vec<MaterialState>,
    bindings: Vec<MaterialBinding>,
}

impl Supply {
    fn new(id: usize, kind: String, can_rotate: bool, bindings: Vec<MaterialBinding>) -> Self {
        Self {
            id,
            kind,
            can_rotate,
            enabled: false,
            brightness: 0.0,
            audio_active: false,
            target_magnitude: 0.0,
            rotation: 0.0,
            model: None,
            materials: Vec::new(),
            bindings,
        }
    }

    pub fn state(&self) -> SupplyState {
        SupplyState::new(self.enabled, self.brightness)
    }
}

/// Supply and motor values captured or requested as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub supplies: Vec<SupplyState>,
    pub motor_enabled: bool,
    pub motor_direction: bool,
    pub motor_speed: f32,
}

/// Progress of the proximity override.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverridePhase {
    Inactive,
    /// Blending towards the proximity level.
    Engaging { timer: f32 },
    /// Blending back towards the snapshot taken on entry.
    Releasing { timer: f32 },
}

#[derive(Debug, Clone, Default)]
struct OverrideBlend {
    /// Values to restore once the release completes.
    snapshot: DeviceState,
    /// Displayed brightness per supply and speed when the current phase began.
    from_brightness: Vec<f32>,
    from_speed: f32,
    /// Brightness and speed the engaged override aims for.
    level: f32,
}

/// Brightness and speed in place before a profile took over.
#[derive(Debug, Clone)]
struct ProfileBaseline {
    brightness: Vec<f32>,
    speed: f32,
}

/// Simulation and arbitration state of one physical controller.
#[derive(Debug)]
pub struct NeonController {
    index: usize,
    schema: ControllerSchema,
    supplies: Vec<Supply>,
    motor_enabled: bool,
    direction: bool,
    current_speed: f32,
    target_speed: f32,
    distance: f32,
    manual: DeviceState,
    manual_pending: bool,
    /// Seconds since the last audio message, while audio mode lasts.
    audio_timer: Option<f64>,
    profile: ProfileExecutor,
    profile_drives_motor: bool,
    profile_baseline: Option<ProfileBaseline>,
    override_phase: OverridePhase,
    blend: OverrideBlend,
    last_source: Option<ControlSource>,
}

impl NeonController {
    pub fn new(index: usize, schema: ControllerSchema) -> Self {
        Self::with_executor(index, schema, ProfileExecutor::new())
    }

    pub fn with_rng(index: usize, schema: ControllerSchema, rng: StdRng) -> Self {
        Self::with_executor(index, schema, ProfileExecutor::with_rng(rng))
    }

    fn with_executor(index: usize, schema: ControllerSchema, profile: ProfileExecutor) -> Self {
        let supplies: Vec<Supply> = schema
            .supplies
            .iter()
            .map(|supply| {
                Supply::new(
                    supply.id,
                    supply.kind.clone(),
                    supply.can_rotate,
                    supply.materials.clone(),
                )
            })
            .collect();
        let count = supplies.len();

        Self {
            index,
            schema,
            supplies,
            motor_enabled: true,
            direction: true,
            current_speed: 0.0,
            target_speed: 0.0,
            distance: 0.0,
            manual: DeviceState {
                supplies: vec![SupplyState::default(); count],
                ..DeviceState::default()
            },
            manual_pending: false,
            audio_timer: None,
            profile,
            profile_drives_motor: true,
            profile_baseline: None,
            override_phase: OverridePhase::Inactive,
            blend: OverrideBlend::default(),
            last_source: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn supplies(&self) -> &[Supply] {
        &self.supplies
    }

    pub fn supply(&self, index: usize) -> Option<&Supply> {
        self.supplies.get(index)
    }

    pub fn motor_enabled(&self) -> bool {
        self.motor_enabled
    }

    pub fn direction(&self) -> bool {
        self.direction
    }

    pub fn current_speed(&self) -> f32 {
        self.current_speed
    }

    pub fn target_speed(&self) -> f32 {
        self.target_speed
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn is_audio_active(&self) -> bool {
        self.audio_timer.is_some()
    }

    pub fn is_profile_active(&self) -> bool {
        self.profile.is_active()
    }

    pub fn active_profile(&self) -> Option<&Profile> {
        self.profile.profile().filter(|_| self.profile.is_active())
    }

    pub fn override_phase(&self) -> OverridePhase {
        self.override_phase
    }

    pub fn is_in_distance_override(&self) -> bool {
        self.override_phase != OverridePhase::Inactive
    }

    /// Source that drove the most recent update.
    pub fn last_source(&self) -> Option<ControlSource> {
        self.last_source
    }

    /// Current supply and motor values.
    pub fn state(&self) -> DeviceState {
        DeviceState {
            supplies: self.supplies.iter().map(Supply::state).collect(),
            motor_enabled: self.motor_enabled,
            motor_direction: self.direction,
            motor_speed: self.current_speed,
        }
    }

    /// Loads every distinct model the schema references through the shared
    /// cache and places a copy on each supply.
    ///
    /// Returns `false` if any model failed or no supply received one. Supplies
    /// whose model did load stay usable either way.
    pub fn load_models(&mut self, loader: &mut dyn ModelLoader, cache: &mut ModelCache) -> bool {
        let paths: Vec<String> = self
            .schema
            .model_paths()
            .into_iter()
            .map(str::to_owned)
            .collect();
        if paths.is_empty() {
            tracing::error!(controller = self.index, "no model paths in controller schema");
            return false;
        }

        let mut loaded: HashMap<String, SceneNode> = HashMap::new();
        let mut failures = 0;
        for path in &paths {
            match cache.get_or_load(loader, path) {
                Ok(node) => {
                    loaded.insert(path.clone(), node);
                }
                Err(error) => {
                    failures += 1;
                    tracing::warn!(controller = self.index, path = %path, %error, "model failed to load");
                }
            }
        }

        let mut placed = 0;
        for (supply, supply_schema) in self.supplies.iter_mut().zip(&self.schema.supplies) {
            let Some(placement) = &supply_schema.model else {
                continue;
            };
            let Some(base) = loaded.get(&placement.path) else {
                continue;
            };
            let mut node = base.clone();
            node.place(placement);
            supply.materials = supply
                .bindings
                .iter()
                .filter_map(|binding| {
                    let material = node.material(&binding.name)?;
                    Some(MaterialState::from_binding(binding, material.color))
                })
                .collect();
            supply.model = Some(node);
            placed += 1;
        }

        tracing::info!(
            controller = self.index,
            models = paths.len(),
            failures,
            supplies = placed,
            "controller models ready"
        );
        self.update_visuals();
        failures == 0 && placed > 0
    }

    /// Arms a manual update for the next tick. Stops any running profile
    /// immediately. A message without supplies keeps the previous supply
    /// request.
    pub fn handle_manual_message(&mut self, message: &ManualMessage) {
        self.stop_profile();
        if !message.supplies.is_empty() {
            self.manual.supplies = message.supplies.clone();
        }
        self.manual.motor_enabled = message.motor_enable;
        self.manual.motor_direction = message.motor_direction;
        self.manual.motor_speed = message.motor_speed;
        self.manual_pending = true;
    }

    pub fn handle_profile_message(&mut self, message: &ProfileMessage) {
        if message.stop_profile || !message.is_enabled() {
            self.stop_profile();
            return;
        }
        self.profile_drives_motor = message.drives_motor();
        self.profile.start_profile(message.to_profile());
    }

    /// Enters audio mode for the next [`AUDIO_REACTIVITY_TIMEOUT`] seconds
    /// and marks the supplies this controller's entry flags.
    pub fn handle_audio_message(&mut self, message: &AudioMessage) {
        self.audio_timer = Some(0.0);
        for supply in &mut self.supplies {
            supply.audio_active = false;
            supply.target_magnitude = 0.0;
        }

        let Some(entry) = message
            .audio
            .iter()
            .find(|entry| entry.controller_index == self.index)
        else {
            return;
        };

        for (supply, flag) in self.supplies.iter_mut().zip(&entry.audio_supply_flags) {
            if flag.is_none() {
                continue;
            }
            supply.audio_active = true;
            supply.target_magnitude = flag
                .bands()
                .map(|band| match band {
                    Band::Low => entry.weighted_low_magnitude,
                    Band::Mid => entry.weighted_mid_magnitude,
                    Band::High => entry.weighted_high_magnitude,
                })
                .fold(0.0, f32::max);
        }
    }

    pub fn set_distance(&mut self, meters: f32) {
        self.distance = meters;
    }

    pub fn set_supply_enabled(&mut self, index: usize, enabled: bool) {
        if let Some(supply) = self.supplies.get_mut(index) {
            supply.enabled = enabled;
        }
    }

    pub fn set_supply_brightness(&mut self, index: usize, brightness: f32) {
        if let Some(supply) = self.supplies.get_mut(index) {
            supply.brightness = brightness.clamp(0.0, 1.0);
        }
    }

    pub fn set_motor_enabled(&mut self, enabled: bool) {
        self.motor_enabled = enabled;
    }

    pub fn set_direction(&mut self, direction: bool) {
        self.direction = direction;
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.current_speed = speed.clamp(0.0, 1.0);
    }

    pub fn set_target_speed(&mut self, speed: f32) {
        self.target_speed = speed.clamp(0.0, 1.0);
    }

    /// Stops the waveform and puts back the brightness and speed that were
    /// in place when it took over.
    pub fn stop_profile(&mut self) {
        self.profile.stop_profile();
        if let Some(baseline) = self.profile_baseline.take() {
            for (supply, brightness) in self.supplies.iter_mut().zip(baseline.brightness) {
                supply.brightness = brightness;
            }
            self.current_speed = baseline.speed;
        }
    }

    /// Advances the controller by one tick.
    pub fn update(&mut self, delta_time: f32) {
        let source = self.resolve_source();
        match source {
            ControlSource::Manual => self.run_manual(),
            ControlSource::Audio => self.run_audio(),
            ControlSource::Profile => self.run_profile(delta_time),
            ControlSource::Passive => {}
        }
        if self.last_source != Some(source) {
            tracing::debug!(controller = self.index, ?source, "control source changed");
        }
        self.last_source = Some(source);

        self.run_distance_override(delta_time);
        self.update_visuals();
        self.update_rotation(delta_time);

        if let Some(elapsed) = self.audio_timer.as_mut() {
            *elapsed += f64::from(delta_time);
            if *elapsed >= f64::from(AUDIO_REACTIVITY_TIMEOUT) - AUDIO_TIMEOUT_TOLERANCE {
                self.audio_timer = None;
                for supply in &mut self.supplies {
                    supply.audio_active = false;
                }
            }
        }
    }

    fn resolve_source(&self) -> ControlSource {
        if self.manual_pending {
            ControlSource::Manual
        } else if self.audio_timer.is_some() {
            ControlSource::Audio
        } else if self.profile.is_active() {
            ControlSource::Profile
        } else {
            ControlSource::Passive
        }
    }

    fn run_manual(&mut self) {
        self.manual_pending = false;
        self.stop_profile();
        for (supply, requested) in self.supplies.iter_mut().zip(&self.manual.supplies) {
            supply.enabled = requested.enabled;
            supply.brightness = requested.brightness.clamp(0.0, 1.0);
        }
        self.motor_enabled = self.manual.motor_enabled;
        self.direction = self.manual.motor_direction;
        self.current_speed = self.manual.motor_speed.clamp(0.0, 1.0);
    }

    fn run_audio(&mut self) {
        for supply in self.supplies.iter_mut().filter(|supply| supply.audio_active) {
            supply.brightness = supply.target_magnitude.clamp(0.0, 1.0);
        }
    }

    fn run_profile(&mut self, delta_time: f32) {
        for supply in &mut self.supplies {
            supply.enabled = true;
        }
        if self.profile_baseline.is_none() {
            self.profile_baseline = Some(ProfileBaseline {
                brightness: self.supplies.iter().map(|supply| supply.brightness).collect(),
                speed: self.current_speed,
            });
        }

        let mut values = ProfileValues {
            supplies: self.supplies.iter().map(|supply| supply.brightness).collect(),
            motor: self.current_speed,
        };
        if self.profile.update_profile_values(delta_time, &mut values) {
            for (supply, value) in self.supplies.iter_mut().zip(values.supplies) {
                supply.brightness = value;
            }
            if self.profile_drives_motor {
                self.current_speed = values.motor;
            }
        }
    }

    fn displayed(&self) -> (Vec<f32>, f32) {
        (
            self.supplies.iter().map(|supply| supply.brightness).collect(),
            self.current_speed,
        )
    }

    fn run_distance_override(&mut self, delta_time: f32) {
        let within = self.distance > 0.0 && self.distance < DISTANCE_OVERRIDE_THRESHOLD;

        self.override_phase = match (self.override_phase, within) {
            (OverridePhase::Inactive, true) => {
                self.blend.snapshot = self.state();
                (self.blend.from_brightness, self.blend.from_speed) = self.displayed();
                for supply in &mut self.supplies {
                    supply.enabled = true;
                }
                self.motor_enabled = true;
                tracing::debug!(controller = self.index, distance = self.distance, "proximity override engaged");
                OverridePhase::Engaging { timer: 0.0 }
            }
            (OverridePhase::Releasing { .. }, true) => {
                (self.blend.from_brightness, self.blend.from_speed) = self.displayed();
                for supply in &mut self.supplies {
                    supply.enabled = true;
                }
                self.motor_enabled = true;
                OverridePhase::Engaging { timer: 0.0 }
            }
            (OverridePhase::Engaging { .. }, false) => {
                (self.blend.from_brightness, self.blend.from_speed) = self.displayed();
                OverridePhase::Releasing { timer: 0.0 }
            }
            (phase, _) => phase,
        };

        match self.override_phase {
            OverridePhase::Inactive => {}
            OverridePhase::Engaging { timer } => {
                let timer = (timer + delta_time).min(TRANSITION_DURATION);
                let progress = timer / TRANSITION_DURATION;
                let level = proximity_level(self.distance);
                self.blend.level = level;

                for (supply, from) in self.supplies.iter_mut().zip(&self.blend.from_brightness) {
                    supply.brightness = lerp(*from, level, progress).clamp(0.0, 1.0);
                }
                self.current_speed = lerp(self.blend.from_speed, level, progress).clamp(0.0, 1.0);
                self.direction = !self.blend.snapshot.motor_direction;
                self.override_phase = OverridePhase::Engaging { timer };
            }
            OverridePhase::Releasing { timer } => {
                let timer = (timer + delta_time).min(TRANSITION_DURATION);
                let progress = timer / TRANSITION_DURATION;
                let snapshot = &self.blend.snapshot;

                for ((supply, from), to) in self
                    .supplies
                    .iter_mut()
                    .zip(&self.blend.from_brightness)
                    .zip(&snapshot.supplies)
                {
                    supply.brightness = lerp(*from, to.brightness, progress).clamp(0.0, 1.0);
                }
                self.current_speed =
                    lerp(self.blend.from_speed, snapshot.motor_speed, progress).clamp(0.0, 1.0);
                self.direction = snapshot.motor_direction;

                if timer >= TRANSITION_DURATION {
                    for (supply, saved) in self.supplies.iter_mut().zip(&snapshot.supplies) {
                        supply.enabled = saved.enabled;
                        supply.brightness = saved.brightness;
                    }
                    self.current_speed = snapshot.motor_speed;
                    self.motor_enabled = snapshot.motor_enabled;
                    self.override_phase = OverridePhase::Inactive;
                    tracing::debug!(controller = self.index, "proximity override released");
                } else {
                    self.override_phase = OverridePhase::Releasing { timer };
                }
            }
        }
    }

    /// Pushes supply state onto the emissive materials.
    pub fn update_visuals(&mut self) {
        for supply in &mut self.supplies {
            let (enabled, brightness) = (supply.enabled, supply.brightness);
            for material in &mut supply.materials {
                material.apply_supply(enabled, brightness);
            }
        }
    }

    fn update_rotation(&mut self, delta_time: f32) {
        if !self.motor_enabled || self.current_speed <= 0.0 {
            return;
        }
        let sign = if self.direction { 1.0 } else { -1.0 };
        let step = self.current_speed * PI * 0.1 * sign * delta_time;
        for supply in self.supplies.iter_mut().filter(|supply| supply.can_rotate) {
            supply.rotation += step;
        }
    }

    /// Emissive colour of the first emissive material of each supply, or
    /// `None` where nothing glows.
    pub fn emissive_colors(&self) -> Vec<Option<(Rgb, f32)>> {
        self.supplies
            .iter()
            .map(|supply| {
                supply
                    .materials
                    .iter()
                    .find(|material| material.is_emissive)
                    .map(|material| (material.emissive, material.emissive_intensity))
            })
            .collect()
    }
}

/// Override brightness for a distance inside the threshold: 0 at the
/// threshold, 1 at the sensor.
fn proximity_level(distance: f32) -> f32 {
    let mapped = (distance - DISTANCE_OVERRIDE_THRESHOLD) / (0.0 - DISTANCE_OVERRIDE_THRESHOLD);
    mapped.clamp(0.0, 1.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::{
        assets::StaticLoader,
        config::{schema::stool_schema, schema::wallflower_schema, BandMask},
        neon::messages::ControllerAudio,
        profile::ProfileType,
        render::MIN_BRIGHTNESS_OFF,
    };

    fn controller() -> NeonController {
        let schema = wallflower_schema().remove(0);
        NeonController::with_rng(0, schema, StdRng::seed_from_u64(3))
    }

    fn manual(supplies: &[(bool, f32)], enable: bool, direction: bool, speed: f32) -> ManualMessage {
        ManualMessage {
            index: Some(0),
            supplies: supplies
                .iter()
                .map(|(enabled, brightness)| SupplyState::new(*enabled, *brightness))
                .collect(),
            motor_enable: enable,
            motor_direction: direction,
            motor_speed: speed,
        }
    }

    fn audio_for(index: usize, low: f32, flags: Vec<BandMask>) -> AudioMessage {
        AudioMessage {
            audio: vec![ControllerAudio {
                controller_index: index,
                weighted_low_magnitude: low,
                audio_supply_flags: flags,
                ..ControllerAudio::default()
            }],
        }
    }

    #[test]
    fn manual_wins_the_next_tick_then_falls_through() {
        let mut controller = controller();
        controller.handle_profile_message(&ProfileMessage::start(
            0,
            Profile::new(ProfileType::Cosine, 1.0, 1.0, 0.0),
        ));
        controller.update(0.1);
        assert_eq!(controller.last_source(), Some(ControlSource::Profile));

        controller.handle_manual_message(&manual(&[(true, 0.3), (false, 0.7)], true, false, 0.4));
        assert!(!controller.is_profile_active());
        controller.update(0.1);

        assert_eq!(controller.last_source(), Some(ControlSource::Manual));
        assert_eq!(controller.supplies()[0].state(), SupplyState::new(true, 0.3));
        assert_eq!(controller.supplies()[1].state(), SupplyState::new(false, 0.7));
        assert!(controller.motor_enabled());
        assert!(!controller.direction());
        assert_eq!(controller.current_speed(), 0.4);

        controller.update(0.1);
        assert_eq!(controller.last_source(), Some(ControlSource::Passive));
        assert_eq!(controller.supplies()[0].brightness, 0.3);
    }

    #[test]
    fn manual_values_are_clamped() {
        let mut controller = controller();
        controller.handle_manual_message(&manual(&[(true, 1.7), (true, -0.2)], true, true, 3.0));
        controller.update(0.016);
        assert_eq!(controller.supplies()[0].brightness, 1.0);
        assert_eq!(controller.supplies()[1].brightness, 0.0);
        assert_eq!(controller.current_speed(), 1.0);
    }

    #[test]
    fn audio_decays_after_timeout() {
        let mut controller = controller();
        controller.handle_audio_message(&audio_for(0, 0.6, vec![BandMask::LOW, BandMask::NONE]));

        for _ in 0..19 {
            controller.update(0.25);
        }
        assert!(controller.is_audio_active());
        assert!(controller.supplies()[0].audio_active);
        assert_eq!(controller.supplies()[0].brightness, 0.6);
        assert!(!controller.supplies()[1].audio_active);

        controller.update(0.25);
        assert!(!controller.is_audio_active());
        assert!(controller.supplies().iter().all(|supply| !supply.audio_active));
    }

    #[test]
    fn audio_decays_on_inexact_frame_times() {
        for (delta, ticks) in [(0.1_f32, 50), (1.0 / 30.0, 150), (1.0 / 60.0, 300)] {
            let mut controller = controller();
            controller.handle_audio_message(&audio_for(0, 0.6, vec![BandMask::LOW, BandMask::NONE]));
            for _ in 0..ticks - 1 {
                controller.update(delta);
            }
            assert!(controller.is_audio_active(), "expired early at {delta}");
            controller.update(delta);
            assert!(!controller.is_audio_active(), "still active after 5 s at {delta}");
        }
    }

    #[test]
    fn audio_outranks_profile() {
        let mut controller = controller();
        controller.handle_profile_message(&ProfileMessage::start(
            0,
            Profile::new(ProfileType::Triangle, 1.0, 1.0, 0.0),
        ));
        controller.handle_audio_message(&audio_for(0, 0.45, vec![BandMask::LOW, BandMask::NONE]));
        controller.update(0.25);
        assert_eq!(controller.last_source(), Some(ControlSource::Audio));
        assert_eq!(controller.supplies()[0].brightness, 0.45);
        assert!(controller.is_profile_active());
    }

    #[test]
    fn audio_for_other_controllers_only_restarts_timer() {
        let mut controller = controller();
        controller.handle_audio_message(&audio_for(2, 0.9, vec![BandMask::LOW]));
        assert!(controller.is_audio_active());
        assert!(controller.supplies().iter().all(|supply| !supply.audio_active));
    }

    #[test]
    fn multi_band_flags_take_the_strongest_band() {
        let mut controller = controller();
        let message = AudioMessage {
            audio: vec![ControllerAudio {
                controller_index: 0,
                weighted_low_magnitude: 0.3,
                weighted_high_magnitude: 0.5,
                audio_supply_flags: vec![BandMask::LOW | BandMask::HIGH],
                ..ControllerAudio::default()
            }],
        };
        controller.handle_audio_message(&message);
        assert_eq!(controller.supplies()[0].target_magnitude, 0.5);
    }

    #[test]
    fn profile_enables_supplies_and_drives_motor() {
        let mut controller = controller();
        controller.handle_profile_message(&ProfileMessage::start(
            0,
            Profile::new(ProfileType::Triangle, 1.0, 1.0, 0.0),
        ));
        controller.update(0.25);
        assert!(controller.supplies().iter().all(|supply| supply.enabled));
        assert!(controller
            .supplies()
            .iter()
            .all(|supply| (supply.brightness - 0.5).abs() < 1e-6));
        assert!((controller.current_speed() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn profile_without_motor_leaves_speed() {
        let mut controller = controller();
        controller.set_speed(0.2);
        let mut message = ProfileMessage::start(0, Profile::new(ProfileType::Triangle, 1.0, 1.0, 0.0));
        message.drive_motor = Some(false);
        controller.handle_profile_message(&message);
        controller.update(0.25);
        assert_eq!(controller.current_speed(), 0.2);
    }

    #[test]
    fn stopping_profile_restores_baseline() {
        let mut controller = controller();
        controller.set_supply_brightness(0, 0.3);
        controller.set_speed(0.1);
        controller.handle_profile_message(&ProfileMessage::start(
            0,
            Profile::new(ProfileType::Triangle, 1.0, 1.0, 0.0),
        ));
        controller.update(0.25);
        controller.handle_profile_message(&ProfileMessage::stop(Some(0)));
        assert_eq!(controller.supplies()[0].brightness, 0.3);
        assert_eq!(controller.current_speed(), 0.1);
    }

    #[test]
    fn zero_distance_never_overrides() {
        let mut controller = controller();
        controller.set_distance(0.0);
        for _ in 0..10 {
            controller.update(0.1);
        }
        assert!(!controller.is_in_distance_override());

        controller.set_distance(-0.2);
        controller.update(0.1);
        assert!(!controller.is_in_distance_override());
    }

    #[test]
    fn override_round_trip_restores_snapshot() {
        let mut controller = controller();
        controller.handle_manual_message(&manual(&[(true, 0.35), (false, 0.6)], false, true, 0.25));
        controller.update(0.016);
        let before = controller.state();

        controller.set_distance(0.3);
        for _ in 0..8 {
            controller.update(0.1);
        }
        assert!(controller.is_in_distance_override());
        let engaged = controller.state();
        assert!(engaged.supplies.iter().all(|supply| supply.enabled));
        assert!(engaged.motor_enabled);
        assert!(!engaged.motor_direction);
        assert!((engaged.supplies[0].brightness - 0.4).abs() < 1e-5);
        assert!((engaged.motor_speed - 0.4).abs() < 1e-5);

        controller.set_distance(0.6);
        for _ in 0..6 {
            controller.update(0.1);
        }
        assert!(!controller.is_in_distance_override());
        let after = controller.state();
        assert_eq!(after.motor_enabled, before.motor_enabled);
        assert_eq!(after.motor_direction, before.motor_direction);
        assert!((after.motor_speed - before.motor_speed).abs() < 1e-6);
        for (a, b) in after.supplies.iter().zip(&before.supplies) {
            assert_eq!(a.enabled, b.enabled);
            assert!((a.brightness - b.brightness).abs() < 1e-6);
        }
    }

    #[test]
    fn override_blends_over_transition() {
        let mut controller = controller();
        controller.set_distance(0.1);
        controller.update(0.25);
        assert!((controller.supplies()[0].brightness - 0.4).abs() < 1e-5);
        controller.update(0.25);
        assert!((controller.supplies()[0].brightness - 0.8).abs() < 1e-5);
        controller.update(0.25);
        assert!((controller.supplies()[0].brightness - 0.8).abs() < 1e-5);
    }

    #[test]
    fn rotation_follows_speed_and_direction() {
        let mut controller = controller();
        controller.handle_manual_message(&manual(&[(true, 1.0), (true, 1.0)], true, false, 1.0));
        controller.update(1.0);
        let spin = controller.supplies()[1].rotation;
        assert!((spin + PI * 0.1).abs() < 1e-6);
        assert_eq!(controller.supplies()[0].rotation, 0.0);

        controller.set_motor_enabled(false);
        controller.update(1.0);
        assert_eq!(controller.supplies()[1].rotation, spin);
    }

    #[test]
    fn loads_models_and_drives_materials() {
        let mut loader = StaticLoader::new()
            .with_materials("/models/wallflower_ring.glb", &["NeonRing", "Backplate"])
            .with_materials("/models/wallflower_flower.glb", &["NeonPetals"]);
        let mut cache = ModelCache::new();
        let mut controller = controller();
        assert!(controller.load_models(&mut loader, &mut cache));
        assert_eq!(controller.supplies()[0].materials.len(), 2);

        controller.handle_manual_message(&manual(&[(true, 0.9), (false, 0.0)], false, true, 0.0));
        controller.update(0.016);
        let colors = controller.emissive_colors();
        assert_eq!(colors[0].unwrap().1, 0.9);
        assert_eq!(colors[1].unwrap(), (Rgb::DIM_GREY, MIN_BRIGHTNESS_OFF));
    }

    #[test]
    fn partial_model_failure_reports_false_but_keeps_loaded_supplies() {
        let mut loader = StaticLoader::new().with_materials("/models/wallflower_ring.glb", &["NeonRing"]);
        let mut cache = ModelCache::new();
        let mut controller = controller();
        assert!(!controller.load_models(&mut loader, &mut cache));
        assert!(controller.supplies()[0].model.is_some());
        assert!(controller.supplies()[1].model.is_none());
    }

    #[test]
    fn shared_model_is_loaded_once() {
        let mut loader = StaticLoader::new().with_materials("/models/stool.glb", &["NeonSeat", "NeonLegs"]);
        let mut cache = ModelCache::new();
        let mut controller = NeonController::new(0, stool_schema().remove(0));
        assert!(controller.load_models(&mut loader, &mut cache));
        assert_eq!(loader.loads(), 1);
        assert!(controller.supplies().iter().all(|supply| supply.model.is_some()));
    }
}

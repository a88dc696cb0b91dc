use std::path::Path;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    assets::{ModelCache, ModelLoader},
    audio::{AudioAnalyzer, AudioClip},
    config::{AnalyserConfig, AudioConfig, ControllerSchema, PartialAudioConfig, PassiveConfig},
    neon::{
        controller::NeonController,
        messages::{ManualMessage, ProfileMessage, ProfileRequest},
        passive::PassiveChoreographer,
        pulse::PulseGenerator,
    },
    persistence::InstallationConfig,
    profile::{Profile, ProfileType},
};

/// User-driven source currently holding an installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectControl {
    Manual,
    Profile,
    Audio,
}

/// Who is driving an installation right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authority {
    Direct(DirectControl),
    Passive,
    /// Nothing is driving and passive mode is off or suspended.
    Idle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStats {
    pub profile_dispatches: u64,
    pub audio_dispatches: u64,
    pub passive_activations: u64,
}

/// One installation: its controllers, audio pipeline and idle choreography.
#[derive(Debug)]
pub struct NeonManager {
    name: String,
    schema: Vec<ControllerSchema>,
    num_controllers: usize,
    controllers: Vec<NeonController>,
    audio: AudioAnalyzer,
    audio_config: AudioConfig,
    audio_reactivity_enabled: bool,
    pulse: PulseGenerator,
    passive: PassiveChoreographer,
    direct: Option<DirectControl>,
    /// Simulated seconds since construction.
    clock: f64,
    last_user_action: f64,
    stats: ManagerStats,
    rng: StdRng,
}

impl NeonManager {
    pub fn new(
        name: impl Into<String>,
        schema: Vec<ControllerSchema>,
        num_controllers: usize,
        supplies_per_controller: usize,
    ) -> Self {
        Self::with_rng(
            name,
            schema,
            num_controllers,
            supplies_per_controller,
            StdRng::from_entropy(),
        )
    }

    /// Builds the manager with every random source derived from `rng`.
    pub fn with_rng(
        name: impl Into<String>,
        schema: Vec<ControllerSchema>,
        num_controllers: usize,
        supplies_per_controller: usize,
        mut rng: StdRng,
    ) -> Self {
        let controllers = schema
            .iter()
            .take(num_controllers)
            .enumerate()
            .map(|(index, controller)| {
                NeonController::with_rng(index, controller.clone(), StdRng::seed_from_u64(rng.gen()))
            })
            .collect();
        let passive = PassiveChoreographer::with_rng(
            PassiveConfig::default(),
            StdRng::seed_from_u64(rng.gen()),
        );

        Self {
            name: name.into(),
            schema,
            num_controllers,
            controllers,
            audio: AudioAnalyzer::new(AnalyserConfig::default()),
            audio_config: AudioConfig::with_layout(num_controllers, supplies_per_controller),
            audio_reactivity_enabled: true,
            pulse: PulseGenerator::new(),
            passive,
            direct: None,
            clock: 0.0,
            last_user_action: 0.0,
            stats: ManagerStats::default(),
            rng,
        }
    }

    /// Replaces the passive timing, keeping the built-in profile sets.
    pub fn with_passive_config(mut self, config: PassiveConfig) -> Self {
        self.passive = PassiveChoreographer::with_rng(config, StdRng::seed_from_u64(self.rng.gen()));
        self
    }

    pub fn with_passive(mut self, passive: PassiveChoreographer) -> Self {
        self.passive = passive;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &[ControllerSchema] {
        &self.schema
    }

    pub fn controllers(&self) -> &[NeonController] {
        &self.controllers
    }

    pub fn controller(&self, index: usize) -> Option<&NeonController> {
        self.controllers.get(index)
    }

    pub fn audio_config(&self) -> &AudioConfig {
        &self.audio_config
    }

    pub fn audio(&self) -> &AudioAnalyzer {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut AudioAnalyzer {
        &mut self.audio
    }

    pub fn passive(&self) -> &PassiveChoreographer {
        &self.passive
    }

    pub fn stats(&self) -> ManagerStats {
        self.stats
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn set_audio_reactivity_enabled(&mut self, enabled: bool) {
        self.audio_reactivity_enabled = enabled;
    }

    pub fn authority(&self) -> Authority {
        match self.direct {
            Some(direct) => Authority::Direct(direct),
            None if self.passive.is_active() => Authority::Passive,
            None => Authority::Idle,
        }
    }

    /// Restores saved state and loads every controller's models. Returns
    /// `false` if there are no controllers or any controller failed to load;
    /// controllers that did load stay usable.
    pub fn initialize(
        &mut self,
        saved: &InstallationConfig,
        loader: &mut dyn ModelLoader,
        cache: &mut ModelCache,
    ) -> bool {
        self.apply_saved_state(saved);
        self.load_models(loader, cache)
    }

    pub fn load_models(&mut self, loader: &mut dyn ModelLoader, cache: &mut ModelCache) -> bool {
        if self.controllers.is_empty() {
            tracing::warn!(installation = %self.name, "no controllers to initialize");
            return false;
        }
        let mut all_loaded = true;
        for controller in &mut self.controllers {
            if !controller.load_models(loader, cache) {
                tracing::error!(
                    installation = %self.name,
                    controller = controller.index(),
                    "failed to load models for controller"
                );
                all_loaded = false;
            }
        }
        all_loaded
    }

    /// Applies a saved document: the audio configuration is merged onto the
    /// defaults, controller entries are replayed as manual messages and
    /// enabled profiles are restarted.
    pub fn apply_saved_state(&mut self, saved: &InstallationConfig) {
        self.audio_config.merge(&saved.audio_config);
        self.audio.apply_configuration(&self.audio_config);

        for (index, controller) in self.controllers.iter_mut().enumerate() {
            if let Some(message) = saved.controllers.get(index) {
                controller.handle_manual_message(message);
            }
        }

        let profiles: Vec<ProfileMessage> = saved
            .profiles
            .iter()
            .take(self.controllers.len())
            .enumerate()
            .filter(|(_, profile)| profile.enabled == Some(true))
            .map(|(index, profile)| ProfileMessage {
                index: Some(index),
                ..profile.clone()
            })
            .collect();
        if !profiles.is_empty() {
            self.handle_profile_request(&ProfileRequest::Batch(profiles), false);
        }
    }

    /// Loads a clip for the audio pipeline. On failure audio reactivity
    /// stays off and this returns `false`.
    pub fn initialize_audio(&mut self, path: impl AsRef<Path>) -> bool {
        let available = self.audio.initialize(path);
        if available {
            self.audio.apply_configuration(&self.audio_config);
        } else {
            tracing::error!(installation = %self.name, "failed to initialize audio analyzer");
        }
        available
    }

    pub fn with_audio(mut self, clip: AudioClip) -> Self {
        self.audio.set_clip(clip);
        self.audio.apply_configuration(&self.audio_config);
        self
    }

    /// Advances the installation by one tick.
    pub fn update(&mut self, delta_time: f32) {
        let before = self.authority();
        self.clock += f64::from(delta_time);

        if self.audio_reactivity_enabled {
            self.update_audio(delta_time);
        }

        if self.direct.is_some()
            && self.clock - self.last_user_action > f64::from(self.passive.config().idle_threshold)
        {
            tracing::debug!(installation = %self.name, "direct control expired");
            self.direct = None;
        }

        if self.direct.is_none() {
            self.update_passive_mode(delta_time);
        }

        for controller in &mut self.controllers {
            controller.update(delta_time);
        }

        let after = self.authority();
        if before != after {
            tracing::debug!(installation = %self.name, ?before, ?after, "authority changed");
        }
    }

    fn update_passive_mode(&mut self, delta_time: f32) {
        if !self.passive.is_enabled() || self.audio.is_playing() {
            if self.passive.is_active() {
                self.cleanup_passive_mode();
            }
            return;
        }

        if !self.passive.is_active() {
            let messages = self.passive.activate(&mut self.controllers);
            self.stats.passive_activations += 1;
            self.dispatch(&messages);
        }

        let messages = self.passive.tick(delta_time, &mut self.controllers);
        self.dispatch(&messages);
    }

    fn dispatch(&mut self, messages: &[ProfileMessage]) {
        for message in messages {
            if let Some(index) = message.index {
                self.send_profile_to_controller(index, message);
            }
        }
    }

    fn update_audio(&mut self, delta_time: f32) {
        let Some(readings) = self.audio.update(delta_time) else {
            return;
        };
        let supply_counts: Vec<usize> = self
            .controllers
            .iter()
            .map(|controller| controller.supplies().len())
            .collect();
        if !self
            .pulse
            .generate_pulse(&readings, &self.audio_config, &supply_counts)
        {
            return;
        }

        self.direct = Some(DirectControl::Audio);
        self.last_user_action = self.clock;
        if self.passive.is_active() {
            self.cleanup_passive_mode();
        }

        for (index, controller) in self.controllers.iter_mut().enumerate() {
            if let Some(message) = self.pulse.message_for(index) {
                controller.handle_audio_message(&message);
                self.stats.audio_dispatches += 1;
            }
        }
    }

    /// Applies a manual request to one controller. Out-of-range indices are
    /// ignored but still count as user activity.
    pub fn handle_manual_request(&mut self, message: &ManualMessage, index: usize) {
        self.last_user_action = self.clock;
        self.direct = Some(DirectControl::Manual);
        if self.passive.is_active() {
            self.cleanup_passive_mode();
        }

        match self.controllers.get_mut(index) {
            Some(controller) => controller.handle_manual_message(message),
            None => tracing::debug!(installation = %self.name, index, "manual request for unknown controller"),
        }
    }

    /// Stops every controller, or starts the enabled entries of a batch.
    ///
    /// The ripple offset of a batch is read from its first entry only and
    /// spread over the enabled entries: controller `i` is shifted by
    /// `i / active * phaseOffset` where `active` is the number of enabled
    /// entries, capped at the controller count.
    pub fn handle_profile_request(&mut self, request: &ProfileRequest, from_passive: bool) {
        if !from_passive {
            self.last_user_action = self.clock;
            self.direct = Some(DirectControl::Profile);
            if self.passive.is_active() {
                self.cleanup_passive_mode();
            }
        }

        match request {
            ProfileRequest::Stop => {
                for index in 0..self.controllers.len() {
                    self.send_profile_to_controller(index, &ProfileMessage::stop(Some(index)));
                }
            }
            ProfileRequest::Batch(entries) => {
                let phase_offset = entries
                    .first()
                    .and_then(|entry| entry.phase_offset)
                    .unwrap_or(0.0);
                let enabled: Vec<&ProfileMessage> =
                    entries.iter().filter(|entry| entry.is_enabled()).collect();
                let active = enabled.len().min(self.controllers.len());

                for entry in enabled {
                    let Some(index) = entry.index.filter(|index| *index < self.controllers.len())
                    else {
                        continue;
                    };
                    let shift = index as f32 / active as f32 * phase_offset;
                    let message = ProfileMessage {
                        phase: Some((entry.phase.unwrap_or(0.0) + shift) % 1.0),
                        ..entry.clone()
                    };
                    self.send_profile_to_controller(index, &message);
                }
            }
        }
    }

    /// Merges a configuration panel update onto the current audio settings.
    pub fn handle_audio_config_request(&mut self, partial: &PartialAudioConfig) {
        self.audio_config.merge(partial);
        self.audio.apply_configuration(&self.audio_config);
    }

    /// Returns `false` when `index` names no controller.
    pub fn send_profile_to_controller(&mut self, index: usize, message: &ProfileMessage) -> bool {
        let Some(controller) = self.controllers.get_mut(index) else {
            return false;
        };
        controller.handle_profile_message(message);
        self.stats.profile_dispatches += 1;
        true
    }

    pub fn set_distance(&mut self, index: usize, meters: f32) {
        if let Some(controller) = self.controllers.get_mut(index) {
            controller.set_distance(meters);
        }
    }

    pub fn set_passive_mode_enabled(&mut self, enabled: bool) {
        self.passive.set_enabled(enabled);
        if !enabled && self.passive.is_active() {
            for index in 0..self.controllers.len() {
                self.send_profile_to_controller(index, &ProfileMessage::stop(Some(index)));
            }
            self.passive.deactivate(&mut self.controllers);
        }
    }

    /// Tears passive mode down: every profile stops and the timers reset.
    pub fn cleanup_passive_mode(&mut self) {
        self.passive.deactivate(&mut self.controllers);
    }

    /// Current state in the shape the persistence layer stores.
    pub fn to_installation_config(&self) -> InstallationConfig {
        let controllers = self
            .controllers
            .iter()
            .map(|controller| {
                let state = controller.state();
                ManualMessage {
                    index: Some(controller.index()),
                    supplies: state.supplies,
                    motor_enable: state.motor_enabled,
                    motor_direction: state.motor_direction,
                    motor_speed: state.motor_speed,
                }
            })
            .collect();
        let profiles = self
            .controllers
            .iter()
            .map(|controller| match controller.active_profile() {
                Some(profile) => ProfileMessage::start(controller.index(), *profile),
                None => ProfileMessage {
                    enabled: Some(false),
                    ..ProfileMessage::start(
                        controller.index(),
                        Profile::new(ProfileType::Cosine, 0.5, 0.5, 0.0),
                    )
                },
            })
            .collect();

        InstallationConfig {
            controllers,
            profiles,
            audio_config: PartialAudioConfig::from(&self.audio_config),
        }
    }

    pub fn num_controllers(&self) -> usize {
        self.num_controllers
    }
}

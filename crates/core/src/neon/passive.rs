//! Idle choreography: rotating profile sets and wandering motors while no
//! one is driving an installation.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    config::PassiveConfig,
    neon::{controller::NeonController, messages::ProfileMessage},
    profile::{Profile, ProfileType},
};

/// Fraction of a motor transition after which a pending direction flip is
/// applied.
const DIRECTION_SWAP_PROGRESS: f32 = 0.95;

/// Motor behaviour of a passive profile set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotorChoreography {
    pub speed_range: (f32, f32),
    pub direction_change_prob: f32,
    pub enable_motor: bool,
    /// Draw a separate target speed per controller instead of one shared
    /// target.
    #[serde(default)]
    pub individual_speeds: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetPattern {
    /// Controller `i` of `n` starts at phase `i / n * profile.phase`, giving
    /// a ripple across the installation.
    Sync,
    /// Every controller gets the profile as is.
    Uniform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveProfileSet {
    pub pattern: SetPattern,
    pub profile: Profile,
    #[serde(default)]
    pub motor: Option<MotorChoreography>,
}

impl PassiveProfileSet {
    fn motor_enabled(&self) -> bool {
        self.motor.as_ref().is_some_and(|motor| motor.enable_motor)
    }

    /// Profile messages that apply this set to `count` controllers.
    pub fn messages(&self, count: usize) -> Vec<ProfileMessage> {
        (0..count)
            .map(|index| {
                let mut profile = self.profile;
                if self.pattern == SetPattern::Sync {
                    profile.phase = index as f32 / count as f32 * self.profile.phase;
                }
                let mut message = ProfileMessage::start(index, profile);
                message.drive_motor = Some(false);
                message
            })
            .collect()
    }
}

/// A slow cosine ripple with drifting motors, and a heartbeat with the
/// motors parked.
pub fn default_profile_sets() -> Vec<PassiveProfileSet> {
    vec![
        PassiveProfileSet {
            pattern: SetPattern::Sync,
            profile: Profile::new(ProfileType::Cosine, 0.9, 0.5, 0.3),
            motor: Some(MotorChoreography {
                speed_range: (0.1, 0.3),
                direction_change_prob: 0.2,
                enable_motor: true,
                individual_speeds: false,
            }),
        },
        PassiveProfileSet {
            pattern: SetPattern::Sync,
            profile: Profile::new(ProfileType::Pulse, 0.9, 0.5, 0.3),
            motor: None,
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MotorState {
    speed: f32,
    direction: bool,
    start_speed: f32,
    target_speed: f32,
    target_direction: bool,
}

impl Default for MotorState {
    fn default() -> Self {
        Self {
            speed: 0.2,
            direction: true,
            start_speed: 0.2,
            target_speed: 0.2,
            target_direction: true,
        }
    }
}

/// Passive mode state machine owned by a neon manager.
///
/// The choreographer never sends profiles itself. `activate` and `tick`
/// return the messages to dispatch so the manager stays the only sender.
#[derive(Debug)]
pub struct PassiveChoreographer {
    config: PassiveConfig,
    sets: Vec<PassiveProfileSet>,
    active: bool,
    current_set: usize,
    profile_set_timer: f32,
    motor_change_timer: f32,
    motor_transition: Option<f32>,
    motors: Vec<MotorState>,
    rng: StdRng,
}

impl PassiveChoreographer {
    pub fn new(config: PassiveConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: PassiveConfig, rng: StdRng) -> Self {
        Self {
            config,
            sets: default_profile_sets(),
            active: false,
            current_set: 0,
            profile_set_timer: 0.0,
            motor_change_timer: 0.0,
            motor_transition: None,
            motors: Vec::new(),
            rng,
        }
    }

    /// Replaces the set library. An empty library keeps the defaults.
    pub fn with_sets(mut self, sets: Vec<PassiveProfileSet>) -> Self {
        if !sets.is_empty() {
            self.sets = sets;
        }
        self
    }

    pub fn config(&self) -> &PassiveConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn current_set(&self) -> Option<&PassiveProfileSet> {
        self.active.then(|| &self.sets[self.current_set])
    }

    pub fn is_motor_transitioning(&self) -> bool {
        self.motor_transition.is_some()
    }

    /// Enters passive mode with a random set and returns the profiles to
    /// broadcast.
    pub fn activate(&mut self, controllers: &mut [NeonController]) -> Vec<ProfileMessage> {
        self.active = true;
        self.profile_set_timer = 0.0;
        self.motor_change_timer = 0.0;
        self.motor_transition = None;
        self.current_set = self.rng.gen_range(0..self.sets.len());
        tracing::info!(set = self.current_set, "passive mode engaged");
        let set = self.sets[self.current_set].clone();
        self.initialize_motors(&set, controllers);
        set.messages(controllers.len())
    }

    /// Advances the motor choreography and the set rotation. Returns the
    /// profiles to broadcast when a new set was chosen.
    pub fn tick(&mut self, delta_time: f32, controllers: &mut [NeonController]) -> Vec<ProfileMessage> {
        if !self.active {
            return Vec::new();
        }
        self.update_motors(delta_time, controllers);

        self.profile_set_timer += delta_time;
        if self.profile_set_timer < self.config.profile_set_duration {
            return Vec::new();
        }
        self.profile_set_timer = 0.0;
        self.current_set = self.rng.gen_range(0..self.sets.len());
        tracing::debug!(set = self.current_set, "passive profile set rotated");
        let set = self.sets[self.current_set].clone();
        self.retarget_motors(&set, controllers);
        set.messages(controllers.len())
    }

    /// Stops every controller's profile and resets the timers.
    pub fn deactivate(&mut self, controllers: &mut [NeonController]) {
        for controller in controllers.iter_mut() {
            controller.stop_profile();
        }
        if self.active {
            tracing::info!("passive mode released");
        }
        self.active = false;
        self.profile_set_timer = 0.0;
        self.motor_change_timer = 0.0;
        self.motor_transition = None;
    }

    /// Moves running motors toward the new set's targets through a regular
    /// transition. Sets without a motor park them.
    fn retarget_motors(&mut self, set: &PassiveProfileSet, controllers: &mut [NeonController]) {
        if self.motors.len() != controllers.len() {
            self.initialize_motors(set, controllers);
            return;
        }
        if !set.motor_enabled() {
            self.motor_transition = None;
            for controller in controllers.iter_mut() {
                controller.set_motor_enabled(false);
            }
            return;
        }
        self.motor_change_timer = 0.0;
        self.motor_transition = Some(0.0);
        self.pick_motor_targets();
    }

    fn initialize_motors(&mut self, set: &PassiveProfileSet, controllers: &mut [NeonController]) {
        self.motors = vec![MotorState::default(); controllers.len()];
        let Some(motor) = &set.motor else {
            for controller in controllers.iter_mut() {
                controller.set_motor_enabled(false);
            }
            return;
        };

        for (state, controller) in self.motors.iter_mut().zip(controllers.iter_mut()) {
            let speed = sample_speed(&mut self.rng, motor.speed_range);
            let direction = self.rng.gen_bool(0.5);
            *state = MotorState {
                speed,
                direction,
                start_speed: speed,
                target_speed: speed,
                target_direction: direction,
            };

            controller.set_motor_enabled(motor.enable_motor);
            if motor.enable_motor {
                controller.set_speed(speed);
                controller.set_direction(direction);
            }
        }
    }

    fn pick_motor_targets(&mut self) {
        let Some(motor) = self.sets[self.current_set].motor.clone() else {
            return;
        };
        if !motor.enable_motor {
            return;
        }

        let shared = sample_speed(&mut self.rng, motor.speed_range);
        for state in &mut self.motors {
            state.start_speed = state.speed;
            state.target_speed = if motor.individual_speeds {
                sample_speed(&mut self.rng, motor.speed_range)
            } else {
                shared
            };
            state.target_direction = if self.rng.gen::<f32>() < motor.direction_change_prob {
                !state.direction
            } else {
                state.direction
            };
        }
    }

    fn update_motors(&mut self, delta_time: f32, controllers: &mut [NeonController]) {
        self.motor_change_timer += delta_time;
        if self.motor_change_timer >= self.config.motor_change_duration {
            self.motor_change_timer = 0.0;
            self.motor_transition = Some(0.0);
            self.pick_motor_targets();
        }

        let Some(timer) = self.motor_transition else {
            return;
        };
        let timer = timer + delta_time;
        let progress = if self.config.motor_transition_duration > 0.0 {
            (timer / self.config.motor_transition_duration).min(1.0)
        } else {
            1.0
        };
        let drive = self.sets[self.current_set].motor_enabled();

        for (state, controller) in self.motors.iter_mut().zip(controllers.iter_mut()) {
            if !drive {
                controller.set_motor_enabled(false);
                continue;
            }
            state.speed = state.start_speed + (state.target_speed - state.start_speed) * progress;
            controller.set_speed(state.speed);
            if progress >= DIRECTION_SWAP_PROGRESS && state.direction != state.target_direction {
                state.direction = state.target_direction;
                controller.set_direction(state.direction);
            }
            controller.set_motor_enabled(true);
        }

        self.motor_transition = (progress < 1.0).then_some(timer);
    }
}

fn sample_speed(rng: &mut StdRng, (min, max): (f32, f32)) -> f32 {
    min + rng.gen::<f32>() * (max - min)
}

//! Waveform generator driving brightness and motor speed from elapsed time.

use std::f32::consts::PI;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Waveform selector, encoded on the wire as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ProfileType {
    Cosine,
    Bounce,
    Exponential,
    Pulse,
    Triangle,
    Elastic,
    Cascade,
    Flicker,
    /// Any code outside the known range. Evaluates to zero.
    Unknown(u8),
}

impl ProfileType {
    pub const ALL: [ProfileType; 8] = [
        ProfileType::Cosine,
        ProfileType::Bounce,
        ProfileType::Exponential,
        ProfileType::Pulse,
        ProfileType::Triangle,
        ProfileType::Elastic,
        ProfileType::Cascade,
        ProfileType::Flicker,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProfileType::Cosine => "cosine",
            ProfileType::Bounce => "bounce",
            ProfileType::Exponential => "exponential",
            ProfileType::Pulse => "pulse",
            ProfileType::Triangle => "triangle",
            ProfileType::Elastic => "elastic",
            ProfileType::Cascade => "cascade",
            ProfileType::Flicker => "flicker",
            ProfileType::Unknown(_) => "unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

impl From<u8> for ProfileType {
    fn from(code: u8) -> Self {
        match code {
            0 => ProfileType::Cosine,
            1 => ProfileType::Bounce,
            2 => ProfileType::Exponential,
            3 => ProfileType::Pulse,
            4 => ProfileType::Triangle,
            5 => ProfileType::Elastic,
            6 => ProfileType::Cascade,
            7 => ProfileType::Flicker,
            other => ProfileType::Unknown(other),
        }
    }
}

impl From<ProfileType> for u8 {
    fn from(kind: ProfileType) -> Self {
        match kind {
            ProfileType::Cosine => 0,
            ProfileType::Bounce => 1,
            ProfileType::Exponential => 2,
            ProfileType::Pulse => 3,
            ProfileType::Triangle => 4,
            ProfileType::Elastic => 5,
            ProfileType::Cascade => 6,
            ProfileType::Flicker => 7,
            ProfileType::Unknown(code) => code,
        }
    }
}

/// Parameters of one running waveform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub kind: ProfileType,
    pub magnitude: f32,
    /// Cycles per second.
    pub frequency: f32,
    /// Fraction of a cycle in `[0, 1)`.
    pub phase: f32,
}

impl Profile {
    pub fn new(kind: ProfileType, magnitude: f32, frequency: f32, phase: f32) -> Self {
        Self {
            kind,
            magnitude,
            frequency,
            phase,
        }
    }
}

/// Output slots written by [`ProfileExecutor::update_profile_values`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileValues {
    pub supplies: Vec<f32>,
    pub motor: f32,
}

impl ProfileValues {
    pub fn new(supply_count: usize) -> Self {
        Self {
            supplies: vec![0.0; supply_count],
            motor: 0.0,
        }
    }
}

/// Stateful clock around the waveform functions. One per controller.
#[derive(Debug)]
pub struct ProfileExecutor {
    active: bool,
    elapsed: f32,
    profile: Option<Profile>,
    rng: StdRng,
}

impl Default for ProfileExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileExecutor {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Uses the provided generator for the flicker noise.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            active: false,
            elapsed: 0.0,
            profile: None,
            rng,
        }
    }

    /// Replaces the running profile. The elapsed clock keeps running so a
    /// replacement continues from the current point in time.
    pub fn start_profile(&mut self, profile: Profile) {
        self.profile = Some(profile);
        self.active = true;
    }

    pub fn stop_profile(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active && self.profile.is_some()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Advances the clock and writes the scaled waveform value into every
    /// slot of `values`. Returns `false` and leaves `values` untouched while
    /// no profile is active.
    pub fn update_profile_values(&mut self, delta_time: f32, values: &mut ProfileValues) -> bool {
        let profile = match (self.active, self.profile) {
            (true, Some(profile)) => profile,
            _ => return false,
        };

        self.elapsed += delta_time;
        let t = (self.elapsed * profile.frequency + profile.phase).rem_euclid(1.0);
        let value = (waveform(profile.kind, t, &mut self.rng) * profile.magnitude).clamp(0.0, 1.0);

        values.supplies.iter_mut().for_each(|slot| *slot = value);
        values.motor = value;
        true
    }
}

/// Evaluates a waveform at cycle position `t`, clamped to `[0, 1]`.
pub fn waveform<R: Rng + ?Sized>(kind: ProfileType, t: f32, rng: &mut R) -> f32 {
    let value = match kind {
        ProfileType::Cosine => 0.5 + 0.5 * (2.0 * PI * t).cos(),
        ProfileType::Exponential => 1.0 - (-3.0 * t).exp(),
        ProfileType::Bounce => 1.0 - (1.0 - t) * (1.0 - t),
        ProfileType::Pulse => heartbeat(t),
        ProfileType::Triangle => {
            if t < 0.5 {
                2.0 * t
            } else {
                2.0 * (1.0 - t)
            }
        }
        ProfileType::Elastic => 1.0 - (-3.0 * t).exp() * (2.0 * PI * 3.0 * t).cos(),
        ProfileType::Cascade => (1.0 - t).powi(2) * (2.0 * PI * 3.0 * t).sin(),
        ProfileType::Flicker => {
            let noise: f32 = rng.gen();
            0.5 + 0.8 * (t * 50.0 + noise * 10.0).sin()
        }
        ProfileType::Unknown(_) => 0.0,
    };

    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

struct Bump {
    start: f32,
    end: f32,
    rise_ratio: f32,
    rise_power: f32,
    fall_power: f32,
    height: f32,
}

impl Bump {
    fn sample(&self, position: f32) -> f32 {
        if position < self.start || position >= self.end {
            return 0.0;
        }
        let phase = (position - self.start) / (self.end - self.start);
        let shape = if phase < self.rise_ratio {
            (phase / self.rise_ratio).powf(self.rise_power)
        } else {
            (1.0 - (phase - self.rise_ratio) / (1.0 - self.rise_ratio)).powf(self.fall_power)
        };
        shape * self.height
    }
}

const PRIMARY_BEAT: Bump = Bump {
    start: 0.0,
    end: 0.15,
    rise_ratio: 0.3,
    rise_power: 1.5,
    fall_power: 2.0,
    height: 1.0,
};

const SECONDARY_BEAT: Bump = Bump {
    start: 0.075,
    end: 0.40,
    rise_ratio: 0.15,
    rise_power: 1.2,
    fall_power: 1.2,
    height: 0.7,
};

const PULSE_FLOOR: f32 = 0.08;

fn heartbeat(t: f32) -> f32 {
    let value = PRIMARY_BEAT.sample(t).max(SECONDARY_BEAT.sample(t));
    value.min(1.0).max(PULSE_FLOOR)
}

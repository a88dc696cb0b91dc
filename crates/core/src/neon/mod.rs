//! Neon installations: per-controller arbitration, audio pulses, idle
//! choreography, and the manager tying them together.

pub mod controller;
pub mod manager;
pub mod messages;
pub mod passive;
pub mod pulse;

pub use controller::{ControlSource, DeviceState, NeonController, OverridePhase, Supply};
pub use manager::{Authority, DirectControl, ManagerStats, NeonManager};
pub use messages::{
    AudioMessage, ControllerAudio, ManualMessage, ProfileMessage, ProfileRequest, SupplyState,
};
pub use passive::{MotorChoreography, PassiveChoreographer, PassiveProfileSet, SetPattern};
pub use pulse::{BandMagnitudes, PulseGenerator};

/// Seconds an audio message keeps a controller in audio mode.
pub const AUDIO_REACTIVITY_TIMEOUT: f32 = 5.0;
/// Seconds a proximity override takes to blend in or out.
pub const TRANSITION_DURATION: f32 = 0.5;
/// Distance in metres under which the proximity override engages.
pub const DISTANCE_OVERRIDE_THRESHOLD: f32 = 0.5;

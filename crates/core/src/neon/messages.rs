//! Inbound and outbound payloads of the neon installations.
//!
//! Every field is optional on the wire and tolerant of wrong types; missing
//! values fall back to the defaults the controllers expect.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::{lenient, lenient_or_default, lenient_vec, BandMask},
    profile::{Profile, ProfileType},
};

/// Requested state of one supply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplyState {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub brightness: f32,
}

impl SupplyState {
    pub fn new(enabled: bool, brightness: f32) -> Self {
        Self {
            enabled,
            brightness,
        }
    }
}

/// Direct control of one controller: supplies and motor, applied verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualMessage {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub supplies: Vec<SupplyState>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub motor_enable: bool,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub motor_direction: bool,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub motor_speed: f32,
}

/// One waveform request, or a stop, for a single controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMessage {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub profile_type: Option<ProfileType>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f32>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f32>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub phase: Option<f32>,
    /// Batch-level ripple offset. Only read from the first batch entry.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub phase_offset: Option<f32>,
    #[serde(
        default,
        alias = "enable",
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "lenient_or_default", skip_serializing_if = "is_false")]
    pub stop_profile: bool,
    /// Whether the waveform also drives motor speed. Defaults to yes.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub drive_motor: Option<bool>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ProfileMessage {
    pub fn start(index: usize, profile: Profile) -> Self {
        Self {
            index: Some(index),
            profile_type: Some(profile.kind),
            magnitude: Some(profile.magnitude),
            frequency: Some(profile.frequency),
            phase: Some(profile.phase),
            enabled: Some(true),
            ..Self::default()
        }
    }

    pub fn stop(index: Option<usize>) -> Self {
        Self {
            index,
            stop_profile: true,
            ..Self::default()
        }
    }

    /// Entries are enabled unless they explicitly say otherwise.
    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }

    pub fn drives_motor(&self) -> bool {
        self.drive_motor.unwrap_or(true)
    }

    /// Waveform parameters with defaults for every missing field. An absent
    /// type selects no known waveform and evaluates to zero.
    pub fn to_profile(&self) -> Profile {
        Profile::new(
            self.profile_type.unwrap_or(ProfileType::Unknown(u8::MAX)),
            self.magnitude.unwrap_or(0.5),
            self.frequency.unwrap_or(1.0),
            self.phase.unwrap_or(0.0),
        )
    }
}

/// A profile request addressed to a whole installation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileRequest {
    /// Stop the profile of every controller.
    Stop,
    /// Per-controller entries, each carrying its own `index`.
    Batch(Vec<ProfileMessage>),
}

impl ProfileRequest {
    /// Interprets a raw payload: an object with `stopProfile: true` stops
    /// everything, an array is a batch, any other object is a batch of one.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) if map.get("stopProfile") == Some(&Value::Bool(true)) => {
                Some(ProfileRequest::Stop)
            }
            Value::Object(_) => serde_json::from_value(value.clone())
                .ok()
                .map(|message| ProfileRequest::Batch(vec![message])),
            Value::Array(items) => Some(ProfileRequest::Batch(
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect(),
            )),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ProfileRequest::Stop => serde_json::json!({ "stopProfile": true }),
            ProfileRequest::Batch(entries) => {
                serde_json::to_value(entries).unwrap_or_else(|_| Value::Array(Vec::new()))
            }
        }
    }
}

/// Band magnitudes and the supplies that crossed their threshold for one
/// controller on one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerAudio {
    pub controller_index: usize,
    #[serde(default)]
    pub weighted_low_magnitude: f32,
    #[serde(default)]
    pub weighted_mid_magnitude: f32,
    #[serde(default)]
    pub weighted_high_magnitude: f32,
    /// Per supply: the bands that are active this tick.
    #[serde(default)]
    pub audio_supply_flags: Vec<BandMask>,
}

impl ControllerAudio {
    pub fn has_active_supply(&self) -> bool {
        self.audio_supply_flags.iter().any(|flag| !flag.is_none())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioMessage {
    #[serde(default)]
    pub audio: Vec<ControllerAudio>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_message_defaults_missing_fields() {
        let message: ManualMessage = serde_json::from_str(
            r#"{"index": 1, "mac": "00:00", "supplies": [{"enabled": true}, {"brightness": "x"}],
                "motorSpeed": 0.4}"#,
        )
        .unwrap();
        assert_eq!(message.index, Some(1));
        assert_eq!(message.supplies[0], SupplyState::new(true, 0.0));
        assert_eq!(message.supplies[1], SupplyState::new(false, 0.0));
        assert!(!message.motor_enable);
        assert_eq!(message.motor_speed, 0.4);
    }

    #[test]
    fn profile_message_defaults() {
        let message: ProfileMessage = serde_json::from_str(r#"{"profileType": 4, "magnitude": 0}"#).unwrap();
        let profile = message.to_profile();
        assert_eq!(profile.kind, ProfileType::Triangle);
        assert_eq!(profile.magnitude, 0.0);
        assert_eq!(profile.frequency, 1.0);
        assert_eq!(profile.phase, 0.0);
        assert!(message.is_enabled());
        assert!(message.drives_motor());
    }

    #[test]
    fn enable_is_accepted_as_alias() {
        let message: ProfileMessage = serde_json::from_str(r#"{"index": 0, "enable": false}"#).unwrap();
        assert!(!message.is_enabled());
    }

    #[test]
    fn profile_request_shapes() {
        let stop = ProfileRequest::from_value(&serde_json::json!({"stopProfile": true}));
        assert_eq!(stop, Some(ProfileRequest::Stop));

        let batch = ProfileRequest::from_value(&serde_json::json!([
            {"index": 0, "profileType": 0, "phaseOffset": 0.5},
            "garbage",
            {"index": 2, "stopProfile": true}
        ]))
        .unwrap();
        match batch {
            ProfileRequest::Batch(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].phase_offset, Some(0.5));
                assert!(entries[1].stop_profile);
            }
            other => panic!("unexpected request {other:?}"),
        }

        let single = ProfileRequest::from_value(&serde_json::json!({"index": 1, "profileType": 3})).unwrap();
        assert!(matches!(single, ProfileRequest::Batch(ref entries) if entries.len() == 1));
        assert_eq!(ProfileRequest::from_value(&serde_json::json!("nope")), None);
    }

    #[test]
    fn audio_message_uses_wire_names() {
        let message = AudioMessage {
            audio: vec![ControllerAudio {
                controller_index: 2,
                weighted_low_magnitude: 0.5,
                audio_supply_flags: vec![BandMask::LOW, BandMask::NONE],
                ..ControllerAudio::default()
            }],
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["audio"][0]["controllerIndex"], 2);
        assert_eq!(value["audio"][0]["audioSupplyFlags"], serde_json::json!([1, 0]));
        assert!(message.audio[0].has_active_supply());
    }
}

//! Topic grammar of the device bus and the publishing contract.
//!
//! Topics look like `<device>/<channel>[/<index>]`. Inbound payloads are
//! parsed here into typed commands. Anything the core does not act on
//! (status reports, lock traffic) still parses so callers can tell it apart
//! from garbage.

use std::{fmt, str::FromStr};

use serde_json::Value;

use crate::{
    config::PartialAudioConfig,
    disco::DiscoMessage,
    flipdisc::{CameraFrame, DrawingRequest, PatternRequest},
    neon::{ManualMessage, ProfileRequest},
    NeonRoomError, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Wallflower,
    Stool,
    Flip,
    Smartknob,
}

impl Device {
    pub const ALL: [Device; 4] = [Device::Wallflower, Device::Stool, Device::Flip, Device::Smartknob];

    pub fn as_str(self) -> &'static str {
        match self {
            Device::Wallflower => "wallflower",
            Device::Stool => "stool",
            Device::Flip => "flip",
            Device::Smartknob => "smartknob",
        }
    }

    /// Whether the device is a neon installation driven by manual, profile
    /// and audio messages.
    pub fn is_neon(self) -> bool {
        matches!(self, Device::Wallflower | Device::Stool)
    }
}

impl FromStr for Device {
    type Err = NeonRoomError;

    fn from_str(text: &str) -> Result<Self> {
        Device::ALL
            .into_iter()
            .find(|device| device.as_str() == text)
            .ok_or_else(|| NeonRoomError::msg(format!("unknown device `{text}`")))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Manual { device: Device, index: usize },
    Profile(Device),
    AudioConfig(Device),
    FlipDraw,
    FlipPattern,
    FlipCamera,
    Disco,
    ManagerStatus(Device),
    /// `<device>/lock/<rest>`.
    Lock { device: Device, action: String },
}

impl Topic {
    pub fn device(&self) -> Device {
        match self {
            Topic::Manual { device, .. }
            | Topic::Profile(device)
            | Topic::AudioConfig(device)
            | Topic::ManagerStatus(device)
            | Topic::Lock { device, .. } => *device,
            Topic::FlipDraw | Topic::FlipPattern | Topic::FlipCamera => Device::Flip,
            Topic::Disco => Device::Smartknob,
        }
    }
}

impl FromStr for Topic {
    type Err = NeonRoomError;

    fn from_str(text: &str) -> Result<Self> {
        let invalid = || NeonRoomError::msg(format!("unrecognised topic `{text}`"));
        let mut parts = text.split('/');
        let device: Device = parts.next().ok_or_else(invalid)?.parse()?;
        let channel = parts.next().ok_or_else(invalid)?;
        let rest: Vec<&str> = parts.collect();

        let topic = match (device, channel, rest.as_slice()) {
            (device, "manual", [index]) if device.is_neon() => Topic::Manual {
                device,
                index: index.parse().map_err(|_| invalid())?,
            },
            (device, "profile", []) if device.is_neon() => Topic::Profile(device),
            (device, "audio_config", []) if device.is_neon() => Topic::AudioConfig(device),
            (Device::Flip, "draw", []) => Topic::FlipDraw,
            (Device::Flip, "pattern", []) => Topic::FlipPattern,
            (Device::Flip, "camera", []) => Topic::FlipCamera,
            (Device::Smartknob, "disco", []) => Topic::Disco,
            (device, "manager", ["status"]) => Topic::ManagerStatus(device),
            (device, "lock", action) if !action.is_empty() => Topic::Lock {
                device,
                action: action.join("/"),
            },
            _ => return Err(invalid()),
        };
        Ok(topic)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Manual { device, index } => write!(f, "{device}/manual/{index}"),
            Topic::Profile(device) => write!(f, "{device}/profile"),
            Topic::AudioConfig(device) => write!(f, "{device}/audio_config"),
            Topic::FlipDraw => f.write_str("flip/draw"),
            Topic::FlipPattern => f.write_str("flip/pattern"),
            Topic::FlipCamera => f.write_str("flip/camera"),
            Topic::Disco => f.write_str("smartknob/disco"),
            Topic::ManagerStatus(device) => write!(f, "{device}/manager/status"),
            Topic::Lock { device, action } => write!(f, "{device}/lock/{action}"),
        }
    }
}

/// A bus message the device managers act on.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundCommand {
    Manual {
        device: Device,
        index: usize,
        message: ManualMessage,
    },
    Profile {
        device: Device,
        request: ProfileRequest,
    },
    AudioConfig {
        device: Device,
        config: PartialAudioConfig,
    },
    Draw(DrawingRequest),
    Pattern(PatternRequest),
    Camera(CameraFrame),
    Disco(DiscoMessage),
    /// Status and lock traffic, left to the UI layer.
    Ignored(Topic),
}

impl InboundCommand {
    /// Parses a payload received on `topic`.
    pub fn parse(topic: &str, payload: &Value) -> Result<Self> {
        let topic: Topic = topic.parse()?;
        let payload = payload.clone();
        let command = match topic {
            Topic::Manual { device, index } => InboundCommand::Manual {
                device,
                index,
                message: serde_json::from_value(payload)?,
            },
            Topic::Profile(device) => InboundCommand::Profile {
                device,
                request: ProfileRequest::from_value(&payload).ok_or(NeonRoomError::InvalidInput(
                    "profile payload must be an object or an array",
                ))?,
            },
            Topic::AudioConfig(device) => InboundCommand::AudioConfig {
                device,
                config: serde_json::from_value(payload)?,
            },
            Topic::FlipDraw => InboundCommand::Draw(serde_json::from_value(payload)?),
            Topic::FlipPattern => InboundCommand::Pattern(serde_json::from_value(payload)?),
            Topic::FlipCamera => InboundCommand::Camera(serde_json::from_value(payload)?),
            Topic::Disco => InboundCommand::Disco(serde_json::from_value(payload)?),
            topic @ (Topic::ManagerStatus(_) | Topic::Lock { .. }) => InboundCommand::Ignored(topic),
        };
        Ok(command)
    }
}

/// Outbound side of the bus.
pub trait Publisher {
    /// Sends `payload` on `topic`. Returns `false` when nothing was sent.
    fn publish(&mut self, topic: &str, payload: &Value) -> bool;
    fn is_connected(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Value,
}

/// In-process bus that records everything published while connected.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    connected: bool,
    messages: Vec<PublishedMessage>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            connected: true,
            messages: Vec::new(),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            messages: Vec::new(),
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn messages(&self) -> &[PublishedMessage] {
        &self.messages
    }

    pub fn take_messages(&mut self) -> Vec<PublishedMessage> {
        std::mem::take(&mut self.messages)
    }
}

impl Publisher for MemoryBus {
    fn publish(&mut self, topic: &str, payload: &Value) -> bool {
        if !self.connected {
            tracing::debug!(topic, "bus disconnected, message dropped");
            return false;
        }
        self.messages.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        true
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn topics_round_trip() {
        for text in [
            "wallflower/manual/2",
            "stool/profile",
            "stool/audio_config",
            "flip/draw",
            "flip/pattern",
            "flip/camera",
            "smartknob/disco",
            "flip/manager/status",
            "wallflower/lock/request",
        ] {
            let topic: Topic = text.parse().unwrap();
            assert_eq!(topic.to_string(), text);
        }
    }

    #[test]
    fn rejects_foreign_topics() {
        for text in ["lamp/manual/0", "flip/manual/0", "stool/manual/x", "stool/profile/1", "stool", "smartknob/lock"] {
            assert!(text.parse::<Topic>().is_err(), "{text} should not parse");
        }
    }

    #[test]
    fn parses_commands() {
        let command = InboundCommand::parse(
            "wallflower/manual/1",
            &json!({"supplies": [{"enabled": true, "brightness": 0.5}], "motorSpeed": 0.2}),
        )
        .unwrap();
        match command {
            InboundCommand::Manual { device, index, message } => {
                assert_eq!(device, Device::Wallflower);
                assert_eq!(index, 1);
                assert_eq!(message.motor_speed, 0.2);
            }
            other => panic!("unexpected {other:?}"),
        }

        let status = InboundCommand::parse("stool/manager/status", &json!({"locked": false})).unwrap();
        assert_eq!(status, InboundCommand::Ignored(Topic::ManagerStatus(Device::Stool)));

        let draw = InboundCommand::parse("flip/draw", &json!([[1, 0]])).unwrap();
        assert!(matches!(draw, InboundCommand::Draw(request) if request.grid == vec![vec![1, 0]]));
    }

    #[test]
    fn disconnected_bus_drops_messages() {
        let mut bus = MemoryBus::disconnected();
        assert!(!bus.publish("flip/draw", &json!([])));
        bus.set_connected(true);
        assert!(bus.publish("flip/draw", &json!([])));
        assert_eq!(bus.take_messages().len(), 1);
        assert!(bus.messages().is_empty());
    }
}

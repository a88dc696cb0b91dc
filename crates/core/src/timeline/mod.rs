//! Simulated playback time and scripted bus traffic.
//!
//! A scenario is a list of messages stamped with the simulated second at
//! which they arrive. The scheduler hands out every message that has come
//! due as the clock advances.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    pub time_seconds: f64,
    frames: u64,
}

impl PlaybackClock {
    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
        self.frames = 0;
    }

    pub fn advance(&mut self, delta: f32) {
        self.time_seconds = (self.time_seconds + f64::from(delta)).max(0.0);
        self.frames += 1;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// One inbound message of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    #[serde(alias = "time")]
    pub time_seconds: f64,
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
}

impl ScheduledEvent {
    pub fn new(time_seconds: f64, topic: impl Into<String>, payload: Value) -> Self {
        Self {
            time_seconds,
            topic: topic.into(),
            payload,
        }
    }
}

/// Scenario files are either a bare event list or `{"events": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScenarioFile {
    Events(Vec<ScheduledEvent>),
    Wrapped { events: Vec<ScheduledEvent> },
}

#[derive(Debug, Default)]
pub struct Scheduler {
    events: Vec<ScheduledEvent>,
    next_event: usize,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let events = match serde_json::from_str(text)? {
            ScenarioFile::Events(events) | ScenarioFile::Wrapped { events } => events,
        };
        let mut scheduler = Self::new();
        scheduler.set_events(events);
        Ok(scheduler)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn set_events(&mut self, events: Vec<ScheduledEvent>) {
        self.events = events;
        // stable, so same-time events keep file order
        self.events
            .sort_by(|a, b| a.time_seconds.total_cmp(&b.time_seconds));
        self.next_event = 0;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.events.len() - self.next_event
    }

    pub fn is_finished(&self) -> bool {
        self.next_event >= self.events.len()
    }

    /// Every event due at the clock's time that has not been handed out yet.
    pub fn tick(&mut self, clock: &PlaybackClock) -> Vec<ScheduledEvent> {
        let start = self.next_event;
        while self
            .events
            .get(self.next_event)
            .is_some_and(|event| clock.time_seconds >= event.time_seconds)
        {
            self.next_event += 1;
        }
        self.events[start..self.next_event].to_vec()
    }
}

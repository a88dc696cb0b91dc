//! Saved installation documents and the store they live in.
//!
//! A document is whatever the store hands back, so every level deserializes
//! leniently: an empty object is a valid document meaning "nothing saved".

use std::{collections::HashMap, path::Path};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::{from_json_or_default, lenient, lenient_or_default, lenient_vec, PartialAudioConfig},
    disco::{DiscoRotation, Spotlights},
    flipdisc::{DrawingRequest, PatternRequest},
    neon::{ManualMessage, ProfileMessage},
    Result,
};

/// Minutes a session survives after its last write.
pub const SESSION_TTL_MINUTES: i64 = 10;

/// Saved state of one neon installation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationConfig {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub controllers: Vec<ManualMessage>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub profiles: Vec<ProfileMessage>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub audio_config: PartialAudioConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlipDiscConfig {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternRequest>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub drawing: Option<DrawingRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoKnobConfig {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub rotation: Option<DiscoRotation>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub spotlights: Option<Spotlights>,
}

/// Everything one visitor session has saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioDocument {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub stool: Option<InstallationConfig>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub wallflower: Option<InstallationConfig>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub flip_disc: Option<FlipDiscConfig>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub disco_knob: Option<DiscoKnobConfig>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub lights_on: Option<bool>,
}

impl PortfolioDocument {
    /// Parses a saved document. Text that is not JSON yields an empty one.
    pub fn from_json(text: &str) -> Self {
        from_json_or_default(text)
    }

    /// Reads a saved document from disk. Only I/O failures are errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Copies every section `other` carries over this document.
    pub fn merge(&mut self, other: PortfolioDocument) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(session_id, client_id, stool, wallflower, flip_disc, disco_knob, lights_on);
    }
}

/// Keyed document storage.
pub trait ConfigStore {
    /// Saved document for `session`, or an empty one.
    fn get_config(&mut self, session: &str) -> PortfolioDocument;
    fn save_config(&mut self, session: &str, document: PortfolioDocument) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Entry {
    document: PortfolioDocument,
    expires_at: DateTime<Utc>,
}

/// In-memory store whose sessions expire a fixed time after their last
/// write.
#[derive(Debug, Clone)]
pub struct SessionStore {
    entries: HashMap<String, Entry>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::minutes(SESSION_TTL_MINUTES))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_config_at(&mut self, session: &str, now: DateTime<Utc>) -> PortfolioDocument {
        match self.entries.get(session) {
            Some(entry) if entry.expires_at > now => entry.document.clone(),
            Some(_) => {
                tracing::debug!(session, "session expired");
                self.entries.remove(session);
                PortfolioDocument::default()
            }
            None => PortfolioDocument::default(),
        }
    }

    /// Merges `document` into the live session and restarts its expiry.
    pub fn save_config_at(&mut self, session: &str, document: PortfolioDocument, now: DateTime<Utc>) {
        let mut stored = self.get_config_at(session, now);
        stored.merge(document);
        stored.session_id = Some(session.to_string());
        self.entries.insert(
            session.to_string(),
            Entry {
                document: stored,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Drops every expired session.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }
}

impl ConfigStore for SessionStore {
    fn get_config(&mut self, session: &str) -> PortfolioDocument {
        self.get_config_at(session, Utc::now())
    }

    fn save_config(&mut self, session: &str, document: PortfolioDocument) -> Result<()> {
        self.save_config_at(session, document, Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn empty_object_is_an_empty_document() {
        let document: PortfolioDocument = serde_json::from_str("{}").unwrap();
        assert!(document.is_empty());
    }

    #[test]
    fn unreadable_text_is_an_empty_document() {
        assert!(PortfolioDocument::from_json("{ not json").is_empty());

        let document = PortfolioDocument::from_json(r#"{"clientId": "kiosk", "lightsOn": false}"#);
        assert_eq!(document.client_id.as_deref(), Some("kiosk"));
        assert_eq!(document.lights_on, Some(false));

        assert!(PortfolioDocument::load("/definitely/not/here.json").is_err());
    }

    #[test]
    fn malformed_sections_are_dropped() {
        let document: PortfolioDocument = serde_json::from_value(serde_json::json!({
            "stool": {"controllers": "nope", "profiles": [{"profileType": 3}, 7]},
            "wallflower": 12,
            "lightsOn": "yes",
            "flipDisc": {"pattern": {"id": 2, "speed": 2.0, "enable": true}}
        }))
        .unwrap();

        let stool = document.stool.unwrap();
        assert!(stool.controllers.is_empty());
        assert_eq!(stool.profiles.len(), 1);
        assert!(document.wallflower.is_none());
        assert!(document.lights_on.is_none());
        assert_eq!(document.flip_disc.unwrap().pattern.unwrap().id, 2);
    }

    #[test]
    fn sessions_slide_and_expire() {
        let mut store = SessionStore::new();
        let t0 = start();
        let document = PortfolioDocument {
            lights_on: Some(true),
            ..PortfolioDocument::default()
        };
        store.save_config_at("abc", document, t0);

        let later = t0 + Duration::minutes(9);
        assert_eq!(store.get_config_at("abc", later).lights_on, Some(true));

        // a write restarts the clock
        store.save_config_at("abc", PortfolioDocument::default(), later);
        let after = later + Duration::minutes(9);
        let kept = store.get_config_at("abc", after);
        assert_eq!(kept.lights_on, Some(true));
        assert_eq!(kept.session_id.as_deref(), Some("abc"));

        assert!(store.get_config_at("abc", after + Duration::minutes(2)).is_empty());
        assert!(store.is_empty());
        assert!(store.get_config_at("unknown", t0).is_empty());
    }

    #[test]
    fn saves_merge_sections() {
        let mut store = SessionStore::new();
        let t0 = start();
        store.save_config_at(
            "s",
            PortfolioDocument {
                lights_on: Some(false),
                ..PortfolioDocument::default()
            },
            t0,
        );
        store.save_config_at(
            "s",
            PortfolioDocument {
                stool: Some(InstallationConfig::default()),
                ..PortfolioDocument::default()
            },
            t0,
        );
        let document = store.get_config_at("s", t0);
        assert_eq!(document.lights_on, Some(false));
        assert!(document.stool.is_some());

        store.save_config_at("other", PortfolioDocument::default(), t0 + Duration::minutes(5));
        assert_eq!(store.purge_expired(t0 + Duration::minutes(11)), 1);
        assert_eq!(store.len(), 1);
    }
}

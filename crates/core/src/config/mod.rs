//! Typed configuration for the simulated installations.
//!
//! Documents coming back from persistence or over the bus have no guaranteed
//! shape. Each persisted structure therefore has a strict internal type and a
//! `Partial*` twin whose fields all deserialize through [`lenient`]: a missing
//! field, a `null`, or a value of the wrong type all become `None`. Partials
//! are merged onto defaults once, at the boundary.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

pub mod audio;
pub mod schema;

pub use audio::{AudioConfig, AudioMode, Band, BandMask, BandWeights, PartialAudioConfig};
pub use schema::{
    ControllerSchema, DiscoKnobSchema, FlipDiscSchema, MaterialBinding, ModelPlacement,
    PartSchema, SupplySchema, Vec3,
};

/// Settings for the real-time spectral capture stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyserConfig {
    pub sample_rate: u32,
    pub fft_size: usize,
    /// Blend factor between the previous and the current magnitude frame.
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            fft_size: 1024,
            smoothing_time_constant: 0.3,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// Timing of the idle choreography run by a neon manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PassiveConfig {
    pub enabled: bool,
    /// Seconds without user input before passive mode may take over again.
    pub idle_threshold: f32,
    pub profile_set_duration: f32,
    pub motor_change_duration: f32,
    pub motor_transition_duration: f32,
}

impl Default for PassiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_threshold: 60.0,
            profile_set_duration: 120.0,
            motor_change_duration: 8.0,
            motor_transition_duration: 1.5,
        }
    }
}

/// Deserializes any JSON value and keeps it only if it converts to `T`.
///
/// Use together with `#[serde(default)]` on `Option` fields.
pub fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Like [`lenient`] but falls back to `T::default()` for plain fields.
pub fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

/// Like [`lenient`] for sequences, but keeps every element that converts and
/// drops the rest.
pub fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Copies `values` over the front of `base`. Extra values are ignored and
/// missing ones keep the default.
pub(crate) fn overlay<T: Copy, const N: usize>(base: &mut [T; N], values: &[T]) {
    for (slot, value) in base.iter_mut().zip(values) {
        *slot = *value;
    }
}

/// Parses a document leniently, falling back to `T::default()` when the text
/// is not JSON at all.
pub fn from_json_or_default<T>(text: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(%error, "discarding malformed configuration document");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "lenient")]
        speed: Option<f32>,
        #[serde(default, deserialize_with = "lenient_vec")]
        items: Vec<u8>,
        #[serde(default, deserialize_with = "lenient_or_default")]
        flag: bool,
    }

    #[test]
    fn wrong_types_become_none() {
        let sample: Sample = serde_json::from_str(r#"{"speed": "fast"}"#).unwrap();
        assert_eq!(sample.speed, None);

        let sample: Sample = serde_json::from_str(r#"{"speed": null}"#).unwrap();
        assert_eq!(sample.speed, None);

        let sample: Sample = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(sample.speed, None);

        let sample: Sample = serde_json::from_str(r#"{"flag": "yes"}"#).unwrap();
        assert!(!sample.flag);
        let sample: Sample = serde_json::from_str(r#"{"flag": true}"#).unwrap();
        assert!(sample.flag);
    }

    #[test]
    fn lenient_vec_keeps_valid_elements() {
        let sample: Sample = serde_json::from_str(r#"{"items": [1, "x", 3, -4]}"#).unwrap();
        assert_eq!(sample.items, vec![1, 3]);

        let sample: Sample = serde_json::from_str(r#"{"items": 7}"#).unwrap();
        assert!(sample.items.is_empty());
    }

    #[test]
    fn overlay_pads_with_defaults() {
        let mut base = [0.5_f32; 3];
        overlay(&mut base, &[0.1]);
        assert_eq!(base, [0.1, 0.5, 0.5]);

        overlay(&mut base, &[0.2, 0.3, 0.4, 0.9]);
        assert_eq!(base, [0.2, 0.3, 0.4]);
    }

    #[test]
    fn malformed_documents_fall_back_to_defaults() {
        let config: PassiveConfig = from_json_or_default("not json");
        assert_eq!(config, PassiveConfig::default());

        let config: PassiveConfig = from_json_or_default(r#"{"idleThreshold": 5}"#);
        assert_eq!(config.idle_threshold, 5.0);
        assert_eq!(config.profile_set_duration, 120.0);
    }
}

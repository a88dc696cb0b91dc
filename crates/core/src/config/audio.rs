use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use super::{lenient, overlay};

/// Number of spectral readings that make up one band.
pub const BINS_PER_BAND: usize = 5;

/// Default magnitude a band has to exceed before a supply pulses.
pub const DEFAULT_THRESHOLD: f32 = 0.25;

/// One of the three frequency bands used for audio reactivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Low,
    Mid,
    High,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Low, Band::Mid, Band::High];

    pub fn index(self) -> usize {
        match self {
            Band::Low => 0,
            Band::Mid => 1,
            Band::High => 2,
        }
    }

    pub fn mask(self) -> BandMask {
        match self {
            Band::Low => BandMask::LOW,
            Band::Mid => BandMask::MID,
            Band::High => BandMask::HIGH,
        }
    }
}

/// Band assignment of a supply, as the bit flags used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandMask(pub u8);

impl BandMask {
    pub const NONE: BandMask = BandMask(0);
    pub const LOW: BandMask = BandMask(1);
    pub const MID: BandMask = BandMask(2);
    pub const HIGH: BandMask = BandMask(4);

    pub fn is_none(self) -> bool {
        self.bands().next().is_none()
    }

    pub fn contains(self, band: Band) -> bool {
        self.0 & band.mask().0 != 0
    }

    /// Bands set in this mask, low to high.
    pub fn bands(self) -> impl Iterator<Item = Band> {
        Band::ALL.into_iter().filter(move |band| self.contains(*band))
    }
}

impl BitOr for BandMask {
    type Output = BandMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        BandMask(self.0 | rhs.0)
    }
}

/// How pulses are distributed across supplies. Only `Fixed` has its own
/// behaviour; the other modes currently pulse the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioMode {
    #[default]
    Fixed,
    Random,
    Sequential,
}

/// Per-reading weights applied to the smoothed magnitudes of each band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandWeights {
    pub low: [f32; BINS_PER_BAND],
    pub mid: [f32; BINS_PER_BAND],
    pub high: [f32; BINS_PER_BAND],
}

impl Default for BandWeights {
    fn default() -> Self {
        Self {
            low: [0.4, 0.4, 0.1, 0.1, 0.0],
            mid: [0.2; BINS_PER_BAND],
            high: [0.5, 0.5, 0.0, 0.0, 0.0],
        }
    }
}

impl BandWeights {
    pub fn band(&self, band: Band) -> &[f32; BINS_PER_BAND] {
        match band {
            Band::Low => &self.low,
            Band::Mid => &self.mid,
            Band::High => &self.high,
        }
    }

    pub fn merge(&mut self, partial: &PartialBandWeights) {
        if let Some(low) = &partial.low {
            overlay(&mut self.low, low);
        }
        if let Some(mid) = &partial.mid {
            overlay(&mut self.mid, mid);
        }
        if let Some(high) = &partial.high {
            overlay(&mut self.high, high);
        }
    }
}

/// Fully populated audio reactivity configuration owned by a neon manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    pub audio_mode: AudioMode,
    pub audio_allow_multiple_active: bool,
    pub audio_weights: BandWeights,
    /// Smoothing coefficient used while a reading rises.
    pub audio_fast_alpha: f32,
    /// Smoothing coefficient used while a reading falls.
    pub audio_slow_alpha: f32,
    /// `[controller][supply]` band assignments.
    pub audio_supply_flags: Vec<Vec<BandMask>>,
    /// One threshold per band, low/mid/high.
    pub audio_magnitude_thresholds: [f32; 3],
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self::with_layout(0, 0)
    }
}

impl AudioConfig {
    /// Defaults sized for an installation, with every supply unassigned.
    pub fn with_layout(num_controllers: usize, supplies_per_controller: usize) -> Self {
        Self {
            audio_mode: AudioMode::Fixed,
            audio_allow_multiple_active: false,
            audio_weights: BandWeights::default(),
            audio_fast_alpha: 0.9,
            audio_slow_alpha: 0.2,
            audio_supply_flags: vec![vec![BandMask::NONE; supplies_per_controller]; num_controllers],
            audio_magnitude_thresholds: [DEFAULT_THRESHOLD; 3],
        }
    }

    /// Band assignment for a supply; out-of-range indices are unassigned.
    pub fn supply_flag(&self, controller: usize, supply: usize) -> BandMask {
        self.audio_supply_flags
            .get(controller)
            .and_then(|row| row.get(supply))
            .copied()
            .unwrap_or(BandMask::NONE)
    }

    pub fn threshold(&self, band: Band) -> f32 {
        self.audio_magnitude_thresholds[band.index()]
    }

    /// Applies every field present in `partial`, leaving the rest untouched.
    pub fn merge(&mut self, partial: &PartialAudioConfig) {
        if let Some(mode) = partial.audio_mode {
            self.audio_mode = mode;
        }
        if let Some(allow) = partial.audio_allow_multiple_active {
            self.audio_allow_multiple_active = allow;
        }
        if let Some(weights) = &partial.audio_weights {
            self.audio_weights.merge(weights);
        }
        if let Some(alpha) = partial.audio_fast_alpha {
            self.audio_fast_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Some(alpha) = partial.audio_slow_alpha {
            self.audio_slow_alpha = alpha.clamp(0.0, 1.0);
        }
        if let Some(rows) = &partial.audio_supply_flags {
            for (index, row) in rows.iter().enumerate() {
                match self.audio_supply_flags.get_mut(index) {
                    Some(existing) => {
                        if existing.len() < row.len() {
                            existing.resize(row.len(), BandMask::NONE);
                        }
                        existing[..row.len()].copy_from_slice(row);
                    }
                    None => self.audio_supply_flags.push(row.clone()),
                }
            }
        }
        if let Some(thresholds) = &partial.audio_magnitude_thresholds {
            overlay(&mut self.audio_magnitude_thresholds, thresholds);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialBandWeights {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub low: Option<Vec<f32>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub mid: Option<Vec<f32>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub high: Option<Vec<f32>>,
}

/// Audio configuration as received from persistence or the configuration
/// panel. Every field is optional and tolerant of wrong types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialAudioConfig {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub audio_mode: Option<AudioMode>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub audio_allow_multiple_active: Option<bool>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub audio_weights: Option<PartialBandWeights>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub audio_fast_alpha: Option<f32>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub audio_slow_alpha: Option<f32>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub audio_supply_flags: Option<Vec<Vec<BandMask>>>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub audio_magnitude_thresholds: Option<Vec<f32>>,
}

impl From<&AudioConfig> for PartialAudioConfig {
    fn from(config: &AudioConfig) -> Self {
        Self {
            audio_mode: Some(config.audio_mode),
            audio_allow_multiple_active: Some(config.audio_allow_multiple_active),
            audio_weights: Some(PartialBandWeights {
                low: Some(config.audio_weights.low.to_vec()),
                mid: Some(config.audio_weights.mid.to_vec()),
                high: Some(config.audio_weights.high.to_vec()),
            }),
            audio_fast_alpha: Some(config.audio_fast_alpha),
            audio_slow_alpha: Some(config.audio_slow_alpha),
            audio_supply_flags: Some(config.audio_supply_flags.clone()),
            audio_magnitude_thresholds: Some(config.audio_magnitude_thresholds.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_combine_and_report_bands() {
        let mask = BandMask::LOW | BandMask::HIGH;
        assert!(mask.contains(Band::Low));
        assert!(!mask.contains(Band::Mid));
        assert_eq!(mask.bands().collect::<Vec<_>>(), vec![Band::Low, Band::High]);
        assert!(BandMask::NONE.is_none());
        assert!(BandMask(8).is_none());
    }

    #[test]
    fn empty_partial_keeps_defaults() {
        let partial: PartialAudioConfig = serde_json::from_str("{}").unwrap();
        let mut config = AudioConfig::with_layout(3, 2);
        config.merge(&partial);
        assert_eq!(config, AudioConfig::with_layout(3, 2));
    }

    #[test]
    fn merges_short_and_malformed_fields() {
        let partial: PartialAudioConfig = serde_json::from_str(
            r#"{
                "audioMode": "bogus",
                "audioFastAlpha": 0.7,
                "audioSlowAlpha": "slow",
                "audioWeights": {"low": [1.0], "mid": "x"},
                "audioSupplyFlags": [[1], [2, 4]],
                "audioMagnitudeThresholds": [0.5]
            }"#,
        )
        .unwrap();

        let mut config = AudioConfig::with_layout(3, 2);
        config.merge(&partial);

        assert_eq!(config.audio_mode, AudioMode::Fixed);
        assert_eq!(config.audio_fast_alpha, 0.7);
        assert_eq!(config.audio_slow_alpha, 0.2);
        assert_eq!(config.audio_weights.low, [1.0, 0.4, 0.1, 0.1, 0.0]);
        assert_eq!(config.audio_weights.mid, [0.2; 5]);
        assert_eq!(config.supply_flag(0, 0), BandMask::LOW);
        assert_eq!(config.supply_flag(0, 1), BandMask::NONE);
        assert_eq!(config.supply_flag(1, 1), BandMask::HIGH);
        assert_eq!(config.supply_flag(2, 0), BandMask::NONE);
        assert_eq!(config.audio_magnitude_thresholds, [0.5, 0.25, 0.25]);
    }

    #[test]
    fn out_of_range_flags_are_unassigned() {
        let config = AudioConfig::with_layout(1, 1);
        assert_eq!(config.supply_flag(5, 0), BandMask::NONE);
        assert_eq!(config.supply_flag(0, 9), BandMask::NONE);
    }

    #[test]
    fn round_trips_through_partial() {
        let mut config = AudioConfig::with_layout(2, 2);
        config.audio_supply_flags[1][0] = BandMask::MID;
        let partial = PartialAudioConfig::from(&config);

        let mut rebuilt = AudioConfig::default();
        rebuilt.merge(&partial);
        assert_eq!(rebuilt, config);
    }
}

use crate::{
    audio::Readings,
    config::{audio::BINS_PER_BAND, AudioConfig, AudioMode, Band, BandMask},
    neon::messages::{AudioMessage, ControllerAudio},
};

/// Prevailing weighted magnitude of each band on one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandMagnitudes {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl BandMagnitudes {
    pub fn new(low: f32, mid: f32, high: f32) -> Self {
        Self { low, mid, high }
    }

    /// Collapses each band's five weighted readings to their peak.
    pub fn from_readings(readings: &Readings) -> Self {
        let peak = |band: Band| {
            let start = band.index() * BINS_PER_BAND;
            readings[start..start + BINS_PER_BAND]
                .iter()
                .fold(0.0_f32, |peak, value| peak.max(*value))
        };
        Self::new(peak(Band::Low), peak(Band::Mid), peak(Band::High))
    }

    pub fn get(&self, band: Band) -> f32 {
        match band {
            Band::Low => self.low,
            Band::Mid => self.mid,
            Band::High => self.high,
        }
    }
}

/// Threshold stage of the audio pipeline: decides which supplies pulse.
#[derive(Debug, Default)]
pub struct PulseGenerator {
    bands: BandMagnitudes,
    messages: Vec<ControllerAudio>,
}

impl PulseGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bands(&self) -> BandMagnitudes {
        self.bands
    }

    pub fn update_frequency_magnitudes(&mut self, readings: &Readings) {
        self.bands = BandMagnitudes::from_readings(readings);
    }

    pub fn set_bands(&mut self, bands: BandMagnitudes) {
        self.bands = bands;
    }

    /// Decides this tick's pulse from `readings`. `supply_counts` holds the
    /// number of supplies of each controller. Returns whether any controller
    /// has a supply above threshold.
    pub fn generate_pulse(
        &mut self,
        readings: &Readings,
        config: &AudioConfig,
        supply_counts: &[usize],
    ) -> bool {
        self.update_frequency_magnitudes(readings);
        match config.audio_mode {
            AudioMode::Fixed => self.generate_fixed_pulse(config, supply_counts),
            mode => {
                tracing::trace!(?mode, "audio mode has no own distribution, pulsing as fixed");
                self.generate_fixed_pulse(config, supply_counts)
            }
        }
    }

    /// Marks every supply whose assigned band exceeds that band's threshold.
    /// A supply with several bands keeps only the bands that crossed.
    pub fn generate_fixed_pulse(&mut self, config: &AudioConfig, supply_counts: &[usize]) -> bool {
        let bands = self.bands;
        self.messages = supply_counts
            .iter()
            .enumerate()
            .map(|(controller, supplies)| {
                let audio_supply_flags: Vec<BandMask> = (0..*supplies)
                    .map(|supply| {
                        config
                            .supply_flag(controller, supply)
                            .bands()
                            .filter(|band| bands.get(*band) > config.threshold(*band))
                            .fold(BandMask::NONE, |mask, band| mask | band.mask())
                    })
                    .collect();
                let mut message = ControllerAudio {
                    controller_index: controller,
                    audio_supply_flags,
                    ..ControllerAudio::default()
                };
                if message.has_active_supply() {
                    message.weighted_low_magnitude = bands.low;
                    message.weighted_mid_magnitude = bands.mid;
                    message.weighted_high_magnitude = bands.high;
                }
                message
            })
            .collect();

        self.messages.iter().any(ControllerAudio::has_active_supply)
    }

    /// Per-controller results of the last pulse, active or not.
    pub fn messages(&self) -> &[ControllerAudio] {
        &self.messages
    }

    /// Audio message for `controller` if it has an active supply.
    pub fn message_for(&self, controller: usize) -> Option<AudioMessage> {
        self.messages
            .get(controller)
            .filter(|message| message.has_active_supply())
            .map(|message| AudioMessage {
                audio: vec![message.clone()],
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(flags: Vec<Vec<BandMask>>) -> AudioConfig {
        let mut config = AudioConfig::with_layout(flags.len(), 2);
        config.audio_supply_flags = flags;
        config
    }

    #[test]
    fn collapse_takes_band_peaks() {
        let mut readings = [0.0; 15];
        readings[2] = 0.4;
        readings[6] = 0.2;
        readings[14] = 0.9;
        assert_eq!(BandMagnitudes::from_readings(&readings), BandMagnitudes::new(0.4, 0.2, 0.9));
    }

    #[test]
    fn only_bands_above_threshold_pulse() {
        let mut generator = PulseGenerator::new();
        generator.set_bands(BandMagnitudes::new(0.5, 0.1, 0.1));
        let config = config(vec![
            vec![BandMask::LOW, BandMask::MID],
            vec![BandMask::HIGH, BandMask::NONE],
        ]);

        assert!(generator.generate_fixed_pulse(&config, &[2, 2]));
        let messages = generator.messages();
        assert_eq!(messages[0].audio_supply_flags, vec![BandMask::LOW, BandMask::NONE]);
        assert_eq!(messages[1].audio_supply_flags, vec![BandMask::NONE, BandMask::NONE]);
        assert!(generator.message_for(0).is_some());
        assert!(generator.message_for(1).is_none());
    }

    #[test]
    fn low_band_pulse_reaches_controller() {
        let mut generator = PulseGenerator::new();
        generator.set_bands(BandMagnitudes::new(0.3, 0.0, 0.0));
        let config = config(vec![vec![BandMask::LOW, BandMask::NONE]]);

        assert!(generator.generate_fixed_pulse(&config, &[2]));
        let message = generator.message_for(0).unwrap();
        assert_eq!(message.audio[0].weighted_low_magnitude, 0.3);

        let schema = crate::config::schema::wallflower_schema().remove(0);
        let mut controller = crate::neon::NeonController::new(0, schema);
        controller.handle_audio_message(&message);
        assert!(controller.supplies()[0].audio_active);
        assert_eq!(controller.supplies()[0].target_magnitude, 0.3);
        assert!(!controller.supplies()[1].audio_active);
    }

    #[test]
    fn threshold_is_strict() {
        let mut generator = PulseGenerator::new();
        generator.set_bands(BandMagnitudes::new(0.25, 0.0, 0.0));
        let config = config(vec![vec![BandMask::LOW, BandMask::LOW]]);
        assert!(!generator.generate_fixed_pulse(&config, &[2]));
    }

    #[test]
    fn multi_band_supply_keeps_crossing_bands() {
        let mut generator = PulseGenerator::new();
        generator.set_bands(BandMagnitudes::new(0.1, 0.6, 0.4));
        let config = config(vec![vec![BandMask::LOW | BandMask::MID | BandMask::HIGH]]);
        assert!(generator.generate_fixed_pulse(&config, &[1]));
        assert_eq!(
            generator.messages()[0].audio_supply_flags[0],
            BandMask::MID | BandMask::HIGH
        );
    }

    #[test]
    fn missing_flag_rows_stay_silent() {
        let mut generator = PulseGenerator::new();
        generator.set_bands(BandMagnitudes::new(1.0, 1.0, 1.0));
        let config = config(vec![vec![BandMask::LOW]]);
        assert!(generator.generate_fixed_pulse(&config, &[2, 2, 2]));
        assert_eq!(generator.messages()[0].audio_supply_flags, vec![BandMask::LOW, BandMask::NONE]);
        assert!(!generator.messages()[2].has_active_supply());
    }
}

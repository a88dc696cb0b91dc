use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::AnalyserConfig, NeonRoomError, Result};

/// Real-time spectral capture producing byte-resolution magnitudes.
///
/// Each call takes the most recent `fft_size` samples of the playing clip,
/// applies a Blackman window, transforms them and blends the normalised
/// magnitudes with the previous frame using the smoothing time constant.
/// Magnitudes are converted to decibels and mapped linearly from
/// `[min_decibels, max_decibels]` onto `0..=255`.
pub struct SpectrumAnalyser {
    config: AnalyserConfig,
    planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
}

impl SpectrumAnalyser {
    pub fn new(config: AnalyserConfig) -> Self {
        Self {
            config,
            planner: RealFftPlanner::new(),
            fft: None,
            smoothed: Vec::new(),
            bytes: Vec::new(),
        }
    }

    pub fn config(&self) -> &AnalyserConfig {
        &self.config
    }

    /// Number of frequency bins produced per frame.
    pub fn bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    /// Centre frequency of a bin in Hz.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.config.sample_rate as f32 / self.config.fft_size.max(1) as f32
    }

    /// Forgets the smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|value| *value = 0.0);
        self.bytes.iter_mut().for_each(|value| *value = 0);
    }

    /// Analyses the tail of `window` and returns the byte spectrum. Shorter
    /// windows are zero padded at the front.
    pub fn byte_frequency_data(&mut self, window: &[f32]) -> Result<&[u8]> {
        let size = self.config.fft_size;
        if size < 2 || !size.is_power_of_two() {
            return Err(NeonRoomError::InvalidInput(
                "fft size must be a power of two of at least 2",
            ));
        }

        let bins = size / 2;
        if self.smoothed.len() != bins {
            self.smoothed = vec![0.0; bins];
            self.bytes = vec![0; bins];
        }

        let smoothing = self.config.smoothing_time_constant.clamp(0.0, 1.0);
        let min_db = self.config.min_decibels;
        let range_db = (self.config.max_decibels - min_db).max(f32::EPSILON);

        let Self {
            planner,
            fft,
            smoothed,
            bytes,
            ..
        } = self;
        let fft = prepare_fft(planner, fft, size)?;
        let tail = &window[window.len().saturating_sub(size)..];
        let padding = size - tail.len();
        for (index, slot) in fft.input.iter_mut().enumerate() {
            *slot = if index < padding {
                0.0
            } else {
                tail[index - padding] * blackman_value(index, size)
            };
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        for (bin, (smoothed, byte)) in smoothed.iter_mut().zip(bytes.iter_mut()).enumerate() {
            let magnitude = fft.spectrum[bin].norm() / size as f32;
            *smoothed = smoothing * *smoothed + (1.0 - smoothing) * magnitude;

            let decibels = if *smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = 255.0 * (decibels - min_db) / range_db;
            *byte = scaled.clamp(0.0, 255.0) as u8;
        }

        Ok(bytes.as_slice())
    }
}

fn prepare_fft<'a>(
    planner: &mut RealFftPlanner<f32>,
    slot: &'a mut Option<FftResources>,
    size: usize,
) -> Result<&'a mut FftResources> {
    let rebuild = slot.as_ref().map(|fft| fft.size != size).unwrap_or(true);

    if rebuild {
        let plan = planner.plan_fft_forward(size);
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let input = plan.make_input_vec();
        *slot = Some(FftResources {
            size,
            plan,
            scratch,
            spectrum,
            input,
        });
    }

    slot.as_mut()
        .ok_or_else(|| NeonRoomError::msg("fft resources were not prepared"))
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("config", &self.config)
            .field("fft", &self.fft)
            .field("bins", &self.smoothed.len())
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    let x = index as f32 / len as f32;
    a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frequency: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| amplitude * (2.0 * PI * frequency * n as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero() {
        let mut analyser = SpectrumAnalyser::new(AnalyserConfig::default());
        let bytes = analyser.byte_frequency_data(&[0.0; 1024]).unwrap();
        assert_eq!(bytes.len(), 512);
        assert!(bytes.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn tone_lights_up_its_bin() {
        let config = AnalyserConfig::default();
        let mut analyser = SpectrumAnalyser::new(config.clone());
        // bin 3 of a 1024 point transform at 48 kHz
        let frequency = analyser.bin_frequency(3);
        let samples = tone(frequency, 1.0, config.sample_rate, 1024);

        let bytes = analyser.byte_frequency_data(&samples).unwrap();
        assert_eq!(bytes[3], 255);
        assert!(bytes[100] < 50);
    }

    #[test]
    fn smoothing_carries_previous_frame() {
        let config = AnalyserConfig::default();
        let mut analyser = SpectrumAnalyser::new(config.clone());
        let frequency = analyser.bin_frequency(40);
        let samples = tone(frequency, 0.001, config.sample_rate, 1024);

        let loud = analyser.byte_frequency_data(&samples).unwrap()[40];
        let decayed = analyser.byte_frequency_data(&[0.0; 1024]).unwrap()[40];
        assert!(decayed > 0);
        assert!(decayed < loud);

        analyser.reset();
        let cleared = analyser.byte_frequency_data(&[0.0; 1024]).unwrap()[40];
        assert_eq!(cleared, 0);
    }

    #[test]
    fn short_windows_are_padded() {
        let mut analyser = SpectrumAnalyser::new(AnalyserConfig::default());
        assert_eq!(analyser.byte_frequency_data(&[0.5; 10]).unwrap().len(), 512);
    }

    #[test]
    fn rejects_invalid_sizes() {
        let config = AnalyserConfig {
            fft_size: 1000,
            ..AnalyserConfig::default()
        };
        let mut analyser = SpectrumAnalyser::new(config);
        assert!(analyser.byte_frequency_data(&[0.0; 1000]).is_err());
    }
}

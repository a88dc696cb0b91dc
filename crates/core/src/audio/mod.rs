use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    analysis::SpectrumAnalyser,
    config::{audio::BINS_PER_BAND, AnalyserConfig, AudioConfig, BandWeights},
    NeonRoomError, Result,
};

/// Spectrum bins sampled for the low band.
pub const LOW_BINS: [usize; BINS_PER_BAND] = [1, 2, 3, 4, 5];
/// Spectrum bins sampled for the mid band.
pub const MID_BINS: [usize; BINS_PER_BAND] = [20, 30, 40, 50, 60];
/// Spectrum bins sampled for the high band.
pub const HIGH_BINS: [usize; BINS_PER_BAND] = [80, 90, 100, 110, 120];

/// Number of scalar readings produced per tick: five per band.
pub const READING_COUNT: usize = 3 * BINS_PER_BAND;

/// Weighted readings in low, mid, high order.
pub type Readings = [f32; READING_COUNT];

/// Mono PCM clip held in memory.
#[derive(Debug, Clone)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Decodes a WAV file, mixing every channel down to mono.
    pub fn from_wav(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = hound::WavReader::open(path.as_ref())?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / scale))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        if interleaved.is_empty() {
            return Err(NeonRoomError::msg(format!(
                "clip `{}` contains no samples",
                path.as_ref().display()
            )));
        }

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Self::from_samples(samples, spec.sample_rate))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Up to `len` samples ending at `position` seconds.
    fn window_ending_at(&self, position: f32, len: usize) -> &[f32] {
        let end = ((position * self.sample_rate as f32) as usize).min(self.samples.len());
        &self.samples[end.saturating_sub(len)..end]
    }
}

/// Audio reactivity front end: clip playback, spectral capture, band
/// extraction, asymmetric smoothing and weighting.
///
/// Without a loaded clip every update is a no-op, which is how an
/// unavailable audio system degrades.
#[derive(Debug)]
pub struct AudioAnalyzer {
    analyser: SpectrumAnalyser,
    clip: Option<AudioClip>,
    playing: bool,
    looping: bool,
    autoplay: bool,
    position: f32,
    fast_alpha: f32,
    slow_alpha: f32,
    weights: BandWeights,
    smoothed: Readings,
    weighted: Readings,
}

impl Default for AudioAnalyzer {
    fn default() -> Self {
        Self::new(AnalyserConfig::default())
    }
}

impl AudioAnalyzer {
    pub fn new(config: AnalyserConfig) -> Self {
        let defaults = AudioConfig::default();
        Self {
            analyser: SpectrumAnalyser::new(config),
            clip: None,
            playing: false,
            looping: true,
            autoplay: false,
            position: 0.0,
            fast_alpha: defaults.audio_fast_alpha,
            slow_alpha: defaults.audio_slow_alpha,
            weights: defaults.audio_weights,
            smoothed: [0.0; READING_COUNT],
            weighted: [0.0; READING_COUNT],
        }
    }

    pub fn with_clip(mut self, clip: AudioClip) -> Self {
        self.set_clip(clip);
        self
    }

    /// Loads the clip at `path`. Returns `false` and leaves audio disabled
    /// when the clip cannot be decoded.
    pub fn initialize(&mut self, path: impl AsRef<Path>) -> bool {
        match self.try_initialize(path) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, "audio reactivity disabled");
                false
            }
        }
    }

    /// Like [`AudioAnalyzer::initialize`], reporting why audio is
    /// unavailable. A failed load drops any previous clip.
    pub fn try_initialize(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match AudioClip::from_wav(path) {
            Ok(clip) => {
                tracing::info!(
                    path = %path.display(),
                    seconds = clip.duration_seconds(),
                    sample_rate = clip.sample_rate(),
                    "audio clip loaded"
                );
                self.set_clip(clip);
                Ok(())
            }
            Err(error) => {
                self.clip = None;
                self.playing = false;
                Err(NeonRoomError::AudioUnavailable(format!("{}: {error}", path.display())))
            }
        }
    }

    pub fn set_clip(&mut self, clip: AudioClip) {
        let mut config = self.analyser.config().clone();
        config.sample_rate = clip.sample_rate();
        self.analyser = SpectrumAnalyser::new(config);
        self.clip = Some(clip);
        self.position = 0.0;
        if self.autoplay {
            self.play();
        }
    }

    pub fn is_available(&self) -> bool {
        self.clip.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn set_autoplay(&mut self, autoplay: bool) {
        self.autoplay = autoplay;
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    /// Starts the clip from the beginning.
    pub fn play(&mut self) -> bool {
        if self.clip.is_none() {
            tracing::warn!("cannot play: no audio clip loaded");
            return false;
        }
        self.stop();
        self.position = 0.0;
        self.playing = true;
        tracing::debug!("audio playback started");
        true
    }

    /// Stops playback and zeroes every magnitude. Returns `false` if nothing
    /// was playing.
    pub fn stop(&mut self) -> bool {
        if !self.playing {
            return false;
        }
        self.playing = false;
        self.reset_magnitudes();
        tracing::debug!("audio playback stopped");
        true
    }

    pub fn reset_magnitudes(&mut self) {
        self.smoothed = [0.0; READING_COUNT];
        self.weighted = [0.0; READING_COUNT];
        self.analyser.reset();
    }

    pub fn apply_configuration(&mut self, config: &AudioConfig) {
        self.fast_alpha = config.audio_fast_alpha;
        self.slow_alpha = config.audio_slow_alpha;
        self.weights = config.audio_weights.clone();
    }

    pub fn weighted(&self) -> &Readings {
        &self.weighted
    }

    /// Advances playback and returns this tick's weighted readings, or
    /// `None` when nothing is playing.
    pub fn update(&mut self, delta_time: f32) -> Option<Readings> {
        if !self.playing {
            return None;
        }
        let duration = self.clip.as_ref()?.duration_seconds();

        self.position += delta_time.max(0.0);
        if self.position >= duration {
            if self.looping && duration > 0.0 {
                self.position %= duration;
            } else {
                self.stop();
                return None;
            }
        }

        let clip = self.clip.as_ref()?;
        let window = clip.window_ending_at(self.position, self.analyser.config().fft_size);
        let bytes = match self.analyser.byte_frequency_data(window) {
            Ok(bytes) => bytes.to_vec(),
            Err(error) => {
                tracing::warn!(%error, "spectral capture failed");
                return None;
            }
        };

        Some(self.process_bytes(&bytes))
    }

    /// Runs band extraction, smoothing and weighting over one byte spectrum.
    pub fn process_bytes(&mut self, bytes: &[u8]) -> Readings {
        let bins = LOW_BINS.iter().chain(&MID_BINS).chain(&HIGH_BINS);
        for (slot, bin) in self.smoothed.iter_mut().zip(bins) {
            let raw = bytes.get(*bin).map_or(0.0, |byte| f32::from(*byte) / 255.0);
            let alpha = if raw > *slot {
                self.fast_alpha
            } else {
                self.slow_alpha
            };
            *slot = (alpha * raw + (1.0 - alpha) * *slot).clamp(0.0, 1.0);
        }

        let weights = self
            .weights
            .low
            .iter()
            .chain(&self.weights.mid)
            .chain(&self.weights.high);
        for ((out, smoothed), weight) in self.weighted.iter_mut().zip(&self.smoothed).zip(weights) {
            *out = smoothed * weight;
        }

        self.weighted
    }
}

/// One precomputed analysis frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFrame {
    pub time: f32,
    pub readings: Vec<f32>,
}

/// Plays `clip` once at `frame_rate` ticks per second and records the
/// weighted readings of every tick.
pub fn precompute_frames(
    clip: AudioClip,
    analyser: AnalyserConfig,
    config: &AudioConfig,
    frame_rate: f32,
) -> Result<Vec<SpectrumFrame>> {
    if frame_rate <= 0.0 {
        return Err(NeonRoomError::InvalidInput("frame rate must be positive"));
    }

    let mut analyzer = AudioAnalyzer::new(analyser).with_clip(clip);
    analyzer.apply_configuration(config);
    analyzer.set_looping(false);
    analyzer.play();

    let delta = 1.0 / frame_rate;
    let mut frames = Vec::new();
    while let Some(readings) = analyzer.update(delta) {
        frames.push(SpectrumFrame {
            time: analyzer.position(),
            readings: readings.to_vec(),
        });
    }
    Ok(frames)
}

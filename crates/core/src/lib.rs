//! Core library for the neon room installations.
//!
//! The room holds two neon installations (the wallflower and the stool), a
//! flip-disc display and a disco knob. Each module owns one subsystem:
//! waveform profiles, spectral capture and band analysis, the controller and
//! manager state machines, the flip-disc patterns, persistence and the bus
//! topics. Everything runs on simulated time so the managers can be driven
//! deterministically from tests or the headless simulator.

pub mod analysis;
pub mod assets;
pub mod audio;
pub mod config;
pub mod disco;
pub mod error;
pub mod flipdisc;
pub mod hub;
pub mod neon;
pub mod persistence;
pub mod profile;
pub mod render;
pub mod timeline;
pub mod transport;

pub use analysis::SpectrumAnalyser;
pub use assets::{DirectoryLoader, ModelCache, ModelLoader, SceneNode, StaticLoader};
pub use audio::{AudioAnalyzer, AudioClip, SpectrumFrame};
pub use config::{AudioConfig, PartialAudioConfig};
pub use disco::{DiscoKnobManager, DiscoMessage};
pub use error::{NeonRoomError, Result};
pub use flipdisc::{DisplayMode, FlipDiscManager, PatternKind, PatternRequest};
pub use hub::DeviceHub;
pub use neon::{Authority, NeonController, NeonManager};
pub use persistence::{ConfigStore, PortfolioDocument, SessionStore};
pub use profile::{Profile, ProfileExecutor, ProfileType};
pub use render::{MaterialState, Rgb};
pub use timeline::{PlaybackClock, ScheduledEvent, Scheduler};
pub use transport::{Device, InboundCommand, MemoryBus, Publisher, Topic};

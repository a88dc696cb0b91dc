use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use neon_room_core::{
    audio::precompute_frames,
    config::{AnalyserConfig, AudioConfig},
    neon::Authority,
    profile::waveform,
    AudioClip, DeviceHub, Device, DirectoryLoader, MemoryBus, ModelCache, NeonRoomError,
    PlaybackClock, PortfolioDocument, ProfileType, Scheduler,
};
use rand::{rngs::StdRng, SeedableRng};
use tracing_subscriber::EnvFilter;

fn main() -> neon_room_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => run_simulation(&args),
        Commands::Waveform { kind, steps, seed } => run_waveform(&kind, steps, seed),
        Commands::Spectrum { input, output, fps } => run_spectrum(&input, &output, fps),
    }
}

fn run_simulation(args: &SimulateArgs) -> neon_room_core::Result<()> {
    if args.fps <= 0.0 || args.seconds < 0.0 {
        return Err(NeonRoomError::InvalidInput("fps must be positive and seconds non-negative"));
    }
    tracing::info!(fps = args.fps, seconds = args.seconds, seed = ?args.seed, "starting simulation");

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut hub = DeviceHub::with_rng(MemoryBus::new(), rng);

    if let Some(models) = &args.models {
        let mut loader = DirectoryLoader::new(models);
        let mut cache = ModelCache::new();
        if !hub.load_models(&mut loader, &mut cache) {
            tracing::warn!(root = %models.display(), "some models failed to load");
        }
    }

    if let Some(path) = &args.document {
        let document = PortfolioDocument::load(path)?;
        if document.is_empty() {
            tracing::warn!(path = %path.display(), "saved document is empty or malformed");
        }
        hub.load_document(&document);
    }

    if let Some(clip) = &args.clip {
        for device in [Device::Wallflower, Device::Stool] {
            if let Some(manager) = hub.neon_mut(device) {
                if manager.initialize_audio(clip) {
                    manager.audio_mut().play();
                }
            }
        }
    }

    let mut scheduler = match &args.scenario {
        Some(path) => Scheduler::load(path)?,
        None => Scheduler::new(),
    };
    tracing::info!(events = scheduler.len(), "scenario loaded");

    let delta = 1.0 / args.fps;
    let frames = (args.seconds * args.fps).round() as u64;
    let mut clock = PlaybackClock::default();
    let mut authority = [hub.wallflower().authority(), hub.stool().authority()];
    let mut authority_changes = 0_u32;

    for _ in 0..frames {
        clock.advance(delta);
        for event in scheduler.tick(&clock) {
            if let Err(error) = hub.handle_inbound(&event.topic, &event.payload) {
                tracing::warn!(topic = %event.topic, %error, "scenario event rejected");
            }
        }
        hub.update(delta);

        let current = [hub.wallflower().authority(), hub.stool().authority()];
        for (name, (before, after)) in ["wallflower", "stool"]
            .iter()
            .zip(authority.iter().zip(current.iter()))
        {
            if before != after {
                authority_changes += 1;
                tracing::info!(
                    installation = name,
                    time = clock.time_seconds,
                    from = describe(*before),
                    to = describe(*after),
                    "authority changed"
                );
            }
        }
        authority = current;
    }

    for manager in [hub.wallflower(), hub.stool()] {
        let stats = manager.stats();
        tracing::info!(
            installation = manager.name(),
            authority = describe(manager.authority()),
            profile_dispatches = stats.profile_dispatches,
            audio_dispatches = stats.audio_dispatches,
            passive_activations = stats.passive_activations,
            "installation summary"
        );
    }
    tracing::info!(
        mode = ?hub.flip().mode(),
        lit = hub.flip().lit_count(),
        disco_angle = hub.disco().angle(),
        frames = clock.frames(),
        authority_changes,
        pending_events = scheduler.remaining(),
        "simulation finished"
    );

    if let Some(output) = &args.output {
        std::fs::write(output, serde_json::to_string_pretty(&hub.snapshot())?)?;
        tracing::info!(path = %output.display(), "final state written");
    }
    Ok(())
}

fn describe(authority: Authority) -> String {
    match authority {
        Authority::Direct(source) => format!("{source:?}").to_lowercase(),
        Authority::Passive => "passive".into(),
        Authority::Idle => "idle".into(),
    }
}

fn run_waveform(kind: &str, steps: usize, seed: Option<u64>) -> neon_room_core::Result<()> {
    let kind = ProfileType::from_name(kind)
        .ok_or_else(|| NeonRoomError::msg(format!("unknown profile type `{kind}`")))?;
    if steps == 0 {
        return Err(NeonRoomError::InvalidInput("steps must be at least 1"));
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    println!("t\t{}", kind.name());
    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        println!("{t:.3}\t{:.4}", waveform(kind, t, &mut rng));
    }
    Ok(())
}

fn run_spectrum(input: &Path, output: &Path, fps: f32) -> neon_room_core::Result<()> {
    tracing::info!(input = %input.display(), output = %output.display(), fps, "precomputing spectrum");

    let clip = AudioClip::from_wav(input)?;
    let frames = precompute_frames(clip, AnalyserConfig::default(), &AudioConfig::default(), fps)?;
    std::fs::write(output, serde_json::to_string(&frames)?)?;

    tracing::info!(frames = frames.len(), "spectrum written");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless simulator for the neon room devices", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct SimulateArgs {
    /// Ticks per simulated second.
    #[arg(long, default_value_t = 60.0)]
    fps: f32,
    /// Simulated seconds to run.
    #[arg(long, default_value_t = 30.0)]
    seconds: f32,
    /// Saved room document to restore before the first tick.
    #[arg(long)]
    document: Option<PathBuf>,
    /// Scripted bus messages, as `[{"time", "topic", "payload"}]`.
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// WAV clip played into both installations.
    #[arg(long)]
    clip: Option<PathBuf>,
    /// Directory holding model descriptors.
    #[arg(long)]
    models: Option<PathBuf>,
    /// Where to write the final room state.
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the room at a fixed frame rate without a UI.
    Simulate(SimulateArgs),
    /// Tabulate one profile waveform over a cycle.
    Waveform {
        /// Profile name, e.g. `cosine` or `flicker`.
        kind: String,
        #[arg(long, default_value_t = 20)]
        steps: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Analyse a WAV clip ahead of time and write the weighted band readings.
    Spectrum {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = 60.0)]
        fps: f32,
    },
}

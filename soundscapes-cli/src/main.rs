//! Soundscapes CLI: real-time player for procedural ambience recipes.
//!
//! ```text
//! soundscapes --tags rain,thunder --duration 60
//! soundscapes --recipe storm.json --volume 0.6 --device "USB Audio"
//! RUST_LOG=soundscapes_engine=debug soundscapes --tags forest,birds
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use soundscapes_engine::control::TICK;
use soundscapes_engine::presets::{recipe_for_tags, AVAILABLE_TAGS};
use soundscapes_engine::{list_output_devices, CpalOutput, Engine, EngineConfig, Recipe, SharedEngine};
use tracing::info;
use tracing_subscriber::EnvFilter;

const METER_PERIOD: Duration = Duration::from_secs(1);
const WAKE_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(name = "soundscapes", version, about = "Play procedural ambient soundscapes")]
struct Args {
    /// Recipe document (JSON) to play.
    #[arg(long, conflicts_with = "tags")]
    recipe: Option<PathBuf>,

    /// Comma-separated scene tags, e.g. `rain,thunder`.
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Output device name (see --list-devices).
    #[arg(long)]
    device: Option<String>,

    #[arg(long)]
    sample_rate: Option<u32>,

    #[arg(long)]
    channels: Option<u16>,

    /// Stop after this many seconds instead of running until Ctrl+C.
    #[arg(long)]
    duration: Option<u64>,

    /// Master volume override, 0..1.
    #[arg(long)]
    volume: Option<f32>,

    /// Seed the timing RNG for a reproducible performance.
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    list_devices: bool,

    #[arg(long)]
    list_tags: bool,
}

fn load_recipe(args: &Args) -> Result<Recipe> {
    let mut recipe = match &args.recipe {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading recipe {}", path.display()))?;
            Recipe::from_json(&text).with_context(|| format!("parsing recipe {}", path.display()))?
        }
        None if !args.tags.is_empty() => recipe_for_tags(&args.tags),
        None => bail!("nothing to play: pass --recipe <file> or --tags <a,b,...>"),
    };
    if let Some(v) = args.volume {
        recipe.master_volume = Some(v);
    }
    if recipe.layers.is_empty() {
        bail!("recipe has no layers");
    }
    Ok(recipe)
}

/// Block until `running` clears or `deadline` passes, calling `meter` about
/// once per [`METER_PERIOD`].
fn wait(running: &AtomicBool, deadline: Option<Instant>, wake: Duration, mut meter: impl FnMut()) {
    let mut next_meter = Instant::now() + METER_PERIOD;
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(wake);
        let now = Instant::now();
        if now >= next_meter {
            meter();
            next_meter += METER_PERIOD;
        }
        if deadline.map_or(false, |d| now >= d) {
            break;
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if args.list_devices {
        println!("Available output devices:");
        for name in list_output_devices()? {
            println!("- {name}");
        }
        return Ok(());
    }
    if args.list_tags {
        println!("{}", AVAILABLE_TAGS.join(", "));
        return Ok(());
    }

    let recipe = load_recipe(&args)?;

    let mut output = CpalOutput::new();
    if let Some(name) = &args.device {
        output = output.with_device(name.clone());
    }
    if let Some(sr) = args.sample_rate {
        output = output.with_sample_rate(sr);
    }
    if let Some(ch) = args.channels {
        output = output.with_channels(ch);
    }

    let config = EngineConfig { seed: args.seed, ..EngineConfig::default() };
    let engine = SharedEngine::new(Engine::with_config(output, config));

    engine.play(&recipe).context("starting playback")?;
    for (i, layer) in engine.layers().iter().enumerate() {
        info!(index = i, kind = %layer.kind, gain = layer.gain, "layer");
    }
    let ticker = engine.spawn_ticker(TICK).context("spawning control thread")?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)).context("installing Ctrl+C handler")?;

    let telemetry = engine.lock().telemetry().context("no audio context")?;
    let deadline = args.duration.map(|d| Instant::now() + Duration::from_secs(d));
    match args.duration {
        Some(d) => info!("auto-stop after {d}s (Ctrl+C stops early)"),
        None => info!("press Ctrl+C to stop"),
    }

    wait(&running, deadline, WAKE_PERIOD, || {
        info!(
            peak = telemetry.take_peak(),
            master = telemetry.master_level(),
            voices = telemetry.voices(),
            "meter"
        );
    });
    if !running.load(Ordering::SeqCst) {
        info!("interrupted, shutting down");
    }

    ticker.stop();
    engine.lock().shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_ends_the_wait() {
        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        let flip = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            r.store(false, Ordering::SeqCst);
        });
        let started = Instant::now();
        wait(&running, None, Duration::from_millis(5), || {});
        flip.join().unwrap();
        assert!(started.elapsed() < METER_PERIOD);
    }

    #[test]
    fn deadline_ends_the_wait_and_meters_run() {
        let running = AtomicBool::new(true);
        let mut meters = 0;
        let deadline = Instant::now() + Duration::from_millis(1_150);
        wait(&running, Some(deadline), Duration::from_millis(10), || meters += 1);
        assert!(Instant::now() >= deadline);
        assert_eq!(meters, 1);
        assert!(running.load(Ordering::SeqCst));
    }

    #[test]
    fn tags_or_recipe_are_required() {
        let args = Args::parse_from(["soundscapes"]);
        assert!(load_recipe(&args).is_err());
        let args = Args::parse_from(["soundscapes", "--tags", "rain,thunder", "--volume", "0.3"]);
        let recipe = load_recipe(&args).unwrap();
        assert_eq!(recipe.master_volume, Some(0.3));
        assert!(!recipe.layers.is_empty());
    }
}

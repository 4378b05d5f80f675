use std::{f32::consts::TAU, path::PathBuf};

use audioreactive_core::{
    AppConfig, JsonFileStore, Layer, LayerRegistry, MemoryStore, ParamValue, RenderContext,
    RenderDriver, SpectrumAnalyser, StateStore,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Frames per second of the synthetic demo clock.
const DEMO_FPS: f32 = 60.0;

fn main() -> audioreactive_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            config,
            state,
            frames,
            layers,
        } => run_demo(config, state, frames, layers),
        Commands::Layers { state } => run_layers(state),
        Commands::Set {
            layer,
            key,
            value,
            config,
            state,
        } => run_set(&layer, &key, &value, config, state),
    }
}

fn load_config(path: Option<PathBuf>) -> audioreactive_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading configuration");
            AppConfig::load(&path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn open_store(path: Option<PathBuf>) -> Box<dyn StateStore> {
    match path {
        Some(path) => Box::new(JsonFileStore::open(path)),
        None => Box::new(MemoryStore::new()),
    }
}

fn run_demo(
    config: Option<PathBuf>,
    state: Option<PathBuf>,
    frames: usize,
    layers: Vec<String>,
) -> audioreactive_core::Result<()> {
    let config = load_config(config)?;
    let store = open_store(state.or_else(|| config.state_path.clone()));
    let mut analyser = SpectrumAnalyser::from_config(&config.audio)?;
    let mut driver = RenderDriver::new(
        config.extractor.clone(),
        LayerRegistry::with_builtin(),
        store,
        RenderContext::default(),
    )?;

    let active = if layers.is_empty() {
        config.active_layers.clone()
    } else {
        layers
    };
    tracing::info!(?active, frames, "starting demo");
    driver.set_active(active);

    let sample_rate = config.audio.sample_rate as f32;
    let hop = (sample_rate / DEMO_FPS).round() as usize;
    let mut synth = DemoSignal::new(sample_rate);
    let mut window = vec![0.0; analyser.fft_size()];
    let mut onsets = 0usize;

    for index in 0..frames {
        synth.advance(&mut window, hop);
        let spectrum = analyser.analyse(&window, sample_rate)?;
        let t_ms = index as f32 * 1_000.0 / DEMO_FPS;
        let report = driver.frame_at(
            t_ms,
            &spectrum.spectrum_db,
            spectrum.loudness_db,
            spectrum.sample_rate,
        );
        if report.onset {
            onsets += 1;
        }
        for failed in &report.failed_layers {
            tracing::warn!(layer = %failed, "layer unavailable for the rest of the demo");
        }
        if (index + 1) % DEMO_FPS as usize == 0 {
            let features = driver.features();
            tracing::info!(
                t_ms = features.t,
                energy = features.energy,
                low = features.bands.low,
                mid = features.bands.mid,
                high = features.bands.high,
                onsets,
                "feature summary"
            );
        }
    }

    let features = driver.features();
    tracing::info!(
        onsets,
        energy = features.energy,
        centroid_hz = features.centroid_hz,
        visible_nodes = driver.context().draw().visible_nodes,
        "demo finished"
    );
    println!("{}", serde_json::to_string_pretty(features)?);

    driver.shutdown();
    Ok(())
}

fn run_layers(state: Option<PathBuf>) -> audioreactive_core::Result<()> {
    let store = open_store(state);
    let mut registry = LayerRegistry::with_builtin();
    let ids: Vec<String> = registry.ids().into_iter().map(str::to_string).collect();
    let mut listing = Vec::new();
    for id in ids {
        let Some(layer) = registry.get_mut(&id) else {
            continue;
        };
        layer.configure(&store.load(&id));
        listing.push(json!({
            "id": layer.id(),
            "label": layer.label(),
            "controls": layer.controls(),
            "params": layer.params(),
        }));
    }
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

fn run_set(
    layer: &str,
    key: &str,
    value: &str,
    config: Option<PathBuf>,
    state: Option<PathBuf>,
) -> audioreactive_core::Result<()> {
    let config = load_config(config)?;
    let Some(state) = state.or_else(|| config.state_path.clone()) else {
        return Err("no state file: pass --state or set state_path in the configuration".into());
    };
    let store = Box::new(JsonFileStore::open(&state));
    let mut driver = RenderDriver::new(
        config.extractor.clone(),
        LayerRegistry::with_builtin(),
        store,
        RenderContext::default(),
    )?;
    driver.set_param(layer, key, ParamValue::parse_literal(value))?;

    if let Some(params) = driver.registry().get(layer).map(|l| l.params()) {
        tracing::info!(layer, key, path = %state.display(), "parameter saved");
        println!("{}", serde_json::to_string_pretty(params)?);
    }
    driver.shutdown();
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Kick drum every half second over a quiet sustained tone.
struct DemoSignal {
    sample_rate: f32,
    position: usize,
}

impl DemoSignal {
    const KICK_PERIOD_S: f32 = 0.5;

    fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            position: 0,
        }
    }

    /// Shifts `window` left by `hop` samples and fills the tail with new
    /// signal.
    fn advance(&mut self, window: &mut [f32], hop: usize) {
        let hop = hop.min(window.len());
        window.rotate_left(hop);
        let start = window.len() - hop;
        for sample in &mut window[start..] {
            *sample = self.next_sample();
        }
    }

    fn next_sample(&mut self) -> f32 {
        let t = self.position as f32 / self.sample_rate;
        self.position += 1;

        let tone = 0.05 * (TAU * 440.0 * t).sin();
        let since_kick = t % Self::KICK_PERIOD_S;
        let kick = 0.8 * (-since_kick * 30.0).exp() * (TAU * 55.0 * since_kick).sin();
        tone + kick
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a synthetic signal through the full pipeline and print the final
    /// feature snapshot.
    Demo {
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// JSON file holding persisted layer parameters.
        #[arg(short, long)]
        state: Option<PathBuf>,
        /// Number of frames to render.
        #[arg(short, long, default_value_t = 600)]
        frames: usize,
        /// Layers to enable; defaults to the configured set.
        #[arg(short, long)]
        layers: Vec<String>,
    },
    /// List every built-in layer with its controls and current parameters.
    Layers {
        #[arg(short, long)]
        state: Option<PathBuf>,
    },
    /// Validate and persist one layer parameter.
    Set {
        layer: String,
        key: String,
        /// Value literal: `true`, `false`, a number or free text.
        value: String,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// JSON file holding persisted layer parameters; defaults to the
        /// configured `state_path`.
        #[arg(short, long)]
        state: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &std::path::Path, config: serde_json::Value) -> PathBuf {
        let path = dir.join("config.json");
        std::fs::write(&path, config.to_string()).unwrap();
        path
    }

    #[test]
    fn set_falls_back_to_configured_state_path() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("layers.json");
        let config = write_config(dir.path(), json!({ "state_path": state }));

        run_set("bars", "mirror", "true", Some(config), None).unwrap();

        let stored = JsonFileStore::open(&state).load("bars");
        assert_eq!(stored.flag("mirror"), Some(true));
    }

    #[test]
    fn set_applies_the_given_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("layers.json");
        let config = write_config(dir.path(), json!({ "extractor": { "log_bins": 0 } }));

        assert!(run_set("bars", "mirror", "true", Some(config), Some(state.clone())).is_err());
        assert!(!state.exists());
    }

    #[test]
    fn set_needs_somewhere_to_persist() {
        assert!(run_set("bars", "mirror", "true", None, None).is_err());
    }
}

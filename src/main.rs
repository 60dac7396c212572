use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use distress_engine::alert::DeviceRegistry;
use distress_engine::pipeline::{AudioClip, DistressPipeline, SensorSample};
use distress_engine::{events, EngineConfig, EnsembleClassifier, GpsFix, VitalsSample};

/// Headless CLI for offline distress evaluation of a single sensor sample
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the ensemble model artifact (.json)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Path to the engine config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WAV clip to classify (mono or multi-channel, any sample rate)
    #[arg(short, long)]
    audio: Option<PathBuf>,

    /// Device ID the sample is attributed to
    #[arg(short, long, default_value = "device-001")]
    device: String,

    /// Heart rate in BPM
    #[arg(long)]
    heart_rate: Option<f64>,

    /// Body temperature in Celsius
    #[arg(long)]
    temperature: Option<f64>,

    /// Blood oxygen saturation in percent
    #[arg(long)]
    spo2: Option<f64>,

    /// GPS latitude
    #[arg(long)]
    lat: Option<f64>,

    /// GPS longitude
    #[arg(long)]
    lng: Option<f64>,

    /// Simulate the SOS button
    #[arg(long)]
    manual: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    // Load config
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    // Determine model path
    let model_path = match &args.model {
        Some(path) => path.clone(),
        None => config.get_model_path()?,
    };

    info!("Distress engine starting...");
    info!("Model: {:?}", model_path);
    info!("Device: {}", args.device);

    // A missing model is not fatal: audio degrades to unknown and the
    // vitals/manual paths keep working
    let classifier = match EnsembleClassifier::load(&model_path) {
        Ok(classifier) => {
            info!(
                "Loaded ensemble with {} members over {} features",
                classifier.member_count(),
                classifier.feature_dim()
            );
            Some(classifier)
        }
        Err(e) => {
            warn!("Running without a classifier: {}", e);
            None
        }
    };

    // Single-device registry for the offline run
    let registry = Arc::new(DeviceRegistry::with_device(
        &args.device,
        Uuid::new_v4(),
        &[],
    ));
    let (event_tx, mut event_rx) = events::channel();
    let pipeline = DistressPipeline::with_registry(config, classifier, registry, event_tx)
        .map_err(|e| anyhow::anyhow!("Failed to assemble pipeline: {}", e))?;

    let audio = match &args.audio {
        Some(path) => Some(read_wav(path)?),
        None => None,
    };

    let gps = match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => Some(GpsFix { lat, lng }),
        _ => None,
    };

    let sample = SensorSample {
        device_id: args.device.clone(),
        timestamp: chrono::Utc::now(),
        vitals: VitalsSample {
            heart_rate: args.heart_rate,
            temperature: args.temperature,
            spo2: args.spo2,
        },
        gps,
        audio,
        manual_trigger: args.manual,
    };

    let outcome = pipeline
        .evaluate(sample)
        .await
        .map_err(|e| anyhow::anyhow!("Evaluation failed: {}", e))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?
    );

    while let Ok(event) = event_rx.try_recv() {
        println!(
            "{}",
            serde_json::to_string(&event).context("Failed to serialize event")?
        );
    }

    Ok(())
}

/// Read a WAV file as mono f32, averaging channels if needed
fn read_wav(path: &PathBuf) -> Result<AudioClip> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {:?}", path))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("Failed to read float samples")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("Failed to read int samples")?
        }
    };

    let mono: Vec<f32> = if channels == 1 {
        samples
    } else {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    info!(
        "Read {:?}: {} samples at {} Hz ({} channels)",
        path,
        mono.len(),
        spec.sample_rate,
        channels
    );

    Ok(AudioClip {
        samples: mono,
        sample_rate: spec.sample_rate,
    })
}

mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cli::{BeatsArgs, Cli, Command, DenoiseArgs, LearnProfileArgs, NoiseRange, SegmentsArgs};
use config::Config;
use spectral_engine::audio::{decode_audio, AudioBuffer};
use spectral_engine::backend::{BackendRegistry, BitDepth};
use spectral_engine::beat::BeatDetector;
use spectral_engine::encode::write_wav;
use spectral_engine::noise::{detect_noise_segments, learn_noise_profile, longest_noise_segment, NoiseProfile, NoiseReducer};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut cfg = Config::default();
    if let Some(path) = config::find_config(cli.config.as_deref()) {
        if let Some(loaded) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    let registry = Arc::new(if cli.reference_only {
        BackendRegistry::reference_only()
    } else {
        BackendRegistry::new(&cfg.backend)
    });
    // Loads overlap decoding; the first kernel call waits for it if needed.
    let _preload = registry.preload_in_background();

    match cli.command {
        Command::Denoise(mut args) => {
            // Config values apply only when the flag is at its default
            if args.reduction == 0.5 { args.reduction = cfg.denoise.reduction; }
            if args.threshold == -20.0 { args.threshold = cfg.denoise.threshold; }
            if args.smoothing == 0.1 { args.smoothing = cfg.denoise.smoothing; }
            if args.fft_size == 2048 { args.fft_size = cfg.denoise.fft_size; }
            if args.bit_depth == 16 { args.bit_depth = cfg.output.bit_depth; }
            denoise(&registry, &cfg, args)
        }
        Command::LearnProfile(mut args) => {
            if args.fft_size == 2048 { args.fft_size = cfg.denoise.fft_size; }
            learn_profile(&registry, &cfg, args)
        }
        Command::Segments(mut args) => {
            if args.threshold_db == -40.0 { args.threshold_db = cfg.segments.threshold_db; }
            if args.min_duration_ms == 500.0 { args.min_duration_ms = cfg.segments.min_duration_ms; }
            segments(&cfg, args)
        }
        Command::Beats(mut args) => {
            if args.sensitivity == 1.5 { args.sensitivity = cfg.beats.sensitivity; }
            beats(&registry, &cfg, args)
        }
        Command::Backends => {
            registry.preload();
            println!("Backends:");
            println!("{}", registry.report());
            Ok(())
        }
    }
}

fn load_input(input: &Path) -> Result<AudioBuffer> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    log::info!("Input: {}", input.display());
    decode_audio(input)
}

/// Explicit range if given, else the longest quiet segment.
fn noise_sample(buffer: &AudioBuffer, range: &NoiseRange, cfg: &Config) -> Result<AudioBuffer> {
    if let Some((start, end)) = range.get() {
        if end <= start {
            anyhow::bail!("--noise-end ({}) must be after --noise-start ({})", end, start);
        }
        log::info!("Noise sample: {:.2}s - {:.2}s", start, end);
        return Ok(buffer.slice(buffer.seconds_to_samples(start), buffer.seconds_to_samples(end)));
    }

    let segment = longest_noise_segment(buffer, &cfg.segments)
        .context("No quiet segment found; pass --noise-start/--noise-end or --profile")?;
    log::info!(
        "Noise sample (auto): {:.2}s - {:.2}s",
        segment.start_time,
        segment.end_time
    );
    Ok(buffer.slice(segment.start, segment.end))
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("[{elapsed_precise}] {spinner} {msg}")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn denoise(registry: &Arc<BackendRegistry>, cfg: &Config, args: DenoiseArgs) -> Result<()> {
    let bit_depth = BitDepth::try_from(args.bit_depth)?;
    let buffer = load_input(&args.input)?;

    let mut reduction = cfg.denoise;
    reduction.reduction = args.reduction;
    reduction.threshold = args.threshold;
    reduction.smoothing = args.smoothing;
    reduction.fft_size = args.fft_size;

    let mut reducer = NoiseReducer::new(Arc::clone(registry), reduction)
        .with_context(|| format!("Invalid FFT size: {}", args.fft_size))?;

    if let Some(ref path) = args.profile {
        let profile = NoiseProfile::load(path)
            .with_context(|| format!("Failed to load noise profile: {}", path.display()))?;
        reducer.set_profile(profile)?;
    } else {
        let sample = noise_sample(&buffer, &args.noise, cfg)?;
        reducer.learn_profile(&sample).context("Failed to learn noise profile")?;
    }

    if let (Some(path), Some(profile)) = (&args.save_profile, reducer.profile()) {
        profile.save(path)?;
    }

    let pb = spinner("Reducing noise...")?;
    let output = reducer.process_buffer(&buffer)?;
    pb.finish_with_message("Noise reduction complete");

    write_wav(registry.pcm(), &output, bit_depth, &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    log::info!("Done! Output: {}", args.output.display());
    Ok(())
}

fn learn_profile(registry: &BackendRegistry, cfg: &Config, args: LearnProfileArgs) -> Result<()> {
    let buffer = load_input(&args.input)?;
    let sample = noise_sample(&buffer, &args.noise, cfg)?;

    let fft = registry
        .fft()
        .kernel(args.fft_size)
        .with_context(|| format!("Invalid FFT size: {}", args.fft_size))?;
    let profile = learn_noise_profile(&sample, fft.as_ref()).context("Failed to learn noise profile")?;

    profile
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    Ok(())
}

fn segments(cfg: &Config, args: SegmentsArgs) -> Result<()> {
    let buffer = load_input(&args.input)?;

    let mut detector = cfg.segments;
    detector.threshold_db = args.threshold_db;
    detector.min_duration_ms = args.min_duration_ms;

    let found = detect_noise_segments(&buffer, &detector);
    if found.is_empty() {
        println!("No quiet segments below {:.1} dB", detector.threshold_db);
        return Ok(());
    }
    println!("Quiet segments:");
    for (i, segment) in found.iter().enumerate() {
        println!(
            "  [{:3}] {:8.2}s - {:8.2}s  ({:.2}s)",
            i,
            segment.start_time,
            segment.end_time,
            segment.duration()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct BeatsReport {
    tempo_bpm: f32,
    onsets: Vec<f32>,
}

fn beats(registry: &Arc<BackendRegistry>, cfg: &Config, args: BeatsArgs) -> Result<()> {
    let buffer = load_input(&args.input)?;

    let mut config = cfg.beats;
    config.sensitivity = args.sensitivity;
    let series = BeatDetector::new(Arc::clone(registry), config).analyze(&buffer);

    let report = BeatsReport {
        tempo_bpm: series.tempo_bpm(),
        onsets: series.onset_times(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Tempo: {:.1} BPM, {} onset(s)", report.tempo_bpm, report.onsets.len());
        for t in &report.onsets {
            println!("  {:.3}s", t);
        }
    }
    Ok(())
}

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "spectral", about = "Spectral noise reduction, segment and beat analysis")]
pub struct Cli {
    /// Config file (defaults to spectral-engine.toml or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Skip the accelerated backends and use the reference kernels only
    #[arg(long, global = true)]
    pub reference_only: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Remove stationary background noise and write a WAV file
    Denoise(DenoiseArgs),
    /// Learn a noise profile and save it as JSON
    LearnProfile(LearnProfileArgs),
    /// List quiet segments usable as noise samples
    Segments(SegmentsArgs),
    /// Detect beat onsets and estimate tempo
    Beats(BeatsArgs),
    /// Load every backend and print its status
    Backends,
}

/// Explicit noise sample range in seconds.
#[derive(Args, Debug, Clone, Copy)]
pub struct NoiseRange {
    /// Start of a noise-only stretch of the input (seconds)
    #[arg(long, requires = "noise_end")]
    pub noise_start: Option<f32>,

    /// End of a noise-only stretch of the input (seconds)
    #[arg(long, requires = "noise_start")]
    pub noise_end: Option<f32>,
}

impl NoiseRange {
    pub fn get(&self) -> Option<(f32, f32)> {
        self.noise_start.zip(self.noise_end)
    }
}

#[derive(Args, Debug)]
pub struct DenoiseArgs {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Output WAV file
    #[arg(short, long, default_value = "denoised.wav")]
    pub output: PathBuf,

    /// Noise profile JSON to apply instead of learning one
    #[arg(short, long, conflicts_with_all = ["noise_start", "noise_end"])]
    pub profile: Option<PathBuf>,

    #[command(flatten)]
    pub noise: NoiseRange,

    /// Also save the learned profile here
    #[arg(long)]
    pub save_profile: Option<PathBuf>,

    /// Over-subtraction strength (0.0-1.0)
    #[arg(long, default_value_t = 0.5)]
    pub reduction: f32,

    /// Spectral floor in dB relative to the noise level
    #[arg(long, default_value_t = -20.0, allow_hyphen_values = true)]
    pub threshold: f32,

    /// Share of the original signal mixed back in (0.0-1.0)
    #[arg(long, default_value_t = 0.1)]
    pub smoothing: f32,

    /// Transform size (power of two)
    #[arg(long, default_value_t = 2048)]
    pub fft_size: usize,

    /// Output bit depth (16 or 24)
    #[arg(long, default_value_t = 16)]
    pub bit_depth: u16,
}

#[derive(Args, Debug)]
pub struct LearnProfileArgs {
    /// Input audio file
    pub input: PathBuf,

    /// Output profile JSON
    #[arg(short, long, default_value = "noise-profile.json")]
    pub output: PathBuf,

    #[command(flatten)]
    pub noise: NoiseRange,

    /// Transform size (power of two)
    #[arg(long, default_value_t = 2048)]
    pub fft_size: usize,
}

#[derive(Args, Debug)]
pub struct SegmentsArgs {
    /// Input audio file
    pub input: PathBuf,

    /// Windows quieter than this are noise (dB)
    #[arg(long, default_value_t = -40.0, allow_hyphen_values = true)]
    pub threshold_db: f32,

    /// Drop quiet runs shorter than this
    #[arg(long, default_value_t = 500.0)]
    pub min_duration_ms: f32,
}

#[derive(Args, Debug)]
pub struct BeatsArgs {
    /// Input audio file
    pub input: PathBuf,

    /// Standard deviations above the median an onset must reach
    #[arg(long, default_value_t = 1.5)]
    pub sensitivity: f32,

    /// Print onsets and tempo as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_denoise_with_noise_range() {
        let cli = Cli::parse_from([
            "spectral",
            "--reference-only",
            "denoise",
            "in.wav",
            "-o",
            "out.wav",
            "--noise-start",
            "0.5",
            "--noise-end",
            "2",
            "--threshold",
            "-30",
        ]);
        assert!(cli.reference_only);
        match cli.command {
            Command::Denoise(args) => {
                assert_eq!(args.noise.get(), Some((0.5, 2.0)));
                assert_eq!(args.threshold, -30.0);
                assert_eq!(args.fft_size, 2048);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn profile_conflicts_with_noise_range() {
        let result = Cli::try_parse_from([
            "spectral",
            "denoise",
            "in.wav",
            "--profile",
            "p.json",
            "--noise-start",
            "0",
            "--noise-end",
            "1",
        ]);
        assert!(result.is_err());
    }
}

use serde::Deserialize;
use std::path::{Path, PathBuf};

use spectral_engine::{BackendConfig, BeatDetectorConfig, NoiseReductionConfig, SegmentDetectorConfig};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub denoise: NoiseReductionConfig,
    #[serde(default)]
    pub segments: SegmentDetectorConfig,
    #[serde(default)]
    pub beats: BeatDetectorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_bit_depth")]
    pub bit_depth: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            bit_depth: default_bit_depth(),
        }
    }
}

fn default_bit_depth() -> u16 { 16 }

/// Explicit path, else `spectral-engine.toml` in the working directory, the
/// XDG-style `~/.config` location, then the platform config directory.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("spectral-engine.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("spectral-engine").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("spectral-engine").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [backend]
            accelerated = false

            [denoise]
            reduction = 0.8
            fft_size = 1024

            [beats]
            sensitivity = 2.0
            "#,
        )
        .unwrap();

        assert!(!config.backend.accelerated);
        assert_eq!(config.denoise.reduction, 0.8);
        assert_eq!(config.denoise.fft_size, 1024);
        assert_eq!(config.denoise.smoothing, 0.1);
        assert_eq!(config.beats.sensitivity, 2.0);
        assert_eq!(config.beats.window_ms, 10.0);
        assert_eq!(config.segments.threshold_db, -40.0);
        assert_eq!(config.output.bit_depth, 16);
    }

    #[test]
    fn empty_config_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.backend.accelerated);
        assert_eq!(config.denoise, NoiseReductionConfig::default());
    }
}

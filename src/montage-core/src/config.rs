//! Configuration management

use anyhow::{Context, Result};
use montage_processing::{EncoderConfig, ExportPreset, FrameSize, MuxerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory receiving video.mp4 and videoWithAudio.mp4
    pub output_dir: PathBuf,

    /// Output frame width in pixels
    pub width: u32,

    /// Output frame height in pixels
    pub height: u32,

    /// Slideshow framerate; each image stays on screen for 1/fps seconds
    pub fps: u32,

    /// x264 constant rate factor (0-51, lower = better)
    pub crf: u32,

    /// x264 speed preset
    pub x264_preset: String,

    /// Quality profile for the muxed export
    pub export_preset: ExportPreset,

    /// Place the MP4 index at the front of the muxed file
    pub optimize_for_network_use: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: dirs::document_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Montage"),
            width: 1024,
            height: 1024,
            fps: 1,
            crf: 23,
            x264_preset: "medium".to_string(),
            export_preset: ExportPreset::HighestQuality,
            optimize_for_network_use: true,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// Keys missing from the file keep their default values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config TOML {:?}", path))
    }

    /// Load the given file, or the default location when it exists, or defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            info!("loading config from {:?}", path);
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => {
                info!("loading config from {:?}", path);
                Self::from_file(&path)
            }
            _ => {
                debug!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// `<config dir>/Montage/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("Montage").join("config.toml"))
    }

    /// Output frame size
    pub fn frame_size(&self) -> Result<FrameSize> {
        FrameSize::new(self.width, self.height)
            .with_context(|| format!("Invalid frame size {}x{}", self.width, self.height))
    }

    /// Settings for the slideshow encoder
    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            output_dir: self.output_dir.clone(),
            fps: self.fps,
            quality: self.crf,
            preset: self.x264_preset.clone(),
            ..EncoderConfig::default()
        }
    }

    /// Settings for the soundtrack muxer
    pub fn muxer_config(&self) -> MuxerConfig {
        MuxerConfig {
            output_dir: self.output_dir.clone(),
            preset: self.export_preset,
            optimize_for_network_use: self.optimize_for_network_use,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.output_dir.ends_with("Montage"));
        assert_eq!((config.width, config.height), (1024, 1024));
        assert_eq!(config.fps, 1);
        assert_eq!(config.crf, 23);
        assert_eq!(config.export_preset, ExportPreset::HighestQuality);
        assert!(config.optimize_for_network_use);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "output_dir = \"/srv/slides\"\nfps = 2\nexport_preset = \"low\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/srv/slides"));
        assert_eq!(config.fps, 2);
        assert_eq!(config.export_preset, ExportPreset::Low);
        assert_eq!(config.width, 1024);
        assert_eq!(config.x264_preset, "medium");
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config {
            output_dir: PathBuf::from("/tmp/out"),
            width: 640,
            height: 480,
            crf: 18,
            ..Config::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(toml::from_str::<Config>(&text).unwrap(), config);
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "fps = \"fast\"").unwrap();

        assert!(Config::from_file(&path).is_err());
        assert!(Config::load_or_default(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_derived_configs() {
        let config = Config {
            output_dir: PathBuf::from("/tmp/out"),
            fps: 3,
            crf: 30,
            export_preset: ExportPreset::Medium,
            optimize_for_network_use: false,
            ..Config::default()
        };

        let encoder = config.encoder_config();
        assert_eq!(encoder.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!((encoder.fps, encoder.quality), (3, 30));

        let muxer = config.muxer_config();
        assert_eq!(muxer.preset, ExportPreset::Medium);
        assert!(!muxer.optimize_for_network_use);

        assert!(Config { width: 0, ..config }.frame_size().is_err());
    }
}

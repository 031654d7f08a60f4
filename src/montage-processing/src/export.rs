//! Export of a composition into a single container file

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::composition::Composition;
use crate::error::MuxError;
use crate::output::discard_partial;
use crate::probe::MediaKind;

/// Quality profile applied when writing the exported file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPreset {
    /// Video passes through untouched, audio at the highest AAC bitrate
    #[default]
    HighestQuality,
    Medium,
    Low,
}

impl ExportPreset {
    fn video_args(&self) -> &'static [&'static str] {
        match self {
            ExportPreset::HighestQuality => &["-c:v", "copy"],
            ExportPreset::Medium => &["-c:v", "libx264", "-preset", "medium", "-crf", "23", "-pix_fmt", "yuv420p"],
            ExportPreset::Low => &["-c:v", "libx264", "-preset", "fast", "-crf", "28", "-pix_fmt", "yuv420p"],
        }
    }

    fn audio_bitrate(&self) -> &'static str {
        match self {
            ExportPreset::HighestQuality => "256k",
            ExportPreset::Medium => "192k",
            ExportPreset::Low => "128k",
        }
    }
}

/// Container written by an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFileType {
    #[default]
    Mp4,
}

impl OutputFileType {
    pub fn ffmpeg_format(&self) -> &'static str {
        match self {
            OutputFileType::Mp4 => "mp4",
        }
    }
}

/// Writes a [`Composition`] to disk through ffmpeg
#[derive(Debug, Clone)]
pub struct ExportSession {
    composition: Composition,
    preset: ExportPreset,
    pub output_file_type: OutputFileType,
    pub output_path: Option<PathBuf>,
    /// Move the index to the front of the file so playback can start while downloading
    pub optimize_for_network_use: bool,
}

impl ExportSession {
    pub fn new(composition: Composition, preset: ExportPreset) -> Self {
        Self {
            composition,
            preset,
            output_file_type: OutputFileType::Mp4,
            output_path: None,
            optimize_for_network_use: false,
        }
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn preset(&self) -> ExportPreset {
        self.preset
    }

    /// Arguments for the ffmpeg child performing this export
    pub fn ffmpeg_args(&self) -> Result<Vec<OsString>, MuxError> {
        let output_path = self
            .output_path
            .as_deref()
            .ok_or_else(|| MuxError::Export("no output path set".to_string()))?;

        if self.composition.is_empty() {
            return Err(MuxError::Export("composition has no media to export".to_string()));
        }

        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error"]
            .iter()
            .map(OsString::from)
            .collect();

        let placed: Vec<_> = self
            .composition
            .tracks()
            .iter()
            .filter_map(|track| track.segment().map(|segment| (track, segment)))
            .collect();

        // inputs, each trimmed to its inserted range
        for (track, segment) in &placed {
            if !segment.source_range.start.is_zero() {
                args.push("-ss".into());
                args.push(segment.source_range.start.to_ffmpeg_arg().into());
            }
            args.push("-t".into());
            args.push(segment.source_range.duration.to_ffmpeg_arg().into());

            if track.kind() == MediaKind::Video && track.preferred_transform() != segment.source_transform {
                args.push("-display_rotation".into());
                args.push(track.preferred_transform().rotation_degrees().to_string().into());
            }

            args.push("-i".into());
            args.push(segment.source_path.as_os_str().to_owned());
        }

        for (input, (_, segment)) in placed.iter().enumerate() {
            args.push("-map".into());
            args.push(format!("{}:{}", input, segment.source_index).into());
        }

        for (track, segment) in &placed {
            match track.kind() {
                MediaKind::Video => {
                    args.extend(self.preset.video_args().iter().map(OsString::from));
                }
                MediaKind::Audio => {
                    args.push("-c:a".into());
                    args.push("aac".into());
                    args.push("-b:a".into());
                    args.push(self.preset.audio_bitrate().into());
                    // source material shorter than the requested range is padded with silence
                    args.push("-af".into());
                    args.push(format!("apad=whole_dur={}", segment.source_range.duration.to_ffmpeg_arg()).into());
                }
            }
        }

        if self.optimize_for_network_use {
            args.push("-movflags".into());
            args.push("+faststart".into());
        }

        args.push("-t".into());
        args.push(self.composition.duration().to_ffmpeg_arg().into());
        args.push("-f".into());
        args.push(self.output_file_type.ffmpeg_format().into());
        args.push(output_path.as_os_str().to_owned());

        Ok(args)
    }

    /// Run the export and wait for it to complete
    pub async fn export(&self) -> Result<PathBuf, MuxError> {
        let args = self.ffmpeg_args()?;
        let output_path = self
            .output_path
            .clone()
            .ok_or_else(|| MuxError::Export("no output path set".to_string()))?;

        info!(
            "exporting composition ({}, {:?}) to {:?}",
            self.composition.duration(),
            self.preset,
            output_path
        );

        let mut cmd = Command::new("ffmpeg");
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("running ffmpeg export: {:?}", cmd);

        let output = cmd
            .output()
            .await
            .map_err(|e| MuxError::Export(format!("failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            discard_partial(&output_path).await;
            return Err(MuxError::Export(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.chars().take(500).collect::<String>().trim()
            )));
        }

        if !tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
            return Err(MuxError::Export(format!("ffmpeg produced no file at {:?}", output_path)));
        }

        Ok(output_path)
    }
}

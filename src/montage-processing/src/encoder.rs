//! Image sequence encoding using FFmpeg
//!
//! Each image is composed into a pooled ARGB buffer and streamed to an
//! ffmpeg session at a fixed frame rate: frame `i` is shown at `i / fps`.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use crate::compose::{compose_into, RasterImage};
use crate::error::EncodeError;
use crate::output::{discard_partial, replace_existing};
use crate::pixel::{FrameSize, PixelBufferPool};
use crate::time::MediaTime;
use crate::writer::{VideoSettings, VideoWriter, VideoWriterInput, WrittenVideo};

/// File name of the encoded slideshow inside the output directory
pub const VIDEO_FILE_NAME: &str = "video.mp4";

/// Video encoder configuration
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Directory receiving `video.mp4`
    pub output_dir: PathBuf,
    /// Frames per second; every image is shown for `1 / fps` seconds
    pub fps: u32,
    /// Video quality (CRF value, lower = better, 18-28 typical)
    pub quality: u32,
    /// x264 speed preset
    pub preset: String,
    /// Frames that may wait in front of the encoder
    pub queue_depth: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            fps: 1,
            quality: 23,
            preset: "medium".to_string(),
            queue_depth: 2,
        }
    }
}

/// Encodes an ordered image sequence into `video.mp4`
pub struct FrameSequenceEncoder {
    config: EncoderConfig,
}

impl FrameSequenceEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Where [`build`](Self::build) writes its result
    pub fn output_path(&self) -> PathBuf {
        self.config.output_dir.join(VIDEO_FILE_NAME)
    }

    /// Encode `images` in order, one frame each, scaled to fit `output_size`
    ///
    /// Any existing file at the output path is replaced. An empty sequence
    /// still produces a finalized, zero-length container. On failure no
    /// output file is left behind.
    pub async fn build(&self, images: &[RasterImage], output_size: FrameSize) -> Result<PathBuf, EncodeError> {
        let output_path = self.output_path();

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        replace_existing(&output_path).await?;

        info!(
            "encoding {} image(s) to {:?} at {} ({} fps)",
            images.len(),
            output_path,
            output_size,
            self.config.fps
        );

        match self.encode(images, output_size, &output_path).await {
            Ok(written) => Ok(written.path),
            Err(e) => {
                discard_partial(&output_path).await;
                Err(e)
            }
        }
    }

    async fn encode(
        &self,
        images: &[RasterImage],
        output_size: FrameSize,
        output_path: &Path,
    ) -> Result<WrittenVideo, EncodeError> {
        let settings = VideoSettings {
            fps: self.config.fps,
            crf: self.config.quality,
            preset: self.config.preset.clone(),
            queue_depth: self.config.queue_depth,
            ..VideoSettings::new(output_size)
        };
        let fps = settings.fps;

        let mut writer = VideoWriter::create(output_path, settings).await?;
        let input = writer.start_writing()?;

        let pool = match session_pool(&writer) {
            Ok(pool) => pool,
            Err(e) => {
                writer.cancel_writing().await;
                return Err(e);
            }
        };

        match feed_frames(input, &pool, images, fps).await {
            Ok(()) => writer.finish_writing().await,
            Err(e) => {
                writer.cancel_writing().await;
                Err(e)
            }
        }
    }

    /// Get the output directory
    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }
}

/// The pixel buffer pool of a started session
fn session_pool(writer: &VideoWriter) -> Result<PixelBufferPool, EncodeError> {
    writer
        .pixel_buffer_pool()
        .cloned()
        .ok_or_else(|| EncodeError::BufferPool("session has no pixel buffer pool".to_string()))
}

/// Compose and submit every image in order, then close the input
async fn feed_frames(
    mut input: VideoWriterInput,
    pool: &PixelBufferPool,
    images: &[RasterImage],
    fps: u32,
) -> Result<(), EncodeError> {
    for (index, image) in images.iter().enumerate() {
        let slot = input.wait_until_ready().await?;

        let mut buffer = pool.acquire().ok_or_else(|| EncodeError::FrameComposition {
            frame: index,
            reason: "no pixel buffer available".to_string(),
        })?;

        let rect = compose_into(&mut buffer, image).map_err(|e| EncodeError::FrameComposition {
            frame: index,
            reason: e.to_string(),
        })?;

        let pts = MediaTime::from_frame(index as i64, fps);
        debug!("frame {} drawn at {:?}, presenting at {}", index, rect, pts);

        input.append(slot, buffer, pts)?;
    }

    input.mark_as_finished();
    Ok(())
}

/// Check if FFmpeg is available
pub fn check_ffmpeg() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check if ffprobe is available
pub fn check_ffprobe() -> bool {
    std::process::Command::new("ffprobe")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check if ffmpeg was built with the named encoder
pub async fn check_encoder(name: &str) -> bool {
    let output = match Command::new("ffmpeg").args(["-hide_banner", "-encoders"]).output().await {
        Ok(o) if o.status.success() => o,
        _ => return false,
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name))
}

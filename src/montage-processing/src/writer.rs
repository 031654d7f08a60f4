//! Streaming video writer
//!
//! A session owns one ffmpeg child reading raw frames on stdin. Frames reach
//! the child through a bounded channel drained by a pump task; a full channel
//! is what "not ready for more media data" means to the producer.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::encoder::check_encoder;
use crate::error::EncodeError;
use crate::pixel::{FrameSize, PixelBuffer, PixelBufferPool, PixelFormat, CANONICAL_PIXEL_FORMAT};
use crate::time::MediaTime;

/// Largest accepted frame dimension
pub const MAX_DIMENSION: u32 = 8192;

/// Speed presets understood by libx264, fastest first
pub const X264_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

/// Video codec written into the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
}

impl VideoCodec {
    /// ffmpeg encoder implementing this codec
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
        }
    }
}

/// Output settings for a single-track video session
#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub codec: VideoCodec,
    pub size: FrameSize,
    /// Fixed frame rate; frame `i` is presented at `i / fps`
    pub fps: u32,
    /// x264 constant rate factor (0 = lossless, 51 = worst)
    pub crf: u32,
    /// x264 speed preset
    pub preset: String,
    /// Layout of the buffers submitted to the session
    pub pixel_format: PixelFormat,
    /// Frames that may be queued ahead of the encoder
    pub queue_depth: usize,
}

impl VideoSettings {
    pub fn new(size: FrameSize) -> Self {
        Self {
            codec: VideoCodec::H264,
            size,
            fps: 1,
            crf: 23,
            preset: "medium".to_string(),
            pixel_format: CANONICAL_PIXEL_FORMAT,
            queue_depth: 2,
        }
    }

    /// Check the settings without touching the filesystem or the toolchain
    pub fn validate(&self) -> Result<(), EncodeError> {
        let FrameSize { width, height } = self.size;

        if width == 0 || height == 0 {
            return Err(EncodeError::EncoderSetup(format!("frame size {} is empty", self.size)));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(EncodeError::EncoderSetup(format!(
                "frame size {} exceeds {}x{}",
                self.size, MAX_DIMENSION, MAX_DIMENSION
            )));
        }
        if self.fps == 0 {
            return Err(EncodeError::EncoderSetup("fps must be at least 1".to_string()));
        }
        if self.crf > 51 {
            return Err(EncodeError::EncoderSetup(format!("crf {} is outside 0..=51", self.crf)));
        }
        if !X264_PRESETS.contains(&self.preset.as_str()) {
            return Err(EncodeError::EncoderSetup(format!(
                "unknown x264 preset '{}', expected one of {}",
                self.preset,
                X264_PRESETS.join(", ")
            )));
        }
        if self.queue_depth == 0 {
            return Err(EncodeError::EncoderSetup("queue depth must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Size of the encoded picture
    ///
    /// yuv420p stores chroma at half resolution in both directions, so an odd
    /// dimension gains one padding row or column on the right or bottom.
    pub fn encoded_size(&self) -> FrameSize {
        FrameSize {
            width: self.size.width + self.size.width % 2,
            height: self.size.height + self.size.height % 2,
        }
    }

    /// Bytes in one raw frame
    pub fn frame_len(&self) -> usize {
        self.size.width as usize * self.size.height as usize * self.pixel_format.bytes_per_pixel()
    }

    /// Arguments for the ffmpeg child that encodes this session into `output_path`
    pub fn ffmpeg_args(&self, output_path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            self.pixel_format.ffmpeg_name(),
        ]
        .iter()
        .map(OsString::from)
        .collect();

        args.push("-s".into());
        args.push(format!("{}x{}", self.size.width, self.size.height).into());
        args.push("-framerate".into());
        args.push(self.fps.to_string().into());
        args.push("-i".into());
        args.push("-".into());

        let encoded = self.encoded_size();
        if encoded != self.size {
            args.push("-vf".into());
            args.push(format!("pad={}:{}:0:0", encoded.width, encoded.height).into());
        }

        args.push("-c:v".into());
        args.push(self.codec.ffmpeg_encoder().into());
        args.push("-preset".into());
        args.push(self.preset.clone().into());
        args.push("-crf".into());
        args.push(self.crf.to_string().into());
        args.push("-pix_fmt".into());
        args.push("yuv420p".into());
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push("-f".into());
        args.push("mp4".into());
        args.push(output_path.as_os_str().to_owned());

        args
    }
}

/// Lifecycle of a [`VideoWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterStatus {
    Unknown,
    Writing,
    Completed,
    Failed,
}

/// Summary of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenVideo {
    pub path: PathBuf,
    pub frames: u64,
    pub duration: MediaTime,
}

pub(crate) struct Sample {
    buffer: PixelBuffer,
    pts: MediaTime,
}

/// Encoding session writing one video track into an MP4 file
pub struct VideoWriter {
    output_path: PathBuf,
    settings: VideoSettings,
    status: WriterStatus,
    pool: Option<PixelBufferPool>,
    child: Option<Child>,
    pump: Option<JoinHandle<std::io::Result<u64>>>,
    stderr: Option<JoinHandle<String>>,
}

impl VideoWriter {
    /// Prepare a session for `output_path`
    ///
    /// Fails with [`EncodeError::EncoderSetup`] when the settings are invalid
    /// or the toolchain cannot encode the codec.
    pub async fn create(output_path: &Path, settings: VideoSettings) -> Result<Self, EncodeError> {
        let writer = Self::with_settings(output_path, settings)?;

        let encoder = writer.settings.codec.ffmpeg_encoder();
        if !check_encoder(encoder).await {
            return Err(EncodeError::EncoderSetup(format!(
                "ffmpeg with the {} encoder is not available",
                encoder
            )));
        }

        Ok(writer)
    }

    /// Prepare a session after validating `settings`, without consulting the toolchain
    pub fn with_settings(output_path: &Path, settings: VideoSettings) -> Result<Self, EncodeError> {
        settings.validate()?;

        Ok(Self {
            output_path: output_path.to_path_buf(),
            settings,
            status: WriterStatus::Unknown,
            pool: None,
            child: None,
            pump: None,
            stderr: None,
        })
    }

    /// Spawn the encoder and open the session at time zero
    pub fn start_writing(&mut self) -> Result<VideoWriterInput, EncodeError> {
        if self.status != WriterStatus::Unknown {
            return Err(EncodeError::WriteStart(format!("writer is already {:?}", self.status)));
        }

        info!(
            "starting encoding session to {:?} ({} @ {} fps)",
            self.output_path, self.settings.size, self.settings.fps
        );

        let mut cmd = Command::new("ffmpeg");
        cmd.args(self.settings.ffmpeg_args(&self.output_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("spawning ffmpeg session: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| {
            self.status = WriterStatus::Failed;
            EncodeError::WriteStart(format!("failed to spawn ffmpeg: {}", e))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            self.status = WriterStatus::Failed;
            EncodeError::WriteStart("failed to open ffmpeg stdin".to_string())
        })?;

        if let Some(mut stderr) = child.stderr.take() {
            self.stderr = Some(tokio::spawn(async move {
                let mut bytes = Vec::new();
                let _ = stderr.read_to_end(&mut bytes).await;
                String::from_utf8_lossy(&bytes).into_owned()
            }));
        }

        // one buffer in flight per queue slot, plus one being written and one being composed
        let pool = PixelBufferPool::new(
            self.settings.size,
            self.settings.pixel_format,
            self.settings.queue_depth + 2,
        )?;

        let (tx, rx) = mpsc::channel(self.settings.queue_depth);
        self.pump = Some(tokio::spawn(pump_frames(stdin, rx)));
        self.child = Some(child);
        self.pool = Some(pool);
        self.status = WriterStatus::Writing;

        Ok(VideoWriterInput {
            tx,
            fps: self.settings.fps,
            frame_len: self.settings.frame_len(),
            appended: 0,
        })
    }

    /// Buffer pool for the session; only available once writing started
    pub fn pixel_buffer_pool(&self) -> Option<&PixelBufferPool> {
        self.pool.as_ref()
    }

    pub fn status(&self) -> WriterStatus {
        self.status
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Abort the session: stop the encoder and wait for it to exit
    pub async fn cancel_writing(mut self) {
        self.status = WriterStatus::Failed;

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("failed to stop ffmpeg session: {}", e);
            }
        }
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }

        info!("cancelled encoding session for {:?}", self.output_path);
    }

    /// Flush queued frames, close the encoder and wait for the container to be written
    ///
    /// The session input must have been marked finished (or dropped) first,
    /// otherwise this waits for it.
    pub async fn finish_writing(mut self) -> Result<WrittenVideo, EncodeError> {
        let (Some(pump), Some(mut child)) = (self.pump.take(), self.child.take()) else {
            return Err(EncodeError::Finalize("writing was never started".to_string()));
        };

        let pumped = pump
            .await
            .map_err(|e| EncodeError::Finalize(format!("frame pump panicked: {}", e)));

        let status = child.wait().await?;
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            self.status = WriterStatus::Failed;
            let tail: String = stderr.chars().take(500).collect();
            return Err(EncodeError::Finalize(format!("ffmpeg exited with {}: {}", status, tail.trim())));
        }
        if !stderr.trim().is_empty() {
            warn!("ffmpeg stderr: {}", stderr.chars().take(500).collect::<String>());
        }

        let frames = match pumped? {
            Ok(frames) => frames,
            Err(e) => {
                self.status = WriterStatus::Failed;
                return Err(EncodeError::Finalize(format!("failed to stream frames: {}", e)));
            }
        };

        self.status = WriterStatus::Completed;
        let duration = MediaTime::from_frame(frames as i64, self.settings.fps);
        info!("finished writing {} frames ({}) to {:?}", frames, duration, self.output_path);

        Ok(WrittenVideo {
            path: self.output_path.clone(),
            frames,
            duration,
        })
    }
}

/// Permission to append exactly one frame, granted once the session has room
pub struct ReadySlot {
    permit: mpsc::OwnedPermit<Sample>,
}

/// Producer side of a session: the video track input
pub struct VideoWriterInput {
    tx: mpsc::Sender<Sample>,
    fps: u32,
    frame_len: usize,
    appended: u64,
}

impl VideoWriterInput {
    #[cfg(test)]
    pub(crate) fn for_channel(tx: mpsc::Sender<Sample>, fps: u32, frame_len: usize) -> Self {
        Self {
            tx,
            fps,
            frame_len,
            appended: 0,
        }
    }

    /// Wait until the encoder can take another frame
    pub async fn wait_until_ready(&self) -> Result<ReadySlot, EncodeError> {
        let permit = self
            .tx
            .clone()
            .reserve_owned()
            .await
            .map_err(|_| EncodeError::Session("ffmpeg stopped accepting frames".to_string()))?;
        Ok(ReadySlot { permit })
    }

    /// Presentation time the next appended frame must carry
    pub fn next_presentation_time(&self) -> MediaTime {
        MediaTime::from_frame(self.appended as i64, self.fps)
    }

    /// Hand `buffer` to the encoder for display at `pts`
    ///
    /// Timestamps must follow the session cadence exactly: `0, 1/fps, 2/fps, ...`.
    pub fn append(&mut self, slot: ReadySlot, buffer: PixelBuffer, pts: MediaTime) -> Result<(), EncodeError> {
        let frame = self.appended as usize;

        let expected = self.next_presentation_time();
        if pts != expected {
            return Err(EncodeError::FrameComposition {
                frame,
                reason: format!("presentation time {} does not follow {}", pts, expected),
            });
        }
        if buffer.data().len() != self.frame_len {
            return Err(EncodeError::FrameComposition {
                frame,
                reason: format!("buffer holds {} bytes, expected {}", buffer.data().len(), self.frame_len),
            });
        }

        slot.permit.send(Sample { buffer, pts });
        self.appended += 1;
        Ok(())
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Signal that no more frames will be appended
    pub fn mark_as_finished(self) {
        debug!("video input finished after {} frames", self.appended);
    }
}

async fn pump_frames(mut stdin: ChildStdin, mut rx: mpsc::Receiver<Sample>) -> std::io::Result<u64> {
    let mut frames = 0u64;

    while let Some(sample) = rx.recv().await {
        stdin.write_all(sample.buffer.data()).await?;
        frames += 1;
        debug!("frame {} streamed at {}", frames - 1, sample.pts);
    }

    stdin.flush().await?;
    drop(stdin);
    Ok(frames)
}

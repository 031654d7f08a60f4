//! Encoding and muxing error types

use std::path::PathBuf;

use thiserror::Error;

use crate::probe::MediaKind;

/// Errors raised while turning an image sequence into a video file
#[derive(Error, Debug)]
pub enum EncodeError {
    /// Codec or output configuration was rejected before any work started
    #[error("encoder setup rejected: {0}")]
    EncoderSetup(String),

    /// The encoding session could not be started
    #[error("failed to start writing: {0}")]
    WriteStart(String),

    /// No pixel-buffer pool is available for the session
    #[error("pixel buffer pool unavailable: {0}")]
    BufferPool(String),

    /// A buffer could not be acquired or composed for a frame
    #[error("frame {frame} composition failed: {reason}")]
    FrameComposition { frame: usize, reason: String },

    /// The encoding session terminated while frames were still being submitted
    #[error("encoder session terminated: {0}")]
    Session(String),

    /// Flushing or closing the output failed
    #[error("failed to finish writing: {0}")]
    Finalize(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while combining a video file with a soundtrack
#[derive(Error, Debug)]
pub enum MuxError {
    /// The composition refused to allocate a track
    #[error("could not create {0} track in composition")]
    TrackCreation(MediaKind),

    /// The source asset carries no track of the requested kind
    #[error("no {kind} track in {path:?}")]
    NoMediaTrack { kind: MediaKind, path: PathBuf },

    /// Asset metadata could not be loaded
    #[error("failed to load asset: {0}")]
    Probe(#[from] ProbeError),

    /// A time range insert violated the composition layout
    #[error("invalid insert: {0}")]
    InvalidInsert(String),

    /// The export session reported a failure
    #[error("export failed: {0}")]
    Export(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading asset metadata through ffprobe
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to execute ffprobe: {0}")]
    ExecutionFailed(#[source] std::io::Error),

    #[error("ffprobe exited with code {code} for {path:?}")]
    NonZeroExit { path: PathBuf, code: i32 },

    #[error("failed to parse ffprobe output: {0}")]
    ParseFailed(#[from] serde_json::Error),
}

/// Errors raised while drawing an image into a pixel buffer
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ComposeError {
    #[error("image has no raster content ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferLength { expected: usize, actual: usize },
}

//! montage-processing - slideshow encoding and soundtrack muxing
//!
//! Turns an ordered image sequence into an H.264 MP4 with
//! [`FrameSequenceEncoder`], and places a separate soundtrack under that
//! video with [`AudioVideoMuxer`]. Both drive the FFmpeg command-line tools.

pub mod compose;
pub mod composition;
pub mod encoder;
pub mod error;
pub mod export;
pub mod muxer;
pub mod output;
pub mod pixel;
pub mod probe;
pub mod time;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use compose::{compose_into, fitted_rect, FittedRect, RasterImage};
pub use composition::{Composition, CompositionTrack, TrackId, TrackSegment};
pub use encoder::{check_encoder, check_ffmpeg, check_ffprobe, EncoderConfig, FrameSequenceEncoder, VIDEO_FILE_NAME};
pub use error::{ComposeError, EncodeError, MuxError, ProbeError};
pub use export::{ExportPreset, ExportSession, OutputFileType};
pub use muxer::{compose_assets, place_assets, AudioVideoMuxer, MuxerConfig, MUXED_FILE_NAME};
pub use pixel::{FrameSize, PixelBuffer, PixelBufferPool, PixelFormat};
pub use probe::{load_asset, AssetTrack, DisplayTransform, MediaAsset, MediaKind};
pub use time::{MediaTime, TimeRange};
pub use writer::{VideoSettings, VideoWriter, VideoWriterInput, WriterStatus, WrittenVideo, X264_PRESETS};

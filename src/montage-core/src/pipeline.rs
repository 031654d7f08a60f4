//! The slideshow pipeline: fetch images, build the video, add the soundtrack
//!
//! Each stage finishes before the next begins; the intermediate `video.mp4`
//! stays next to the muxed result.

use std::path::{Path, PathBuf};

use montage_processing::{AudioVideoMuxer, EncodeError, FrameSequenceEncoder, FrameSize, MuxError};
use montage_source::{ImageSource, SourceError};
use thiserror::Error;
use tracing::info;

use crate::config::Config;

/// A pipeline failure, tagged with the stage that raised it
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("image source failed: {0}")]
    Source(#[from] SourceError),

    #[error("slideshow encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("soundtrack muxing failed: {0}")]
    Mux(#[from] MuxError),
}

/// Artifacts written by a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    /// The silent slideshow
    pub video: PathBuf,
    /// The slideshow with its soundtrack
    pub muxed: PathBuf,
}

/// Build a slideshow from `source` and lay `audio` underneath it
pub async fn run_pipeline(
    source: &dyn ImageSource,
    audio: &Path,
    config: &Config,
) -> Result<PipelineOutput, PipelineError> {
    info!("fetching images from {}", source.describe());
    let images = source.fetch()?;

    let size = FrameSize::new(config.width, config.height)?;
    let encoder = FrameSequenceEncoder::new(config.encoder_config());
    let video = encoder.build(&images, size).await?;
    info!("slideshow ready: {:?}", video);

    let muxer = AudioVideoMuxer::new(config.muxer_config());
    let muxed = muxer.merge(&video, audio).await?;
    info!("slideshow with soundtrack ready: {:?}", muxed);

    Ok(PipelineOutput { video, muxed })
}

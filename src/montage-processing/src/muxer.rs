//! Audio/video muxing
//!
//! Places the first video track of one file and the first audio track of
//! another on a fresh composition, both from time zero and both spanning the
//! video's duration, then exports the result as MP4.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::composition::Composition;
use crate::error::MuxError;
use crate::export::{ExportPreset, ExportSession};
use crate::output::replace_existing;
use crate::probe::{load_asset, MediaAsset, MediaKind};
use crate::time::{MediaTime, TimeRange};

/// File name of the muxed artifact inside the output directory
pub const MUXED_FILE_NAME: &str = "videoWithAudio.mp4";

/// Muxer configuration
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// Directory receiving `videoWithAudio.mp4`
    pub output_dir: PathBuf,
    pub preset: ExportPreset,
    pub optimize_for_network_use: bool,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            preset: ExportPreset::HighestQuality,
            optimize_for_network_use: true,
        }
    }
}

/// Combines a video file with a separate soundtrack
pub struct AudioVideoMuxer {
    config: MuxerConfig,
}

impl AudioVideoMuxer {
    pub fn new(config: MuxerConfig) -> Self {
        Self { config }
    }

    /// Where [`merge`](Self::merge) writes its result
    pub fn output_path(&self) -> PathBuf {
        self.config.output_dir.join(MUXED_FILE_NAME)
    }

    /// Lay out the video and audio sources on a new composition
    ///
    /// The audio range is the video track's duration, whatever the length of
    /// the audio source.
    pub async fn compose(&self, video: &Path, audio: &Path) -> Result<Composition, MuxError> {
        let (video_asset, audio_asset) = tokio::try_join!(load_asset(video), load_asset(audio))?;
        compose_assets(&video_asset, &audio_asset)
    }

    /// Mux `video` and `audio` into `videoWithAudio.mp4`
    ///
    /// Any existing file at the output path is replaced. When either source
    /// lacks the needed track nothing is written.
    pub async fn merge(&self, video: &Path, audio: &Path) -> Result<PathBuf, MuxError> {
        info!("merging {:?} with soundtrack {:?}", video, audio);

        let composition = self.compose(video, audio).await?;

        let output_path = self.output_path();
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        replace_existing(&output_path).await?;

        let mut session = ExportSession::new(composition, self.config.preset);
        session.output_path = Some(output_path);
        session.optimize_for_network_use = self.config.optimize_for_network_use;

        let path = session.export().await?;
        info!("muxed output written to {:?}", path);
        Ok(path)
    }

    /// Get the output directory
    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }
}

/// Place the first video track of `video` and the first audio track of `audio` on a new composition
pub fn compose_assets(video: &MediaAsset, audio: &MediaAsset) -> Result<Composition, MuxError> {
    place_assets(Composition::new(), video, audio)
}

/// Add one video and one audio track to `composition` and fill them from time zero
///
/// Both tracks receive the video track's duration. Fails with
/// [`MuxError::TrackCreation`] when `composition` already holds a track of
/// either kind.
pub fn place_assets(
    mut composition: Composition,
    video: &MediaAsset,
    audio: &MediaAsset,
) -> Result<Composition, MuxError> {
    let video_id = composition
        .add_mutable_track(MediaKind::Video)
        .ok_or(MuxError::TrackCreation(MediaKind::Video))?;
    let audio_id = composition
        .add_mutable_track(MediaKind::Audio)
        .ok_or(MuxError::TrackCreation(MediaKind::Audio))?;

    let video_track = video
        .first_track(MediaKind::Video)
        .ok_or_else(|| MuxError::NoMediaTrack {
            kind: MediaKind::Video,
            path: video.path.clone(),
        })?;
    let audio_track = audio
        .first_track(MediaKind::Audio)
        .ok_or_else(|| MuxError::NoMediaTrack {
            kind: MediaKind::Audio,
            path: audio.path.clone(),
        })?;

    composition.set_preferred_transform(video_id, video_track.preferred_transform)?;

    let range = TimeRange::from_zero(video_track.time_range.duration);
    composition.insert_time_range(video_id, range, &video.path, video_track, MediaTime::zero())?;
    composition.insert_time_range(audio_id, range, &audio.path, audio_track, MediaTime::zero())?;

    if audio_track.time_range.duration < range.duration {
        info!(
            "audio source {:?} ({}) is shorter than the video ({}), padding with silence",
            audio.path, audio_track.time_range.duration, range.duration
        );
    }

    Ok(composition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EncoderConfig, FrameSequenceEncoder};
    use crate::pixel::FrameSize;
    use crate::probe::{parse_ffprobe_json, DisplayTransform};
    use crate::test_support::{probe_streams, require_toolchain, solid_image, write_wav};

    const SLIDESHOW_JSON: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "codec_type": "video",
                "width": 1024,
                "height": 1024,
                "time_base": "1/16384",
                "start_pts": 0,
                "duration_ts": 81920,
                "duration": "5.000000",
                "nb_frames": "5",
                "side_data_list": [{ "side_data_type": "Display Matrix", "rotation": -90 }]
            }
        ],
        "format": { "duration": "5.000000" }
    }"#;

    const SOUNDTRACK_JSON: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "pcm_s16le",
                "codec_type": "audio",
                "time_base": "1/44100",
                "start_pts": 0,
                "duration_ts": 132300,
                "duration": "3.000000"
            }
        ],
        "format": { "duration": "3.000000" }
    }"#;

    fn asset(path: &str, json: &str) -> MediaAsset {
        parse_ffprobe_json(Path::new(path), json.as_bytes()).unwrap()
    }

    async fn encode_slideshow(dir: &Path, seconds: u32) -> PathBuf {
        let encoder = FrameSequenceEncoder::new(EncoderConfig {
            output_dir: dir.to_path_buf(),
            preset: "ultrafast".to_string(),
            ..EncoderConfig::default()
        });
        let images: Vec<_> = (0..seconds).map(|i| solid_image(32 + i * 8, 48)).collect();
        encoder.build(&images, FrameSize::new(64, 64).unwrap()).await.unwrap()
    }

    fn muxer_in(dir: &Path) -> AudioVideoMuxer {
        AudioVideoMuxer::new(MuxerConfig {
            output_dir: dir.to_path_buf(),
            ..MuxerConfig::default()
        })
    }

    #[test]
    fn test_muxer_config_default() {
        let config = MuxerConfig::default();
        assert_eq!(config.preset, ExportPreset::HighestQuality);
        assert!(config.optimize_for_network_use);
        assert_eq!(
            muxer_in(Path::new("/tmp/docs")).output_path(),
            PathBuf::from("/tmp/docs/videoWithAudio.mp4")
        );
    }

    #[test]
    fn test_audio_range_follows_video_duration() {
        let video = asset("/docs/video.mp4", SLIDESHOW_JSON);
        let audio = asset("/docs/music.wav", SOUNDTRACK_JSON);

        let composition = compose_assets(&video, &audio).unwrap();
        let video_track = composition.track_with_kind(MediaKind::Video).unwrap();
        let audio_track = composition.track_with_kind(MediaKind::Audio).unwrap();

        // five seconds requested from a three second source
        assert_eq!(video_track.time_range(), TimeRange::from_zero(MediaTime::new(5, 1)));
        assert_eq!(audio_track.time_range(), TimeRange::from_zero(MediaTime::new(5, 1)));

        let segment = audio_track.segment().unwrap();
        assert_eq!(segment.source_path, PathBuf::from("/docs/music.wav"));
        assert_eq!(segment.target_start, MediaTime::zero());
        assert_eq!(composition.duration(), MediaTime::new(5, 1));

        assert_eq!(video_track.preferred_transform(), DisplayTransform::from_rotation(-90.0));
    }

    #[test]
    fn test_longer_audio_is_cut_to_video() {
        let video = asset("/docs/video.mp4", &SLIDESHOW_JSON.replace("81920", "32768"));
        let audio = asset("/docs/music.wav", SOUNDTRACK_JSON);

        let composition = compose_assets(&video, &audio).unwrap();
        let audio_track = composition.track_with_kind(MediaKind::Audio).unwrap();
        assert_eq!(audio_track.time_range().duration, MediaTime::new(2, 1));
    }

    #[test]
    fn test_missing_tracks_are_reported() {
        let video = asset("/docs/video.mp4", SLIDESHOW_JSON);
        let audio = asset("/docs/music.wav", SOUNDTRACK_JSON);

        let err = compose_assets(&audio, &audio).unwrap_err();
        assert!(matches!(err, MuxError::NoMediaTrack { kind: MediaKind::Video, ref path } if path == Path::new("/docs/music.wav")));

        let err = compose_assets(&video, &video).unwrap_err();
        assert!(matches!(err, MuxError::NoMediaTrack { kind: MediaKind::Audio, ref path } if path == Path::new("/docs/video.mp4")));
    }

    #[test]
    fn test_occupied_composition_cannot_take_tracks() {
        let video = asset("/docs/video.mp4", SLIDESHOW_JSON);
        let audio = asset("/docs/music.wav", SOUNDTRACK_JSON);

        let mut with_video = Composition::new();
        with_video.add_mutable_track(MediaKind::Video).unwrap();
        let err = place_assets(with_video, &video, &audio).unwrap_err();
        assert!(matches!(err, MuxError::TrackCreation(MediaKind::Video)));

        let mut with_audio = Composition::new();
        with_audio.add_mutable_track(MediaKind::Audio).unwrap();
        let err = place_assets(with_audio, &video, &audio).unwrap_err();
        assert!(matches!(err, MuxError::TrackCreation(MediaKind::Audio)));
    }

    #[tokio::test]
    async fn test_unreadable_sources_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = muxer_in(dir.path());

        let err = muxer
            .merge(&dir.path().join("missing.mp4"), &dir.path().join("missing.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, MuxError::Probe(_)));
        assert!(!muxer.output_path().exists());
    }

    #[tokio::test]
    #[ignore = "needs ffmpeg, ffprobe and libx264 on PATH"]
    async fn test_short_audio_spans_video_duration() {
        require_toolchain().await;

        let dir = tempfile::tempdir().unwrap();
        let video = encode_slideshow(dir.path(), 5).await;
        let audio = write_wav(&dir.path().join("music.wav"), 3.0);
        let muxer = muxer_in(dir.path());

        let composition = muxer.compose(&video, &audio).await.unwrap();
        let audio_track = composition.track_with_kind(MediaKind::Audio).unwrap();
        assert_eq!(audio_track.time_range().start, MediaTime::zero());
        assert!((audio_track.time_range().duration.as_secs_f64() - 5.0).abs() < 0.01);

        let output = muxer.merge(&video, &audio).await.unwrap();
        let streams = probe_streams(&output);
        let source = probe_streams(&video);

        let muxed_video = streams.iter().find(|s| s.kind == "video").unwrap();
        let source_video = source.iter().find(|s| s.kind == "video").unwrap();
        assert!((muxed_video.duration - source_video.duration).abs() < 0.05);

        // the requested five seconds, not the source's three
        let muxed_audio = streams.iter().find(|s| s.kind == "audio").unwrap();
        assert!((muxed_audio.duration - 5.0).abs() < 0.1, "audio {}", muxed_audio.duration);
    }

    #[tokio::test]
    #[ignore = "needs ffmpeg, ffprobe and libx264 on PATH"]
    async fn test_long_audio_is_truncated_to_video() {
        require_toolchain().await;

        let dir = tempfile::tempdir().unwrap();
        let video = encode_slideshow(dir.path(), 2).await;
        let audio = write_wav(&dir.path().join("music.wav"), 6.0);

        let output = muxer_in(dir.path()).merge(&video, &audio).await.unwrap();
        let streams = probe_streams(&output);

        assert_eq!(streams.len(), 2);
        let muxed_audio = streams.iter().find(|s| s.kind == "audio").unwrap();
        assert!((muxed_audio.duration - 2.0).abs() < 0.1, "audio {}", muxed_audio.duration);
    }

    #[tokio::test]
    #[ignore = "needs ffmpeg, ffprobe and libx264 on PATH"]
    async fn test_missing_tracks_write_nothing() {
        require_toolchain().await;

        let dir = tempfile::tempdir().unwrap();
        let video = encode_slideshow(dir.path(), 1).await;
        let audio = write_wav(&dir.path().join("music.wav"), 1.0);
        let muxer = muxer_in(dir.path());

        // a soundtrack offers no video track
        let err = muxer.merge(&audio, &audio).await.unwrap_err();
        assert!(matches!(err, MuxError::NoMediaTrack { kind: MediaKind::Video, .. }));

        // a silent slideshow offers no audio track
        let err = muxer.merge(&video, &video).await.unwrap_err();
        assert!(matches!(err, MuxError::NoMediaTrack { kind: MediaKind::Audio, .. }));

        assert!(!muxer.output_path().exists());
    }

    #[tokio::test]
    #[ignore = "needs ffmpeg, ffprobe and libx264 on PATH"]
    async fn test_merge_twice_overwrites() {
        require_toolchain().await;

        let dir = tempfile::tempdir().unwrap();
        let video = encode_slideshow(dir.path(), 3).await;
        let audio = write_wav(&dir.path().join("music.wav"), 2.0);
        let muxer = muxer_in(dir.path());

        let first = muxer.merge(&video, &audio).await.unwrap();
        let first_streams = probe_streams(&first);
        let second = muxer.merge(&video, &audio).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(probe_streams(&second), first_streams);
    }
}

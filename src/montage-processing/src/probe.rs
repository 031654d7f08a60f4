//! Media asset loading through ffprobe

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::ProbeError;
use crate::time::{MediaTime, TimeRange};

/// Timescale used when ffprobe only reports a decimal duration
const FALLBACK_TIMESCALE: i32 = 1_000_000;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    fn from_codec_type(codec_type: &str) -> Option<Self> {
        match codec_type {
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Display orientation of a video track, as a counter-clockwise rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayTransform {
    rotation_degrees: i32,
}

impl DisplayTransform {
    pub const IDENTITY: DisplayTransform = DisplayTransform { rotation_degrees: 0 };

    /// Snap to the nearest quarter turn and normalize into `0..360`
    pub fn from_rotation(degrees: f64) -> Self {
        let quarter_turns = (degrees / 90.0).round() as i64;
        Self {
            rotation_degrees: (quarter_turns.rem_euclid(4) * 90) as i32,
        }
    }

    pub fn rotation_degrees(&self) -> i32 {
        self.rotation_degrees
    }

    pub fn is_identity(&self) -> bool {
        self.rotation_degrees == 0
    }
}

/// One stream of a probed asset
#[derive(Debug, Clone, PartialEq)]
pub struct AssetTrack {
    /// Stream index inside the source file
    pub index: usize,
    pub kind: MediaKind,
    pub codec: Option<String>,
    pub time_range: TimeRange,
    pub frame_count: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub preferred_transform: DisplayTransform,
}

/// A media file and the tracks it carries
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub tracks: Vec<AssetTrack>,
    /// Container duration, when reported
    pub duration: Option<MediaTime>,
}

impl MediaAsset {
    /// Tracks of one kind, in stream order
    pub fn tracks_with_kind(&self, kind: MediaKind) -> impl Iterator<Item = &AssetTrack> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }

    pub fn first_track(&self, kind: MediaKind) -> Option<&AssetTrack> {
        self.tracks_with_kind(kind).next()
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    time_base: Option<String>,
    start_pts: Option<i64>,
    duration_ts: Option<i64>,
    start_time: Option<String>,
    duration: Option<String>,
    nb_frames: Option<String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

/// Load the track layout of a media file
pub async fn load_asset(path: &Path) -> Result<MediaAsset, ProbeError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .await
        .map_err(ProbeError::ExecutionFailed)?;

    if !output.status.success() {
        return Err(ProbeError::NonZeroExit {
            path: path.to_path_buf(),
            code: output.status.code().unwrap_or(-1),
        });
    }

    let asset = parse_ffprobe_json(path, &output.stdout)?;
    debug!("loaded asset {:?} with {} track(s)", path, asset.tracks.len());
    Ok(asset)
}

/// Build a [`MediaAsset`] from `ffprobe -print_format json` output
pub fn parse_ffprobe_json(path: &Path, json: &[u8]) -> Result<MediaAsset, ProbeError> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let tracks = probe
        .streams
        .into_iter()
        .filter_map(|stream| {
            let kind = MediaKind::from_codec_type(stream.codec_type.as_deref()?)?;
            Some(track_from_stream(kind, stream))
        })
        .collect();

    let duration = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .map(|secs| MediaTime::from_seconds(secs, FALLBACK_TIMESCALE));

    Ok(MediaAsset {
        path: path.to_path_buf(),
        tracks,
        duration,
    })
}

fn track_from_stream(kind: MediaKind, stream: FfprobeStream) -> AssetTrack {
    let time_base = stream.time_base.as_deref().and_then(parse_time_base);

    let start = match (stream.start_pts, time_base) {
        (Some(pts), Some((1, den))) => MediaTime::new(pts, den),
        _ => parse_seconds(stream.start_time.as_deref()).unwrap_or_default(),
    };
    let duration = match (stream.duration_ts, time_base) {
        (Some(ts), Some((1, den))) => MediaTime::new(ts, den),
        _ => parse_seconds(stream.duration.as_deref()).unwrap_or_default(),
    };

    let rotation = stream
        .side_data_list
        .iter()
        .find_map(|side| side.rotation)
        .or_else(|| stream.tags.rotate.as_deref().and_then(|r| r.parse::<f64>().ok()).map(|r| -r));

    AssetTrack {
        index: stream.index,
        kind,
        codec: stream.codec_name,
        time_range: TimeRange::new(start, duration),
        frame_count: stream.nb_frames.and_then(|n| n.parse().ok()),
        width: stream.width,
        height: stream.height,
        preferred_transform: rotation.map(DisplayTransform::from_rotation).unwrap_or_default(),
    }
}

fn parse_time_base(time_base: &str) -> Option<(i64, i32)> {
    let (num, den) = time_base.split_once('/')?;
    let num = num.trim().parse().ok()?;
    let den: i32 = den.trim().parse().ok()?;
    (den > 0).then_some((num, den))
}

fn parse_seconds(value: Option<&str>) -> Option<MediaTime> {
    value?
        .parse::<f64>()
        .ok()
        .map(|secs| MediaTime::from_seconds(secs, FALLBACK_TIMESCALE))
}

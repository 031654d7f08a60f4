//! Helpers shared by the ffmpeg-backed tests

use std::path::{Path, PathBuf};
use std::process::Command;

use hound::{SampleFormat, WavSpec, WavWriter};
use image::{Rgba, RgbaImage};
use serde_json::Value;

use crate::compose::RasterImage;
use crate::encoder::{check_encoder, check_ffmpeg, check_ffprobe};

/// Opaque single-colour image of the given size
pub fn solid_image(width: u32, height: u32) -> RasterImage {
    let pixel = Rgba([(width % 256) as u8, (height % 256) as u8, 200, 255]);
    RasterImage::ImageRgba8(RgbaImage::from_pixel(width, height, pixel))
}

/// Fail loudly when ffmpeg, ffprobe or libx264 is missing
///
/// Tests calling this are `#[ignore]`d; run them with `cargo test -- --ignored`.
pub async fn require_toolchain() {
    assert!(check_ffmpeg(), "ffmpeg not found on PATH");
    assert!(check_ffprobe(), "ffprobe not found on PATH");
    assert!(check_encoder("libx264").await, "ffmpeg lacks the libx264 encoder");
}

/// The observable properties of one encoded stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub kind: String,
    pub codec: String,
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

fn ffprobe_json(path: &Path, extra: &[&str]) -> Value {
    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json"])
        .args(extra)
        .arg(path)
        .output()
        .expect("ffprobe runs");
    assert!(output.status.success(), "ffprobe failed on {:?}", path);
    serde_json::from_slice(&output.stdout).expect("ffprobe emits json")
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Every stream in the file, in container order
pub fn probe_streams(path: &Path) -> Vec<StreamSummary> {
    let json = ffprobe_json(path, &["-count_packets", "-show_streams"]);
    json["streams"]
        .as_array()
        .map(|streams| {
            streams
                .iter()
                .map(|s| StreamSummary {
                    kind: s["codec_type"].as_str().unwrap_or_default().to_string(),
                    codec: s["codec_name"].as_str().unwrap_or_default().to_string(),
                    frames: number(&s["nb_read_packets"]).unwrap_or(0.0) as u64,
                    width: s["width"].as_u64().unwrap_or(0) as u32,
                    height: s["height"].as_u64().unwrap_or(0) as u32,
                    duration: number(&s["duration"]).unwrap_or(0.0),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// The first video stream of the file
pub fn probe_video_stream(path: &Path) -> StreamSummary {
    probe_streams(path)
        .into_iter()
        .find(|s| s.kind == "video")
        .expect("file has a video stream")
}

/// Presentation times of every video packet, in seconds, ascending
pub fn frame_pts(path: &Path) -> Vec<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-select_streams",
            "v:0",
            "-show_entries",
            "packet=pts_time",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .expect("ffprobe runs");

    let mut pts: Vec<f64> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().trim_end_matches(',').parse().ok())
        .collect();
    pts.sort_by(|a, b| a.total_cmp(b));
    pts
}

/// Write a mono 16-bit sine tone lasting `seconds`
pub fn write_wav(path: &Path, seconds: f64) -> PathBuf {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).expect("create wav");

    let samples = (seconds * spec.sample_rate as f64).round() as u64;
    for n in 0..samples {
        let t = n as f64 / spec.sample_rate as f64;
        let sample = (t * 440.0 * std::f64::consts::TAU).sin() * 0.3;
        writer.write_sample((sample * i16::MAX as f64) as i16).expect("write sample");
    }
    writer.finalize().expect("finalize wav");

    path.to_path_buf()
}

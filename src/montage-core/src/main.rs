//! Montage - slideshow videos with a soundtrack
//!
//! Encodes a directory of still images into an H.264 slideshow and muxes a
//! separate audio file underneath it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use montage_core::colored_logger::{init_component_logger, Component};
use montage_core::config::Config;
use montage_core::pipeline::run_pipeline;
use montage_processing::{
    check_encoder, check_ffmpeg, check_ffprobe, load_asset, AudioVideoMuxer, FrameSequenceEncoder,
};
use montage_source::{DirectoryImageSource, ImageSource};

#[derive(Parser)]
#[command(name = "montage")]
#[command(about = "Slideshow videos from still images, with a soundtrack")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory receiving video.mp4 and videoWithAudio.mp4
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a directory of images into video.mp4
    Build {
        /// Directory holding the images, taken in file name order
        #[arg(short, long)]
        images: PathBuf,

        /// Output frame size (e.g. 1024x1024)
        #[arg(short, long, value_parser = parse_size)]
        size: Option<(u32, u32)>,
    },

    /// Lay a soundtrack under an existing video
    Merge {
        /// Video file providing the picture
        #[arg(long)]
        video: PathBuf,

        /// Audio file providing the soundtrack
        #[arg(short, long)]
        audio: PathBuf,
    },

    /// Build the slideshow, then merge the soundtrack
    Run {
        /// Directory holding the images, taken in file name order
        #[arg(short, long)]
        images: PathBuf,

        /// Audio file providing the soundtrack
        #[arg(short, long)]
        audio: PathBuf,

        /// Output frame size (e.g. 1024x1024)
        #[arg(short, long, value_parser = parse_size)]
        size: Option<(u32, u32)>,
    },

    /// Show the tracks of a media file
    Probe {
        /// Media file to inspect
        file: PathBuf,
    },

    /// Check dependencies (FFmpeg, etc.)
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_component_logger(Component::Main, cli.verbose)?;

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    match cli.command {
        Commands::Build { images, size } => {
            cmd_build(apply_size(config, size), &images)?;
        }
        Commands::Merge { video, audio } => {
            cmd_merge(config, &video, &audio)?;
        }
        Commands::Run { images, audio, size } => {
            cmd_run(apply_size(config, size), &images, &audio)?;
        }
        Commands::Probe { file } => {
            cmd_probe(&file)?;
        }
        Commands::Check => {
            cmd_check()?;
        }
    }

    Ok(())
}

fn apply_size(mut config: Config, size: Option<(u32, u32)>) -> Config {
    if let Some((width, height)) = size {
        config.width = width;
        config.height = height;
    }
    config
}

/// Parse a `WIDTHxHEIGHT` frame size
fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let width = w.trim().parse().map_err(|_| format!("invalid width '{}'", w))?;
    let height = h.trim().parse().map_err(|_| format!("invalid height '{}'", h))?;
    Ok((width, height))
}

fn require_ffmpeg() -> Result<()> {
    if !check_ffmpeg() || !check_ffprobe() {
        error!("ffmpeg/ffprobe not found in PATH - please install FFmpeg");
        return Err(anyhow::anyhow!("FFmpeg not found"));
    }
    Ok(())
}

#[tokio::main]
async fn cmd_build(config: Config, images: &Path) -> Result<()> {
    require_ffmpeg()?;

    let source = DirectoryImageSource::new(images);
    info!("loading images from {}", source.describe());
    let frames = source
        .fetch()
        .with_context(|| format!("Failed to load images from {:?}", images))?;

    let size = config.frame_size()?;
    let encoder = FrameSequenceEncoder::new(config.encoder_config());
    let video = encoder
        .build(&frames, size)
        .await
        .context("Failed to encode slideshow")?;

    println!("{}", video.display());
    Ok(())
}

#[tokio::main]
async fn cmd_merge(config: Config, video: &Path, audio: &Path) -> Result<()> {
    require_ffmpeg()?;

    let muxer = AudioVideoMuxer::new(config.muxer_config());
    let muxed = muxer
        .merge(video, audio)
        .await
        .with_context(|| format!("Failed to merge {:?} with {:?}", video, audio))?;

    println!("{}", muxed.display());
    Ok(())
}

#[tokio::main]
async fn cmd_run(config: Config, images: &Path, audio: &Path) -> Result<()> {
    require_ffmpeg()?;

    info!("output directory: {:?}", config.output_dir);
    let source = DirectoryImageSource::new(images);
    let output = run_pipeline(&source, audio, &config)
        .await
        .context("Slideshow pipeline failed")?;

    println!("video:      {}", output.video.display());
    println!("with audio: {}", output.muxed.display());
    Ok(())
}

#[tokio::main]
async fn cmd_probe(file: &Path) -> Result<()> {
    require_ffmpeg()?;

    let asset = load_asset(file)
        .await
        .with_context(|| format!("Failed to probe {:?}", file))?;

    match asset.duration {
        Some(duration) => println!("{} ({})", asset.path.display(), duration),
        None => println!("{}", asset.path.display()),
    }
    for track in &asset.tracks {
        print!(
            "  [{}] {} {} {}",
            track.index,
            track.kind,
            track.codec.as_deref().unwrap_or("?"),
            track.time_range.duration
        );
        if let (Some(w), Some(h)) = (track.width, track.height) {
            print!(" {}x{}", w, h);
        }
        if !track.preferred_transform.is_identity() {
            print!(" rotated {}°", track.preferred_transform.rotation_degrees());
        }
        println!();
    }

    Ok(())
}

#[tokio::main]
async fn cmd_check() -> Result<()> {
    println!("checking dependencies...\n");

    let ffmpeg_ok = check_ffmpeg();
    println!("  ffmpeg:  {}", if ffmpeg_ok { "OK" } else { "NOT FOUND" });

    let ffprobe_ok = check_ffprobe();
    println!("  ffprobe: {}", if ffprobe_ok { "OK" } else { "NOT FOUND" });

    let x264_ok = ffmpeg_ok && check_encoder("libx264").await;
    if ffmpeg_ok {
        println!("  libx264: {}", if x264_ok { "OK" } else { "NOT AVAILABLE" });
    }

    println!();

    if !(ffmpeg_ok && ffprobe_ok && x264_ok) {
        println!("WARNING: FFmpeg with libx264 is required for encoding.");
        println!("Please install FFmpeg and ensure ffmpeg and ffprobe are in your PATH.");
        println!("Download: https://ffmpeg.org/download.html");
    } else {
        println!("all checks passed!");
    }

    Ok(())
}

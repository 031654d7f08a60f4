//! Montage Core Library
//!
//! Configuration, colored logging and the build-then-merge pipeline behind
//! the `montage` binary.

pub mod colored_logger;
pub mod config;
pub mod pipeline;

pub use config::Config;
pub use pipeline::{run_pipeline, PipelineError, PipelineOutput};

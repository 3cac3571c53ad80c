//! Crash detection and vehicle mass estimation from logged IMU telemetry.
//!
//! Raw samples are gravity-compensated once, then consumed by two independent
//! paths: a cooldown-gated crash classifier and a movement-filtered,
//! adaptively smoothed longitudinal-dynamics mass estimator.

pub mod config;
pub mod error;
pub mod incident;
pub mod ingest;
pub mod movement;
pub mod orientation;
pub mod physics;
pub mod pipeline;
pub mod smoothing;
pub mod stats;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use incident::{CrashDetector, CrashEvent, CrashSeverity};
pub use physics::{MassEstimate, MassEstimation};
pub use pipeline::{AnalysisReport, MassReport};
pub use types::{NormalizedSample, Sample};

use std::fmt;
use std::fs;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::incident::{self, CrashEvent, CrashSeverity};
use crate::movement::{self, MovementThresholds};
use crate::orientation;
use crate::physics::{self, MassEstimate, MassEstimation};
use crate::smoothing::{SmoothingStrategy, WindowPolicy};
use crate::types::{NormalizedSample, Sample};

/// Which downstream paths to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Crash,
    Mass,
    All,
}

impl AnalysisMode {
    pub fn runs_crash(self) -> bool {
        matches!(self, AnalysisMode::Crash | AnalysisMode::All)
    }

    pub fn runs_mass(self) -> bool {
        matches!(self, AnalysisMode::Mass | AnalysisMode::All)
    }
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crash" => Ok(AnalysisMode::Crash),
            "mass" => Ok(AnalysisMode::Mass),
            "all" | "both" => Ok(AnalysisMode::All),
            other => Err(format!("unknown mode {other:?} (expected crash, mass or all)")),
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnalysisMode::Crash => "crash",
            AnalysisMode::Mass => "mass",
            AnalysisMode::All => "all",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MassReport {
    pub window_size: usize,
    pub window_policy: WindowPolicy,
    pub strategy: SmoothingStrategy,
    pub moving_samples: usize,
    pub records: Vec<MassEstimate>,
    pub final_mass_estimate: f64,
}

impl From<MassEstimation> for MassReport {
    fn from(estimation: MassEstimation) -> Self {
        Self {
            window_size: estimation.window.size,
            window_policy: estimation.window.policy,
            strategy: estimation.strategy,
            moving_samples: estimation.moving_samples,
            records: estimation.records,
            final_mass_estimate: estimation.final_mass_estimate,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub generated_at: String,
    pub mode: AnalysisMode,
    pub total_samples: usize,
    pub crashes: Vec<CrashEvent>,
    pub small_crash_count: usize,
    pub large_crash_count: usize,
    pub mass: Option<MassReport>,
}

impl AnalysisReport {
    pub fn crash_times(&self, severity: CrashSeverity) -> Vec<f64> {
        self.crashes
            .iter()
            .filter(|e| e.severity == severity)
            .map(|e| e.time)
            .collect()
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Time must be finite and non-decreasing.
pub fn validate_time_order(samples: &[Sample]) -> PipelineResult<()> {
    let mut previous: Option<f64> = None;
    for (index, sample) in samples.iter().enumerate() {
        if !sample.time.is_finite() {
            return Err(PipelineError::MalformedSample {
                index,
                reason: format!("non-finite time {}", sample.time),
            });
        }
        if let Some(prev) = previous {
            if sample.time < prev {
                return Err(PipelineError::NonMonotonicTime {
                    index,
                    previous: prev,
                    current: sample.time,
                });
            }
        }
        previous = Some(sample.time);
    }
    Ok(())
}

/// Batch pipeline over one in-memory sample table
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Check ordering and gravity-compensate the batch.
    pub fn normalize(&self, samples: &[Sample]) -> PipelineResult<Vec<NormalizedSample>> {
        if samples.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }
        validate_time_order(samples)?;
        orientation::normalize_acceleration(samples, self.config.gravity)
    }

    pub fn detect_crashes(
        &self,
        normalized: &[NormalizedSample],
    ) -> PipelineResult<Vec<CrashEvent>> {
        incident::detect_sample_crashes(normalized, &self.config)
    }

    pub fn estimate_mass(&self, normalized: &[NormalizedSample]) -> PipelineResult<MassEstimation> {
        let thresholds = MovementThresholds::from_config(&self.config);
        let mask = movement::movement_mask(normalized, &thresholds);
        physics::estimate_vehicle_mass(normalized, &mask, &self.config)
    }

    /// Run the selected paths. Any failure fails the whole run.
    pub fn analyze(
        &self,
        samples: &[Sample],
        mode: AnalysisMode,
    ) -> PipelineResult<AnalysisReport> {
        let normalized = self.normalize(samples)?;

        let crashes = if mode.runs_crash() {
            self.detect_crashes(&normalized)?
        } else {
            Vec::new()
        };
        let mass = if mode.runs_mass() {
            Some(MassReport::from(self.estimate_mass(&normalized)?))
        } else {
            None
        };

        let large_crash_count = crashes
            .iter()
            .filter(|e| e.severity == CrashSeverity::Large)
            .count();
        Ok(AnalysisReport {
            generated_at: Utc::now().to_rfc3339(),
            mode,
            total_samples: samples.len(),
            small_crash_count: crashes.len() - large_crash_count,
            large_crash_count,
            crashes,
            mass,
        })
    }
}

use thiserror::Error;

/// Pipeline error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Malformed sample at index {index}: {reason}")]
    MalformedSample { index: usize, reason: String },

    #[error("Non-monotonic time at index {index}: {current:.3}s follows {previous:.3}s")]
    NonMonotonicTime {
        index: usize,
        previous: f64,
        current: f64,
    },

    #[error("Empty batch: no samples to process")]
    EmptyBatch,

    #[error("No moving periods detected (try lowering min_moving_speed or motion_accel_floor)")]
    NoMovingPeriods,

    #[error(
        "No valid acceleration events: smoothed acceleration never exceeded {min_acceleration} m/s²"
    )]
    NoValidAccelerationEvents { min_acceleration: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Numerical error: {0}")]
    Numerical(String),
}

impl PipelineError {
    /// True for conditions a caller may recover from by relaxing thresholds.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(
            self,
            PipelineError::EmptyBatch
                | PipelineError::NoMovingPeriods
                | PipelineError::NoValidAccelerationEvents { .. }
        )
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

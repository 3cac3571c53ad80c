use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::stats;
use crate::types::{NormalMatrix, PolyCoeffs, POLY_COEFFS};

/// Points used by the short-series fallback
const FALLBACK_AVERAGE_POINTS: usize = 3;

/// How the window size was derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    PointBased,
    TimeAware,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowChoice {
    pub size: usize,
    pub policy: WindowPolicy,
}

/// Smoothing kernel, chosen from the series length and the window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SmoothingStrategy {
    /// Degree-2 local polynomial regression
    SavitzkyGolay { window: usize },
    /// Centered mean for series shorter than the requested window
    MovingAverage { window: usize },
}

impl SmoothingStrategy {
    pub fn select(series_len: usize, window: usize) -> Self {
        if series_len < window {
            SmoothingStrategy::MovingAverage {
                window: FALLBACK_AVERAGE_POINTS.min(series_len),
            }
        } else {
            SmoothingStrategy::SavitzkyGolay { window }
        }
    }

    pub fn window(&self) -> usize {
        match *self {
            SmoothingStrategy::SavitzkyGolay { window } => window,
            SmoothingStrategy::MovingAverage { window } => window,
        }
    }

    pub fn apply(&self, series: &[f64]) -> PipelineResult<Vec<f64>> {
        match *self {
            SmoothingStrategy::SavitzkyGolay { window } => savitzky_golay(series, window),
            SmoothingStrategy::MovingAverage { window } => {
                Ok(centered_moving_average(series, window))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SmoothedSeries {
    pub values: Vec<f64>,
    pub window: WindowChoice,
    pub strategy: SmoothingStrategy,
}

/// Data-length and sample-rate aware smoother
pub struct AdaptiveSmoother {
    min_window: usize,
    max_window: usize,
    window_ratio: f64,
    target_seconds: f64,
}

impl AdaptiveSmoother {
    pub fn new(
        min_window: usize,
        max_window: usize,
        window_ratio: f64,
        target_seconds: f64,
    ) -> Self {
        AdaptiveSmoother {
            min_window,
            max_window,
            window_ratio,
            target_seconds,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.min_window_size,
            config.max_window_size,
            config.target_window_ratio,
            config.target_window_seconds,
        )
    }

    /// Window sized as a fraction of the series length.
    pub fn point_based_window(&self, data_length: usize) -> usize {
        let suggested = (self.window_ratio * data_length as f64).round() as usize;
        self.clamp_odd(suggested)
    }

    /// Window covering `target_seconds` at the median sample interval.
    /// Irregular or degenerate timing falls back to the point-based size.
    pub fn time_aware_window(&self, times: &[f64]) -> WindowChoice {
        let point_based = WindowChoice {
            size: self.point_based_window(times.len()),
            policy: WindowPolicy::PointBased,
        };

        let intervals: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
        let (median_dt, spread) = match (stats::median(&intervals), stats::std_dev(&intervals)) {
            (Some(m), Some(s)) => (m, s),
            _ => return point_based,
        };

        if !median_dt.is_finite() || median_dt <= 0.0 || !spread.is_finite() {
            log::debug!("Degenerate sample interval {median_dt}, using point-based window");
            return point_based;
        }
        if spread > 2.0 * median_dt {
            log::debug!(
                "Irregular sampling (interval std {spread:.4}s > 2 x median {median_dt:.4}s), using point-based window"
            );
            return point_based;
        }

        let suggested = (self.target_seconds / median_dt).round() as usize;
        WindowChoice {
            size: self.clamp_odd(suggested),
            policy: WindowPolicy::TimeAware,
        }
    }

    /// Smooth `values` sampled at `times` using the time-aware window.
    pub fn smooth(&self, values: &[f64], times: &[f64]) -> PipelineResult<SmoothedSeries> {
        if values.len() != times.len() {
            return Err(PipelineError::Numerical(format!(
                "series length {} does not match time length {}",
                values.len(),
                times.len()
            )));
        }

        let window = self.time_aware_window(times);
        let strategy = SmoothingStrategy::select(values.len(), window.size);
        if let SmoothingStrategy::MovingAverage { window: points } = strategy {
            log::warn!(
                "Dataset too small ({} points) for a {}-point window, using {}-point moving average",
                values.len(),
                window.size,
                points
            );
        }

        Ok(SmoothedSeries {
            values: strategy.apply(values)?,
            window,
            strategy,
        })
    }

    // Clamp into [min, max] and force odd; steps down when max is even.
    fn clamp_odd(&self, suggested: usize) -> usize {
        let window = suggested.clamp(self.min_window, self.max_window);
        if window % 2 == 1 {
            window
        } else if window < self.max_window {
            window + 1
        } else {
            window - 1
        }
    }
}

/// Savitzky–Golay style smoothing: least-squares quadratic over each window
/// centered on the target (shifted inward at the edges), evaluated at the
/// target point.
pub fn savitzky_golay(series: &[f64], window: usize) -> PipelineResult<Vec<f64>> {
    let n = series.len();
    if window < POLY_COEFFS || window > n {
        return Err(PipelineError::Numerical(format!(
            "window {window} unusable for a quadratic fit over {n} points"
        )));
    }

    let half = window / 2;
    let mut smoothed = Vec::with_capacity(n);
    for i in 0..n {
        let start = i.saturating_sub(half).min(n - window);
        let coeffs = fit_quadratic(&series[start..start + window], start as f64 - i as f64)?;
        // Offsets are relative to i, so the fit at the target is the intercept
        smoothed.push(coeffs[0]);
    }
    Ok(smoothed)
}

// Normal equations for y ≈ a0 + a1·x + a2·x², x = first_offset + k.
fn fit_quadratic(window: &[f64], first_offset: f64) -> PipelineResult<PolyCoeffs> {
    let mut power_sums = [0.0; 2 * POLY_COEFFS - 1];
    let mut rhs = PolyCoeffs::zeros();

    for (k, &y) in window.iter().enumerate() {
        let x = first_offset + k as f64;
        let mut x_pow = 1.0;
        for (p, sum) in power_sums.iter_mut().enumerate() {
            *sum += x_pow;
            if p < POLY_COEFFS {
                rhs[p] += y * x_pow;
            }
            x_pow *= x;
        }
    }

    let normal = NormalMatrix::from_fn(|r, c| power_sums[r + c]);
    normal
        .cholesky()
        .map(|chol| chol.solve(&rhs))
        .ok_or_else(|| PipelineError::Numerical("singular polynomial fit".to_string()))
}

/// Centered moving average; windows are truncated at the series edges.
pub fn centered_moving_average(series: &[f64], window: usize) -> Vec<f64> {
    let n = series.len();
    if window <= 1 {
        return series.to_vec();
    }
    let before = (window - 1) / 2;
    let after = window / 2;

    (0..n)
        .map(|i| {
            let start = i.saturating_sub(before);
            let end = (i + after + 1).min(n);
            let slice = &series[start..end];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn smoother() -> AdaptiveSmoother {
        AdaptiveSmoother::from_config(&PipelineConfig::default())
    }

    #[test]
    fn test_point_window_bounds_and_parity() {
        let smoother = smoother();
        for n in 0..2000 {
            let w = smoother.point_based_window(n);
            assert!(w >= 5 && w <= 50, "n={n} w={w}");
            assert_eq!(w % 2, 1, "n={n} w={w}");
        }
    }

    #[test]
    fn test_time_aware_window_bounds_and_parity() {
        let smoother = smoother();
        // 1 kHz: 1 s target is 1000 points, capped at the even max
        let times: Vec<f64> = (0..5000).map(|i| i as f64 * 0.001).collect();
        let choice = smoother.time_aware_window(&times);
        assert_eq!(choice.policy, WindowPolicy::TimeAware);
        assert_eq!(choice.size, 49);

        for hz in [0.5, 1.0, 4.0, 10.0, 25.0, 49.0, 50.0, 100.0, 1000.0] {
            let times: Vec<f64> = (0..200).map(|i| i as f64 / hz).collect();
            let w = smoother.time_aware_window(&times).size;
            assert!(w >= 5 && w <= 50, "hz={hz} w={w}");
            assert_eq!(w % 2, 1, "hz={hz} w={w}");
        }
    }

    #[test]
    fn test_point_window_scales_with_length() {
        let smoother = smoother();
        assert_eq!(smoother.point_based_window(10), 5);
        assert_eq!(smoother.point_based_window(100), 11); // 10 -> 11
        assert_eq!(smoother.point_based_window(250), 25);
        assert_eq!(smoother.point_based_window(10_000), 49); // capped at even max
    }

    #[test]
    fn test_time_aware_window_regular_sampling() {
        let smoother = smoother();
        // 20 Hz for 10 s: 1 s target -> 20 points -> 21
        let times: Vec<f64> = (0..200).map(|i| i as f64 * 0.05).collect();
        let choice = smoother.time_aware_window(&times);
        assert_eq!(choice.policy, WindowPolicy::TimeAware);
        assert_eq!(choice.size, 21);
    }

    #[test]
    fn test_time_aware_window_irregular_falls_back() {
        let smoother = smoother();
        let mut times = Vec::new();
        let mut t = 0.0;
        for i in 0..100 {
            t += if i % 10 == 0 { 30.0 } else { 0.1 };
            times.push(t);
        }
        let choice = smoother.time_aware_window(&times);
        assert_eq!(choice.policy, WindowPolicy::PointBased);
        assert_eq!(choice.size, smoother.point_based_window(100));
    }

    #[test]
    fn test_time_aware_window_degenerate_intervals() {
        let smoother = smoother();
        // Logger with one-second clock resolution can repeat timestamps
        let times = vec![3.0; 40];
        assert_eq!(
            smoother.time_aware_window(&times).policy,
            WindowPolicy::PointBased
        );
        assert_eq!(
            smoother.time_aware_window(&[1.0]).policy,
            WindowPolicy::PointBased
        );
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            SmoothingStrategy::select(100, 11),
            SmoothingStrategy::SavitzkyGolay { window: 11 }
        );
        assert_eq!(
            SmoothingStrategy::select(4, 5),
            SmoothingStrategy::MovingAverage { window: 3 }
        );
        assert_eq!(
            SmoothingStrategy::select(2, 5),
            SmoothingStrategy::MovingAverage { window: 2 }
        );
    }

    #[test]
    fn test_savgol_preserves_quadratic() {
        let series: Vec<f64> = (0..30)
            .map(|i| {
                let x = i as f64;
                0.5 * x * x - 3.0 * x + 7.0
            })
            .collect();
        let smoothed = savitzky_golay(&series, 7).unwrap();
        assert_eq!(smoothed.len(), series.len());
        for (s, y) in smoothed.iter().zip(series.iter()) {
            assert_abs_diff_eq!(s, y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_savgol_reduces_noise() {
        let series: Vec<f64> = (0..60)
            .map(|i| 2.0 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let smoothed = savitzky_golay(&series, 11).unwrap();
        for v in &smoothed[5..55] {
            assert!((v - 2.0).abs() < 0.1, "v={v}");
        }
    }

    #[test]
    fn test_savgol_rejects_oversized_window() {
        assert!(savitzky_golay(&[1.0, 2.0, 3.0], 5).is_err());
    }

    #[test]
    fn test_moving_average_edges() {
        let smoothed = centered_moving_average(&[1.0, 2.0, 6.0, 3.0], 3);
        assert_abs_diff_eq!(smoothed[0], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(smoothed[1], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(smoothed[2], 11.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(smoothed[3], 4.5, epsilon = 1e-12);
    }

    #[test]
    fn test_smooth_short_series_degrades() {
        let smoother = smoother();
        let values = [1.0, 2.0, 3.0, 4.0];
        let times = [0.0, 0.1, 0.2, 0.3];
        let result = smoother.smooth(&values, &times).unwrap();
        assert_eq!(result.strategy, SmoothingStrategy::MovingAverage { window: 3 });
        assert_eq!(result.values.len(), 4);
        assert!(result.values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_smooth_length_mismatch() {
        assert!(smoother().smooth(&[1.0, 2.0], &[0.0]).is_err());
    }
}

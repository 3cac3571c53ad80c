use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::types::NormalizedSample;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrashSeverity {
    Small,
    Large,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrashEvent {
    pub time: f64,
    pub magnitude: f64, // m/s², gravity-compensated
    pub severity: CrashSeverity,
}

/// Refractory timers carried between samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CooldownState {
    pub last_small_time: f64,
    pub last_large_time: f64,
}

impl CooldownState {
    /// Both timers start one cooldown in the past so the first spike can fire.
    pub fn new(cooldown: f64) -> Self {
        Self {
            last_small_time: -cooldown,
            last_large_time: -cooldown,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrashThresholds {
    pub small: f64,
    pub large: f64,
    pub cooldown: f64,
}

impl CrashThresholds {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            small: config.small_crash_threshold,
            large: config.large_crash_threshold,
            cooldown: config.cooldown_time,
        }
    }
}

/// One transition of the two-timer classifier.
///
/// Thresholds are exclusive. A large event also resets the small-event timer,
/// so a moderate spike right after an impact is not counted separately.
pub fn step(
    state: CooldownState,
    time: f64,
    magnitude: f64,
    thresholds: &CrashThresholds,
) -> (CooldownState, Option<CrashEvent>) {
    let since_large = time - state.last_large_time;
    let since_small = time - state.last_small_time;

    if magnitude > thresholds.large {
        if since_large >= thresholds.cooldown {
            let next = CooldownState {
                last_small_time: time,
                last_large_time: time,
            };
            let event = CrashEvent {
                time,
                magnitude,
                severity: CrashSeverity::Large,
            };
            return (next, Some(event));
        }
        return (state, None);
    }

    if magnitude > thresholds.small
        && since_small >= thresholds.cooldown
        && since_large >= thresholds.cooldown
    {
        let next = CooldownState {
            last_small_time: time,
            ..state
        };
        let event = CrashEvent {
            time,
            magnitude,
            severity: CrashSeverity::Small,
        };
        return (next, Some(event));
    }

    (state, None)
}

/// Stateful wrapper for feeding samples one at a time
pub struct CrashDetector {
    thresholds: CrashThresholds,
    state: CooldownState,
    last_time: Option<f64>,
    processed: usize,
}

impl CrashDetector {
    pub fn new(thresholds: CrashThresholds) -> Self {
        Self {
            state: CooldownState::new(thresholds.cooldown),
            thresholds,
            last_time: None,
            processed: 0,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(CrashThresholds::from_config(config))
    }

    /// Classify one `(time, magnitude)` pair. Time must not go backwards.
    pub fn detect(&mut self, time: f64, magnitude: f64) -> PipelineResult<Option<CrashEvent>> {
        let index = self.processed;
        if !time.is_finite() || !magnitude.is_finite() {
            return Err(PipelineError::MalformedSample {
                index,
                reason: format!("non-finite time/magnitude ({time}, {magnitude})"),
            });
        }
        if let Some(previous) = self.last_time {
            if time < previous {
                return Err(PipelineError::NonMonotonicTime {
                    index,
                    previous,
                    current: time,
                });
            }
        }

        let (next, event) = step(self.state, time, magnitude, &self.thresholds);
        self.state = next;
        self.last_time = Some(time);
        self.processed += 1;
        Ok(event)
    }

    pub fn state(&self) -> CooldownState {
        self.state
    }
}

/// Scan a time-ordered `(time, magnitude)` series for crash events.
pub fn detect_crashes(
    series: &[(f64, f64)],
    thresholds: &CrashThresholds,
) -> PipelineResult<Vec<CrashEvent>> {
    let mut detector = CrashDetector::new(*thresholds);
    let mut events = Vec::new();
    for &(time, magnitude) in series {
        if let Some(event) = detector.detect(time, magnitude)? {
            events.push(event);
        }
    }

    let large = events
        .iter()
        .filter(|e| e.severity == CrashSeverity::Large)
        .count();
    log::info!(
        "Crash scan over {} samples: {} small, {} large",
        series.len(),
        events.len() - large,
        large
    );
    Ok(events)
}

/// Crash detection over gravity-compensated samples.
pub fn detect_sample_crashes(
    samples: &[NormalizedSample],
    config: &PipelineConfig,
) -> PipelineResult<Vec<CrashEvent>> {
    let series: Vec<(f64, f64)> = samples
        .iter()
        .map(|s| (s.time(), s.accel_norm_magnitude()))
        .collect();
    detect_crashes(&series, &CrashThresholds::from_config(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: f64 = 9.81;

    fn thresholds() -> CrashThresholds {
        CrashThresholds {
            small: 10.0 * G,
            large: 30.0 * G,
            cooldown: 2.0,
        }
    }

    #[test]
    fn test_first_spike_triggers() {
        let events = detect_crashes(&[(0.0, 35.0 * G)], &thresholds()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, CrashSeverity::Large);
        assert_eq!(events[0].time, 0.0);
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        let t = thresholds();
        let events = detect_crashes(&[(0.0, t.small), (5.0, t.large)], &t).unwrap();
        // 30g exactly is above the small threshold but not the large one
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, CrashSeverity::Small);
        assert_eq!(events[0].time, 5.0);
    }

    #[test]
    fn test_cooldown_enforcement() {
        // Continuous large signal for 7 s at 2 Hz -> events at 0, 2, 4, 6
        let duration = 7.0;
        let series: Vec<(f64, f64)> = (0..=14).map(|i| (i as f64 * 0.5, 40.0 * G)).collect();
        let events = detect_crashes(&series, &thresholds()).unwrap();

        let expected = (duration / 2.0_f64).floor() as usize + 1;
        assert_eq!(events.len(), expected);
        assert!(events.iter().all(|e| e.severity == CrashSeverity::Large));
        for pair in events.windows(2) {
            assert!(pair[1].time - pair[0].time >= 2.0);
        }
    }

    #[test]
    fn test_large_event_resets_small_cooldown() {
        let series = [(10.0, 31.0 * G), (10.5, 15.0 * G), (11.9, 15.0 * G)];
        let events = detect_crashes(&series, &thresholds()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, CrashSeverity::Large);
    }

    #[test]
    fn test_small_after_large_cooldown() {
        let series = [(10.0, 31.0 * G), (12.0, 15.0 * G)];
        let events = detect_crashes(&series, &thresholds()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].severity, CrashSeverity::Small);
        assert_eq!(events[1].time, 12.0);
    }

    #[test]
    fn test_large_escalates_during_small_cooldown() {
        // A small event does not block a large one
        let series = [(0.0, 12.0 * G), (0.5, 32.0 * G)];
        let events = detect_crashes(&series, &thresholds()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].severity, CrashSeverity::Small);
        assert_eq!(events[1].severity, CrashSeverity::Large);
    }

    #[test]
    fn test_large_within_cooldown_is_suppressed_not_downgraded() {
        let series = [(0.0, 31.0 * G), (1.0, 31.0 * G), (2.5, 12.0 * G)];
        let events = detect_crashes(&series, &thresholds()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].severity, CrashSeverity::Small);
        assert_eq!(events[1].time, 2.5);
    }

    #[test]
    fn test_step_fold_matches_detector() {
        let t = thresholds();
        let series = [(0.0, 11.0 * G), (1.0, 12.0 * G), (2.0, 13.0 * G), (3.0, 40.0 * G)];
        let (state, events) = series.iter().fold(
            (CooldownState::new(t.cooldown), Vec::new()),
            |(state, mut events), &(time, mag)| {
                let (next, event) = step(state, time, mag, &t);
                events.extend(event);
                (next, events)
            },
        );
        assert_eq!(events, detect_crashes(&series, &t).unwrap());
        assert_eq!(state.last_large_time, 3.0);
        assert_eq!(state.last_small_time, 3.0);
    }

    #[test]
    fn test_rejects_time_going_backwards() {
        let series = [(1.0, 0.0), (2.0, 0.0), (1.5, 0.0)];
        match detect_crashes(&series, &thresholds()) {
            Err(PipelineError::NonMonotonicTime { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected NonMonotonicTime, got {:?}", other),
        }
    }

    #[test]
    fn test_equal_times_accepted() {
        let series = [(1.0, 0.0), (1.0, 0.0)];
        assert!(detect_crashes(&series, &thresholds()).unwrap().is_empty());
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let event = CrashEvent {
            time: 1.0,
            magnitude: 100.0,
            severity: CrashSeverity::Small,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"severity\":\"small\""));
    }
}

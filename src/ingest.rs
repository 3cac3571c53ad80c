//! Loading telemetry into time-ordered `Sample`s.
//!
//! Two sources are understood:
//! - the logger's text format, one reading per line:
//!   `Time: 12:03:44 | GPS: 51.50,-0.12 | Accel: 0.1, -0.3, 9.8 | Roll: 1.2 | Pitch: -0.4 | Yaw: 181.0`
//! - a JSON table whose rows use the column names `Time`, `x-axis`, `y-axis`,
//!   `z-axis`, `Roll`, `Pitch`, `Yaw` and optionally `Speed`, `Lat`, `Long`.
//!
//! Either may be gzip-compressed (`.gz`). Wall-clock times are rebased to
//! seconds since the earliest reading and rows are sorted by time.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{NaiveTime, Timelike};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccelData, GpsFix, Orientation, Sample};

const FIELD_SEPARATOR: &str = " | ";
const LOG_FIELD_COUNT: usize = 6;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No usable samples in input")]
    Empty,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub lines_read: usize,
    pub rows_parsed: usize,
    pub rows_skipped: usize,
    pub reordered: bool,
}

#[derive(Clone, Debug)]
pub struct Ingested {
    pub samples: Vec<Sample>,
    pub stats: IngestStats,
}

/// `Time` column: seconds since start, or a wall-clock `HH:MM:SS[.fff]`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TimeField {
    Seconds(f64),
    Clock(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct TableRow {
    #[serde(rename = "Time")]
    pub time: TimeField,
    #[serde(rename = "x-axis")]
    pub x: f64,
    #[serde(rename = "y-axis")]
    pub y: f64,
    #[serde(rename = "z-axis")]
    pub z: f64,
    #[serde(rename = "Roll")]
    pub roll: f64,
    #[serde(rename = "Pitch")]
    pub pitch: f64,
    #[serde(rename = "Yaw")]
    pub yaw: f64,
    #[serde(rename = "Speed", default)]
    pub speed: Option<f64>,
    #[serde(rename = "Lat", default)]
    pub lat: Option<f64>,
    #[serde(rename = "Long", default)]
    pub lon: Option<f64>,
}

// Rows are decoded one at a time in `parse_table`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TableFile {
    Rows(Vec<serde_json::Value>),
    Wrapped { rows: Vec<serde_json::Value> },
}

impl TableRow {
    fn into_parts(self) -> (TimeField, Sample) {
        let position = match (self.lat, self.lon) {
            (Some(latitude), Some(longitude)) => Some(GpsFix {
                latitude,
                longitude,
            }),
            _ => None,
        };
        let sample = Sample {
            time: 0.0,
            accel: AccelData::new(self.x, self.y, self.z),
            orientation: Orientation::new(self.roll, self.pitch, self.yaw),
            speed: self.speed,
            position,
        };
        (self.time, sample)
    }
}

/// Seconds since midnight for `HH:MM:SS` with optional fraction.
pub fn parse_clock(value: &str) -> Option<f64> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M:%S%.f").ok()?;
    Some(time.num_seconds_from_midnight() as f64 + time.nanosecond() as f64 * 1e-9)
}

/// Raw row before its time is resolved, tagged with its source position.
type RawRow = (usize, TimeField, Sample);

fn field_value<'a>(part: &'a str, label: &str) -> Result<&'a str, String> {
    let (name, value) = part
        .split_once(": ")
        .ok_or_else(|| format!("missing ': ' in {part:?}"))?;
    if name.trim() != label {
        return Err(format!("expected {label}, found {:?}", name.trim()));
    }
    Ok(value.trim())
}

fn parse_number(value: &str, label: &str) -> Result<f64, String> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("{label} {value:?}: {e}"))
}

/// Parse one logger line into its raw time and sample.
pub fn parse_log_line(line: &str) -> Result<(TimeField, Sample), String> {
    let parts: Vec<&str> = line.trim().split(FIELD_SEPARATOR).collect();
    if parts.len() != LOG_FIELD_COUNT {
        return Err(format!(
            "expected {LOG_FIELD_COUNT} fields, found {}",
            parts.len()
        ));
    }

    let time = TimeField::Clock(field_value(parts[0], "Time")?.to_string());

    let gps = field_value(parts[1], "GPS")?;
    let position = if gps.contains("Invalid") {
        None
    } else {
        let (lat, lon) = gps
            .split_once(',')
            .ok_or_else(|| format!("GPS {gps:?} is not lat,lon"))?;
        Some(GpsFix {
            latitude: parse_number(lat, "latitude")?,
            longitude: parse_number(lon, "longitude")?,
        })
    };

    let axes: Vec<&str> = field_value(parts[2], "Accel")?.split(',').collect();
    if axes.len() != 3 {
        return Err(format!("expected 3 accel axes, found {}", axes.len()));
    }
    let accel = AccelData::new(
        parse_number(axes[0], "x-axis")?,
        parse_number(axes[1], "y-axis")?,
        parse_number(axes[2], "z-axis")?,
    );

    let orientation = Orientation::new(
        parse_number(field_value(parts[3], "Roll")?, "roll")?,
        parse_number(field_value(parts[4], "Pitch")?, "pitch")?,
        parse_number(field_value(parts[5], "Yaw")?, "yaw")?,
    );

    let sample = Sample {
        time: 0.0,
        accel,
        orientation,
        speed: None,
        position,
    };
    Ok((time, sample))
}

/// Parse the logger's text output. Malformed lines are skipped and counted.
pub fn parse_log(text: &str) -> Result<Ingested, IngestError> {
    let mut rows = Vec::new();
    let mut stats = IngestStats::default();

    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        stats.lines_read += 1;
        match parse_log_line(line) {
            Ok((time, sample)) => rows.push((line_no + 1, time, sample)),
            Err(reason) => {
                stats.rows_skipped += 1;
                log::warn!(
                    "Skipping malformed line {}: {} ({})",
                    line_no + 1,
                    line.trim(),
                    reason
                );
            }
        }
    }

    finish(rows, stats)
}

/// Parse a JSON table (a bare array of rows, or `{"rows": [...]}`).
/// Rows missing a required column are skipped and counted.
pub fn parse_table<R: Read>(reader: R) -> Result<Ingested, IngestError> {
    let values = match serde_json::from_reader::<_, TableFile>(reader)? {
        TableFile::Rows(rows) => rows,
        TableFile::Wrapped { rows } => rows,
    };
    let mut stats = IngestStats {
        lines_read: values.len(),
        ..IngestStats::default()
    };

    let mut rows = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<TableRow>(value) {
            Ok(row) => {
                let (time, sample) = row.into_parts();
                rows.push((index, time, sample));
            }
            Err(e) => {
                stats.rows_skipped += 1;
                log::warn!("Skipping malformed table row {}: {}", index, e);
            }
        }
    }
    finish(rows, stats)
}

fn open_maybe_gz(path: &Path) -> Result<Box<dyn Read>, IngestError> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn load_log_file(path: &Path) -> Result<Ingested, IngestError> {
    let mut text = String::new();
    open_maybe_gz(path)?.read_to_string(&mut text)?;
    parse_log(&text)
}

pub fn load_table_file(path: &Path) -> Result<Ingested, IngestError> {
    parse_table(open_maybe_gz(path)?)
}

/// Seconds for a raw time, and whether it was a wall-clock reading.
fn resolve_time(time: &TimeField) -> Option<(f64, bool)> {
    let (seconds, is_clock) = match time {
        TimeField::Seconds(s) => (*s, false),
        TimeField::Clock(text) => match text.trim().parse::<f64>() {
            Ok(s) => (s, false),
            Err(_) => (parse_clock(text)?, true),
        },
    };
    seconds.is_finite().then_some((seconds, is_clock))
}

// Resolve times, rebase wall-clock readings and restore time order.
// Rows with an unusable time are skipped and counted.
fn finish(rows: Vec<RawRow>, mut stats: IngestStats) -> Result<Ingested, IngestError> {
    let mut resolved = Vec::with_capacity(rows.len());
    for (row, time, sample) in rows {
        match resolve_time(&time) {
            Some((seconds, is_clock)) => resolved.push((seconds, is_clock, sample)),
            None => {
                stats.rows_skipped += 1;
                log::warn!("Skipping row {} with unparsable time {:?}", row, time);
            }
        }
    }
    if resolved.is_empty() {
        return Err(IngestError::Empty);
    }

    let clock_origin = resolved
        .iter()
        .filter(|(_, is_clock, _)| *is_clock)
        .map(|(s, _, _)| *s)
        .min_by(|a, b| a.total_cmp(b));

    let mut samples: Vec<Sample> = resolved
        .into_iter()
        .map(|(seconds, is_clock, mut sample)| {
            sample.time = match (is_clock, clock_origin) {
                (true, Some(origin)) => seconds - origin,
                _ => seconds,
            };
            sample
        })
        .collect();

    stats.reordered = samples.windows(2).any(|w| w[1].time < w[0].time);
    if stats.reordered {
        log::warn!("Input rows out of time order, sorting {} samples", samples.len());
        samples.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    stats.rows_parsed = samples.len();
    log::info!(
        "Ingested {} samples ({} skipped)",
        stats.rows_parsed,
        stats.rows_skipped
    );
    Ok(Ingested { samples, stats })
}

//! Core data structures for the causal-join pipeline.
//!
//! Defines the supported sensor types, the flattened [`UnifiedReading`]
//! record with value semantics, and the statistics reported by a run.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::SENSOR_DATA_DIR;

/// Sensor types with a known raw file schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Bme280,
    Sds011,
    Pms,
}

impl SensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Bme280 => "bme280",
            SensorType::Sds011 => "sds011",
            SensorType::Pms => "pms",
        }
    }

    /// Directory holding this sensor type's raw files
    pub fn data_dir(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(SENSOR_DATA_DIR).join(self.as_str())
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bme280" => Ok(SensorType::Bme280),
            "sds011" => Ok(SensorType::Sds011),
            "pms" | "pms3003" | "pms5003" | "pms7003" => Ok(SensorType::Pms),
            other => Err(format!(
                "unknown sensor type '{}' (expected bme280, sds011 or pms)",
                other
            )),
        }
    }
}

/// One joined sensor observation, flattened into typed fields.
///
/// Measurements are `NaN` when absent. Equality treats `NaN` as equal to
/// `NaN` and compares every field; the hash is derived from the same key.
#[derive(Debug, Clone)]
pub struct UnifiedReading {
    pub sensor_id: i32,
    pub sensor_type: Option<String>,
    pub location: i32,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: Option<NaiveDateTime>,
    pub pressure: f64,
    pub altitude: f64,
    pub pressure_sealevel: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub p1: f64,
    pub p2: f64,
    pub p0: f64,
    pub dur_p1: f64,
    pub ratio_p1: f64,
    pub dur_p2: f64,
    pub ratio_p2: f64,
}

impl Default for UnifiedReading {
    fn default() -> Self {
        Self {
            sensor_id: 0,
            sensor_type: None,
            location: 0,
            lat: f64::NAN,
            lon: f64::NAN,
            timestamp: None,
            pressure: f64::NAN,
            altitude: f64::NAN,
            pressure_sealevel: f64::NAN,
            temperature: f64::NAN,
            humidity: f64::NAN,
            p1: f64::NAN,
            p2: f64::NAN,
            p0: f64::NAN,
            dur_p1: f64::NAN,
            ratio_p1: f64::NAN,
            dur_p2: f64::NAN,
            ratio_p2: f64::NAN,
        }
    }
}

/// Bit pattern used for float equality: all NaNs collapse to one value
fn float_key(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

type ReadingKey<'a> = (
    i32,
    Option<&'a str>,
    i32,
    Option<NaiveDateTime>,
    [u64; 14],
);

impl UnifiedReading {
    fn key(&self) -> ReadingKey<'_> {
        (
            self.sensor_id,
            self.sensor_type.as_deref(),
            self.location,
            self.timestamp,
            [
                float_key(self.lat),
                float_key(self.lon),
                float_key(self.pressure),
                float_key(self.altitude),
                float_key(self.pressure_sealevel),
                float_key(self.temperature),
                float_key(self.humidity),
                float_key(self.p1),
                float_key(self.p2),
                float_key(self.p0),
                float_key(self.dur_p1),
                float_key(self.ratio_p1),
                float_key(self.dur_p2),
                float_key(self.ratio_p2),
            ],
        )
    }
}

impl PartialEq for UnifiedReading {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for UnifiedReading {}

impl Hash for UnifiedReading {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Statistics for one pipeline run
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub sensor_files: usize,
    pub sensor_rows: usize,
    pub mapping_rows: usize,
    pub weather_rows: usize,
    pub output_rows: usize,
    pub output_path: PathBuf,
    pub processing_time_ms: u128,
}

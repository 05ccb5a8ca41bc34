//! Configuration for a pipeline run.
//!
//! All input and output locations are derived from one base data
//! directory; the remaining settings choose the sensor type and how
//! sensor readings are bucketed in time.

use crate::constants::{
    DEFAULT_DATA_DIR, DEFAULT_DELIMITER, DEFAULT_GRANULARITY_MINUTES, OUTPUT_PATH,
    SENSOR_STATION_MAPPING_PATH, WEATHER_DATA_PATH,
};
use crate::error::{PipelineError, Result};
use crate::models::SensorType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings for one causal-join pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Base data directory holding `raw/`, `intermediate/` and `processed/`
    pub data_dir: PathBuf,

    /// Sensor type whose raw files are joined with the weather data
    pub sensor_type: SensorType,

    /// Width of the sensor aggregation window in minutes
    pub granularity_minutes: u32,

    /// Field delimiter for inputs and the output
    pub delimiter: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            sensor_type: SensorType::Bme280,
            granularity_minutes: DEFAULT_GRANULARITY_MINUTES,
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

impl PipelineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_sensor_type(mut self, sensor_type: SensorType) -> Self {
        self.sensor_type = sensor_type;
        self
    }

    pub fn with_granularity_minutes(mut self, minutes: u32) -> Self {
        self.granularity_minutes = minutes;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Check settings that would otherwise fail deep inside a run
    pub fn validate(&self) -> Result<()> {
        if self.granularity_minutes == 0 {
            return Err(PipelineError::configuration(
                "granularity must be at least one minute",
            ));
        }
        if self.granularity_minutes > 24 * 60 {
            return Err(PipelineError::configuration(format!(
                "granularity of {} minutes exceeds one day",
                self.granularity_minutes
            )));
        }
        if matches!(self.delimiter, b'\n' | b'\r' | b'"') {
            return Err(PipelineError::configuration(format!(
                "{:?} cannot be used as a field delimiter",
                self.delimiter as char
            )));
        }
        if !self.data_dir.is_dir() {
            return Err(PipelineError::DatasetNotFound {
                path: self.data_dir.clone(),
            });
        }

        debug!("Validated configuration: {:?}", self);
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding the configured sensor type's raw files
    pub fn sensor_dir(&self) -> PathBuf {
        self.sensor_type.data_dir(&self.data_dir)
    }

    pub fn weather_path(&self) -> PathBuf {
        self.data_dir.join(WEATHER_DATA_PATH)
    }

    pub fn sensor_station_mapping_path(&self) -> PathBuf {
        self.data_dir.join(SENSOR_STATION_MAPPING_PATH)
    }

    pub fn output_path(&self) -> PathBuf {
        self.data_dir.join(OUTPUT_PATH)
    }
}

//! Application constants for the causal-join pipeline
//!
//! File locations relative to the base data directory, table names, and
//! the fixed text formats used when coercing raw fields.

// =============================================================================
// Data Directory Layout
// =============================================================================

/// Default base data directory
pub const DEFAULT_DATA_DIR: &str = "data";

/// Weather observations, relative to the data directory
pub const WEATHER_DATA_PATH: &str = "raw/weather/weather_data.csv";

/// Directory holding one sub-directory of CSV files per sensor type
pub const SENSOR_DATA_DIR: &str = "raw/sensors";

/// Sensor-to-closest-weather-station mapping, relative to the data directory
pub const SENSOR_STATION_MAPPING_PATH: &str = "intermediate/berlin_enrichable_sensors.csv";

/// Joined output, relative to the data directory
pub const OUTPUT_PATH: &str = "processed/causalDiscoveryData.csv";

/// Sensor files within a sensor-type directory
pub const SENSOR_FILE_PATTERN: &str = "*.csv";

// =============================================================================
// Table Names
// =============================================================================

pub mod tables {
    pub const SENSOR: &str = "sensor";
    pub const SENSOR_STATION_MAPPING: &str = "sensor_station_mapping";
    pub const WEATHER: &str = "weather";
}

// =============================================================================
// Parsing
// =============================================================================

/// Pattern for timestamp fields (`yyyy-MM-dd HH:mm:ss`)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Literal that coerces to `true` for boolean fields
pub const BOOLEAN_TRUE_LITERAL: &str = "1";

/// Default field delimiter for all inputs and the output
pub const DEFAULT_DELIMITER: u8 = b',';

/// Default sensor aggregation window in minutes
pub const DEFAULT_GRANULARITY_MINUTES: u32 = 60;

/// Zero-based positions of `location` and `closest_weather_station` in the mapping file
pub const MAPPING_FIELD_POSITIONS: [usize; 2] = [4, 5];

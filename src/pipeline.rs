//! Assembly of the causal-discovery dataset.
//!
//! Three feature tables are built from the data directory and joined in
//! two steps: sensor readings pick up their closest weather station from
//! the mapping table, then meet the weather observation of the same
//! station and hour. Only sensor readings with a match on both joins
//! reach the output file.

use crate::config::PipelineConfig;
use crate::constants::{MAPPING_FIELD_POSITIONS, SENSOR_FILE_PATTERN, tables};
use crate::engine::{DelimitedSource, PolarsEngine, TableEngine};
use crate::error::{PipelineError, Result};
use crate::feature_table::FeatureTable;
use crate::models::PipelineStats;
use crate::schema::{sensor_columns, sensor_station_mapping_columns, weather_columns};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Attaches the closest weather station to each sensor reading
pub const SENSOR_MAPPING_PREDICATE: &str = "sensor_station_mapping_location = sensor_location";

/// Matches a reading with its station's weather in the same hour
pub const MAPPING_WEATHER_PREDICATE: &str = "sensor_station_mapping_closest_weather_station = weather_location AND FLOOR(sensor_timestamp TO HOUR) = FLOOR(weather_time TO HOUR)";

/// Builds the input tables and joins them into the output dataset
#[derive(Debug)]
pub struct JoinPipeline<E: TableEngine = PolarsEngine> {
    config: PipelineConfig,
    engine: E,
}

impl JoinPipeline<PolarsEngine> {
    pub fn with_polars(config: PipelineConfig) -> Self {
        Self::new(config, PolarsEngine::new())
    }
}

impl<E: TableEngine> JoinPipeline<E> {
    pub fn new(config: PipelineConfig, engine: E) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Raw files for the configured sensor type, sorted by path
    pub fn sensor_files(&self) -> Result<Vec<PathBuf>> {
        let sensor_dir = self.config.sensor_dir();
        if !sensor_dir.is_dir() {
            return Err(PipelineError::DatasetNotFound { path: sensor_dir });
        }

        let pattern = sensor_dir.join(SENSOR_FILE_PATTERN);
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern).map_err(|e| {
            PipelineError::configuration(format!("Invalid sensor file pattern '{}': {}", pattern, e))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable sensor path: {}", e),
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(PipelineError::DatasetNotFound { path: sensor_dir });
        }
        debug!("Found {} {} sensor files", files.len(), self.config.sensor_type);
        Ok(files)
    }

    /// Sensor readings bucketed to the configured granularity.
    ///
    /// Keys: `location`, `timestamp`.
    pub fn build_sensor_table(&self) -> Result<FeatureTable<E::Rows>> {
        let files = self.sensor_files()?;
        let columns = sensor_columns(self.config.sensor_type);
        let source = DelimitedSource::from_paths(files).with_delimiter(self.config.delimiter);

        let rows = self.engine.read_delimited(&source, &columns)?;
        let rows = self.engine.aggregate_by_time(
            rows,
            &columns,
            "timestamp",
            self.config.granularity_minutes,
        )?;

        FeatureTable::new(
            tables::SENSOR,
            rows,
            columns,
            &["location", "timestamp"],
            &self.engine,
        )
    }

    /// Distinct (location, closest_weather_station) pairs.
    ///
    /// Keys: both columns.
    pub fn build_sensor_station_mapping_table(&self) -> Result<FeatureTable<E::Rows>> {
        let columns = sensor_station_mapping_columns();
        let source = DelimitedSource::new(self.config.sensor_station_mapping_path())
            .with_positions(MAPPING_FIELD_POSITIONS)
            .with_delimiter(self.config.delimiter);

        let rows = self.engine.read_delimited(&source, &columns)?;
        let rows = self.engine.distinct(rows)?;

        FeatureTable::new(
            tables::SENSOR_STATION_MAPPING,
            rows,
            columns,
            &["location", "closest_weather_station"],
            &self.engine,
        )
    }

    /// Weather observations.
    ///
    /// Keys: `location`, `time`.
    pub fn build_weather_table(&self) -> Result<FeatureTable<E::Rows>> {
        let columns = weather_columns();
        let source =
            DelimitedSource::new(self.config.weather_path()).with_delimiter(self.config.delimiter);
        let rows = self.engine.read_delimited(&source, &columns)?;

        FeatureTable::new(
            tables::WEATHER,
            rows,
            columns,
            &["location", "time"],
            &self.engine,
        )
    }

    /// Join the three tables; the result keeps the sensor table's keys
    pub fn assemble(
        &self,
        sensor: &FeatureTable<E::Rows>,
        mapping: &FeatureTable<E::Rows>,
        weather: &FeatureTable<E::Rows>,
    ) -> Result<FeatureTable<E::Rows>> {
        let keys = sensor.key_columns();
        let mapped = sensor.join(mapping, keys, SENSOR_MAPPING_PREDICATE, &self.engine)?;
        mapped.join(weather, keys, MAPPING_WEATHER_PREDICATE, &self.engine)
    }

    /// Build, join and write the dataset
    pub fn run(&self) -> Result<PipelineStats> {
        let start = Instant::now();
        self.config.validate()?;
        info!(
            "Joining {} sensor data with weather observations from {}",
            self.config.sensor_type,
            self.config.data_dir().display()
        );

        let sensor_files = self.sensor_files()?.len();
        let sensor = self.build_sensor_table()?;
        let mapping = self.build_sensor_station_mapping_table()?;
        let weather = self.build_weather_table()?;

        let sensor_rows = sensor.count(&self.engine)?;
        let mapping_rows = mapping.count(&self.engine)?;
        let weather_rows = weather.count(&self.engine)?;
        info!(
            "Loaded {} sensor rows ({} files, {} minute buckets), {} mapping rows, {} weather rows",
            sensor_rows,
            sensor_files,
            self.config.granularity_minutes,
            mapping_rows,
            weather_rows
        );

        let joined = self.assemble(&sensor, &mapping, &weather)?;
        let output_path = self.config.output_path();
        let output_rows = joined.write(&output_path, self.config.delimiter, &self.engine)?;

        if output_rows == 0 {
            warn!("No sensor reading matched a weather observation; output has only a header");
        }
        info!(
            "Wrote {} rows of '{}' to {}",
            output_rows,
            joined.name(),
            output_path.display()
        );

        Ok(PipelineStats {
            sensor_files,
            sensor_rows,
            mapping_rows,
            weather_rows,
            output_rows,
            output_path,
            processing_time_ms: start.elapsed().as_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SensorType;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn pipeline(dir: &TempDir) -> JoinPipeline {
        JoinPipeline::with_polars(PipelineConfig::new(dir.path()))
    }

    #[test]
    fn test_mapping_table_is_distinct() {
        let dir = TempDir::new().unwrap();
        write(
            &dir.path().join("intermediate/berlin_enrichable_sensors.csv"),
            "sensor_id,sensor_type,lat,lon,location,closest_weather_station\n\
             1,bme280,52.5,13.4,5,S1\n\
             2,bme280,52.5,13.4,5,S1\n",
        );

        let pipeline = pipeline(&dir);
        let mapping = pipeline.build_sensor_station_mapping_table().unwrap();

        assert_eq!(mapping.count(pipeline.engine()).unwrap(), 1);
        assert_eq!(
            mapping.qualified_names().unwrap(),
            [
                "sensor_station_mapping_location",
                "sensor_station_mapping_closest_weather_station"
            ]
        );
        assert_eq!(mapping.feature_columns().count(), 0);
        assert_eq!(mapping.key_columns().len(), 2);
    }

    #[test]
    fn test_sensor_table_reads_all_files_of_type() {
        let dir = TempDir::new().unwrap();
        let sensor_dir = dir.path().join("raw/sensors/pms");
        write(
            &sensor_dir.join("2020-01-01.csv"),
            "sensor_id,sensor_type,location,lat,lon,timestamp,P1,P2,P0\n\
             7,pms,5,52.5,13.4,2020-01-01 10:10:00,4.0,2.0,1.0\n",
        );
        write(
            &sensor_dir.join("2020-01-02.csv"),
            "sensor_id,sensor_type,location,lat,lon,timestamp,P1,P2,P0\n\
             7,pms,5,52.5,13.4,2020-01-01 10:40:00,6.0,4.0,3.0\n",
        );
        write(&sensor_dir.join("notes.txt"), "ignored");

        let config = PipelineConfig::new(dir.path()).with_sensor_type(SensorType::Pms);
        let pipeline = JoinPipeline::with_polars(config);

        assert_eq!(pipeline.sensor_files().unwrap().len(), 2);
        let sensor = pipeline.build_sensor_table().unwrap();
        let df = sensor.collect(pipeline.engine()).unwrap();

        assert_eq!(df.height(), 1);
        assert_eq!(df.column("sensor_P1").unwrap().f64().unwrap().get(0), Some(5.0));
        assert_eq!(df.column("sensor_P0").unwrap().f64().unwrap().get(0), Some(2.0));
        let keys: Vec<&str> = sensor.key_columns().iter().map(|c| c.name()).collect();
        assert_eq!(keys, ["location", "timestamp"]);
    }

    #[test]
    fn test_missing_sensor_directory_is_dataset_not_found() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);

        assert!(matches!(
            pipeline.build_sensor_table(),
            Err(PipelineError::DatasetNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_weather_file_is_dataset_not_found() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);

        match pipeline.build_weather_table() {
            Err(PipelineError::DatasetNotFound { path }) => {
                assert!(path.ends_with("raw/weather/weather_data.csv"))
            }
            other => panic!("Expected DatasetNotFound, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_predicates_parse() {
        use crate::engine::JoinPredicate;
        assert_eq!(JoinPredicate::parse(SENSOR_MAPPING_PREDICATE).unwrap().terms().len(), 1);
        assert_eq!(JoinPredicate::parse(MAPPING_WEATHER_PREDICATE).unwrap().terms().len(), 2);
    }
}

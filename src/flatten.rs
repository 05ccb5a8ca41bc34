//! Flattening of sensor columns into [`UnifiedReading`] records.
//!
//! Works on any table carrying columns owned by the `sensor` table, joined
//! or not. Measurement columns the sensor type does not define become NaN.
//! Rows without a `sensor_id` or `location` have no identity and are
//! skipped, so they never collide with a real sensor in deduplication.

use crate::constants::tables;
use crate::engine::PolarsEngine;
use crate::error::Result;
use crate::feature_table::FeatureTable;
use crate::models::UnifiedReading;
use chrono::{DateTime, NaiveDateTime, Utc};
use polars::prelude::{DataFrame, DataType, LazyFrame};
use tracing::warn;

/// Qualified name of a sensor column, if the table has it
fn sensor_column(table: &FeatureTable<LazyFrame>, name: &str) -> Option<String> {
    let full_name = format!("{}_{}", tables::SENSOR, name);
    table
        .column(&full_name)
        .filter(|c| c.owner() == Some(tables::SENSOR))
        .map(|_| full_name)
}

fn doubles(df: &DataFrame, column: Option<&str>) -> Result<Vec<f64>> {
    let Some(name) = column else {
        return Ok(vec![f64::NAN; df.height()]);
    };
    let values = df.column(name)?.cast(&DataType::Float64)?;
    Ok(values
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

fn integers(df: &DataFrame, column: Option<&str>) -> Result<Vec<Option<i32>>> {
    let Some(name) = column else {
        return Ok(vec![None; df.height()]);
    };
    let values = df.column(name)?.cast(&DataType::Int32)?;
    Ok(values.i32()?.into_iter().collect())
}

fn strings(df: &DataFrame, column: Option<&str>) -> Result<Vec<Option<String>>> {
    let Some(name) = column else {
        return Ok(vec![None; df.height()]);
    };
    let values = df.column(name)?.cast(&DataType::String)?;
    Ok(values
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

fn timestamps(df: &DataFrame, column: Option<&str>) -> Result<Vec<Option<NaiveDateTime>>> {
    let Some(name) = column else {
        return Ok(vec![None; df.height()]);
    };
    let millis = df.column(name)?.cast(&DataType::Int64)?;
    Ok(millis
        .i64()?
        .into_iter()
        .map(|v| v.and_then(DateTime::<Utc>::from_timestamp_millis).map(|t| t.naive_utc()))
        .collect())
}

/// One [`UnifiedReading`] per identified row of `table`, in row order
pub fn unified_readings(
    table: &FeatureTable<LazyFrame>,
    engine: &PolarsEngine,
) -> Result<Vec<UnifiedReading>> {
    let df = table.collect(engine)?;
    let column = |name: &str| sensor_column(table, name);

    let sensor_id = integers(&df, column("sensor_id").as_deref())?;
    let sensor_type = strings(&df, column("sensor_type").as_deref())?;
    let location = integers(&df, column("location").as_deref())?;
    let timestamp = timestamps(&df, column("timestamp").as_deref())?;
    let lat = doubles(&df, column("lat").as_deref())?;
    let lon = doubles(&df, column("lon").as_deref())?;
    let pressure = doubles(&df, column("pressure").as_deref())?;
    let altitude = doubles(&df, column("altitude").as_deref())?;
    let pressure_sealevel = doubles(&df, column("pressure_sealevel").as_deref())?;
    let temperature = doubles(&df, column("temperature").as_deref())?;
    let humidity = doubles(&df, column("humidity").as_deref())?;
    let p1 = doubles(&df, column("P1").as_deref())?;
    let p2 = doubles(&df, column("P2").as_deref())?;
    let p0 = doubles(&df, column("P0").as_deref())?;
    let dur_p1 = doubles(&df, column("durP1").as_deref())?;
    let ratio_p1 = doubles(&df, column("ratioP1").as_deref())?;
    let dur_p2 = doubles(&df, column("durP2").as_deref())?;
    let ratio_p2 = doubles(&df, column("ratioP2").as_deref())?;

    let readings: Vec<UnifiedReading> = (0..df.height())
        .filter_map(|i| Some((i, sensor_id[i]?, location[i]?)))
        .map(|(i, sensor_id, location)| UnifiedReading {
            sensor_id,
            sensor_type: sensor_type[i].clone(),
            location,
            lat: lat[i],
            lon: lon[i],
            timestamp: timestamp[i],
            pressure: pressure[i],
            altitude: altitude[i],
            pressure_sealevel: pressure_sealevel[i],
            temperature: temperature[i],
            humidity: humidity[i],
            p1: p1[i],
            p2: p2[i],
            p0: p0[i],
            dur_p1: dur_p1[i],
            ratio_p1: ratio_p1[i],
            dur_p2: dur_p2[i],
            ratio_p2: ratio_p2[i],
        })
        .collect();

    let skipped = df.height() - readings.len();
    if skipped > 0 {
        warn!(
            "Skipped {} rows of '{}' without sensor_id or location",
            skipped,
            table.name()
        );
    }
    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DelimitedSource, TableEngine};
    use crate::models::SensorType;
    use crate::schema::sensor_columns;
    use std::collections::HashSet;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sensor_table(
        engine: &PolarsEngine,
        sensor_type: SensorType,
        csv: &str,
    ) -> FeatureTable<LazyFrame> {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", csv).unwrap();
        let columns = sensor_columns(sensor_type);
        let rows = engine
            .read_delimited(&DelimitedSource::new(file.path()), &columns)
            .unwrap();
        FeatureTable::new(tables::SENSOR, rows, columns, &["location", "timestamp"], engine)
            .unwrap()
    }

    #[test]
    fn test_bme280_rows_flatten_with_absent_particulates() {
        let engine = PolarsEngine::new();
        let table = sensor_table(
            &engine,
            SensorType::Bme280,
            "sensor_id,sensor_type,location,lat,lon,timestamp,pressure,altitude,pressure_sealevel,temperature,humidity\n\
             141,BME280,5,52.5,13.4,2020-01-01 10:00:00,100800.5,,101325.0,18.5,61.0\n",
        );

        let readings = unified_readings(&table, &engine).unwrap();
        assert_eq!(readings.len(), 1);

        let reading = &readings[0];
        assert_eq!(reading.sensor_id, 141);
        assert_eq!(reading.sensor_type.as_deref(), Some("BME280"));
        assert_eq!(reading.location, 5);
        assert_eq!(
            reading.timestamp,
            NaiveDateTime::parse_from_str("2020-01-01 10:00:00", "%Y-%m-%d %H:%M:%S").ok()
        );
        assert_eq!(reading.pressure, 100800.5);
        assert!(reading.altitude.is_nan());
        assert_eq!(reading.temperature, 18.5);
        assert!(reading.p1.is_nan());
        assert!(reading.ratio_p2.is_nan());
    }

    #[test]
    fn test_sds011_rows_flatten_particulates() {
        let engine = PolarsEngine::new();
        let table = sensor_table(
            &engine,
            SensorType::Sds011,
            "sensor_id,sensor_type,location,lat,lon,timestamp,P1,durP1,ratioP1,P2,durP2,ratioP2\n\
             9,SDS011,3,52.1,13.2,2020-01-01 11:00:00,12.5,,,7.25,,\n\
             9,SDS011,3,52.1,13.2,2020-01-01 11:00:00,12.5,,,7.25,,\n",
        );

        let readings = unified_readings(&table, &engine).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].p1, 12.5);
        assert_eq!(readings[0].p2, 7.25);
        assert!(readings[0].dur_p1.is_nan());
        assert!(readings[0].temperature.is_nan());

        let distinct: HashSet<_> = readings.into_iter().collect();
        assert_eq!(distinct.len(), 1);
    }

    #[test]
    fn test_rows_without_identity_are_skipped() {
        let engine = PolarsEngine::new();
        let table = sensor_table(
            &engine,
            SensorType::Pms,
            "sensor_id,sensor_type,location,lat,lon,timestamp,P1,P2,P0\n\
             0,PMS,0,52.0,13.0,2020-01-01 10:00:00,1.0,1.0,1.0\n\
             x,PMS,0,52.0,13.0,2020-01-01 10:00:00,1.0,1.0,1.0\n\
             0,PMS,?,52.0,13.0,2020-01-01 10:00:00,1.0,1.0,1.0\n",
        );

        let readings = unified_readings(&table, &engine).unwrap();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].sensor_id, 0);
        assert_eq!(readings[0].location, 0);
        assert_eq!(readings[0].p0, 1.0);
    }
}

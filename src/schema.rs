//! Column metadata and per-source schemas.
//!
//! A [`Column`] describes one attribute of a feature table: its logical
//! name, declared type and whether it is a feature. Each column belongs to
//! exactly one table, recorded once by name, and derives its qualified
//! name `<table>_<column>` from that owner. The schema functions at the
//! bottom describe the sensor, weather and mapping sources in file order.

use crate::error::{PipelineError, Result};
use crate::models::SensorType;
use polars::prelude::{DataType, TimeUnit};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Semantic type a raw field is coerced into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    Integer,
    Double,
    String,
    Timestamp,
    Boolean,
    /// A type name this crate does not know how to coerce; values become null
    Unrecognized(String),
}

impl DeclaredType {
    /// Resolve a type name such as `"double"` or `"Timestamp"`
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "integer" | "int" | "i32" => DeclaredType::Integer,
            "double" | "float" | "f64" => DeclaredType::Double,
            "string" | "str" | "text" => DeclaredType::String,
            "timestamp" | "datetime" => DeclaredType::Timestamp,
            "boolean" | "bool" => DeclaredType::Boolean,
            _ => DeclaredType::Unrecognized(name.to_string()),
        }
    }

    /// Convert to the polars data type the engine stores this column as
    pub fn to_polars_dtype(&self) -> DataType {
        match self {
            DeclaredType::Integer => DataType::Int32,
            DeclaredType::Double => DataType::Float64,
            DeclaredType::String => DataType::String,
            DeclaredType::Timestamp => DataType::Datetime(TimeUnit::Milliseconds, None),
            DeclaredType::Boolean => DataType::Boolean,
            DeclaredType::Unrecognized(_) => DataType::Null,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DeclaredType::Integer | DeclaredType::Double)
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredType::Integer => write!(f, "Integer"),
            DeclaredType::Double => write!(f, "Double"),
            DeclaredType::String => write!(f, "String"),
            DeclaredType::Timestamp => write!(f, "Timestamp"),
            DeclaredType::Boolean => write!(f, "Boolean"),
            DeclaredType::Unrecognized(name) => write!(f, "Unrecognized({})", name),
        }
    }
}

/// Metadata for one attribute of a feature table
#[derive(Debug)]
pub struct Column {
    name: String,
    declared_type: DeclaredType,
    feature: bool,
    owner: OnceLock<Arc<str>>,
}

impl Column {
    pub fn new(name: impl Into<String>, declared_type: DeclaredType, feature: bool) -> Self {
        Self {
            name: name.into(),
            declared_type,
            feature,
            owner: OnceLock::new(),
        }
    }

    /// A column that carries a model feature
    pub fn feature(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self::new(name, declared_type, true)
    }

    /// A key or metadata column
    pub fn attribute(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self::new(name, declared_type, false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> &DeclaredType {
        &self.declared_type
    }

    pub fn is_feature(&self) -> bool {
        self.feature
    }

    /// Engine type tag for this column's declared type
    pub fn type_information(&self) -> DataType {
        self.declared_type.to_polars_dtype()
    }

    /// Name of the owning table, if one has been assigned
    pub fn owner(&self) -> Option<&str> {
        self.owner.get().map(|owner| owner.as_ref())
    }

    /// Record the owning table. A column can be owned only once.
    pub(crate) fn assign_owner(&self, table_name: Arc<str>) -> Result<()> {
        self.owner.set(table_name).map_err(|rejected| {
            PipelineError::configuration(format!(
                "Column '{}' is already owned by table '{}', cannot assign it to '{}'",
                self.name,
                self.owner().unwrap_or_default(),
                rejected
            ))
        })
    }

    /// Qualified name `<owner>_<name>`, unique across all tables of a pipeline run
    pub fn full_name(&self) -> Result<String> {
        let owner = self.owner().ok_or_else(|| {
            PipelineError::configuration(format!(
                "Column '{}' has no owning table; full name is undefined",
                self.name
            ))
        })?;
        Ok(format!("{}_{}", owner, self.name))
    }
}

/// Fields every sensor reading starts with, in file order
fn common_sensor_columns() -> Vec<Column> {
    vec![
        Column::attribute("sensor_id", DeclaredType::Integer),
        Column::attribute("sensor_type", DeclaredType::String),
        Column::attribute("location", DeclaredType::Integer),
        Column::attribute("lat", DeclaredType::Double),
        Column::attribute("lon", DeclaredType::Double),
        Column::attribute("timestamp", DeclaredType::Timestamp),
    ]
}

/// Schema of a raw sensor file for the given sensor type
pub fn sensor_columns(sensor_type: SensorType) -> Vec<Column> {
    let mut columns = common_sensor_columns();
    match sensor_type {
        SensorType::Bme280 => {
            columns.push(Column::feature("pressure", DeclaredType::Double));
            columns.push(Column::feature("altitude", DeclaredType::Double));
            columns.push(Column::feature("pressure_sealevel", DeclaredType::Double));
            columns.push(Column::feature("temperature", DeclaredType::Double));
            columns.push(Column::feature("humidity", DeclaredType::Double));
        }
        SensorType::Sds011 => {
            columns.push(Column::feature("P1", DeclaredType::Double));
            columns.push(Column::feature("durP1", DeclaredType::Double));
            columns.push(Column::feature("ratioP1", DeclaredType::Double));
            columns.push(Column::feature("P2", DeclaredType::Double));
            columns.push(Column::feature("durP2", DeclaredType::Double));
            columns.push(Column::feature("ratioP2", DeclaredType::Double));
        }
        SensorType::Pms => {
            columns.push(Column::feature("P1", DeclaredType::Double));
            columns.push(Column::feature("P2", DeclaredType::Double));
            columns.push(Column::feature("P0", DeclaredType::Double));
        }
    }
    columns
}

/// Schema of the weather observation file
pub fn weather_columns() -> Vec<Column> {
    vec![
        Column::attribute("location", DeclaredType::String),
        Column::attribute("time", DeclaredType::Timestamp),
        Column::feature("temperature", DeclaredType::Double),
        Column::feature("dew_point", DeclaredType::Double),
        Column::feature("humidity", DeclaredType::Double),
        Column::feature("precipitation", DeclaredType::Double),
        Column::feature("wind_direction", DeclaredType::Double),
        Column::feature("wind_speed", DeclaredType::Double),
        Column::feature("pressure", DeclaredType::Double),
    ]
}

/// Schema of the two mapping columns; neither is a feature.
///
/// The mapping export writes locations as decimals (`5.0`), so `location`
/// is a double here and is matched numerically against the sensor side.
pub fn sensor_station_mapping_columns() -> Vec<Column> {
    vec![
        Column::attribute("location", DeclaredType::Double),
        Column::attribute("closest_weather_station", DeclaredType::String),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_uses_owner_prefix() {
        let column = Column::feature("temperature", DeclaredType::Double);
        column.assign_owner(Arc::from("weather")).unwrap();

        assert_eq!(column.full_name().unwrap(), "weather_temperature");
        assert_eq!(column.owner(), Some("weather"));
    }

    #[test]
    fn test_full_name_without_owner_is_configuration_error() {
        let column = Column::attribute("location", DeclaredType::Integer);

        match column.full_name().unwrap_err() {
            PipelineError::Configuration { message } => assert!(message.contains("location")),
            other => panic!("Expected Configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_owner_can_only_be_assigned_once() {
        let column = Column::attribute("location", DeclaredType::Integer);
        column.assign_owner(Arc::from("sensor")).unwrap();

        let result = column.assign_owner(Arc::from("weather"));
        assert!(matches!(result, Err(PipelineError::Configuration { .. })));
        assert_eq!(column.full_name().unwrap(), "sensor_location");
    }

    #[test]
    fn test_type_information_mapping() {
        assert_eq!(
            Column::attribute("a", DeclaredType::Integer).type_information(),
            DataType::Int32
        );
        assert_eq!(
            Column::feature("b", DeclaredType::Double).type_information(),
            DataType::Float64
        );
        assert_eq!(
            Column::attribute("c", DeclaredType::Timestamp).type_information(),
            DataType::Datetime(TimeUnit::Milliseconds, None)
        );
        assert_eq!(
            Column::attribute("d", DeclaredType::Unrecognized("blob".into())).type_information(),
            DataType::Null
        );
    }

    #[test]
    fn test_declared_type_from_name() {
        assert_eq!(DeclaredType::from_name("Double"), DeclaredType::Double);
        assert_eq!(DeclaredType::from_name(" int "), DeclaredType::Integer);
        assert_eq!(DeclaredType::from_name("datetime"), DeclaredType::Timestamp);
        assert_eq!(
            DeclaredType::from_name("decimal"),
            DeclaredType::Unrecognized("decimal".to_string())
        );
    }

    #[test]
    fn test_mapping_columns_are_not_features() {
        let columns = sensor_station_mapping_columns();
        assert_eq!(columns.len(), 2);
        assert!(columns.iter().all(|c| !c.is_feature()));
        assert_eq!(columns[0].declared_type(), &DeclaredType::Double);
    }

    #[test]
    fn test_sensor_schemas_share_common_prefix() {
        for sensor_type in [SensorType::Bme280, SensorType::Sds011, SensorType::Pms] {
            let columns = sensor_columns(sensor_type);
            let names: Vec<&str> = columns.iter().take(6).map(|c| c.name()).collect();
            assert_eq!(
                names,
                ["sensor_id", "sensor_type", "location", "lat", "lon", "timestamp"]
            );
            assert!(columns.iter().skip(6).any(|c| c.is_feature()));
        }
    }
}

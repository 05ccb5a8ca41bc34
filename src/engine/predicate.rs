//! String-form join conditions.
//!
//! A predicate is a conjunction of equalities between qualified column
//! names, where either side may be floored to a calendar unit:
//!
//! ```text
//! sensor_station_mapping_closest_weather_station = weather_location
//!     AND FLOOR(sensor_timestamp TO HOUR) = FLOOR(weather_time TO HOUR)
//! ```

use crate::error::{PipelineError, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static CONJUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+AND\s+").expect("valid conjunction regex"));

static FLOOR_OPERAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^FLOOR\s*\(\s*([A-Za-z_][A-Za-z0-9_]*)\s+TO\s+([A-Za-z]+)\s*\)$")
        .expect("valid floor regex")
});

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Calendar unit a timestamp can be floored to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloorUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl FloorUnit {
    /// Polars duration string for one unit
    pub fn every(&self) -> &'static str {
        match self {
            FloorUnit::Second => "1s",
            FloorUnit::Minute => "1m",
            FloorUnit::Hour => "1h",
            FloorUnit::Day => "1d",
        }
    }
}

impl FromStr for FloorUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SECOND" => Ok(FloorUnit::Second),
            "MINUTE" => Ok(FloorUnit::Minute),
            "HOUR" => Ok(FloorUnit::Hour),
            "DAY" => Ok(FloorUnit::Day),
            other => Err(format!("unsupported FLOOR unit '{}'", other)),
        }
    }
}

/// One side of an equality
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Column(String),
    Floor { column: String, unit: FloorUnit },
}

impl Operand {
    /// Qualified column name this operand reads
    pub fn column_name(&self) -> &str {
        match self {
            Operand::Column(name) => name,
            Operand::Floor { column, .. } => column,
        }
    }

    fn parse(text: &str, predicate: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(captures) = FLOOR_OPERAND.captures(text) {
            let unit = captures[2]
                .parse::<FloorUnit>()
                .map_err(|reason| PipelineError::query_compilation(predicate, reason))?;
            return Ok(Operand::Floor {
                column: captures[1].to_string(),
                unit,
            });
        }
        if IDENTIFIER.is_match(text) {
            return Ok(Operand::Column(text.to_string()));
        }
        Err(PipelineError::query_compilation(
            predicate,
            format!("cannot parse operand '{}'", text),
        ))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Column(name) => f.write_str(name),
            Operand::Floor { column, unit } => {
                write!(f, "FLOOR({} TO {})", column, format!("{:?}", unit).to_uppercase())
            }
        }
    }
}

/// `left = right`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equality {
    pub left: Operand,
    pub right: Operand,
}

/// A parsed conjunction of equalities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPredicate {
    source: String,
    terms: Vec<Equality>,
}

impl JoinPredicate {
    pub fn parse(predicate: &str) -> Result<Self> {
        let source = predicate.trim();
        if source.is_empty() {
            return Err(PipelineError::query_compilation(
                predicate,
                "join predicate is empty",
            ));
        }

        let terms = CONJUNCTION
            .split(source)
            .map(|term| {
                let sides: Vec<&str> = term.split('=').collect();
                if sides.len() != 2 {
                    return Err(PipelineError::query_compilation(
                        source,
                        format!("expected exactly one '=' in '{}'", term.trim()),
                    ));
                }
                Ok(Equality {
                    left: Operand::parse(sides[0], source)?,
                    right: Operand::parse(sides[1], source)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source: source.to_string(),
            terms,
        })
    }

    pub fn terms(&self) -> &[Equality] {
        &self.terms
    }

    /// The predicate text as supplied
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for JoinPredicate {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for JoinPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_equality() {
        let predicate =
            JoinPredicate::parse("sensor_station_mapping_location = sensor_location").unwrap();

        assert_eq!(
            predicate.terms(),
            &[Equality {
                left: Operand::Column("sensor_station_mapping_location".to_string()),
                right: Operand::Column("sensor_location".to_string()),
            }]
        );
    }

    #[test]
    fn test_parse_conjunction_with_floor() {
        let predicate = JoinPredicate::parse(
            "sensor_station_mapping_closest_weather_station = weather_location AND \
             FLOOR(sensor_timestamp TO HOUR) = FLOOR(weather_time TO HOUR)",
        )
        .unwrap();

        assert_eq!(predicate.terms().len(), 2);
        assert_eq!(
            predicate.terms()[1].left,
            Operand::Floor {
                column: "sensor_timestamp".to_string(),
                unit: FloorUnit::Hour,
            }
        );
        assert_eq!(predicate.terms()[1].right.column_name(), "weather_time");
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let predicate = JoinPredicate::parse("floor(a_t to day) = floor(b_t to Day) and a_x = b_x")
            .unwrap();
        assert_eq!(predicate.terms().len(), 2);
        assert!(matches!(
            predicate.terms()[0].left,
            Operand::Floor {
                unit: FloorUnit::Day,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_errors_are_query_compilation_errors() {
        for bad in [
            "",
            "a_x",
            "a_x = b_x = c_x",
            "a_x = 'literal'",
            "FLOOR(a_t TO WEEK) = FLOOR(b_t TO WEEK)",
            "a_x > b_x",
        ] {
            assert!(
                matches!(
                    JoinPredicate::parse(bad),
                    Err(PipelineError::QueryCompilation { .. })
                ),
                "expected compilation error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_floor_unit_durations() {
        assert_eq!(FloorUnit::Hour.every(), "1h");
        assert_eq!(FloorUnit::Minute.every(), "1m");
        assert_eq!(
            Operand::Floor {
                column: "t".to_string(),
                unit: FloorUnit::Hour
            }
            .to_string(),
            "FLOOR(t TO HOUR)"
        );
    }
}

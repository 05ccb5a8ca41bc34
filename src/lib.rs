//! Causal-join library
//!
//! Builds typed feature tables from air-quality sensor readings, a
//! sensor-to-weather-station mapping and weather observations, and joins
//! them into one flat dataset for causal discovery.
//!
//! This library provides:
//! - Per-cell field coercion where malformed values become null or NaN
//! - Columns with table-qualified names (`<table>_<column>`)
//! - Feature tables joined through string-form predicates
//! - A pluggable relational engine, backed by polars
//! - Flattening of joined rows into [`UnifiedReading`] records

pub mod cli;
pub mod coercion;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod feature_table;
pub mod flatten;
pub mod models;
pub mod pipeline;
pub mod schema;

pub use config::PipelineConfig;
pub use engine::{PolarsEngine, TableEngine};
pub use error::{PipelineError, Result};
pub use feature_table::FeatureTable;
pub use models::{PipelineStats, SensorType, UnifiedReading};
pub use pipeline::JoinPipeline;
pub use schema::{Column, DeclaredType};

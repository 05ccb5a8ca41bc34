//! Relational engine capability consumed by feature tables.
//!
//! Feature tables never touch rows directly. Everything that reads,
//! reshapes, joins or writes rows goes through [`TableEngine`], whose
//! `Rows` type is an opaque handle valid only within that engine.
//! [`PolarsEngine`] is the implementation used by the pipeline.

pub mod polars_engine;
pub mod predicate;

pub use polars_engine::PolarsEngine;
pub use predicate::{Equality, FloorUnit, JoinPredicate, Operand};

use crate::constants::DEFAULT_DELIMITER;
use crate::error::{PipelineError, Result};
use crate::schema::Column;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One or more delimited files sharing a layout
#[derive(Debug, Clone)]
pub struct DelimitedSource {
    pub paths: Vec<PathBuf>,
    /// Zero-based field positions to read; `None` reads the leading fields
    pub positions: Option<Vec<usize>>,
    pub delimiter: u8,
    pub skip_header: bool,
}

impl DelimitedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_paths(vec![path.into()])
    }

    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            positions: None,
            delimiter: DEFAULT_DELIMITER,
            skip_header: true,
        }
    }

    /// Read only the fields at these positions
    pub fn with_positions(mut self, positions: impl Into<Vec<usize>>) -> Self {
        self.positions = Some(positions.into());
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Field positions to read for a schema of `width` columns
    pub fn resolve_positions(&self, width: usize) -> Result<Vec<usize>> {
        match &self.positions {
            None => Ok((0..width).collect()),
            Some(positions) if positions.len() == width => {
                let mut sorted = positions.clone();
                sorted.sort_unstable();
                sorted.dedup();
                if sorted != *positions {
                    return Err(PipelineError::configuration(format!(
                        "Field positions {:?} must be strictly increasing",
                        positions
                    )));
                }
                Ok(sorted)
            }
            Some(positions) => Err(PipelineError::configuration(format!(
                "Field positions {:?} select {} fields but the schema has {} columns",
                positions,
                positions.len(),
                width
            ))),
        }
    }
}

/// Everything an engine needs to evaluate a join of two feature tables
#[derive(Debug)]
pub struct JoinQuery<'a, R> {
    pub left_name: &'a str,
    pub left_rows: &'a R,
    pub left_columns: &'a [Arc<Column>],
    pub right_name: &'a str,
    pub right_rows: &'a R,
    pub right_columns: &'a [Arc<Column>],
    pub predicate: &'a JoinPredicate,
}

/// Row-set operations the schema layer delegates to a relational engine
pub trait TableEngine {
    /// Opaque handle to a row-set
    type Rows: Clone;

    /// Read delimited files into rows typed per `columns`, one field per column
    fn read_delimited(&self, source: &DelimitedSource, columns: &[Column]) -> Result<Self::Rows>;

    /// Expose `rows` under the qualified names of `columns`, in order
    fn register(&self, table_name: &str, rows: Self::Rows, columns: &[Arc<Column>])
    -> Result<Self::Rows>;

    /// Drop duplicate rows
    fn distinct(&self, rows: Self::Rows) -> Result<Self::Rows>;

    /// Floor `time_column` to `every_minutes` and average feature columns per group
    /// of all non-feature columns
    fn aggregate_by_time(
        &self,
        rows: Self::Rows,
        columns: &[Column],
        time_column: &str,
        every_minutes: u32,
    ) -> Result<Self::Rows>;

    /// Inner join two registered row-sets; output columns are the left
    /// columns followed by the right columns
    fn join(&self, query: JoinQuery<'_, Self::Rows>) -> Result<Self::Rows>;

    fn count(&self, rows: &Self::Rows) -> Result<usize>;

    /// Write rows with a header line, returning the number of rows written
    fn write_delimited(&self, rows: &Self::Rows, path: &Path, delimiter: u8) -> Result<usize>;
}

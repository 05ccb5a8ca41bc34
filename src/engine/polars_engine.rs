//! Polars implementation of [`TableEngine`].
//!
//! Files are read with every field as text and coerced cell by cell, so
//! the coercion policy decides what a malformed value becomes rather than
//! the CSV reader. Joins are planned lazily: each equality term becomes a
//! temporary key column on both sides, and the join output is projected
//! back to the qualified columns of both inputs.

use super::{DelimitedSource, JoinQuery, Operand, TableEngine};
use crate::coercion::coerce_declared;
use crate::constants::TIMESTAMP_FORMAT;
use crate::error::{PipelineError, Result};
use crate::schema::{Column, DeclaredType};

use polars::prelude::{
    CsvParseOptions, CsvReadOptions, CsvWriter, DataFrame, DataType, Expr, IntoColumn, IntoLazy,
    JoinArgs, JoinType, LazyFrame, NamedFrom, PlSmallStr, PolarsError, SerReader, SerWriter,
    Series, UnionArgs, UniqueKeepStrategy, col, concat, lit,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

/// Prefix for join key columns that exist only while a join is planned
const JOIN_KEY_PREFIX: &str = "__join_key";

/// Relational engine backed by polars lazy frames
#[derive(Debug, Clone, Copy, Default)]
pub struct PolarsEngine;

impl PolarsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Materialize rows into a data frame
    pub fn collect(&self, rows: &LazyFrame) -> Result<DataFrame> {
        Ok(rows.clone().collect()?)
    }

    /// Read one file with every field as text
    fn read_raw(&self, path: &Path, source: &DelimitedSource, positions: &[usize]) -> Result<DataFrame> {
        if !path.exists() {
            return Err(PipelineError::DatasetNotFound {
                path: path.to_path_buf(),
            });
        }

        let parse_options = CsvParseOptions::default()
            .with_separator(source.delimiter)
            .with_missing_is_null(false);

        let read = CsvReadOptions::default()
            .with_has_header(false)
            .with_skip_rows(usize::from(source.skip_header))
            .with_infer_schema_length(Some(0))
            .with_projection(Some(Arc::new(positions.to_vec())))
            .with_parse_options(parse_options)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .and_then(|reader| reader.finish());

        let df = match read {
            Ok(df) if df.height() == 0 && df.width() != positions.len() => {
                return empty_text_frame(positions);
            }
            Ok(df) => df,
            // Header-only or zero-byte file
            Err(PolarsError::NoData(_)) => {
                debug!("{} has no data rows", path.display());
                return empty_text_frame(positions);
            }
            Err(e) => return Err(e.into()),
        };

        debug!(
            "Read {} rows x {} fields from {}",
            df.height(),
            df.width(),
            path.display()
        );
        Ok(df)
    }
}

/// Zero-row frame with one text column per selected field
fn empty_text_frame(positions: &[usize]) -> Result<DataFrame> {
    let columns = positions
        .iter()
        .map(|p| {
            Series::new_empty(PlSmallStr::from(format!("column_{}", p + 1)), &DataType::String)
                .into_column()
        })
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Coerce a text column into a typed series named after `column`
fn typed_series(raw: &polars::prelude::Column, column: &Column) -> Result<Series> {
    let name = PlSmallStr::from(column.name());
    let field = column.name();
    let declared = column.declared_type();
    let cells = raw.str()?;
    let values = cells
        .into_iter()
        .map(|cell| coerce_declared(field, cell, declared));

    let series = match declared {
        DeclaredType::Double => Series::new(
            name,
            values
                .map(|v| v.as_f64().unwrap_or(f64::NAN))
                .collect::<Vec<f64>>(),
        ),
        DeclaredType::Integer => {
            Series::new(name, values.map(|v| v.as_i32()).collect::<Vec<Option<i32>>>())
        }
        DeclaredType::String => Series::new(
            name,
            values
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Vec<Option<String>>>(),
        ),
        DeclaredType::Timestamp => Series::new(
            name,
            values
                .map(|v| v.as_timestamp().map(|t| t.and_utc().timestamp_millis()))
                .collect::<Vec<Option<i64>>>(),
        )
        .cast(&column.type_information())?,
        DeclaredType::Boolean => {
            Series::new(name, values.map(|v| v.as_bool()).collect::<Vec<Option<bool>>>())
        }
        DeclaredType::Unrecognized(_) => Series::full_null(name, cells.len(), &DataType::Null),
    };
    Ok(series)
}

/// Qualified names of `columns`, in order
fn qualified_names(columns: &[Arc<Column>]) -> Result<Vec<String>> {
    columns.iter().map(|c| c.full_name()).collect()
}

fn declared_type_of<'a>(
    columns: &'a [Arc<Column>],
    names: &[String],
    name: &str,
) -> Option<&'a DeclaredType> {
    names
        .iter()
        .position(|n| n == name)
        .map(|i| columns[i].declared_type())
}

fn operand_expr(operand: &Operand) -> Expr {
    match operand {
        Operand::Column(name) => col(name.as_str()),
        Operand::Floor { column, unit } => col(column.as_str()).dt().truncate(lit(unit.every())),
    }
}

impl TableEngine for PolarsEngine {
    type Rows = LazyFrame;

    fn read_delimited(&self, source: &DelimitedSource, columns: &[Column]) -> Result<LazyFrame> {
        let positions = source.resolve_positions(columns.len())?;
        if source.paths.is_empty() {
            return Err(PipelineError::configuration(
                "Delimited source has no input files",
            ));
        }

        let mut frames = Vec::with_capacity(source.paths.len());
        for path in &source.paths {
            let raw = self.read_raw(path, source, &positions)?;
            if raw.width() != columns.len() {
                return Err(PipelineError::configuration(format!(
                    "{} yielded {} fields but the schema has {} columns",
                    path.display(),
                    raw.width(),
                    columns.len()
                )));
            }
            let typed = raw
                .get_columns()
                .iter()
                .zip(columns)
                .map(|(raw_column, column)| {
                    typed_series(raw_column, column).map(|s| s.into_column())
                })
                .collect::<Result<Vec<_>>>()?;
            frames.push(DataFrame::new(typed)?.lazy());
        }

        if frames.len() == 1 {
            return Ok(frames.remove(0));
        }
        Ok(concat(frames, UnionArgs::default())?)
    }

    fn register(
        &self,
        table_name: &str,
        rows: LazyFrame,
        columns: &[Arc<Column>],
    ) -> Result<LazyFrame> {
        let projection = columns
            .iter()
            .map(|c| Ok(col(c.name()).alias(c.full_name()?)))
            .collect::<Result<Vec<Expr>>>()?;
        debug!("Registered table '{}' with {} columns", table_name, columns.len());
        Ok(rows.select(projection))
    }

    fn distinct(&self, rows: LazyFrame) -> Result<LazyFrame> {
        Ok(rows.unique_stable(None, UniqueKeepStrategy::First))
    }

    fn aggregate_by_time(
        &self,
        rows: LazyFrame,
        columns: &[Column],
        time_column: &str,
        every_minutes: u32,
    ) -> Result<LazyFrame> {
        match columns.iter().find(|c| c.name() == time_column) {
            Some(c) if *c.declared_type() == DeclaredType::Timestamp => {}
            Some(c) => {
                return Err(PipelineError::configuration(format!(
                    "Cannot bucket by '{}': declared type is {}",
                    time_column,
                    c.declared_type()
                )));
            }
            None => {
                return Err(PipelineError::configuration(format!(
                    "Cannot bucket by unknown column '{}'",
                    time_column
                )));
            }
        }
        if every_minutes == 0 {
            return Err(PipelineError::configuration(
                "Aggregation window must be at least one minute",
            ));
        }

        let every = format!("{}m", every_minutes);
        let keys: Vec<Expr> = columns
            .iter()
            .filter(|c| !c.is_feature())
            .map(|c| col(c.name()))
            .collect();
        let averages: Vec<Expr> = columns
            .iter()
            .filter(|c| c.is_feature())
            .map(|c| {
                col(c.name())
                    .filter(col(c.name()).is_not_nan())
                    .mean()
                    .fill_null(lit(f64::NAN))
                    .alias(c.name())
            })
            .collect();
        let order: Vec<Expr> = columns.iter().map(|c| col(c.name())).collect();

        Ok(rows
            .with_column(col(time_column).dt().truncate(lit(every)).alias(time_column))
            .group_by_stable(keys)
            .agg(averages)
            .select(order))
    }

    fn join(&self, query: JoinQuery<'_, LazyFrame>) -> Result<LazyFrame> {
        let predicate = query.predicate.as_str();
        let left_names = qualified_names(query.left_columns)?;
        let right_names = qualified_names(query.right_columns)?;

        let mut left = query.left_rows.clone();
        let mut right = query.right_rows.clone();
        let mut left_on = Vec::new();
        let mut right_on = Vec::new();

        for (i, term) in query.predicate.terms().iter().enumerate() {
            let in_left = |op: &Operand| left_names.iter().any(|n| n == op.column_name());
            let in_right = |op: &Operand| right_names.iter().any(|n| n == op.column_name());

            let (left_operand, right_operand) = if in_left(&term.left) && in_right(&term.right) {
                (&term.left, &term.right)
            } else if in_right(&term.left) && in_left(&term.right) {
                (&term.right, &term.left)
            } else {
                let unknown = [&term.left, &term.right]
                    .into_iter()
                    .find(|op| !in_left(*op) && !in_right(*op));
                let reason = match unknown {
                    Some(op) => format!(
                        "column '{}' is not defined in '{}' or '{}'",
                        op.column_name(),
                        query.left_name,
                        query.right_name
                    ),
                    None => format!(
                        "'{} = {}' must compare a column of '{}' with a column of '{}'",
                        term.left, term.right, query.left_name, query.right_name
                    ),
                };
                return Err(PipelineError::query_compilation(predicate, reason));
            };

            let mut left_expr = operand_expr(left_operand);
            let mut right_expr = operand_expr(right_operand);

            // Numeric keys of different declared types meet as doubles
            if let (Operand::Column(l), Operand::Column(r)) = (left_operand, right_operand) {
                let l_type = declared_type_of(query.left_columns, &left_names, l);
                let r_type = declared_type_of(query.right_columns, &right_names, r);
                if let (Some(l_type), Some(r_type)) = (l_type, r_type) {
                    if l_type != r_type && l_type.is_numeric() && r_type.is_numeric() {
                        left_expr = left_expr.cast(DataType::Float64);
                        right_expr = right_expr.cast(DataType::Float64);
                    }
                }
            }

            let left_key = format!("{}_l{}", JOIN_KEY_PREFIX, i);
            let right_key = format!("{}_r{}", JOIN_KEY_PREFIX, i);
            left = left.with_column(left_expr.alias(left_key.as_str()));
            right = right.with_column(right_expr.alias(right_key.as_str()));
            left_on.push(col(left_key.as_str()));
            right_on.push(col(right_key.as_str()));
        }

        debug!(
            "Planning join of '{}' and '{}' on {}",
            query.left_name, query.right_name, predicate
        );

        let output: Vec<Expr> = left_names
            .iter()
            .chain(right_names.iter())
            .map(|name| col(name.as_str()))
            .collect();

        Ok(left
            .join(right, left_on, right_on, JoinArgs::new(JoinType::Inner))
            .select(output))
    }

    fn count(&self, rows: &LazyFrame) -> Result<usize> {
        Ok(self.collect(rows)?.height())
    }

    fn write_delimited(&self, rows: &LazyFrame, path: &Path, delimiter: u8) -> Result<usize> {
        let mut df = self.collect(rows)?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        // Rows land in a sibling temp file that replaces `path` only once complete
        let mut file = NamedTempFile::new_in(parent)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(delimiter)
            .with_datetime_format(Some(TIMESTAMP_FORMAT.to_string()))
            .finish(&mut df)?;
        file.persist(path).map_err(|e| PipelineError::Io(e.error))?;

        debug!("Wrote {} rows to {}", df.height(), path.display());
        Ok(df.height())
    }
}

//! Feature tables: named row-sets with column metadata.
//!
//! A [`FeatureTable`] owns its columns and an opaque row handle from a
//! [`TableEngine`]. Construction assigns every column to the table and
//! exposes the rows under qualified column names, so tables from different
//! sources can be joined without name collisions. Joins build new tables
//! and leave both inputs untouched.

use crate::engine::{JoinPredicate, JoinQuery, PolarsEngine, TableEngine};
use crate::error::{PipelineError, Result};
use crate::schema::Column;
use polars::prelude::{DataFrame, LazyFrame};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A named tabular dataset with typed columns and designated key columns
#[derive(Debug, Clone)]
pub struct FeatureTable<R> {
    name: Arc<str>,
    rows: R,
    all_columns: Vec<Arc<Column>>,
    key_columns: Vec<Arc<Column>>,
}

impl<R: Clone> FeatureTable<R> {
    /// Build a table from rows whose fields match `columns` in order.
    ///
    /// Every column becomes owned by this table; `key_names` must name
    /// columns of the table and are kept in the given order.
    pub fn new<E>(
        name: impl Into<String>,
        rows: R,
        columns: Vec<Column>,
        key_names: &[&str],
        engine: &E,
    ) -> Result<Self>
    where
        E: TableEngine<Rows = R>,
    {
        let name: Arc<str> = Arc::from(name.into());

        let mut seen = HashSet::new();
        if let Some(duplicate) = columns.iter().find(|c| !seen.insert(c.name())) {
            return Err(PipelineError::configuration(format!(
                "Table '{}' declares column '{}' more than once",
                name,
                duplicate.name()
            )));
        }

        let all_columns: Vec<Arc<Column>> = columns.into_iter().map(Arc::new).collect();
        for column in &all_columns {
            column.assign_owner(Arc::clone(&name))?;
        }

        let key_columns = key_names
            .iter()
            .map(|key| {
                all_columns
                    .iter()
                    .find(|c| c.name() == *key)
                    .cloned()
                    .ok_or_else(|| {
                        PipelineError::configuration(format!(
                            "Key column '{}' is not a column of table '{}'",
                            key, name
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let rows = engine.register(&name, rows, &all_columns)?;
        debug!(
            "Created feature table '{}' ({} columns, keys {:?})",
            name,
            all_columns.len(),
            key_names
        );

        Ok(Self {
            name,
            rows,
            all_columns,
            key_columns,
        })
    }

    /// Join with `other` on a string-form predicate over qualified names.
    ///
    /// The result's columns are this table's columns followed by `other`'s.
    /// `key_columns` become the result's keys and must be columns of either
    /// input.
    pub fn join<E>(
        &self,
        other: &FeatureTable<R>,
        key_columns: &[Arc<Column>],
        predicate: &str,
        engine: &E,
    ) -> Result<FeatureTable<R>>
    where
        E: TableEngine<Rows = R>,
    {
        let predicate = JoinPredicate::parse(predicate)?;

        let all_columns: Vec<Arc<Column>> = self
            .all_columns
            .iter()
            .chain(other.all_columns.iter())
            .cloned()
            .collect();

        for key in key_columns {
            if !all_columns.iter().any(|c| Arc::ptr_eq(c, key)) {
                return Err(PipelineError::configuration(format!(
                    "Key column '{}' belongs to neither '{}' nor '{}'",
                    key.full_name().unwrap_or_else(|_| key.name().to_string()),
                    self.name,
                    other.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for column in &all_columns {
            let full_name = column.full_name()?;
            if !seen.insert(full_name.clone()) {
                return Err(PipelineError::configuration(format!(
                    "Qualified column name '{}' occurs in both '{}' and '{}'",
                    full_name, self.name, other.name
                )));
            }
        }

        let rows = engine.join(JoinQuery {
            left_name: &self.name,
            left_rows: &self.rows,
            left_columns: &self.all_columns,
            right_name: &other.name,
            right_rows: &other.rows,
            right_columns: &other.all_columns,
            predicate: &predicate,
        })?;

        let name: Arc<str> = Arc::from(format!("{}_{}", self.name, other.name));
        info!("Joined '{}' with '{}' on {}", self.name, other.name, predicate);

        Ok(FeatureTable {
            name,
            rows,
            all_columns,
            key_columns: key_columns.to_vec(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Engine handle to the rows, with qualified column names
    pub fn rows(&self) -> &R {
        &self.rows
    }

    pub fn all_columns(&self) -> &[Arc<Column>] {
        &self.all_columns
    }

    pub fn key_columns(&self) -> &[Arc<Column>] {
        &self.key_columns
    }

    pub fn feature_columns(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.all_columns.iter().filter(|c| c.is_feature())
    }

    /// Look up a column by qualified name
    pub fn column(&self, full_name: &str) -> Option<&Arc<Column>> {
        self.all_columns
            .iter()
            .find(|c| c.full_name().is_ok_and(|n| n == full_name))
    }

    /// Qualified names of all columns, in schema order
    pub fn qualified_names(&self) -> Result<Vec<String>> {
        self.all_columns.iter().map(|c| c.full_name()).collect()
    }

    pub fn count<E>(&self, engine: &E) -> Result<usize>
    where
        E: TableEngine<Rows = R>,
    {
        engine.count(&self.rows)
    }

    /// Write the rows as a delimited file with a header line
    pub fn write<E>(&self, path: &Path, delimiter: u8, engine: &E) -> Result<usize>
    where
        E: TableEngine<Rows = R>,
    {
        engine.write_delimited(&self.rows, path, delimiter)
    }
}

impl FeatureTable<LazyFrame> {
    /// Materialize the rows into a data frame
    pub fn collect(&self, engine: &PolarsEngine) -> Result<DataFrame> {
        engine.collect(&self.rows)
    }
}

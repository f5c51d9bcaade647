#![forbid(unsafe_code)]

use std::collections::HashSet;

use ft_columnar::{Column, ColumnError};
use ft_selection::{Selection, SelectionError};
use ft_types::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TableError {
    #[error("table '{table}' has no column named '{column}'")]
    UnknownColumn { table: String, column: String },
    #[error("table '{table}' already has a column named '{column}'")]
    DuplicateColumnName { table: String, column: String },
    #[error("column '{column}' has {found} rows but table '{table}' has {expected}")]
    LengthMismatch {
        table: String,
        column: String,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// An ordered collection of uniquely named columns of equal length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self, TableError> {
        let mut table = Self::empty(name);
        table.add_columns(columns)?;
        Ok(table)
    }

    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    fn unknown_column(&self, name: &str) -> TableError {
        TableError::UnknownColumn {
            table: self.name.clone(),
            column: name.to_owned(),
        }
    }

    pub fn column(&self, name: &str) -> Result<&Column, TableError> {
        self.columns
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| self.unknown_column(name))
    }

    pub fn column_mut(&mut self, name: &str) -> Result<&mut Column, TableError> {
        match self.column_index(name) {
            Some(idx) => Ok(&mut self.columns[idx]),
            None => Err(self.unknown_column(name)),
        }
    }

    #[must_use]
    pub fn column_at(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    /// Appends columns after validating names and lengths against the
    /// existing ones. On error the table is left unchanged.
    pub fn add_columns(&mut self, columns: Vec<Column>) -> Result<(), TableError> {
        let expected = self
            .columns
            .first()
            .or(columns.first())
            .map_or(0, Column::len);
        {
            let mut seen: HashSet<&str> = self.columns.iter().map(Column::name).collect();
            for column in &columns {
                if !seen.insert(column.name()) {
                    return Err(TableError::DuplicateColumnName {
                        table: self.name.clone(),
                        column: column.name().to_owned(),
                    });
                }
                if column.len() != expected {
                    return Err(TableError::LengthMismatch {
                        table: self.name.clone(),
                        column: column.name().to_owned(),
                        expected,
                        found: column.len(),
                    });
                }
            }
        }
        self.columns.extend(columns);
        Ok(())
    }

    /// Removes the named columns; unknown names are an error and leave the
    /// table unchanged.
    pub fn remove_columns(&mut self, names: &[&str]) -> Result<(), TableError> {
        if let Some(missing) = names.iter().find(|n| !self.has_column(n)) {
            return Err(self.unknown_column(missing));
        }
        self.columns.retain(|c| !names.contains(&c.name()));
        Ok(())
    }

    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) -> Result<(), TableError> {
        let to = to.into();
        if from != to && self.has_column(&to) {
            return Err(TableError::DuplicateColumnName {
                table: self.name.clone(),
                column: to,
            });
        }
        self.column_mut(from)?.set_name(to);
        Ok(())
    }

    /// A new table holding the named columns in the given order.
    pub fn select_columns(&self, names: &[&str]) -> Result<Self, TableError> {
        let columns = names
            .iter()
            .map(|name| self.column(name).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(self.name.clone(), columns)
    }

    /// Same columns (names and types), no rows.
    #[must_use]
    pub fn empty_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            columns: self.columns.iter().map(|c| c.empty_copy(0)).collect(),
        }
    }

    /// The sub-table of rows named by `selection`.
    pub fn where_rows(&self, selection: &Selection) -> Result<Self, TableError> {
        selection.check_bounds(self.row_count())?;
        let positions: Vec<Option<usize>> = selection.iter().map(Some).collect();
        self.take_positions(&positions)
    }

    /// Gathers rows by position across every column; `None` rows are
    /// missing in every column.
    pub fn take_positions(&self, positions: &[Option<usize>]) -> Result<Self, TableError> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.take_positions(positions))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: self.name.clone(),
            columns,
        })
    }

    pub fn row(&self, row: usize) -> Result<Vec<Scalar>, TableError> {
        self.columns
            .iter()
            .map(|c| c.get(row).map_err(TableError::from))
            .collect()
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.semantic_eq(b))
    }
}

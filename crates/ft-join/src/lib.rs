#![forbid(unsafe_code)]

//! Equi-joins of tables on one or more key columns.
//!
//! Every join is driven by its left table: one index is built per key column
//! of the right table, each left row is looked up in all of them, and the
//! per-key matches are intersected. Right and full outer joins are derived
//! from the left-driven join.

mod plan;

use std::borrow::Cow;
use std::fmt;

use ft_columnar::{Column, ColumnError};
use ft_index::{IndexError, JoinKeyKind};
use ft_selection::Selection;
use ft_table::{Table, TableError};
use ft_types::ColumnType;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::plan::{JoinExecutionTrace, execute_plan, has_match, probe_keys};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

impl JoinType {
    pub const ALL: [Self; 4] = [
        Self::Inner,
        Self::LeftOuter,
        Self::RightOuter,
        Self::FullOuter,
    ];
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inner => "inner",
            Self::LeftOuter => "left_outer",
            Self::RightOuter => "right_outer",
            Self::FullOuter => "full_outer",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum JoinError {
    #[error(
        "joining is supported on integer, fractional, string and date-like columns; \
         column '{column}' is of type {column_type}"
    )]
    UnsupportedJoinColumnType {
        column: String,
        column_type: ColumnType,
    },
    #[error("join column '{column}' not found in table '{table}'")]
    UnknownColumn { table: String, column: String },
    #[error(
        "column '{column}' exists in both '{left}' and '{right}'; \
         allow duplicate column names to keep both"
    )]
    DuplicateColumnNameConflict {
        column: String,
        left: String,
        right: String,
    },
    #[error(
        "join column '{column}' is {left_type} in '{left}' but {right_type} in '{right}'"
    )]
    JoinKeyTypeMismatch {
        column: String,
        left: String,
        left_type: ColumnType,
        right: String,
        right_type: ColumnType,
    },
    #[error("at least one join column is required")]
    NoJoinColumns,
    #[error("at least one table to join with is required")]
    NoRightTables,
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Index(IndexError),
}

impl From<IndexError> for JoinError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::UnsupportedColumnType {
                column,
                column_type,
            } => Self::UnsupportedJoinColumnType {
                column,
                column_type,
            },
            other => Self::Index(other),
        }
    }
}

pub const DEFAULT_ARENA_BUDGET_BYTES: usize = 256 * 1024 * 1024;
pub const DEFAULT_ALIAS_PREFIX: &str = "T";
pub const DEFAULT_FIRST_ALIAS_ID: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinExecutionOptions {
    pub use_arena: bool,
    pub arena_budget_bytes: usize,
}

impl Default for JoinExecutionOptions {
    fn default() -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: DEFAULT_ARENA_BUDGET_BYTES,
        }
    }
}

/// Join configuration. Missing fields deserialize to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinOptions {
    /// Keep right columns whose names collide with left columns, renamed
    /// `"{alias}.{name}"`. When false a collision is an error.
    pub allow_duplicate_column_names: bool,
    pub alias_prefix: String,
    pub first_alias_id: usize,
    pub use_arena: bool,
    pub arena_budget_bytes: usize,
}

impl Default for JoinOptions {
    fn default() -> Self {
        let execution = JoinExecutionOptions::default();
        Self {
            allow_duplicate_column_names: false,
            alias_prefix: DEFAULT_ALIAS_PREFIX.to_owned(),
            first_alias_id: DEFAULT_FIRST_ALIAS_ID,
            use_arena: execution.use_arena,
            arena_budget_bytes: execution.arena_budget_bytes,
        }
    }
}

impl JoinOptions {
    #[must_use]
    pub fn with_duplicate_column_names(mut self, allow: bool) -> Self {
        self.allow_duplicate_column_names = allow;
        self
    }

    #[must_use]
    pub fn with_alias_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.alias_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_first_alias_id(mut self, id: usize) -> Self {
        self.first_alias_id = id;
        self
    }

    #[must_use]
    pub fn with_execution(mut self, execution: JoinExecutionOptions) -> Self {
        self.use_arena = execution.use_arena;
        self.arena_budget_bytes = execution.arena_budget_bytes;
        self
    }

    #[must_use]
    pub fn execution(&self) -> JoinExecutionOptions {
        JoinExecutionOptions {
            use_arena: self.use_arena,
            arena_budget_bytes: self.arena_budget_bytes,
        }
    }

    #[must_use]
    pub fn session(&self) -> JoinSession {
        JoinSession::new(self.alias_prefix.clone(), self.first_alias_id)
    }
}

/// Alias counter for a chain of joins. Each join step takes the next alias,
/// whether or not it renames anything, so chained right tables get
/// distinct prefixes (`T2.`, `T3.`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSession {
    prefix: String,
    next_id: usize,
}

impl JoinSession {
    #[must_use]
    pub fn new(prefix: impl Into<String>, first_id: usize) -> Self {
        Self {
            prefix: prefix.into(),
            next_id: first_id,
        }
    }

    /// The alias the next step will use.
    #[must_use]
    pub fn peek_alias(&self) -> String {
        format!("{}{}", self.prefix, self.next_id)
    }

    pub fn next_alias(&mut self) -> String {
        let alias = self.peek_alias();
        self.next_id += 1;
        alias
    }
}

impl Default for JoinSession {
    fn default() -> Self {
        Self::new(DEFAULT_ALIAS_PREFIX, DEFAULT_FIRST_ALIAS_ID)
    }
}

/// A left table and its join columns, ready to join with right tables.
#[derive(Debug, Clone)]
pub struct Joiner<'a> {
    left: &'a Table,
    keys: Vec<String>,
    options: JoinOptions,
}

impl<'a> Joiner<'a> {
    pub fn new(left: &'a Table, keys: &[&str]) -> Result<Self, JoinError> {
        if keys.is_empty() {
            return Err(JoinError::NoJoinColumns);
        }
        for key in keys {
            let column = key_column(left, key)?;
            JoinKeyKind::of(column)?;
        }
        Ok(Self {
            left,
            keys: keys.iter().map(|k| (*k).to_owned()).collect(),
            options: JoinOptions::default(),
        })
    }

    #[must_use]
    pub fn with_options(mut self, options: JoinOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn allow_duplicate_column_names(mut self, allow: bool) -> Self {
        self.options.allow_duplicate_column_names = allow;
        self
    }

    #[must_use]
    pub fn left(&self) -> &'a Table {
        self.left
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[must_use]
    pub fn options(&self) -> &JoinOptions {
        &self.options
    }

    pub fn inner(&self, right: &Table) -> Result<Table, JoinError> {
        self.join(right, JoinType::Inner)
    }

    pub fn left_outer(&self, right: &Table) -> Result<Table, JoinError> {
        self.join(right, JoinType::LeftOuter)
    }

    pub fn right_outer(&self, right: &Table) -> Result<Table, JoinError> {
        self.join(right, JoinType::RightOuter)
    }

    pub fn full_outer(&self, right: &Table) -> Result<Table, JoinError> {
        self.join(right, JoinType::FullOuter)
    }

    pub fn inner_all(&self, rights: &[&Table]) -> Result<Table, JoinError> {
        self.join_all(rights, JoinType::Inner)
    }

    pub fn left_outer_all(&self, rights: &[&Table]) -> Result<Table, JoinError> {
        self.join_all(rights, JoinType::LeftOuter)
    }

    pub fn right_outer_all(&self, rights: &[&Table]) -> Result<Table, JoinError> {
        self.join_all(rights, JoinType::RightOuter)
    }

    pub fn full_outer_all(&self, rights: &[&Table]) -> Result<Table, JoinError> {
        self.join_all(rights, JoinType::FullOuter)
    }

    pub fn join(&self, right: &Table, join_type: JoinType) -> Result<Table, JoinError> {
        self.join_all(&[right], join_type)
    }

    /// Joins with each right table in turn, the output of one step being the
    /// left table of the next. Every right table is validated before any
    /// rows are matched.
    pub fn join_all(&self, rights: &[&Table], join_type: JoinType) -> Result<Table, JoinError> {
        let mut session = self.options.session();
        self.join_all_in(rights, join_type, &mut session)
    }

    /// Like [`Joiner::join_all`], drawing aliases from a caller-owned session.
    pub fn join_all_in(
        &self,
        rights: &[&Table],
        join_type: JoinType,
        session: &mut JoinSession,
    ) -> Result<Table, JoinError> {
        if rights.is_empty() {
            return Err(JoinError::NoRightTables);
        }
        for right in rights {
            check_key_columns(self.left, right, &self.keys)?;
        }
        if !self.options.allow_duplicate_column_names {
            check_duplicate_names(self.left, rights, &self.keys)?;
        }

        let mut joined = Cow::Borrowed(self.left);
        for right in rights {
            let (table, _) =
                join_step(&joined, right, &self.keys, join_type, &self.options, session)?;
            joined = Cow::Owned(table);
        }
        Ok(joined.into_owned())
    }
}

/// Starts a join from a table.
pub trait TableJoinExt {
    fn join_on(&self, keys: &[&str]) -> Result<Joiner<'_>, JoinError>;
}

impl TableJoinExt for Table {
    fn join_on(&self, keys: &[&str]) -> Result<Joiner<'_>, JoinError> {
        Joiner::new(self, keys)
    }
}

pub fn inner(
    left: &Table,
    rights: &[&Table],
    keys: &[&str],
    allow_duplicate_column_names: bool,
) -> Result<Table, JoinError> {
    join_tables(left, rights, keys, JoinType::Inner, allow_duplicate_column_names)
}

pub fn left_outer(
    left: &Table,
    rights: &[&Table],
    keys: &[&str],
    allow_duplicate_column_names: bool,
) -> Result<Table, JoinError> {
    join_tables(left, rights, keys, JoinType::LeftOuter, allow_duplicate_column_names)
}

pub fn right_outer(
    left: &Table,
    rights: &[&Table],
    keys: &[&str],
    allow_duplicate_column_names: bool,
) -> Result<Table, JoinError> {
    join_tables(left, rights, keys, JoinType::RightOuter, allow_duplicate_column_names)
}

pub fn full_outer(
    left: &Table,
    rights: &[&Table],
    keys: &[&str],
    allow_duplicate_column_names: bool,
) -> Result<Table, JoinError> {
    join_tables(left, rights, keys, JoinType::FullOuter, allow_duplicate_column_names)
}

pub fn join_tables(
    left: &Table,
    rights: &[&Table],
    keys: &[&str],
    join_type: JoinType,
    allow_duplicate_column_names: bool,
) -> Result<Table, JoinError> {
    let options = JoinOptions::default().with_duplicate_column_names(allow_duplicate_column_names);
    join_tables_with_options(left, rights, keys, join_type, &options)
}

pub fn join_tables_with_options(
    left: &Table,
    rights: &[&Table],
    keys: &[&str],
    join_type: JoinType,
    options: &JoinOptions,
) -> Result<Table, JoinError> {
    Joiner::new(left, keys)?
        .with_options(options.clone())
        .join_all(rights, join_type)
}

pub(crate) fn is_key(keys: &[String], name: &str) -> bool {
    keys.iter().any(|k| k == name)
}

pub(crate) fn key_column<'t>(table: &'t Table, key: &str) -> Result<&'t Column, JoinError> {
    table.column(key).map_err(|_| JoinError::UnknownColumn {
        table: table.name().to_owned(),
        column: key.to_owned(),
    })
}

/// Every key exists in both tables with the same joinable type.
fn check_key_columns(left: &Table, right: &Table, keys: &[String]) -> Result<(), JoinError> {
    if keys.is_empty() {
        return Err(JoinError::NoJoinColumns);
    }
    for key in keys {
        let left_column = key_column(left, key)?;
        let right_column = key_column(right, key)?;
        JoinKeyKind::of(left_column)?;
        JoinKeyKind::of(right_column)?;
        if left_column.column_type() != right_column.column_type() {
            return Err(JoinError::JoinKeyTypeMismatch {
                column: key.clone(),
                left: left.name().to_owned(),
                left_type: left_column.column_type(),
                right: right.name().to_owned(),
                right_type: right_column.column_type(),
            });
        }
    }
    Ok(())
}

/// Walks the column names each step would produce and fails on the first
/// right non-key column already present, before any step runs.
fn check_duplicate_names(
    left: &Table,
    rights: &[&Table],
    keys: &[String],
) -> Result<(), JoinError> {
    let mut names: Vec<&str> = left.columns().iter().map(Column::name).collect();
    for right in rights {
        for column in right.columns() {
            let name = column.name();
            if is_key(keys, name) {
                continue;
            }
            if names.contains(&name) {
                return Err(JoinError::DuplicateColumnNameConflict {
                    column: name.to_owned(),
                    left: left.name().to_owned(),
                    right: right.name().to_owned(),
                });
            }
            names.push(name);
        }
    }
    Ok(())
}

/// One join of two tables. Takes one alias from `session`.
fn join_step(
    left: &Table,
    right: &Table,
    keys: &[String],
    join_type: JoinType,
    options: &JoinOptions,
    session: &mut JoinSession,
) -> Result<(Table, JoinExecutionTrace), JoinError> {
    check_key_columns(left, right, keys)?;
    let alias = session.next_alias();
    let (table, trace) = match join_type {
        JoinType::Inner => {
            let step = left_driven(left, right, keys, &alias, options, false)?;
            (step.table, step.trace)
        }
        JoinType::LeftOuter => {
            let step = left_driven(left, right, keys, &alias, options, true)?;
            (step.table, step.trace)
        }
        JoinType::RightOuter => right_outer_step(left, right, keys, &alias, options)?,
        JoinType::FullOuter => full_outer_step(left, right, keys, &alias, options)?,
    };
    debug!(
        %join_type,
        left = left.name(),
        right = right.name(),
        left_rows = left.row_count(),
        right_rows = right.row_count(),
        output_rows = trace.output_rows,
        used_arena = trace.used_arena,
        "join step complete"
    );
    Ok((table, trace))
}

struct LeftDriven<'r> {
    table: Table,
    /// The right table after duplicate-name resolution.
    right: Cow<'r, Table>,
    /// `(original, alias)` for every renamed right column.
    renamed: Vec<(String, String)>,
    trace: JoinExecutionTrace,
}

/// Renames right non-key columns that collide with left columns, on a copy.
fn resolve_duplicate_names<'r>(
    left: &Table,
    right: &'r Table,
    keys: &[String],
    alias: &str,
    allow: bool,
) -> Result<(Cow<'r, Table>, Vec<(String, String)>), JoinError> {
    let collisions: Vec<&str> = right
        .columns()
        .iter()
        .map(Column::name)
        .filter(|name| !is_key(keys, name) && left.has_column(name))
        .collect();
    let Some(first) = collisions.first() else {
        return Ok((Cow::Borrowed(right), Vec::new()));
    };
    if !allow {
        return Err(JoinError::DuplicateColumnNameConflict {
            column: (*first).to_owned(),
            left: left.name().to_owned(),
            right: right.name().to_owned(),
        });
    }

    let mut resolved = right.clone();
    let mut renamed = Vec::with_capacity(collisions.len());
    for name in collisions {
        let aliased = format!("{alias}.{name}");
        resolved.rename_column(name, aliased.clone())?;
        debug!(table = right.name(), column = name, alias = %aliased, "renamed duplicate column");
        renamed.push((name.to_owned(), aliased));
    }
    Ok((Cow::Owned(resolved), renamed))
}

fn left_driven<'r>(
    left: &Table,
    right: &'r Table,
    keys: &[String],
    alias: &str,
    options: &JoinOptions,
    outer: bool,
) -> Result<LeftDriven<'r>, JoinError> {
    let (resolved, renamed) = resolve_duplicate_names(
        left,
        right,
        keys,
        alias,
        options.allow_duplicate_column_names,
    )?;

    let probes = probe_keys(&resolved, left, keys)?;
    let (table, trace) = execute_plan(
        left,
        &resolved,
        keys,
        &probes,
        outer,
        options.execution(),
    )?;
    Ok(LeftDriven {
        table,
        right: resolved,
        renamed,
        trace,
    })
}

/// Left outer join with the tables swapped, with columns put back in
/// left-then-right order. Colliding names resolve in the right table's
/// favour, so the left table's columns are the aliased ones.
fn right_outer_step(
    left: &Table,
    right: &Table,
    keys: &[String],
    alias: &str,
    options: &JoinOptions,
) -> Result<(Table, JoinExecutionTrace), JoinError> {
    let step = left_driven(right, left, keys, alias, options, true).map_err(|err| match err {
        JoinError::DuplicateColumnNameConflict {
            column,
            left: driving,
            right: probed,
        } => JoinError::DuplicateColumnNameConflict {
            column,
            left: probed,
            right: driving,
        },
        other => other,
    })?;

    let mut order: Vec<&str> = Vec::with_capacity(step.table.column_count());
    for column in left.columns() {
        let name = column.name();
        let name = step
            .renamed
            .iter()
            .find(|(original, _)| original == name)
            .map_or(name, |(_, aliased)| aliased.as_str());
        order.push(name);
    }
    for column in right.columns() {
        if !order.contains(&column.name()) {
            order.push(column.name());
        }
    }

    let mut table = step.table.select_columns(&order)?;
    table.set_name(left.name());
    Ok((table, step.trace))
}

/// Left outer join, then every right row whose keys match no output row,
/// with its key values in the key columns and the left side missing.
fn full_outer_step(
    left: &Table,
    right: &Table,
    keys: &[String],
    alias: &str,
    options: &JoinOptions,
) -> Result<(Table, JoinExecutionTrace), JoinError> {
    let LeftDriven {
        table: joined,
        right: resolved,
        trace,
        ..
    } = left_driven(left, right, keys, alias, options, true)?;

    let probes = probe_keys(&joined, &resolved, keys)?;
    let mut unmatched = Vec::new();
    for row in 0..resolved.row_count() {
        if !has_match(&probes, row)? {
            unmatched.push(row);
        }
    }

    if unmatched.is_empty() {
        return Ok((joined, trace));
    }
    let right_only = resolved.where_rows(&Selection::from_positions(&unmatched))?;
    let extra_rows = right_only.row_count();

    let mut columns = joined.into_columns();
    for column in &mut columns {
        match right_only.columns().iter().find(|c| c.name() == column.name()) {
            Some(source) => column.append_column(source)?,
            None => {
                for _ in 0..extra_rows {
                    column.append_missing();
                }
            }
        }
    }
    let table = Table::new(left.name(), columns)?;
    debug!(
        table = left.name(),
        unmatched_right_rows = extra_rows,
        "appended unmatched right rows"
    );
    let trace = JoinExecutionTrace {
        output_rows: table.row_count(),
        ..trace
    };
    Ok((table, trace))
}

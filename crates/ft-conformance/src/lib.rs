#![forbid(unsafe_code)]

//! JSON join fixtures: inputs, join parameters and either the expected
//! output table or an expected error message.

use std::fs;
use std::path::{Path, PathBuf};

use ft_columnar::{Column, ColumnError};
use ft_join::{JoinError, JoinOptions, JoinType, join_tables_with_options};
use ft_table::{Table, TableError};
use ft_types::{ColumnType, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConformanceError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("fixture {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("fixture format error: {0}")]
    FixtureFormat(String),
}

#[must_use]
pub fn default_fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub values: Vec<Scalar>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureTable {
    pub name: String,
    pub columns: Vec<FixtureColumn>,
}

impl FixtureTable {
    pub fn to_table(&self) -> Result<Table, ConformanceError> {
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.column_type, c.values.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Table::new(self.name.clone(), columns)?)
    }

    #[must_use]
    pub fn from_table(table: &Table) -> Self {
        Self {
            name: table.name().to_owned(),
            columns: table
                .columns()
                .iter()
                .map(|c| FixtureColumn {
                    name: c.name().to_owned(),
                    column_type: c.column_type(),
                    values: c.values(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinFixture {
    pub case_id: String,
    #[serde(default)]
    pub description: String,
    pub join_type: JoinType,
    pub keys: Vec<String>,
    pub left: FixtureTable,
    pub rights: Vec<FixtureTable>,
    #[serde(default)]
    pub options: JoinOptions,
    #[serde(default)]
    pub expected: Option<FixtureTable>,
    #[serde(default)]
    pub expected_error_contains: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub join_type: JoinType,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
}

impl CaseResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == CaseStatus::Pass
    }
}

/// Runs one fixture. Setup failures (malformed tables) count as mismatches.
#[must_use]
pub fn run_fixture(fixture: &JoinFixture) -> CaseResult {
    let mismatch = check_fixture(fixture).err();
    let status = if mismatch.is_none() {
        CaseStatus::Pass
    } else {
        CaseStatus::Fail
    };
    debug!(case_id = %fixture.case_id, ?status, "fixture checked");
    CaseResult {
        case_id: fixture.case_id.clone(),
        join_type: fixture.join_type,
        status,
        mismatch,
    }
}

fn check_fixture(fixture: &JoinFixture) -> Result<(), String> {
    let left = fixture.left.to_table().map_err(|e| e.to_string())?;
    let rights = fixture
        .rights
        .iter()
        .map(FixtureTable::to_table)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    let right_refs: Vec<&Table> = rights.iter().collect();
    let keys: Vec<&str> = fixture.keys.iter().map(String::as_str).collect();

    let actual = join_tables_with_options(
        &left,
        &right_refs,
        &keys,
        fixture.join_type,
        &fixture.options,
    );
    match (&fixture.expected, &fixture.expected_error_contains, actual) {
        (_, Some(needle), Err(err)) => expect_error(&err, needle),
        (_, Some(needle), Ok(_)) => Err(format!("expected error containing '{needle}', got a table")),
        (Some(expected), None, Ok(table)) => {
            let expected = expected.to_table().map_err(|e| e.to_string())?;
            compare_tables(&table, &expected)
        }
        (Some(_), None, Err(err)) => Err(format!("unexpected error: {err}")),
        (None, None, _) => Err("fixture has neither expected nor expected_error_contains".to_owned()),
    }
}

fn expect_error(err: &JoinError, needle: &str) -> Result<(), String> {
    let message = err.to_string();
    if message.contains(needle) {
        Ok(())
    } else {
        Err(format!("error '{message}' does not contain '{needle}'"))
    }
}

/// First difference between two tables, comparing names, column names,
/// column types and cell values (all missing representations equal).
pub fn compare_tables(actual: &Table, expected: &Table) -> Result<(), String> {
    if actual.name() != expected.name() {
        return Err(format!(
            "table name: expected '{}', got '{}'",
            expected.name(),
            actual.name()
        ));
    }
    if actual.column_names() != expected.column_names() {
        return Err(format!(
            "columns: expected {:?}, got {:?}",
            expected.column_names(),
            actual.column_names()
        ));
    }
    if actual.row_count() != expected.row_count() {
        return Err(format!(
            "row count: expected {}, got {}",
            expected.row_count(),
            actual.row_count()
        ));
    }
    for (a, e) in actual.columns().iter().zip(expected.columns()) {
        if a.column_type() != e.column_type() {
            return Err(format!(
                "column '{}': expected type {}, got {}",
                e.name(),
                e.column_type(),
                a.column_type()
            ));
        }
    }
    for row in 0..expected.row_count() {
        let got = actual.row(row).map_err(|e| e.to_string())?;
        let want = expected.row(row).map_err(|e| e.to_string())?;
        if !got.iter().zip(&want).all(|(g, w)| g.semantic_eq(w)) {
            return Err(format!("row {row}: expected {want:?}, got {got:?}"));
        }
    }
    Ok(())
}

/// Loads every `*.json` fixture directly under `dir`, ordered by file name.
pub fn load_fixtures_dir(dir: &Path) -> Result<Vec<JoinFixture>, ConformanceError> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|p| p.extension().is_some_and(|ext| ext == "json"));
    paths.sort();

    let mut fixtures = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = fs::read_to_string(&path)?;
        let fixture: JoinFixture =
            serde_json::from_str(&raw).map_err(|source| ConformanceError::Json {
                path: path.clone(),
                source,
            })?;
        if fixture.expected.is_some() == fixture.expected_error_contains.is_some() {
            return Err(ConformanceError::FixtureFormat(format!(
                "{}: exactly one of expected and expected_error_contains is required",
                path.display()
            )));
        }
        fixtures.push(fixture);
    }
    Ok(fixtures)
}

pub fn run_fixtures_dir(dir: &Path) -> Result<Vec<CaseResult>, ConformanceError> {
    Ok(load_fixtures_dir(dir)?.iter().map(run_fixture).collect())
}

#[cfg(test)]
mod tests {
    use ft_columnar::Column;
    use ft_join::JoinType;
    use ft_table::Table;
    use ft_types::{ColumnType, Scalar};

    use super::{CaseStatus, FixtureTable, JoinFixture, compare_tables, run_fixture};

    const SCENARIO_INNER: &str = r#"{
        "case_id": "inline_inner",
        "join_type": "inner",
        "keys": ["id"],
        "left": {"name": "A", "columns": [
            {"name": "id", "column_type": "int32", "values": [
                {"kind": "int32", "value": 1}, {"kind": "int32", "value": 2}]}
        ]},
        "rights": [{"name": "B", "columns": [
            {"name": "id", "column_type": "int32", "values": [{"kind": "int32", "value": 2}]},
            {"name": "w", "column_type": "utf8", "values": [{"kind": "utf8", "value": "x"}]}
        ]}],
        "expected": {"name": "A", "columns": [
            {"name": "id", "column_type": "int32", "values": [{"kind": "int32", "value": 2}]},
            {"name": "w", "column_type": "utf8", "values": [{"kind": "utf8", "value": "x"}]}
        ]}
    }"#;

    #[test]
    fn inline_fixture_passes() {
        let fixture: JoinFixture = serde_json::from_str(SCENARIO_INNER).expect("fixture");
        assert_eq!(fixture.join_type, JoinType::Inner);
        assert!(!fixture.options.allow_duplicate_column_names);
        let result = run_fixture(&fixture);
        assert_eq!(result.status, CaseStatus::Pass, "{:?}", result.mismatch);
    }

    #[test]
    fn wrong_expectation_is_reported() {
        let mut fixture: JoinFixture = serde_json::from_str(SCENARIO_INNER).expect("fixture");
        if let Some(expected) = fixture.expected.as_mut() {
            expected.columns[1].values = vec![Scalar::from("nope")];
        }
        let result = run_fixture(&fixture);
        assert_eq!(result.status, CaseStatus::Fail);
        assert!(result.mismatch.expect("mismatch").contains("row 0"));
    }

    #[test]
    fn fixture_tables_round_trip_missing_values() {
        let mut id = Column::from_i64("id", vec![4]);
        id.append_missing();
        let table = Table::new("t", vec![id]).expect("table");
        let fixture = FixtureTable::from_table(&table);
        assert_eq!(fixture.columns[0].column_type, ColumnType::Int64);
        assert_eq!(fixture.columns[0].values[1], Scalar::Missing);
        let rebuilt = fixture.to_table().expect("rebuild");
        assert_eq!(compare_tables(&rebuilt, &table), Ok(()));
    }

    #[test]
    fn compare_tables_reports_column_order() {
        let a = Table::new(
            "t",
            vec![Column::from_i32("a", vec![1]), Column::from_i32("b", vec![2])],
        )
        .expect("a");
        let b = a.select_columns(&["b", "a"]).expect("b");
        let err = compare_tables(&a, &b).expect_err("order differs");
        assert!(err.starts_with("columns"));
    }
}

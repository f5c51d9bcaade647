//! Row matching and output assembly for one left-driven join step.
//!
//! Matching produces a position plan: for every output row, the left row it
//! copies and the right row it pairs with (`None` for outer padding).
//! Output columns are then gathered from the plan one column at a time.

use std::mem::size_of;

use bumpalo::{Bump, collections::Vec as BumpVec};
use ft_columnar::Column;
use ft_index::{JoinKeyIndex, key_at};
use ft_selection::Selection;
use ft_table::Table;
use tracing::trace;

use crate::{JoinError, JoinExecutionOptions, is_key, key_column};

/// An index over one key column of the build side, paired with the same
/// key column of the probe side.
pub(crate) struct ProbeKey<'a> {
    pub(crate) index: JoinKeyIndex,
    pub(crate) probe: &'a Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JoinExecutionTrace {
    pub(crate) used_arena: bool,
    pub(crate) output_rows: usize,
    pub(crate) estimated_bytes: usize,
}

/// Indexes each key column of `build` and pairs it with the same column of
/// `probe`.
pub(crate) fn probe_keys<'p>(
    build: &Table,
    probe: &'p Table,
    keys: &[String],
) -> Result<Vec<ProbeKey<'p>>, JoinError> {
    let mut probes = Vec::with_capacity(keys.len());
    for key in keys {
        probes.push(ProbeKey {
            index: JoinKeyIndex::build(key_column(build, key)?)?,
            probe: key_column(probe, key)?,
        });
    }
    Ok(probes)
}

/// Build-side rows matching probe row `row` on every key (AND of the
/// per-key selections).
fn matches_for_row(
    keys: &[ProbeKey<'_>],
    row: usize,
) -> Result<Selection, JoinError> {
    let (first, rest) = keys.split_first().ok_or(JoinError::NoJoinColumns)?;
    let mut matched = first.index.lookup(first.probe, row)?;
    for key in rest {
        if matched.is_empty() {
            break;
        }
        matched.and(&key.index.lookup(key.probe, row)?);
    }
    Ok(matched)
}

/// Whether probe row `row` matches at least one build-side row.
pub(crate) fn has_match(keys: &[ProbeKey<'_>], row: usize) -> Result<bool, JoinError> {
    if let [only] = keys {
        return Ok(only.index.match_count(key_at(only.probe, row)?) > 0);
    }
    Ok(!matches_for_row(keys, row)?.is_empty())
}

/// Upper bound on output rows, from the first key alone. Exact for
/// single-key joins.
fn estimate_output_rows(
    probe_rows: usize,
    keys: &[ProbeKey<'_>],
    outer: bool,
) -> Result<usize, JoinError> {
    let first = keys.first().ok_or(JoinError::NoJoinColumns)?;
    let mut rows = 0_usize;
    for row in 0..probe_rows {
        let matches = first.index.match_count(key_at(first.probe, row)?);
        rows = rows.saturating_add(match matches {
            0 if outer => 1,
            n => n,
        });
    }
    Ok(rows)
}

fn estimate_intermediate_bytes(output_rows: usize) -> usize {
    output_rows.saturating_mul(size_of::<Option<usize>>().saturating_mul(2))
}

/// Emits one `(left, right)` pair per output row, in left-row order. A
/// single key reads its matches straight from the index.
fn plan_rows<F>(
    probe_rows: usize,
    keys: &[ProbeKey<'_>],
    outer: bool,
    mut emit: F,
) -> Result<(), JoinError>
where
    F: FnMut(usize, Option<usize>),
{
    if let [only] = keys {
        for row in 0..probe_rows {
            let matched = only.index.positions(key_at(only.probe, row)?);
            if matched.is_empty() && outer {
                emit(row, None);
            }
            for &right_row in matched {
                emit(row, Some(right_row));
            }
        }
        return Ok(());
    }
    for row in 0..probe_rows {
        let matched = matches_for_row(keys, row)?;
        if matched.is_empty() {
            if outer {
                emit(row, None);
            }
            continue;
        }
        for right_row in matched.iter() {
            emit(row, Some(right_row));
        }
    }
    Ok(())
}

/// All left columns, then the right columns other than the join keys.
fn assemble(
    left: &Table,
    right: &Table,
    keys: &[String],
    left_positions: &[Option<usize>],
    right_positions: &[Option<usize>],
) -> Result<Table, JoinError> {
    let mut columns = Vec::with_capacity(left.column_count() + right.column_count());
    for column in left.columns() {
        columns.push(column.take_positions(left_positions)?);
    }
    for column in right
        .columns()
        .iter()
        .filter(|c| !is_key(keys, c.name()))
    {
        columns.push(column.take_positions(right_positions)?);
    }
    Ok(Table::new(left.name(), columns)?)
}

pub(crate) fn execute_plan(
    left: &Table,
    right: &Table,
    keys: &[String],
    probe_keys: &[ProbeKey<'_>],
    outer: bool,
    options: JoinExecutionOptions,
) -> Result<(Table, JoinExecutionTrace), JoinError> {
    let probe_rows = left.row_count();
    let estimated_rows = estimate_output_rows(probe_rows, probe_keys, outer)?;
    let estimated_bytes = estimate_intermediate_bytes(estimated_rows);
    let use_arena = options.use_arena && estimated_bytes <= options.arena_budget_bytes;
    trace!(estimated_rows, estimated_bytes, use_arena, "sized join plan");

    let table = if use_arena {
        let arena = Bump::new();
        let mut left_positions =
            BumpVec::<Option<usize>>::with_capacity_in(estimated_rows, &arena);
        let mut right_positions =
            BumpVec::<Option<usize>>::with_capacity_in(estimated_rows, &arena);
        plan_rows(probe_rows, probe_keys, outer, |l, r| {
            left_positions.push(Some(l));
            right_positions.push(r);
        })?;
        assemble(
            left,
            right,
            keys,
            left_positions.as_slice(),
            right_positions.as_slice(),
        )?
    } else {
        let mut left_positions = Vec::<Option<usize>>::with_capacity(estimated_rows);
        let mut right_positions = Vec::<Option<usize>>::with_capacity(estimated_rows);
        plan_rows(probe_rows, probe_keys, outer, |l, r| {
            left_positions.push(Some(l));
            right_positions.push(r);
        })?;
        assemble(left, right, keys, &left_positions, &right_positions)?
    };

    let output_rows = table.row_count();
    Ok((
        table,
        JoinExecutionTrace {
            used_arena: use_arena,
            output_rows,
            estimated_bytes,
        },
    ))
}

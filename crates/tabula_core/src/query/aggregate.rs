//! Column aggregates over a set of rows.
//!
//! Null cells are skipped. Empty input gives `None` for min, max and
//! average, and zero for sums.

use crate::error::CoreResult;
use crate::group::{Cell, TableData};
use crate::types::ColumnType;

/// Non-null values of `column` at `rows`, in row order.
pub(crate) fn collect<T>(
    data: &TableData,
    column: usize,
    ty: ColumnType,
    rows: &[usize],
    extract: fn(&Cell) -> Option<T>,
) -> CoreResult<Vec<T>> {
    data.expect_type(column, ty)?;
    let cells = &data.column(column)?.cells;
    Ok(rows
        .iter()
        .filter_map(|&row| cells.get(row).and_then(extract))
        .collect())
}

pub(crate) fn int(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Int(v) => Some(*v),
        _ => None,
    }
}

/// Float cells widened to double.
pub(crate) fn float(cell: &Cell) -> Option<f64> {
    float_raw(cell).map(f64::from)
}

pub(crate) fn float_raw(cell: &Cell) -> Option<f32> {
    match cell {
        Cell::Float(v) => Some(*v),
        _ => None,
    }
}

pub(crate) fn double(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Double(v) => Some(*v),
        _ => None,
    }
}

pub(crate) fn date(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Date(v) => Some(*v),
        _ => None,
    }
}

/// Wrapping sum.
pub(crate) fn sum_int(values: &[i64]) -> i64 {
    values.iter().fold(0i64, |acc, v| acc.wrapping_add(*v))
}

pub(crate) fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

pub(crate) fn min<T: Ord>(values: Vec<T>) -> Option<T> {
    values.into_iter().min()
}

pub(crate) fn max<T: Ord>(values: Vec<T>) -> Option<T> {
    values.into_iter().max()
}

/// Smallest value; NaN never wins against a number.
pub(crate) fn min_partial<T: PartialOrd>(values: Vec<T>) -> Option<T> {
    values
        .into_iter()
        .reduce(|best, v| if v < best || best.partial_cmp(&best).is_none() { v } else { best })
}

/// Largest value; NaN never wins against a number.
pub(crate) fn max_partial<T: PartialOrd>(values: Vec<T>) -> Option<T> {
    values
        .into_iter()
        .reduce(|best, v| if v > best || best.partial_cmp(&best).is_none() { v } else { best })
}

pub(crate) fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (total, count) = values.fold((0.0, 0usize), |(t, n), v| (t + v, n + 1));
    if count == 0 {
        None
    } else {
        #[allow(clippy::cast_precision_loss)]
        Some(total / count as f64)
    }
}

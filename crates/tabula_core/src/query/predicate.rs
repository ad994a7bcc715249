//! Leaf conditions of a query.

use crate::error::{CoreError, CoreResult};
use crate::group::{Cell, ColumnSpec, TableData};
use crate::types::{Case, ColumnType};
use crate::value::{truncate_date, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl CompareOp {
    const fn is_ordered(self) -> bool {
        !matches!(self, Self::Equal | Self::NotEqual)
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Equal => ord == Ordering::Equal,
            Self::NotEqual => ord != Ordering::Equal,
            Self::Greater => ord == Ordering::Greater,
            Self::GreaterOrEqual => ord != Ordering::Less,
            Self::Less => ord == Ordering::Less,
            Self::LessOrEqual => ord != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextOp {
    Equal,
    Contains,
    BeginsWith,
    EndsWith,
}

/// A single test against one column of a row.
#[derive(Debug, Clone)]
pub(crate) enum Predicate {
    Compare {
        column: usize,
        op: CompareOp,
        operand: Cell,
    },
    /// Inclusive on both ends.
    Between { column: usize, low: Cell, high: Cell },
    Text {
        column: usize,
        op: TextOp,
        needle: String,
        case: Case,
    },
    Null { column: usize, negated: bool },
}

fn ordered_type(ty: ColumnType) -> bool {
    matches!(
        ty,
        ColumnType::Int | ColumnType::Float | ColumnType::Double | ColumnType::Date
    )
}

/// Converts a caller operand to a cell comparable with `column`.
///
/// Float and double columns accept integer operands. Date operands are
/// truncated for equality and kept exact for range tests.
#[allow(clippy::cast_precision_loss)]
fn operand(spec: &ColumnSpec, column: usize, value: Value, exact_date: bool) -> CoreResult<Cell> {
    let ty = spec.column_type;
    let cell = match (ty, value) {
        (ColumnType::Float, Value::Int(v)) => Cell::Float(v as f32),
        (ColumnType::Double, Value::Int(v)) => Cell::Double(v as f64),
        (ColumnType::Double, Value::Float(v)) => Cell::Double(f64::from(v)),
        (ColumnType::Date, Value::Date(v)) if exact_date => Cell::Date(v),
        (ColumnType::Date, Value::Int(v)) => {
            Cell::Date(if exact_date { v } else { truncate_date(v) })
        }
        (ColumnType::Table | ColumnType::LinkList, _) => {
            return Err(CoreError::illegal_argument(format!(
                "cannot compare values of a {ty} column"
            )));
        }
        (_, Value::Null) => {
            return Err(CoreError::illegal_argument(
                "use is_null or is_not_null to test for null",
            ));
        }
        (_, value) => {
            let mut relaxed = spec.clone();
            relaxed.nullable = true;
            Cell::from_value(value, &relaxed, column)?
        }
    };
    Ok(cell)
}

impl Predicate {
    /// Equality or ordered comparison against `value`.
    pub(crate) fn compare(
        data: &TableData,
        column: usize,
        op: CompareOp,
        value: Value,
    ) -> CoreResult<Self> {
        let spec = data.spec(column)?;
        if op.is_ordered() && !ordered_type(spec.column_type) {
            return Err(CoreError::illegal_argument(format!(
                "ordered comparison is not supported on {} columns",
                spec.column_type
            )));
        }
        let operand = operand(spec, column, value, op.is_ordered())?;
        Ok(Self::Compare {
            column,
            op,
            operand,
        })
    }

    pub(crate) fn between(data: &TableData, column: usize, low: Value, high: Value) -> CoreResult<Self> {
        let spec = data.spec(column)?;
        if !ordered_type(spec.column_type) {
            return Err(CoreError::illegal_argument(format!(
                "between is not supported on {} columns",
                spec.column_type
            )));
        }
        Ok(Self::Between {
            column,
            low: operand(spec, column, low, true)?,
            high: operand(spec, column, high, true)?,
        })
    }

    pub(crate) fn text(
        data: &TableData,
        column: usize,
        op: TextOp,
        needle: &str,
        case: Case,
    ) -> CoreResult<Self> {
        data.expect_type(column, ColumnType::String)?;
        let needle = match case {
            Case::Sensitive => needle.to_owned(),
            Case::Insensitive => needle.to_lowercase(),
        };
        Ok(Self::Text {
            column,
            op,
            needle,
            case,
        })
    }

    pub(crate) fn null(data: &TableData, column: usize, negated: bool) -> CoreResult<Self> {
        let spec = data.spec(column)?;
        if !(spec.nullable || spec.column_type == ColumnType::Link) {
            return Err(CoreError::illegal_argument(format!(
                "column {column} cannot hold null"
            )));
        }
        Ok(Self::Null { column, negated })
    }

    /// Whether `row` satisfies the condition.
    ///
    /// A null cell only satisfies `NotEqual` and the null tests.
    pub(crate) fn matches(&self, data: &TableData, row: usize) -> bool {
        let cell = |column: usize| data.columns.get(column).and_then(|c| c.cells.get(row));
        match self {
            Self::Compare {
                column,
                op,
                operand,
            } => match cell(*column) {
                None => false,
                Some(Cell::Null) => *op == CompareOp::NotEqual,
                Some(c) if op.is_ordered() => op.holds(c.compare(operand)),
                Some(c) => (*op == CompareOp::Equal) == c.same_value(operand),
            },
            Self::Between { column, low, high } => match cell(*column) {
                None | Some(Cell::Null) => false,
                Some(c) => c.compare(low) != Ordering::Less && c.compare(high) != Ordering::Greater,
            },
            Self::Text {
                column,
                op,
                needle,
                case,
            } => match cell(*column) {
                Some(Cell::String(s)) => {
                    let lowered;
                    let hay = match case {
                        Case::Sensitive => s.as_str(),
                        Case::Insensitive => {
                            lowered = s.to_lowercase();
                            lowered.as_str()
                        }
                    };
                    match op {
                        TextOp::Equal => hay == needle,
                        TextOp::Contains => hay.contains(needle.as_str()),
                        TextOp::BeginsWith => hay.starts_with(needle.as_str()),
                        TextOp::EndsWith => hay.ends_with(needle.as_str()),
                    }
                }
                _ => false,
            },
            Self::Null { column, negated } => match cell(*column) {
                None => false,
                Some(c) => c.is_null() != *negated,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableData {
        let mut data = TableData::with_columns(&[
            ColumnSpec::new(ColumnType::Int, "age").nullable(true),
            ColumnSpec::new(ColumnType::String, "name"),
            ColumnSpec::new(ColumnType::Double, "score"),
            ColumnSpec::new(ColumnType::Date, "born"),
        ]);
        data.insert_rows(0, 3);
        let rows = [
            (Some(30), "Alice", 1.5, 1_000),
            (None, "bob", 2.0, 2_000),
            (Some(20), "Carol", 3.0, 3_000),
        ];
        for (i, (age, name, score, born)) in rows.into_iter().enumerate() {
            data.columns[0].cells[i] = age.map_or(Cell::Null, Cell::Int);
            data.columns[1].cells[i] = Cell::String(name.to_owned());
            data.columns[2].cells[i] = Cell::Double(score);
            data.columns[3].cells[i] = Cell::Date(born);
        }
        data
    }

    fn hits(data: &TableData, p: &Predicate) -> Vec<usize> {
        (0..data.rows).filter(|&r| p.matches(data, r)).collect()
    }

    #[test]
    fn null_cells_only_match_not_equal() {
        let data = table();
        let gt = Predicate::compare(&data, 0, CompareOp::Greater, Value::Int(25)).unwrap();
        assert_eq!(hits(&data, &gt), vec![0]);
        let ne = Predicate::compare(&data, 0, CompareOp::NotEqual, Value::Int(30)).unwrap();
        assert_eq!(hits(&data, &ne), vec![1, 2]);
        let null = Predicate::null(&data, 0, false).unwrap();
        assert_eq!(hits(&data, &null), vec![1]);
    }

    #[test]
    fn int_operand_on_double_column() {
        let data = table();
        let p = Predicate::compare(&data, 2, CompareOp::GreaterOrEqual, Value::Int(2)).unwrap();
        assert_eq!(hits(&data, &p), vec![1, 2]);
    }

    #[test]
    fn between_is_inclusive() {
        let data = table();
        let p = Predicate::between(&data, 2, Value::Double(1.5), Value::Double(2.0)).unwrap();
        assert_eq!(hits(&data, &p), vec![0, 1]);
    }

    #[test]
    fn date_equality_truncates_operand() {
        let data = table();
        let p = Predicate::compare(&data, 3, CompareOp::Equal, Value::Date(2_400)).unwrap();
        assert_eq!(hits(&data, &p), vec![1]);
        let p = Predicate::compare(&data, 3, CompareOp::Greater, Value::Date(2_400)).unwrap();
        assert_eq!(hits(&data, &p), vec![2]);
    }

    #[test]
    fn text_case() {
        let data = table();
        let p = Predicate::text(&data, 1, TextOp::BeginsWith, "B", Case::Sensitive).unwrap();
        assert!(hits(&data, &p).is_empty());
        let p = Predicate::text(&data, 1, TextOp::BeginsWith, "B", Case::Insensitive).unwrap();
        assert_eq!(hits(&data, &p), vec![1]);
        let p = Predicate::text(&data, 1, TextOp::Contains, "aro", Case::Sensitive).unwrap();
        assert_eq!(hits(&data, &p), vec![2]);
    }

    #[test]
    fn construction_validates_schema() {
        let data = table();
        assert!(Predicate::compare(&data, 1, CompareOp::Less, Value::from("x")).is_err());
        assert!(Predicate::compare(&data, 0, CompareOp::Equal, Value::from("x")).is_err());
        assert!(Predicate::text(&data, 0, TextOp::Contains, "x", Case::Sensitive).is_err());
        assert!(Predicate::null(&data, 1, false).is_err());
        assert!(Predicate::compare(&data, 9, CompareOp::Equal, Value::Int(1)).is_err());
    }
}

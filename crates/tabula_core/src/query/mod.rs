//! Query builder and executor.
//!
//! A [`Query`] is built with chained calls and runs against the snapshot of
//! the transaction it was created in:
//!
//! ```rust,ignore
//! let adults = people
//!     .where_()?
//!     .greater_than(age, 25)?
//!     .group()?
//!     .begins_with(name, "a", Case::Insensitive)?
//!     .or()?
//!     .is_null(nickname)?
//!     .end_group()?
//!     .find_all()?;
//! ```
//!
//! Conditions are joined with AND unless separated by [`Query::or`]; AND
//! binds tighter. [`Query::not`] negates the next condition or group.

pub(crate) mod aggregate;
mod predicate;

use crate::context::{ArenaTicket, HandleKind};
use crate::error::{CoreError, CoreResult};
use crate::group::{Cell, LogOp, TableData, TablePath};
use crate::handle::{Table, View};
use crate::transaction::SessionState;
use crate::types::Case;
use crate::value::Value;
use predicate::{CompareOp, Predicate, TextOp};
use tracing::debug;

/// Rows a query is limited to, instead of the whole table.
#[derive(Debug, Clone)]
pub(crate) enum Restriction {
    /// The rows of a view, in view order.
    Rows { rows: Vec<usize>, generation: usize },
    /// The targets of a link list, in list order.
    LinkList {
        origin: TablePath,
        column: usize,
        row: usize,
        generation: usize,
    },
}

#[derive(Debug)]
enum Node {
    Leaf(Predicate),
    Group(Expr),
    Not(Box<Node>),
}

impl Node {
    fn matches(&self, data: &TableData, row: usize) -> bool {
        match self {
            Self::Leaf(p) => p.matches(data, row),
            Self::Group(e) => e.matches(data, row),
            Self::Not(n) => !n.matches(data, row),
        }
    }
}

/// OR of AND-terms. An empty expression matches every row.
#[derive(Debug, Default)]
struct Expr {
    terms: Vec<Vec<Node>>,
}

impl Expr {
    fn matches(&self, data: &TableData, row: usize) -> bool {
        self.terms.is_empty()
            || self
                .terms
                .iter()
                .any(|term| term.iter().all(|n| n.matches(data, row)))
    }
}

#[derive(Debug, Default)]
struct Frame {
    expr: Expr,
    negate_next: bool,
    or_pending: bool,
}

impl Frame {
    fn push(&mut self, node: Node) {
        let node = if self.negate_next {
            self.negate_next = false;
            Node::Not(Box::new(node))
        } else {
            node
        };
        if self.or_pending || self.expr.terms.is_empty() {
            self.or_pending = false;
            self.expr.terms.push(Vec::new());
        }
        if let Some(term) = self.expr.terms.last_mut() {
            term.push(node);
        }
    }

    fn is_dangling(&self) -> bool {
        self.negate_next || self.or_pending
    }
}

/// A search over the rows of a table, a view or a link list.
///
/// Goes stale when the snapshot moves or the table schema changes. A query
/// restricted to a view or link list also goes stale with its source.
pub struct Query {
    table: Table,
    restriction: Option<Restriction>,
    frames: Vec<Frame>,
    epoch: u64,
    schema_generation: usize,
    _ticket: ArenaTicket,
}

impl Query {
    pub(crate) fn new(table: Table, restriction: Option<Restriction>, s: &SessionState) -> Self {
        let ticket = table.session().register(HandleKind::Query, s.epoch);
        let schema_generation = s.log.generation(TablePath::root(table.path().key));
        Self {
            table,
            restriction,
            frames: vec![Frame::default()],
            epoch: s.epoch,
            schema_generation,
            _ticket: ticket,
        }
    }

    fn check(&self, s: &SessionState) -> CoreResult<()> {
        self.table.check(s)?;
        s.check_epoch(self.epoch)?;
        s.check_schema(self.table.path().key, self.schema_generation)?;
        match &self.restriction {
            None => Ok(()),
            Some(Restriction::Rows { rows, generation }) => {
                s.check_rows(self.table.path(), *generation, rows.iter().max().copied())
            }
            Some(Restriction::LinkList {
                origin,
                row,
                generation,
                ..
            }) => {
                s.check_rows(*origin, *generation, Some(*row))?;
                s.check_schema(origin.key, *generation)
            }
        }
    }

    fn frame(&mut self) -> &mut Frame {
        // The root frame is never popped.
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn add(mut self, build: impl FnOnce(&TableData) -> CoreResult<Predicate>) -> CoreResult<Self> {
        let predicate = self.table.session().read(|s| {
            self.check(s)?;
            build(s.group()?.table(self.table.path())?)
        })?;
        self.frame().push(Node::Leaf(predicate));
        Ok(self)
    }

    fn compare(self, column: usize, op: CompareOp, value: Value) -> CoreResult<Self> {
        self.add(|data| Predicate::compare(data, column, op, value))
    }

    // === Conditions ===

    /// Cells equal to `value`. Date operands are truncated to whole seconds.
    pub fn equal_to(self, column: usize, value: impl Into<Value>) -> CoreResult<Self> {
        self.compare(column, CompareOp::Equal, value.into())
    }

    /// Cells not equal to `value`. Null cells match.
    pub fn not_equal_to(self, column: usize, value: impl Into<Value>) -> CoreResult<Self> {
        self.compare(column, CompareOp::NotEqual, value.into())
    }

    /// String cells equal to `value` under `case`.
    pub fn equal_to_string(self, column: usize, value: &str, case: Case) -> CoreResult<Self> {
        self.add(|data| Predicate::text(data, column, TextOp::Equal, value, case))
    }

    /// Cells greater than `value`.
    ///
    /// # Errors
    ///
    /// Conditions are checked when added: `IllegalArgument` for an ordered
    /// comparison on a column that has no order, `TypeMismatch` for a
    /// value of the wrong type, `IndexOutOfBounds` for a bad column and
    /// `Stale` for a stale query.
    pub fn greater_than(self, column: usize, value: impl Into<Value>) -> CoreResult<Self> {
        self.compare(column, CompareOp::Greater, value.into())
    }

    /// Cells greater than or equal to `value`.
    pub fn greater_than_or_equal(self, column: usize, value: impl Into<Value>) -> CoreResult<Self> {
        self.compare(column, CompareOp::GreaterOrEqual, value.into())
    }

    /// Cells less than `value`.
    pub fn less_than(self, column: usize, value: impl Into<Value>) -> CoreResult<Self> {
        self.compare(column, CompareOp::Less, value.into())
    }

    /// Cells less than or equal to `value`.
    pub fn less_than_or_equal(self, column: usize, value: impl Into<Value>) -> CoreResult<Self> {
        self.compare(column, CompareOp::LessOrEqual, value.into())
    }

    /// Cells in `[low, high]`.
    pub fn between(
        self,
        column: usize,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> CoreResult<Self> {
        let (low, high) = (low.into(), high.into());
        self.add(|data| Predicate::between(data, column, low, high))
    }

    /// String cells containing `needle` under `case`.
    pub fn contains(self, column: usize, needle: &str, case: Case) -> CoreResult<Self> {
        self.add(|data| Predicate::text(data, column, TextOp::Contains, needle, case))
    }

    /// String cells starting with `prefix`.
    pub fn begins_with(self, column: usize, prefix: &str, case: Case) -> CoreResult<Self> {
        self.add(|data| Predicate::text(data, column, TextOp::BeginsWith, prefix, case))
    }

    /// String cells ending with `suffix`.
    pub fn ends_with(self, column: usize, suffix: &str, case: Case) -> CoreResult<Self> {
        self.add(|data| Predicate::text(data, column, TextOp::EndsWith, suffix, case))
    }

    /// Null cells. The column must be nullable or a link column.
    pub fn is_null(self, column: usize) -> CoreResult<Self> {
        self.add(|data| Predicate::null(data, column, false))
    }

    /// Cells that are not null. Same column rule as [`Query::is_null`].
    pub fn is_not_null(self, column: usize) -> CoreResult<Self> {
        self.add(|data| Predicate::null(data, column, true))
    }

    // === Combinators ===

    /// Opens a parenthesised group.
    pub fn group(mut self) -> CoreResult<Self> {
        self.frames.push(Frame::default());
        Ok(self)
    }

    /// Closes the innermost group.
    pub fn end_group(mut self) -> CoreResult<Self> {
        if self.frames.len() < 2 {
            return Err(CoreError::illegal_state("end_group without a matching group"));
        }
        let frame = self.frames.pop().ok_or_else(|| {
            CoreError::illegal_state("end_group without a matching group")
        })?;
        if frame.is_dangling() {
            return Err(CoreError::illegal_state(
                "group ends with or() or not() and no condition",
            ));
        }
        self.frame().push(Node::Group(frame.expr));
        Ok(self)
    }

    /// Separates alternatives.
    pub fn or(mut self) -> CoreResult<Self> {
        let frame = self.frame();
        if frame.is_dangling() || frame.expr.terms.last().map_or(true, Vec::is_empty) {
            return Err(CoreError::illegal_state("or() must follow a condition"));
        }
        frame.or_pending = true;
        Ok(self)
    }

    /// Negates the next condition or group.
    pub fn not(mut self) -> CoreResult<Self> {
        let frame = self.frame();
        frame.negate_next = !frame.negate_next;
        Ok(self)
    }

    // === Execution ===

    fn expr(&self) -> CoreResult<&Expr> {
        match self.frames.as_slice() {
            [root] if !root.is_dangling() => Ok(&root.expr),
            [_] => Err(CoreError::illegal_state(
                "query ends with or() or not() and no condition",
            )),
            _ => Err(CoreError::illegal_state("query has an unterminated group")),
        }
    }

    /// Candidate rows in evaluation order.
    fn candidates(&self, s: &SessionState, data: &TableData) -> CoreResult<Vec<usize>> {
        match &self.restriction {
            None => Ok((0..data.rows).collect()),
            Some(Restriction::Rows { rows, .. }) => Ok(rows.clone()),
            Some(Restriction::LinkList {
                origin,
                column,
                row,
                ..
            }) => match s.group()?.table(*origin)?.cell(*column, *row)? {
                Cell::LinkList(targets) => Ok(targets.clone()),
                _ => Err(CoreError::illegal_state("link list cell is missing")),
            },
        }
    }

    /// Runs the query; `keep` sees each match and returns false to stop.
    fn run(
        &self,
        s: &SessionState,
        mut keep: impl FnMut(usize) -> bool,
    ) -> CoreResult<()> {
        self.check(s)?;
        let expr = self.expr()?;
        let data = s.group()?.table(self.table.path())?;
        for row in self.candidates(s, data)? {
            if row < data.rows && expr.matches(data, row) && !keep(row) {
                break;
            }
        }
        Ok(())
    }

    fn matches(&self, s: &SessionState) -> CoreResult<Vec<usize>> {
        let mut rows = Vec::new();
        self.run(s, |row| {
            rows.push(row);
            true
        })?;
        Ok(rows)
    }

    /// Index of the first matching row.
    ///
    /// # Errors
    ///
    /// `Stale` if the snapshot moved or the schema changed since the query
    /// was built; `IllegalState` if it ends inside a group or after `or()`
    /// or `not()`.
    pub fn find_first(&self) -> CoreResult<Option<usize>> {
        self.table.session().read(|s| {
            let mut found = None;
            self.run(s, |row| {
                found = Some(row);
                false
            })?;
            Ok(found)
        })
    }

    /// All matching rows as a view.
    pub fn find_all(&self) -> CoreResult<View> {
        self.table.session().read(|s| {
            let rows = self.matches(s)?;
            Ok(View::new(
                self.table.duplicate(s.epoch),
                rows,
                s.epoch,
                s.log.generation(self.table.path()),
            ))
        })
    }

    /// Matching rows whose table index is in `start..end`, at most `limit`.
    ///
    /// `end` of `None` means the end of the table.
    ///
    /// # Errors
    ///
    /// `Stale` if the query no longer matches its snapshot or schema,
    /// checked first; then `IllegalArgument` if `start > end` and
    /// `IndexOutOfBounds` if `end` exceeds the table size.
    pub fn find_all_limited(
        &self,
        start: usize,
        end: Option<usize>,
        limit: Option<usize>,
    ) -> CoreResult<View> {
        self.table.session().read(|s| {
            self.check(s)?;
            let size = s.group()?.table(self.table.path())?.rows;
            let end = end.unwrap_or(size);
            if end > size {
                return Err(CoreError::out_of_bounds("row", end, size));
            }
            if start > end {
                return Err(CoreError::illegal_argument(format!(
                    "start {start} is after end {end}"
                )));
            }
            let limit = limit.unwrap_or(usize::MAX);
            let mut rows = Vec::new();
            if limit > 0 {
                self.run(s, |row| {
                    if (start..end).contains(&row) {
                        rows.push(row);
                    }
                    rows.len() < limit
                })?;
            }
            Ok(View::new(
                self.table.duplicate(s.epoch),
                rows,
                s.epoch,
                s.log.generation(self.table.path()),
            ))
        })
    }

    /// Number of matching rows.
    pub fn count(&self) -> CoreResult<usize> {
        self.table.session().read(|s| {
            let mut n = 0;
            self.run(s, |_| {
                n += 1;
                true
            })?;
            Ok(n)
        })
    }

    /// Removes every matching row from the table. Returns how many went.
    ///
    /// A query over a view keeps working afterwards.
    pub fn remove(&mut self) -> CoreResult<usize> {
        let session = std::sync::Arc::clone(self.table.session());
        let path = self.table.path();
        let (removed, generation) = session.write(|s| {
            s.ensure_writable()?;
            let mut rows = self.matches(s)?;
            rows.sort_unstable_by(|a, b| b.cmp(a));
            rows.dedup();
            for &row in &rows {
                self.table
                    .apply_locked(s, LogOp::RemoveRow { table: path, row })?;
            }
            Ok((rows, s.log.generation(path)))
        })?;
        debug!(rows = removed.len(), "query removed rows");
        if let Some(Restriction::Rows { rows, generation: g }) = &mut self.restriction {
            rows.retain(|r| !removed.contains(r));
            for r in rows.iter_mut() {
                let below = removed.iter().filter(|&&x| x < *r).count();
                *r -= below;
            }
            *g = generation;
        }
        Ok(removed.len())
    }

    // === Aggregates ===

    /// Sum over the matching rows, as [`View::sum_int`].
    ///
    /// Aggregates run the query and aggregate the resulting view, so they
    /// fail like [`Query::find_all`] followed by the view aggregate.
    pub fn sum_int(&self, column: usize) -> CoreResult<i64> {
        self.find_all()?.sum_int(column)
    }

    /// Sum of a float column in double precision.
    pub fn sum_float(&self, column: usize) -> CoreResult<f64> {
        self.find_all()?.sum_float(column)
    }

    /// Sum of a double column.
    pub fn sum_double(&self, column: usize) -> CoreResult<f64> {
        self.find_all()?.sum_double(column)
    }

    /// Smallest matching value.
    pub fn min_int(&self, column: usize) -> CoreResult<Option<i64>> {
        self.find_all()?.min_int(column)
    }

    /// Largest matching value.
    pub fn max_int(&self, column: usize) -> CoreResult<Option<i64>> {
        self.find_all()?.max_int(column)
    }

    /// Mean of the matching values.
    pub fn average_int(&self, column: usize) -> CoreResult<Option<f64>> {
        self.find_all()?.average_int(column)
    }

    /// Smallest matching float.
    pub fn min_float(&self, column: usize) -> CoreResult<Option<f32>> {
        self.find_all()?.min_float(column)
    }

    /// Largest matching float.
    pub fn max_float(&self, column: usize) -> CoreResult<Option<f32>> {
        self.find_all()?.max_float(column)
    }

    /// Mean of the matching floats.
    pub fn average_float(&self, column: usize) -> CoreResult<Option<f64>> {
        self.find_all()?.average_float(column)
    }

    /// Smallest matching double.
    pub fn min_double(&self, column: usize) -> CoreResult<Option<f64>> {
        self.find_all()?.min_double(column)
    }

    /// Largest matching double.
    pub fn max_double(&self, column: usize) -> CoreResult<Option<f64>> {
        self.find_all()?.max_double(column)
    }

    /// Mean of the matching doubles.
    pub fn average_double(&self, column: usize) -> CoreResult<Option<f64>> {
        self.find_all()?.average_double(column)
    }

    /// Earliest matching date.
    pub fn min_date(&self, column: usize) -> CoreResult<Option<i64>> {
        self.find_all()?.min_date(column)
    }

    /// Latest matching date.
    pub fn max_date(&self, column: usize) -> CoreResult<Option<i64>> {
        self.find_all()?.max_date(column)
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("table", &self.table)
            .field("restriction", &self.restriction)
            .field("depth", &(self.frames.len() - 1))
            .finish()
    }
}

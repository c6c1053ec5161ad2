//! [`CrossProductOp`] and [`NlJoinOp`]: nested-loop join operators. For each
//! left tuple, the right child is replayed from the start; there is no
//! materialize-once optimization here, and [`NlJoinOp`] supports exactly
//! one join condition rather than an arbitrary predicate tree.

use buffer::BufferPool;
use common::{DbError, DbResult, QlStatus, Row};
use types::CompOp;

use crate::{eval_condition, pad, AttrInfo, Condition, OpState, Operator, Rhs};

fn concat_schema(left: &[AttrInfo], right: &[AttrInfo]) -> Vec<AttrInfo> {
    left.iter().chain(right.iter()).cloned().collect()
}

fn combine(left: &Row, right: &Row) -> Row {
    let mut values = left.values.clone();
    values.extend(right.values.iter().cloned());
    Row::new(values)
}

/// Unconditional nested-loop Cartesian product of `left` and `right`.
pub struct CrossProductOp {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    schema: Vec<AttrInfo>,
    state: OpState,
    current_left: Option<Row>,
    right_open: bool,
}

impl CrossProductOp {
    pub fn new(left: Box<dyn Operator>, right: Box<dyn Operator>) -> Self {
        let schema = concat_schema(left.schema(), right.schema());
        Self {
            left,
            right,
            schema,
            state: OpState::default(),
            current_left: None,
            right_open: false,
        }
    }

    /// Shared by [`CrossProductOp`] and [`NlJoinOp`]: pull the next
    /// `(left, right)` pair, replaying `right` from scratch whenever `left`
    /// advances.
    fn next_pair(&mut self, pool: &mut BufferPool) -> DbResult<(Row, Row)> {
        loop {
            if self.current_left.is_none() {
                match self.left.next(pool) {
                    Ok(row) => {
                        self.current_left = Some(row);
                        self.right.open(pool)?;
                        self.right_open = true;
                    }
                    Err(e) => return Err(e),
                }
            }
            match self.right.next(pool) {
                Ok(rrow) => {
                    let lrow = self.current_left.as_ref().expect("set above").clone();
                    return Ok((lrow, rrow));
                }
                Err(DbError::Ql(QlStatus::Eof)) => {
                    self.right.close(pool)?;
                    self.right_open = false;
                    self.current_left = None;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Operator for CrossProductOp {
    fn open(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        self.state.begin_open()?;
        self.left.open(pool)?;
        self.current_left = None;
        self.right_open = false;
        Ok(())
    }

    fn next(&mut self, pool: &mut BufferPool) -> DbResult<Row> {
        self.state.require_open()?;
        let (lrow, rrow) = self.next_pair(pool)?;
        Ok(combine(&lrow, &rrow))
    }

    fn close(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        if self.state.begin_close() {
            if self.right_open {
                self.right.close(pool)?;
            }
            self.left.close(pool)?;
        }
        Ok(())
    }

    fn schema(&self) -> &[AttrInfo] {
        &self.schema
    }

    fn print(&self, indent: usize) -> String {
        format!(
            "{}CrossProduct\n{}\n{}",
            pad(indent),
            self.left.print(indent + 1),
            self.right.print(indent + 1)
        )
    }
}

/// A single equality/inequality condition between an attribute of `left`
/// and an attribute of `right`. Distinct from [`Condition`] because its two
/// sides deliberately span different relations; the "attr-attr conditions
/// must share a relation" rule that [`crate::validate_condition`] enforces
/// applies to DML conditions, not joins.
#[derive(Clone, Debug)]
pub struct JoinCondition {
    pub left_attr: String,
    pub op: CompOp,
    pub right_attr: String,
}

/// Nested-loop join with one join condition. Built on the same
/// replay-the-right-child loop as [`CrossProductOp`], with non-matching
/// pairs filtered out before being combined.
pub struct NlJoinOp {
    inner: CrossProductOp,
    condition: Condition,
}

impl NlJoinOp {
    pub fn new(left: Box<dyn Operator>, right: Box<dyn Operator>, condition: JoinCondition) -> Self {
        let inner = CrossProductOp::new(left, right);
        // Re-expressed as a `Condition` so evaluation can share
        // `eval_condition`'s resolution over the concatenated schema; the
        // left-hand side always names a left-child attribute, which
        // `resolve_attr` finds unambiguously as long as left/right don't
        // share a column name (qualify with `rel.attr` when they do).
        let condition = Condition {
            attr: condition.left_attr,
            op: condition.op,
            rhs: Rhs::Attr(condition.right_attr),
        };
        Self { inner, condition }
    }
}

impl Operator for NlJoinOp {
    fn open(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        self.inner.open(pool)
    }

    fn next(&mut self, pool: &mut BufferPool) -> DbResult<Row> {
        loop {
            let (lrow, rrow) = self.inner.next_pair(pool)?;
            let row = combine(&lrow, &rrow);
            if eval_condition(&self.condition, &self.inner.schema, &row.values)? {
                return Ok(row);
            }
        }
    }

    fn close(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        self.inner.close(pool)
    }

    fn schema(&self) -> &[AttrInfo] {
        &self.inner.schema
    }

    fn print(&self, indent: usize) -> String {
        format!(
            "{}NLJoin({} {:?} {})\n{}\n{}",
            pad(indent),
            self.condition.attr,
            self.condition.op,
            match &self.condition.rhs {
                Rhs::Attr(a) => a.clone(),
                Rhs::Value(_) => unreachable!("join condition RHS is always an attribute"),
            },
            self.inner.left.print(indent + 1),
            self.inner.right.print(indent + 1)
        )
    }
}

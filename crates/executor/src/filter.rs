//! [`FilterOp`]: evaluates one [`Condition`] per tuple, dropping non-matches.

use buffer::BufferPool;
use common::{DbResult, Row};

use crate::{eval_condition, pad, AttrInfo, Condition, OpState, Operator};

/// Wraps a child operator, evaluating one comparison (`attr op value` or
/// `attr op attr`) per tuple and passing through only the matches.
pub struct FilterOp {
    child: Box<dyn Operator>,
    condition: Condition,
    state: OpState,
}

impl FilterOp {
    pub fn new(child: Box<dyn Operator>, condition: Condition) -> Self {
        Self { child, condition, state: OpState::default() }
    }
}

impl Operator for FilterOp {
    fn open(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        self.state.begin_open()?;
        self.child.open(pool)
    }

    fn next(&mut self, pool: &mut BufferPool) -> DbResult<Row> {
        self.state.require_open()?;
        loop {
            let row = self.child.next(pool)?;
            if eval_condition(&self.condition, self.child.schema(), &row.values)? {
                return Ok(row);
            }
        }
    }

    fn close(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        if self.state.begin_close() {
            self.child.close(pool)?;
        }
        Ok(())
    }

    fn schema(&self) -> &[AttrInfo] {
        self.child.schema()
    }

    fn print(&self, indent: usize) -> String {
        format!(
            "{}Filter({})\n{}",
            pad(indent),
            self.condition.attr,
            self.child.print(indent + 1)
        )
    }
}

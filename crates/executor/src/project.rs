//! [`ProjectOp`]: re-packs tuples to a narrowed schema, recomputing offsets.
//! Unlike every other operator, which concatenates its inputs' schemas
//! without deduplication, this is the one place the output schema is
//! deliberately narrower than the input's.

use buffer::BufferPool;
use common::{DbResult, Row};

use crate::{pad, resolve_attr, AttrInfo, OpState, Operator};

pub struct ProjectOp {
    child: Box<dyn Operator>,
    indices: Vec<usize>,
    schema: Vec<AttrInfo>,
    state: OpState,
}

impl ProjectOp {
    /// `attrs` are resolved against the child's schema at construction time
    /// (bare names or `rel.attr`), so a typo fails before `open` rather than
    /// mid-scan.
    pub fn new(child: Box<dyn Operator>, attrs: &[String]) -> DbResult<Self> {
        let child_schema = child.schema();
        let mut indices = Vec::with_capacity(attrs.len());
        let mut schema = Vec::with_capacity(attrs.len());
        for spec in attrs {
            let idx = resolve_attr(child_schema, spec)?;
            indices.push(idx);
            schema.push(child_schema[idx].clone());
        }
        Ok(Self { child, indices, schema, state: OpState::default() })
    }
}

impl Operator for ProjectOp {
    fn open(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        self.state.begin_open()?;
        self.child.open(pool)
    }

    fn next(&mut self, pool: &mut BufferPool) -> DbResult<Row> {
        self.state.require_open()?;
        let row = self.child.next(pool)?;
        let rid = row.rid();
        let values = self.indices.iter().map(|&i| row.values[i].clone()).collect();
        let mut out = Row::new(values);
        if let Some(rid) = rid {
            out.set_rid(Some(rid));
        }
        Ok(out)
    }

    fn close(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        if self.state.begin_close() {
            self.child.close(pool)?;
        }
        Ok(())
    }

    fn schema(&self) -> &[AttrInfo] {
        &self.schema
    }

    fn print(&self, indent: usize) -> String {
        let names: Vec<&str> = self.schema.iter().map(|a| a.name.as_str()).collect();
        format!(
            "{}Project({})\n{}",
            pad(indent),
            names.join(", "),
            self.child.print(indent + 1)
        )
    }
}

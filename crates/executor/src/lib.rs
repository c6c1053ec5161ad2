//! Query pipeline (QL): physical operators composed into a tree, plus the
//! DML executors that drive a scan and maintain every index on the touched
//! relation.
//!
//! Every operator implements the uniform `open`/`next`/`close` contract in
//! [`Operator`]. `next` returns one [`common::Row`] tagged with the
//! `RecordId` it came from wherever that's known (scan leaves always know
//! it; derived rows from a join or projection carry whichever side's RID
//! survives, or none). Calling `next` on a closed operator, or `open` on an
//! operator that's already open, is an error rather than silently
//! re-initializing — see [`OpState`].


pub mod dml;
pub mod filter;
pub mod join;
pub mod project;
pub mod scan;

pub use dml::{DeleteExecutor, InsertExecutor, UpdateExecutor};
pub use filter::FilterOp;
pub use join::{CrossProductOp, NlJoinOp};
pub use project::ProjectOp;
pub use scan::{FileScanOp, IndexScanOp};

use buffer::BufferPool;
use catalog::TableSchema;
use common::{DbResult, QlStatus, Row};
use types::{AttrType, CompOp, Value};

/// One column of an operator's output schema, qualified by the relation it
/// came from so joins and filters can resolve `rel.attr` as well as a bare
/// `attr` when it's unambiguous.
#[derive(Clone, Debug, PartialEq)]
pub struct AttrInfo {
    pub rel: String,
    pub name: String,
    pub attr_type: AttrType,
}

impl AttrInfo {
    pub fn new(rel: impl Into<String>, name: impl Into<String>, attr_type: AttrType) -> Self {
        Self { rel: rel.into(), name: name.into(), attr_type }
    }
}

/// Build the output schema for a scan leaf over one relation.
pub fn schema_of(schema: &TableSchema) -> Vec<AttrInfo> {
    schema
        .attrs
        .iter()
        .map(|a| AttrInfo::new(schema.name.clone(), a.name.clone(), a.attr_type))
        .collect()
}

/// Resolve `spec` (a bare attribute name, or `rel.attr`) against an
/// operator's output schema. A bare name must be unambiguous; `rel.attr`
/// disambiguates across a join's concatenated schema.
pub fn resolve_attr(schema: &[AttrInfo], spec: &str) -> DbResult<usize> {
    if let Some((rel, attr)) = spec.split_once('.') {
        return schema
            .iter()
            .position(|a| a.rel == rel && a.name == attr)
            .ok_or_else(|| QlStatus::AttributeNotFound(rel.into(), attr.into()).into());
    }
    let mut found = None;
    for (i, a) in schema.iter().enumerate() {
        if a.name == spec {
            if found.is_some() {
                return Err(QlStatus::InvalidCondition(format!(
                    "attribute {spec:?} is ambiguous across the joined schema"
                ))
                .into());
            }
            found = Some(i);
        }
    }
    found.ok_or_else(|| QlStatus::AttributeNotFound("<joined>".into(), spec.into()).into())
}

/// A single-attribute predicate pushed down into a scan: `attr op value`.
/// Used by [`FileScanOp`]/[`IndexScanOp`] and by the DML executors when they
/// pick a scan strategy (a "conditional file scan" over one pushed-down
/// attribute).
#[derive(Clone, Debug)]
pub struct ScanPredicate {
    pub attr: String,
    pub op: CompOp,
    pub value: Value,
}

/// The right-hand side of a [`Condition`]: a literal, or another attribute
/// of the same relation.
#[derive(Clone, Debug)]
pub enum Rhs {
    Value(Value),
    Attr(String),
}

/// A single comparison — `attr op value` or `attr op attr` — as accepted by
/// [`FilterOp`] and the DML executors' condition lists. Unlike
/// [`ScanPredicate`], the left- and right-hand attributes here may resolve
/// against a joined (multi-relation) schema; [`validate_condition`] restricts
/// an attr-attr condition to a single named relation for DML use.
#[derive(Clone, Debug)]
pub struct Condition {
    pub attr: String,
    pub op: CompOp,
    pub rhs: Rhs,
}

/// Validate one DML condition against a single named relation's schema: the
/// LHS must resolve, an attr-attr RHS must resolve against the *same*
/// relation, and both sides' types must match. Fails with a `QlStatus`
/// error before any I/O, never partway through.
pub fn validate_condition(schema: &TableSchema, cond: &Condition) -> DbResult<()> {
    let lhs = schema
        .attr(&cond.attr)
        .map_err(|_| QlStatus::AttributeNotFound(schema.name.clone(), cond.attr.clone()))?;
    match &cond.rhs {
        Rhs::Value(v) => {
            if !v.matches(&lhs.attr_type) {
                return Err(QlStatus::IncorrectAttributeType(cond.attr.clone()).into());
            }
        }
        Rhs::Attr(name) => {
            let rhs = schema
                .attr(name)
                .map_err(|_| QlStatus::AttributeNotFound(schema.name.clone(), name.clone()))?;
            if !attr_types_match(&lhs.attr_type, &rhs.attr_type) {
                return Err(QlStatus::IncorrectAttributeType(cond.attr.clone()).into());
            }
        }
    }
    Ok(())
}

pub(crate) fn attr_types_match(a: &AttrType, b: &AttrType) -> bool {
    match (a, b) {
        (AttrType::Int, AttrType::Int) | (AttrType::Float, AttrType::Float) => true,
        (AttrType::Str(n), AttrType::Str(m)) => n == m,
        _ => false,
    }
}

/// Evaluate one [`Condition`] against a fully materialized row, resolving
/// both sides against `schema` (which may span more than one relation, for
/// [`FilterOp`] sitting above a join). A `Value::Null` right-hand side never
/// participates — the condition is treated as trivially satisfied, the same
/// as [`CompOp::NoOp`].
pub fn eval_condition(cond: &Condition, schema: &[AttrInfo], values: &[Value]) -> DbResult<bool> {
    let lhs_idx = resolve_attr(schema, &cond.attr)?;
    let rhs_value = match &cond.rhs {
        Rhs::Value(v) => v.clone(),
        Rhs::Attr(name) => {
            let idx = resolve_attr(schema, name)?;
            values[idx].clone()
        }
    };
    if matches!(rhs_value, Value::Null) {
        return Ok(true);
    }
    Ok(match values[lhs_idx].compare(&rhs_value) {
        Some(ordering) => cond.op.holds(ordering),
        None => false,
    })
}

/// The uniform physical-operator contract every concrete operator below
/// follows: acquire its lower-layer handles in `open`, yield tuples from
/// `next`, and release everything in `close`. `next`
/// returns `QlStatus::Eof` once exhausted; calling it again after EOF keeps
/// returning EOF rather than panicking or restarting.
pub trait Operator {
    fn open(&mut self, pool: &mut BufferPool) -> DbResult<()>;
    fn next(&mut self, pool: &mut BufferPool) -> DbResult<Row>;
    fn close(&mut self, pool: &mut BufferPool) -> DbResult<()>;
    fn schema(&self) -> &[AttrInfo];
    fn print(&self, indent: usize) -> String;
}

pub(crate) fn pad(indent: usize) -> String {
    "  ".repeat(indent)
}

/// Shared open/closed bookkeeping every concrete operator below embeds,
/// turning "open while open" / "next while closed" into a `QlStatus` error
/// instead of undefined behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum OpState {
    #[default]
    Unopened,
    Open,
    Closed,
}

impl OpState {
    pub(crate) fn begin_open(&mut self) -> DbResult<()> {
        if *self == OpState::Open {
            return Err(QlStatus::OperatorOpen.into());
        }
        *self = OpState::Open;
        Ok(())
    }

    pub(crate) fn require_open(&self) -> DbResult<()> {
        match self {
            OpState::Open => Ok(()),
            _ => Err(QlStatus::OperatorClosed.into()),
        }
    }

    /// Transition to `Closed`, reporting whether it actually was open
    /// (idempotent on an already-closed operator).
    pub(crate) fn begin_close(&mut self) -> bool {
        let was_open = *self == OpState::Open;
        *self = OpState::Closed;
        was_open
    }
}

//! Scan leaves: [`FileScanOp`] drives an RM file scan directly;
//! [`IndexScanOp`] drives a B+-tree scan and translates each RID it yields
//! back into a full tuple through the relation's RM file.

use std::path::PathBuf;

use buffer::BufferPool;
use catalog::{decode_row, TableSchema};
use common::{DbError, DbResult, IxStatus, QlStatus, RmStatus, Row};
use types::{AttrType, CompOp, Value};

use crate::{pad, schema_of, AttrInfo, OpState, Operator, ScanPredicate};

fn resolve_predicate(schema: &TableSchema, predicate: &ScanPredicate) -> DbResult<storage::ScanCondition> {
    let attr = schema.attr(&predicate.attr)?;
    if !predicate.value.matches(&attr.attr_type) {
        return Err(QlStatus::IncorrectAttributeType(predicate.attr.clone()).into());
    }
    Ok(storage::ScanCondition {
        attr_type: attr.attr_type,
        offset: attr.offset,
        op: predicate.op,
        value: predicate.value.clone(),
    })
}

/// A full (optionally predicated) scan of one relation's RM file, in
/// storage order, optionally pushing down one predicate of the form
/// `attr op value` to the underlying RM scan.
pub struct FileScanOp {
    rel_name: String,
    path: PathBuf,
    attr_types: Vec<AttrType>,
    schema: Vec<AttrInfo>,
    condition: Option<storage::ScanCondition>,
    predicate_desc: Option<String>,
    state: OpState,
    handle: Option<storage::RmFileHandle>,
    cursor: Option<storage::RmFileScan>,
}

impl FileScanOp {
    pub fn new(schema: &TableSchema, path: PathBuf, predicate: Option<ScanPredicate>) -> DbResult<Self> {
        let condition = predicate
            .as_ref()
            .map(|p| resolve_predicate(schema, p))
            .transpose()?;
        let predicate_desc = predicate.map(|p| format!("{} {:?} {:?}", p.attr, p.op, p.value));
        Ok(Self {
            rel_name: schema.name.clone(),
            path,
            attr_types: schema.attr_types(),
            schema: schema_of(schema),
            condition,
            predicate_desc,
            state: OpState::default(),
            handle: None,
            cursor: None,
        })
    }
}

impl Operator for FileScanOp {
    fn open(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        self.state.begin_open()?;
        let handle = storage::RmFileHandle::open(pool, &self.path)?;
        self.cursor = Some(handle.scan(self.condition.clone(), false));
        self.handle = Some(handle);
        Ok(())
    }

    fn next(&mut self, pool: &mut BufferPool) -> DbResult<Row> {
        self.state.require_open()?;
        let cursor = self.cursor.as_mut().expect("open() set the cursor");
        match cursor.next(pool) {
            Ok((rid, bytes)) => {
                let values = decode_row(&self.attr_types, &bytes)?;
                Ok(Row::new(values).with_rid(rid))
            }
            Err(DbError::Rm(RmStatus::Eof)) => Err(QlStatus::Eof.into()),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        if self.state.begin_close() {
            if let Some(mut cursor) = self.cursor.take() {
                cursor.close(pool)?;
            }
            if let Some(handle) = self.handle.take() {
                handle.close(pool)?;
            }
        }
        Ok(())
    }

    fn schema(&self) -> &[AttrInfo] {
        &self.schema
    }

    fn print(&self, indent: usize) -> String {
        match &self.predicate_desc {
            Some(p) => format!("{}FileScan({}) where {p}", pad(indent), self.rel_name),
            None => format!("{}FileScan({})", pad(indent), self.rel_name),
        }
    }
}

/// An index-driven scan of one attribute: opens the attribute's B+-tree,
/// then translates each `(key, rid)` pair the tree yields back into a full
/// tuple via the relation's RM file.
pub struct IndexScanOp {
    rel_name: String,
    attr_name: String,
    rel_path: PathBuf,
    index_path: PathBuf,
    op: CompOp,
    value: Value,
    attr_types: Vec<AttrType>,
    schema: Vec<AttrInfo>,
    state: OpState,
    rel_handle: Option<storage::RmFileHandle>,
    ix_handle: Option<btree::IxFileHandle>,
    cursor: Option<btree::IxScan>,
}

impl IndexScanOp {
    pub fn new(
        schema: &TableSchema,
        rel_path: PathBuf,
        index_path: PathBuf,
        attr_name: impl Into<String>,
        op: CompOp,
        value: Value,
    ) -> DbResult<Self> {
        let attr_name = attr_name.into();
        let attr = schema.attr(&attr_name)?;
        if !value.matches(&attr.attr_type) && !matches!(op, CompOp::NoOp) {
            return Err(QlStatus::IncorrectAttributeType(attr_name).into());
        }
        Ok(Self {
            rel_name: schema.name.clone(),
            attr_name,
            rel_path,
            index_path,
            op,
            value,
            attr_types: schema.attr_types(),
            schema: schema_of(schema),
            state: OpState::default(),
            rel_handle: None,
            ix_handle: None,
            cursor: None,
        })
    }
}

impl Operator for IndexScanOp {
    fn open(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        self.state.begin_open()?;
        let rel_handle = storage::RmFileHandle::open(pool, &self.rel_path)?;
        let ix_handle = btree::IxFileHandle::open(pool, &self.index_path)?;
        self.cursor = Some(ix_handle.scan(self.op, self.value.clone()));
        self.rel_handle = Some(rel_handle);
        self.ix_handle = Some(ix_handle);
        Ok(())
    }

    fn next(&mut self, pool: &mut BufferPool) -> DbResult<Row> {
        self.state.require_open()?;
        let cursor = self.cursor.as_mut().expect("open() set the cursor");
        let rel_handle = self.rel_handle.expect("open() set the relation handle");
        loop {
            match cursor.next(pool) {
                Ok((_, rid)) => {
                    let bytes = rel_handle.get_record(pool, rid)?;
                    let values = decode_row(&self.attr_types, &bytes)?;
                    return Ok(Row::new(values).with_rid(rid));
                }
                Err(DbError::Ix(IxStatus::Eof)) => return Err(QlStatus::Eof.into()),
                Err(e) => return Err(e),
            }
        }
    }

    fn close(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        if self.state.begin_close() {
            if let Some(mut cursor) = self.cursor.take() {
                cursor.close();
            }
            if let Some(handle) = self.ix_handle.take() {
                handle.close(pool)?;
            }
            if let Some(handle) = self.rel_handle.take() {
                handle.close(pool)?;
            }
        }
        Ok(())
    }

    fn schema(&self) -> &[AttrInfo] {
        &self.schema
    }

    fn print(&self, indent: usize) -> String {
        format!(
            "{}IndexScan({}.{} {:?} {:?})",
            pad(indent),
            self.rel_name,
            self.attr_name,
            self.op,
            self.value
        )
    }
}

//! [`InsertExecutor`], [`DeleteExecutor`], [`UpdateExecutor`]: the DML
//! entry points. Unlike the read-only operators in [`crate::scan`],
//! [`crate::filter`], [`crate::join`] and [`crate::project`], these drive
//! the relation's RM file and every index on it directly rather than
//! composing through the `Operator` tree, so a single RID touches RM and
//! every affected index exactly once per call.

use std::collections::HashMap;

use buffer::BufferPool;
use catalog::{decode_row, encode_row, SystemManager, TableSchema};
use common::{DbError, DbResult, IxStatus, QlStatus, RecordId, RmStatus, SmStatus};
use types::Value;

use crate::{attr_types_match, eval_condition, schema_of, Condition, Rhs};

fn open_indexes(pool: &mut BufferPool, catalog: &SystemManager, schema: &TableSchema) -> DbResult<HashMap<u32, btree::IxFileHandle>> {
    let mut out = HashMap::new();
    for attr in &schema.attrs {
        if let Some(idx) = attr.index_no {
            let handle = btree::IxFileHandle::open(pool, &catalog.index_path(&schema.name, idx))?;
            out.insert(idx, handle);
        }
    }
    Ok(out)
}

fn close_indexes(pool: &mut BufferPool, indexes: HashMap<u32, btree::IxFileHandle>) -> DbResult<()> {
    for (_, handle) in indexes {
        handle.close(pool)?;
    }
    Ok(())
}

fn check_arity_and_types(schema: &TableSchema, values: &[Value]) -> DbResult<()> {
    if values.len() != schema.attrs.len() {
        return Err(SmStatus::AttributeNotFound(
            schema.name.clone(),
            format!("expected {} values, got {}", schema.attrs.len(), values.len()),
        )
        .into());
    }
    for (v, attr) in values.iter().zip(&schema.attrs) {
        if !v.matches(&attr.attr_type) {
            return Err(QlStatus::IncorrectAttributeType(attr.name.clone()).into());
        }
    }
    Ok(())
}

/// Inserts one tuple: validates arity and per-attribute types against the
/// relation's schema, appends the encoded row to RM, then inserts one entry
/// per indexed attribute.
pub struct InsertExecutor;

impl InsertExecutor {
    pub fn execute(pool: &mut BufferPool, catalog: &SystemManager, rel: &str, values: &[Value]) -> DbResult<RecordId> {
        let schema = catalog.table(rel)?.clone();
        check_arity_and_types(&schema, values)?;
        let bytes = encode_row(&schema.attr_types(), values)?;

        let rel_file = storage::RmFileHandle::open(pool, &catalog.relation_path(rel))?;
        let rid = rel_file.insert_record(pool, &bytes)?;

        let mut indexes = open_indexes(pool, catalog, &schema)?;
        for (i, attr) in schema.attrs.iter().enumerate() {
            if let Some(idx) = attr.index_no {
                indexes.get_mut(&idx).expect("opened above").insert_entry(pool, &values[i], rid)?;
            }
        }
        close_indexes(pool, indexes)?;
        rel_file.close(pool)?;
        log::debug!("inserted into {rel}: {rid:?}");
        Ok(rid)
    }
}

/// Which RM/IX scan drives a conditional DML pass. Chosen once up front,
/// then walked to completion while deletes/updates happen behind the
/// cursor — safe because `storage::RmFileScan` only ever walks forward, and
/// `btree::IxScan` re-derives its position from the last key/rid it
/// returned rather than caching a slot index.
enum CandidateScan {
    Index(btree::IxScan),
    File(storage::RmFileScan),
    Full(storage::RmFileScan),
}

impl CandidateScan {
    fn choose(
        schema: &TableSchema,
        conditions: &[Condition],
        rel_file: &storage::RmFileHandle,
        indexes: &HashMap<u32, btree::IxFileHandle>,
    ) -> DbResult<Self> {
        for cond in conditions {
            if let Rhs::Value(v) = &cond.rhs {
                let attr = schema.attr(&cond.attr)?;
                if let Some(idx) = attr.index_no {
                    let handle = indexes.get(&idx).expect("every indexed attribute was opened");
                    return Ok(CandidateScan::Index(handle.scan(cond.op, v.clone())));
                }
            }
        }
        for cond in conditions {
            if let Rhs::Value(v) = &cond.rhs {
                let attr = schema.attr(&cond.attr)?;
                let pushed = storage::ScanCondition { attr_type: attr.attr_type, offset: attr.offset, op: cond.op, value: v.clone() };
                return Ok(CandidateScan::File(rel_file.scan(Some(pushed), false)));
            }
        }
        Ok(CandidateScan::Full(rel_file.scan(None, false)))
    }

    fn next(&mut self, pool: &mut BufferPool) -> DbResult<Option<RecordId>> {
        match self {
            CandidateScan::Index(cursor) => match cursor.next(pool) {
                Ok((_, rid)) => Ok(Some(rid)),
                Err(DbError::Ix(IxStatus::Eof)) => Ok(None),
                Err(e) => Err(e),
            },
            CandidateScan::File(cursor) | CandidateScan::Full(cursor) => match cursor.next(pool) {
                Ok((rid, _)) => Ok(Some(rid)),
                Err(DbError::Rm(RmStatus::Eof)) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    fn close(self, pool: &mut BufferPool) {
        match self {
            CandidateScan::Index(mut cursor) => cursor.close(),
            CandidateScan::File(mut cursor) | CandidateScan::Full(mut cursor) => {
                let _ = cursor.close(pool);
            }
        }
    }
}

/// Deletes every tuple matching all of `conditions`. Picks an index scan if
/// any `attr op value` condition names an indexed attribute, otherwise a
/// conditional file scan on the first such condition, otherwise a full
/// scan; every candidate RID is still re-checked against the full
/// condition list before anything is deleted, since the chosen scan only
/// guarantees one of the conditions holds.
pub struct DeleteExecutor;

impl DeleteExecutor {
    pub fn execute(pool: &mut BufferPool, catalog: &SystemManager, rel: &str, conditions: &[Condition]) -> DbResult<usize> {
        let schema = catalog.table(rel)?.clone();
        for cond in conditions {
            crate::validate_condition(&schema, cond)?;
        }
        let attr_types = schema.attr_types();
        let op_schema = schema_of(&schema);

        let rel_file = storage::RmFileHandle::open(pool, &catalog.relation_path(rel))?;
        let mut indexes = open_indexes(pool, catalog, &schema)?;

        let mut scan = CandidateScan::choose(&schema, conditions, &rel_file, &indexes)?;
        let mut deleted = 0usize;
        loop {
            let rid = match scan.next(pool)? {
                Some(rid) => rid,
                None => break,
            };
            let bytes = rel_file.get_record(pool, rid)?;
            let values = decode_row(&attr_types, &bytes)?;
            let matches = conditions.iter().all(|c| eval_condition(c, &op_schema, &values).unwrap_or(false));
            if !matches {
                continue;
            }
            rel_file.delete_record(pool, rid)?;
            for (i, attr) in schema.attrs.iter().enumerate() {
                if let Some(idx) = attr.index_no {
                    indexes.get_mut(&idx).expect("opened above").delete_entry(pool, &values[i], rid)?;
                }
            }
            deleted += 1;
        }
        scan.close(pool);
        close_indexes(pool, indexes)?;
        rel_file.close(pool)?;
        log::info!("deleted {deleted} row(s) from {rel}");
        Ok(deleted)
    }
}

/// Updates one attribute of every tuple matching all of `conditions`, to
/// either a literal or a copy of another same-relation attribute of equal
/// width. Only the updated attribute's own index entry (if any) is
/// touched — every other index on the relation is left alone.
pub struct UpdateExecutor;

impl UpdateExecutor {
    pub fn execute(
        pool: &mut BufferPool,
        catalog: &SystemManager,
        rel: &str,
        target_attr: &str,
        rhs: Rhs,
        conditions: &[Condition],
    ) -> DbResult<usize> {
        let schema = catalog.table(rel)?.clone();
        for cond in conditions {
            crate::validate_condition(&schema, cond)?;
        }
        let target_idx = schema.attr_index(target_attr)?;
        let target_type = schema.attrs[target_idx].attr_type;
        match &rhs {
            Rhs::Value(v) => {
                if !v.matches(&target_type) {
                    return Err(QlStatus::IncorrectAttributeType(target_attr.into()).into());
                }
            }
            Rhs::Attr(name) => {
                let source = schema.attr(name)?;
                if !attr_types_match(&target_type, &source.attr_type) {
                    return Err(QlStatus::IncorrectAttributeType(target_attr.into()).into());
                }
            }
        }

        let attr_types = schema.attr_types();
        let op_schema = schema_of(&schema);

        let rel_file = storage::RmFileHandle::open(pool, &catalog.relation_path(rel))?;
        let mut indexes = open_indexes(pool, catalog, &schema)?;

        let mut scan = CandidateScan::choose(&schema, conditions, &rel_file, &indexes)?;
        let mut updated = 0usize;
        loop {
            let rid = match scan.next(pool)? {
                Some(rid) => rid,
                None => break,
            };
            let bytes = rel_file.get_record(pool, rid)?;
            let mut values = decode_row(&attr_types, &bytes)?;
            let matches = conditions.iter().all(|c| eval_condition(c, &op_schema, &values).unwrap_or(false));
            if !matches {
                continue;
            }
            let new_value = match &rhs {
                Rhs::Value(v) => v.clone(),
                Rhs::Attr(name) => values[schema.attr_index(name)?].clone(),
            };
            if let Some(idx) = schema.attrs[target_idx].index_no {
                indexes.get_mut(&idx).expect("opened above").delete_entry(pool, &values[target_idx], rid)?;
            }
            values[target_idx] = new_value.clone();
            let new_bytes = encode_row(&attr_types, &values)?;
            rel_file.update_record(pool, rid, &new_bytes)?;
            if let Some(idx) = schema.attrs[target_idx].index_no {
                indexes.get_mut(&idx).expect("opened above").insert_entry(pool, &new_value, rid)?;
            }
            updated += 1;
        }
        scan.close(pool);
        close_indexes(pool, indexes)?;
        rel_file.close(pool)?;
        log::info!("updated {updated} row(s) in {rel}.{target_attr}");
        Ok(updated)
    }
}

//! System manager (SM): the catalog of relations and indexes.
//!
//! `relcat` and `attrcat` are ordinary [`storage::RmFileHandle`] files that
//! describe every relation, including themselves — the catalog bootstraps by
//! writing its own two rows into itself. An in-memory cache mirrors both
//! files after every mutation so that schema
//! lookups during query execution don't re-scan the catalog on every call.


use std::path::{Path, PathBuf};

use buffer::BufferPool;
use common::{DbError, DbResult, MAX_ATTRS, MAX_NAME, RecordBatch, RecordId, RmStatus, Row, SmStatus};
use hashbrown::HashMap;
use storage::{RmFileHandle, ScanCondition};
use types::{AttrType, CompOp, Value};

fn relcat_schema() -> [AttrType; 4] {
    [
        AttrType::Str(MAX_NAME as u16),
        AttrType::Int,
        AttrType::Int,
        AttrType::Int,
    ]
}
const RELCAT_COLS: [&str; 4] = ["relName", "tupleLength", "attrCount", "indexCount"];

fn attrcat_schema() -> [AttrType; 6] {
    [
        AttrType::Str(MAX_NAME as u16),
        AttrType::Str(MAX_NAME as u16),
        AttrType::Int,
        AttrType::Int,
        AttrType::Int,
        AttrType::Int,
    ]
}
const ATTRCAT_COLS: [&str; 6] = ["relName", "attrName", "offset", "attrType", "length", "indexNo"];

/// Encode a row of values against a fixed attribute schema into its on-disk
/// byte layout. Shared with the executor, which uses the same schema-driven
/// encoding for every user relation.
pub fn encode_row(schema: &[AttrType], values: &[Value]) -> DbResult<Vec<u8>> {
    if values.len() != schema.len() {
        return Err(SmStatus::IncorrectAttributeCount(values.len()).into());
    }
    let mut buf = Vec::with_capacity(schema.iter().map(|a| a.width()).sum());
    for (attr, v) in schema.iter().zip(values) {
        let mut field = vec![0u8; attr.width()];
        v.encode_into(attr, &mut field)?;
        buf.extend(field);
    }
    Ok(buf)
}

/// Inverse of [`encode_row`].
pub fn decode_row(schema: &[AttrType], bytes: &[u8]) -> DbResult<Vec<Value>> {
    let mut out = Vec::with_capacity(schema.len());
    let mut off = 0;
    for attr in schema {
        let w = attr.width();
        out.push(Value::decode(attr, &bytes[off..off + w])?);
        off += w;
    }
    Ok(out)
}

fn offsets(attrs: &[AttrType]) -> Vec<usize> {
    let mut offs = Vec::with_capacity(attrs.len());
    let mut acc = 0;
    for a in attrs {
        offs.push(acc);
        acc += a.width();
    }
    offs
}

fn encode_attr_type(t: AttrType) -> (i32, i32) {
    match t {
        AttrType::Int => (0, 4),
        AttrType::Float => (1, 4),
        AttrType::Str(n) => (2, n as i32),
    }
}

fn decode_attr_type(code: i32, length: i32) -> DbResult<AttrType> {
    match code {
        0 => Ok(AttrType::Int),
        1 => Ok(AttrType::Float),
        2 => AttrType::new_string(length as u16).map_err(Into::into),
        other => Err(SmStatus::InvalidDataFile("attrcat".into(), format!("unknown attr type code {other}")).into()),
    }
}

/// One attribute of a relation, as recorded in `attrcat`.
#[derive(Clone, Debug)]
pub struct Attribute {
    pub name: String,
    pub attr_type: AttrType,
    pub offset: usize,
    /// `Some(n)` if an index exists over this attribute; `n` is both the
    /// attribute's ordinal position and the index file's numeric suffix.
    pub index_no: Option<u32>,
}

/// A relation's schema, as recorded in `relcat`/`attrcat`.
#[derive(Clone, Debug)]
pub struct TableSchema {
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub tuple_length: usize,
    pub index_count: u32,
}

impl TableSchema {
    pub fn attr(&self, name: &str) -> DbResult<&Attribute> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| SmStatus::AttributeNotFound(self.name.clone(), name.into()).into())
    }

    pub fn attr_index(&self, name: &str) -> DbResult<usize> {
        self.attrs
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| SmStatus::AttributeNotFound(self.name.clone(), name.into()).into())
    }

    pub fn attr_types(&self) -> Vec<AttrType> {
        self.attrs.iter().map(|a| a.attr_type).collect()
    }
}

/// Outcome of a bulk [`SystemManager::load`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub inserted: usize,
    pub rejected: usize,
}

/// The open catalog: `relcat`/`attrcat` RM files plus an in-memory mirror.
pub struct SystemManager {
    data_dir: PathBuf,
    relcat: RmFileHandle,
    attrcat: RmFileHandle,
    tables: HashMap<String, TableSchema>,
}

impl SystemManager {
    /// Create a fresh database directory: `relcat`/`attrcat` RM files holding
    /// rows that describe themselves.
    pub fn bootstrap(pool: &mut BufferPool, data_dir: &Path) -> DbResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let rel_schema = relcat_schema();
        let attr_schema = attrcat_schema();
        let rel_len: usize = rel_schema.iter().map(|a| a.width()).sum();
        let attr_len: usize = attr_schema.iter().map(|a| a.width()).sum();

        let relcat = RmFileHandle::create(pool, &data_dir.join("relcat"), rel_len)?;
        let attrcat = RmFileHandle::create(pool, &data_dir.join("attrcat"), attr_len)?;

        let mut sm = SystemManager {
            data_dir: data_dir.to_path_buf(),
            relcat,
            attrcat,
            tables: HashMap::new(),
        };

        sm.insert_relcat_row(pool, "relcat", rel_len, rel_schema.len(), 0)?;
        sm.insert_relcat_row(pool, "attrcat", attr_len, attr_schema.len(), 0)?;
        let rel_offs = offsets(&rel_schema);
        for (i, name) in RELCAT_COLS.iter().enumerate() {
            sm.insert_attrcat_row(pool, "relcat", name, rel_offs[i], rel_schema[i], None)?;
        }
        let attr_offs = offsets(&attr_schema);
        for (i, name) in ATTRCAT_COLS.iter().enumerate() {
            sm.insert_attrcat_row(pool, "attrcat", name, attr_offs[i], attr_schema[i], None)?;
        }

        sm.force_catalog(pool)?;
        sm.rebuild_cache(pool)?;
        log::info!("bootstrapped catalog at {data_dir:?}");
        Ok(sm)
    }

    /// Open a previously bootstrapped database directory.
    pub fn open(pool: &mut BufferPool, data_dir: &Path) -> DbResult<Self> {
        let relcat = RmFileHandle::open(pool, &data_dir.join("relcat"))?;
        let attrcat = RmFileHandle::open(pool, &data_dir.join("attrcat"))?;
        let mut sm = SystemManager {
            data_dir: data_dir.to_path_buf(),
            relcat,
            attrcat,
            tables: HashMap::new(),
        };
        sm.rebuild_cache(pool)?;
        Ok(sm)
    }

    pub fn close(self, pool: &mut BufferPool) -> DbResult<()> {
        self.relcat.close(pool)?;
        self.attrcat.close(pool)?;
        Ok(())
    }

    fn force_catalog(&self, pool: &mut BufferPool) -> DbResult<()> {
        self.relcat.force_pages(pool, None)?;
        self.attrcat.force_pages(pool, None)?;
        Ok(())
    }

    fn insert_relcat_row(
        &self,
        pool: &mut BufferPool,
        name: &str,
        tuple_length: usize,
        attr_count: usize,
        index_count: u32,
    ) -> DbResult<RecordId> {
        let bytes = encode_row(
            &relcat_schema(),
            &[
                Value::Str(name.into()),
                Value::Int(tuple_length as i32),
                Value::Int(attr_count as i32),
                Value::Int(index_count as i32),
            ],
        )?;
        self.relcat.insert_record(pool, &bytes)
    }

    fn insert_attrcat_row(
        &self,
        pool: &mut BufferPool,
        rel: &str,
        attr_name: &str,
        offset: usize,
        attr_type: AttrType,
        index_no: Option<u32>,
    ) -> DbResult<RecordId> {
        let (code, length) = encode_attr_type(attr_type);
        let bytes = encode_row(
            &attrcat_schema(),
            &[
                Value::Str(rel.into()),
                Value::Str(attr_name.into()),
                Value::Int(offset as i32),
                Value::Int(code),
                Value::Int(length),
                Value::Int(index_no.map(|n| n as i32).unwrap_or(-1)),
            ],
        )?;
        self.attrcat.insert_record(pool, &bytes)
    }

    fn attrcat_rows_for(&self, pool: &mut BufferPool, rel: &str) -> DbResult<Vec<(RecordId, Vec<Value>)>> {
        let schema = attrcat_schema();
        let cond = ScanCondition {
            attr_type: schema[0],
            offset: 0,
            op: CompOp::Eq,
            value: Value::Str(rel.to_string()),
        };
        let mut scan = self.attrcat.scan(Some(cond), false);
        let mut out = Vec::new();
        loop {
            match scan.next(pool) {
                Ok((rid, bytes)) => out.push((rid, decode_row(&schema, &bytes)?)),
                Err(DbError::Rm(RmStatus::Eof)) => break,
                Err(e) => return Err(e),
            }
        }
        scan.close(pool)?;
        Ok(out)
    }

    fn relcat_row_for(&self, pool: &mut BufferPool, name: &str) -> DbResult<Option<(RecordId, Vec<Value>)>> {
        let schema = relcat_schema();
        let cond = ScanCondition {
            attr_type: schema[0],
            offset: 0,
            op: CompOp::Eq,
            value: Value::Str(name.to_string()),
        };
        let mut scan = self.relcat.scan(Some(cond), false);
        let found = match scan.next(pool) {
            Ok((rid, bytes)) => Some((rid, decode_row(&schema, &bytes)?)),
            Err(DbError::Rm(RmStatus::Eof)) => None,
            Err(e) => return Err(e),
        };
        scan.close(pool)?;
        Ok(found)
    }

    /// Rebuild the in-memory schema cache from `relcat`/`attrcat`. Attribute
    /// declaration order is recovered by sorting on `offset`, which is
    /// assigned sequentially at creation time and never reused — RM scan
    /// order otherwise follows page/slot placement, not insertion order.
    fn rebuild_cache(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        self.tables.clear();
        let rel_schema = relcat_schema();
        let attr_schema = attrcat_schema();

        let mut rel_rows = Vec::new();
        let mut scan = self.relcat.scan(None, false);
        loop {
            match scan.next(pool) {
                Ok((_, bytes)) => {
                    let vals = decode_row(&rel_schema, &bytes)?;
                    if let [Value::Str(name), Value::Int(tl), _, Value::Int(ic)] = vals.as_slice() {
                        rel_rows.push((name.clone(), *tl as usize, *ic as u32));
                    }
                }
                Err(DbError::Rm(RmStatus::Eof)) => break,
                Err(e) => return Err(e),
            }
        }
        scan.close(pool)?;

        let mut attrs_by_rel: HashMap<String, Vec<Attribute>> = HashMap::new();
        let mut scan = self.attrcat.scan(None, false);
        loop {
            match scan.next(pool) {
                Ok((_, bytes)) => {
                    let vals = decode_row(&attr_schema, &bytes)?;
                    if let [Value::Str(rel), Value::Str(attr_name), Value::Int(offset), Value::Int(code), Value::Int(len), Value::Int(idx)] =
                        vals.as_slice()
                    {
                        let attr_type = decode_attr_type(*code, *len)?;
                        let index_no = if *idx < 0 { None } else { Some(*idx as u32) };
                        attrs_by_rel.entry(rel.clone()).or_default().push(Attribute {
                            name: attr_name.clone(),
                            attr_type,
                            offset: *offset as usize,
                            index_no,
                        });
                    }
                }
                Err(DbError::Rm(RmStatus::Eof)) => break,
                Err(e) => return Err(e),
            }
        }
        scan.close(pool)?;

        for (name, tuple_length, index_count) in rel_rows {
            let mut attrs = attrs_by_rel.remove(&name).unwrap_or_default();
            attrs.sort_by_key(|a| a.offset);
            self.tables.insert(
                name.clone(),
                TableSchema {
                    name,
                    attrs,
                    tuple_length,
                    index_count,
                },
            );
        }
        Ok(())
    }

    pub fn table(&self, name: &str) -> DbResult<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| SmStatus::TableDoesNotExist(name.into()).into())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn relation_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn index_path(&self, rel: &str, index_no: u32) -> PathBuf {
        self.data_dir.join(format!("{rel}.{index_no}"))
    }

    fn reject_system_catalog(name: &str) -> DbResult<()> {
        if name == "relcat" || name == "attrcat" {
            return Err(SmStatus::SystemCatalog(name.into()).into());
        }
        Ok(())
    }

    /// `CREATE TABLE`. `columns` is declared attribute order.
    pub fn create_table(&mut self, pool: &mut BufferPool, name: &str, columns: &[(String, AttrType)]) -> DbResult<()> {
        Self::reject_system_catalog(name)?;
        if name.is_empty() || name.len() > MAX_NAME {
            return Err(SmStatus::InvalidName(name.into()).into());
        }
        if self.tables.contains_key(name) {
            return Err(SmStatus::TableAlreadyExists(name.into()).into());
        }
        if columns.is_empty() || columns.len() > MAX_ATTRS {
            return Err(SmStatus::IncorrectAttributeCount(columns.len()).into());
        }
        for (attr_name, _) in columns {
            if attr_name.is_empty() || attr_name.len() > MAX_NAME {
                return Err(SmStatus::InvalidName(attr_name.clone()).into());
            }
        }

        let attr_types: Vec<AttrType> = columns.iter().map(|(_, t)| *t).collect();
        let tuple_length: usize = attr_types.iter().map(|t| t.width()).sum();
        let offs = offsets(&attr_types);

        RmFileHandle::create(pool, &self.relation_path(name), tuple_length)?.close(pool)?;

        self.insert_relcat_row(pool, name, tuple_length, columns.len(), 0)?;
        for (i, (attr_name, attr_type)) in columns.iter().enumerate() {
            self.insert_attrcat_row(pool, name, attr_name, offs[i], *attr_type, None)?;
        }
        self.force_catalog(pool)?;
        self.rebuild_cache(pool)?;
        log::info!("created table {name:?} with {} attributes", columns.len());
        Ok(())
    }

    /// `DROP TABLE`: destroys the relation's RM file and every index file on
    /// it, then removes its `relcat`/`attrcat` rows.
    pub fn drop_table(&mut self, pool: &mut BufferPool, name: &str) -> DbResult<()> {
        Self::reject_system_catalog(name)?;
        let schema = self.table(name)?.clone();

        for attr in &schema.attrs {
            if let Some(idx) = attr.index_no {
                let _ = std::fs::remove_file(self.index_path(name, idx));
            }
        }
        for (rid, _) in self.attrcat_rows_for(pool, name)? {
            self.attrcat.delete_record(pool, rid)?;
        }
        if let Some((rid, _)) = self.relcat_row_for(pool, name)? {
            self.relcat.delete_record(pool, rid)?;
        }
        self.force_catalog(pool)?;
        let _ = std::fs::remove_file(self.relation_path(name));
        self.tables.remove(name);
        log::info!("dropped table {name:?}");
        Ok(())
    }

    /// `CREATE INDEX`: builds a new B+-tree over an un-indexed attribute and
    /// backfills it from every live record already in the relation.
    pub fn create_index(&mut self, pool: &mut BufferPool, rel: &str, attr_name: &str) -> DbResult<()> {
        Self::reject_system_catalog(rel)?;
        let schema = self.table(rel)?.clone();
        let attr = schema.attr(attr_name)?.clone();
        if attr.index_no.is_some() {
            return Err(SmStatus::IndexExists(rel.into(), attr_name.into()).into());
        }
        let index_no = schema.attr_index(attr_name)? as u32;

        let mut ix = btree::IxFileHandle::create(pool, &self.index_path(rel, index_no), attr.attr_type)?;
        let rel_file = RmFileHandle::open(pool, &self.relation_path(rel))?;
        let attr_types = schema.attr_types();
        let mut scan = rel_file.scan(None, false);
        let backfill = (|| -> DbResult<()> {
            loop {
                match scan.next(pool) {
                    Ok((rid, bytes)) => {
                        let vals = decode_row(&attr_types, &bytes)?;
                        ix.insert_entry(pool, &vals[index_no as usize], rid)?;
                    }
                    Err(DbError::Rm(RmStatus::Eof)) => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
        })();
        scan.close(pool)?;
        rel_file.close(pool)?;
        backfill?;
        ix.close(pool)?;

        let (rid, mut vals) = self
            .attrcat_rows_for(pool, rel)?
            .into_iter()
            .find(|(_, vals)| matches!(&vals[1], Value::Str(n) if n == attr_name))
            .ok_or_else(|| SmStatus::AttributeNotFound(rel.into(), attr_name.into()))?;
        vals[5] = Value::Int(index_no as i32);
        let bytes = encode_row(&attrcat_schema(), &vals)?;
        self.attrcat.update_record(pool, rid, &bytes)?;

        if let Some((rid, mut vals)) = self.relcat_row_for(pool, rel)? {
            if let Value::Int(ic) = &mut vals[3] {
                *ic += 1;
            }
            let bytes = encode_row(&relcat_schema(), &vals)?;
            self.relcat.update_record(pool, rid, &bytes)?;
        }

        self.force_catalog(pool)?;
        self.rebuild_cache(pool)?;
        log::info!("created index on {rel}.{attr_name} (index {index_no})");
        Ok(())
    }

    /// `DROP INDEX`.
    pub fn drop_index(&mut self, pool: &mut BufferPool, rel: &str, attr_name: &str) -> DbResult<()> {
        Self::reject_system_catalog(rel)?;
        let schema = self.table(rel)?.clone();
        let attr = schema.attr(attr_name)?.clone();
        let index_no = attr
            .index_no
            .ok_or_else(|| SmStatus::IndexDoesNotExist(rel.into(), attr_name.into()))?;

        let _ = std::fs::remove_file(self.index_path(rel, index_no));

        let (rid, mut vals) = self
            .attrcat_rows_for(pool, rel)?
            .into_iter()
            .find(|(_, vals)| matches!(&vals[1], Value::Str(n) if n == attr_name))
            .ok_or_else(|| SmStatus::AttributeNotFound(rel.into(), attr_name.into()))?;
        vals[5] = Value::Int(-1);
        let bytes = encode_row(&attrcat_schema(), &vals)?;
        self.attrcat.update_record(pool, rid, &bytes)?;

        if let Some((rid, mut vals)) = self.relcat_row_for(pool, rel)? {
            if let Value::Int(ic) = &mut vals[3] {
                *ic = (*ic - 1).max(0);
            }
            let bytes = encode_row(&relcat_schema(), &vals)?;
            self.relcat.update_record(pool, rid, &bytes)?;
        }

        self.force_catalog(pool)?;
        self.rebuild_cache(pool)?;
        log::info!("dropped index on {rel}.{attr_name}");
        Ok(())
    }

    /// `LOAD`: bulk-insert from a comma-separated text file. A line whose
    /// field count or field parse doesn't match the schema is rejected and
    /// counted, not treated as fatal to the whole load.
    pub fn load(&mut self, pool: &mut BufferPool, rel: &str, data_file: &Path) -> DbResult<LoadReport> {
        Self::reject_system_catalog(rel)?;
        let schema = self.table(rel)?.clone();
        let text = std::fs::read_to_string(data_file)?;

        let rel_file = RmFileHandle::open(pool, &self.relation_path(rel))?;
        let mut indexes: HashMap<u32, btree::IxFileHandle> = HashMap::new();
        for attr in &schema.attrs {
            if let Some(idx) = attr.index_no {
                indexes.insert(idx, btree::IxFileHandle::open(pool, &self.index_path(rel, idx))?);
            }
        }

        let mut report = LoadReport::default();
        let attr_types = schema.attr_types();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match self.parse_load_line(line, &schema) {
                Some(values) => {
                    let bytes = match encode_row(&attr_types, &values) {
                        Ok(b) => b,
                        Err(_) => {
                            report.rejected += 1;
                            continue;
                        }
                    };
                    let rid = match rel_file.insert_record(pool, &bytes) {
                        Ok(r) => r,
                        Err(_) => {
                            report.rejected += 1;
                            continue;
                        }
                    };
                    for (i, attr) in schema.attrs.iter().enumerate() {
                        if let Some(idx) = attr.index_no {
                            indexes
                                .get_mut(&idx)
                                .expect("opened for every indexed attribute above")
                                .insert_entry(pool, &values[i], rid)?;
                        }
                    }
                    report.inserted += 1;
                }
                None => report.rejected += 1,
            }
        }

        rel_file.force_pages(pool, None)?;
        rel_file.close(pool)?;
        for (_, ix) in indexes {
            ix.close(pool)?;
        }
        log::info!("loaded {rel}: {} inserted, {} rejected", report.inserted, report.rejected);
        Ok(report)
    }

    fn parse_load_line(&self, line: &str, schema: &TableSchema) -> Option<Vec<Value>> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != schema.attrs.len() {
            return None;
        }
        let mut values = Vec::with_capacity(fields.len());
        for (field, attr) in fields.iter().zip(&schema.attrs) {
            let field = field.trim();
            let value = match attr.attr_type {
                AttrType::Int => field.parse::<i32>().ok().map(Value::Int)?,
                AttrType::Float => field.parse::<f32>().ok().map(Value::Float)?,
                AttrType::Str(_) => Value::Str(field.to_string()),
            };
            if !value.matches(&attr.attr_type) {
                return None;
            }
            values.push(value);
        }
        Some(values)
    }

    /// `HELP` (no argument): list every relation. `HELP rel`: list a
    /// relation's attributes.
    pub fn help(&self, rel: Option<&str>) -> DbResult<RecordBatch> {
        match rel {
            None => {
                let mut names: Vec<&String> = self.tables.keys().collect();
                names.sort();
                let rows = names
                    .into_iter()
                    .map(|name| {
                        let t = &self.tables[name];
                        Row::new(vec![
                            Value::Str(t.name.clone()),
                            Value::Int(t.tuple_length as i32),
                            Value::Int(t.attrs.len() as i32),
                            Value::Int(t.index_count as i32),
                        ])
                    })
                    .collect();
                Ok(RecordBatch {
                    columns: vec!["relName".into(), "tupleLength".into(), "attrCount".into(), "indexCount".into()],
                    rows,
                })
            }
            Some(name) => {
                let t = self.table(name)?;
                let rows = t
                    .attrs
                    .iter()
                    .map(|a| {
                        Row::new(vec![
                            Value::Str(a.name.clone()),
                            Value::Str(format!("{:?}", a.attr_type)),
                            Value::Int(a.offset as i32),
                            Value::Int(a.attr_type.width() as i32),
                            Value::Int(a.index_no.map(|n| n as i32).unwrap_or(-1)),
                        ])
                    })
                    .collect();
                Ok(RecordBatch {
                    columns: vec!["attrName".into(), "type".into(), "offset".into(), "length".into(), "indexNo".into()],
                    rows,
                })
            }
        }
    }

    /// `PRINT rel`: every live tuple, in storage order.
    pub fn print(&self, pool: &mut BufferPool, rel: &str) -> DbResult<RecordBatch> {
        let schema = self.table(rel)?;
        let attr_types = schema.attr_types();
        let rel_file = RmFileHandle::open(pool, &self.relation_path(rel))?;
        let mut scan = rel_file.scan(None, false);
        let mut rows = Vec::new();
        let result = (|| -> DbResult<()> {
            loop {
                match scan.next(pool) {
                    Ok((rid, bytes)) => {
                        let values = decode_row(&attr_types, &bytes)?;
                        rows.push(Row::new(values).with_rid(rid));
                    }
                    Err(DbError::Rm(RmStatus::Eof)) => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
        })();
        scan.close(pool)?;
        rel_file.close(pool)?;
        result?;
        Ok(RecordBatch {
            columns: schema.attrs.iter().map(|a| a.name.clone()).collect(),
            rows,
        })
    }
}

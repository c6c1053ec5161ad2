//! Synchronous engine facade over one buffer pool and one open catalog.
//! Every DDL/DML/query-building method here is a thin pass-through to the
//! `catalog`/`executor` crates underneath it; there is no SQL front end, no
//! planner, and no network or consensus layer — a caller drives the engine
//! directly with structured arguments, and a built `select` operator tree
//! is run by the caller, not the engine.

use std::path::{Path, PathBuf};

use buffer::BufferPool;
use catalog::{encode_row, LoadReport, SystemManager};
use common::{Config, DbResult, EngineConfig, RecordBatch, RecordId};
use executor::{Condition, DeleteExecutor, FileScanOp, IndexScanOp, InsertExecutor, Operator, Rhs, ScanPredicate, UpdateExecutor};
use storage::RmFileHandle;
use types::{AttrType, Value};

const DBINFO_SCHEMA: [AttrType; 2] = [AttrType::Int, AttrType::Int];

/// An already-open database: one buffer pool, one catalog, one set of
/// session flags. `bootstrap`/`open` both assume `config.data_dir` already
/// exists and is writable — creating the directory itself belongs to a
/// `dbcreate`-style tool outside this crate's scope.
pub struct Engine {
    pool: BufferPool,
    catalog: SystemManager,
    config: EngineConfig,
    data_dir: PathBuf,
}

impl Engine {
    /// Bootstrap a fresh catalog (`relcat`/`attrcat`) and `dbinfo` file in
    /// `config.data_dir`. Fails if the directory already holds a database.
    pub fn bootstrap(config: Config) -> DbResult<Self> {
        let mut pool = BufferPool::new(config.buffer_pool_pages, config.page_size);
        let catalog = SystemManager::bootstrap(&mut pool, &config.data_dir)?;
        Self::write_dbinfo(&mut pool, &config.data_dir)?;
        log::info!("engine bootstrapped at {:?}", config.data_dir);
        Ok(Self { pool, catalog, config: EngineConfig::default(), data_dir: config.data_dir })
    }

    /// Open a previously bootstrapped database directory.
    pub fn open(config: Config) -> DbResult<Self> {
        let mut pool = BufferPool::new(config.buffer_pool_pages, config.page_size);
        let catalog = SystemManager::open(&mut pool, &config.data_dir)?;
        log::info!("engine opened at {:?}", config.data_dir);
        Ok(Self { pool, catalog, config: EngineConfig::default(), data_dir: config.data_dir })
    }

    /// `dbinfo` is a single-record RM file of `{ distributed: i32,
    /// number_nodes: i32 }`; this engine never runs distributed, so
    /// `distributed` is always `0` and `number_nodes` is always `1`.
    fn write_dbinfo(pool: &mut BufferPool, data_dir: &Path) -> DbResult<()> {
        let dbinfo = RmFileHandle::create(pool, &data_dir.join("dbinfo"), 8)?;
        let bytes = encode_row(&DBINFO_SCHEMA, &[Value::Int(0), Value::Int(1)])?;
        dbinfo.insert_record(pool, &bytes)?;
        dbinfo.close(pool)?;
        Ok(())
    }

    /// Read back `dbinfo`'s `(distributed, number_nodes)` pair.
    pub fn dbinfo(&mut self) -> DbResult<(i32, i32)> {
        let handle = RmFileHandle::open(&mut self.pool, &self.data_dir.join("dbinfo"))?;
        let mut scan = handle.scan(None, false);
        let (_, bytes) = scan.next(&mut self.pool)?;
        scan.close(&mut self.pool)?;
        handle.close(&mut self.pool)?;
        let values = catalog::decode_row(&DBINFO_SCHEMA, &bytes)?;
        let (Value::Int(distributed), Value::Int(number_nodes)) = (&values[0], &values[1]) else {
            unreachable!("dbinfo encodes two ints")
        };
        Ok((*distributed, *number_nodes))
    }

    /// Flush the catalog and release the pool's file handles.
    pub fn close(self) -> DbResult<()> {
        let Engine { mut pool, catalog, .. } = self;
        catalog.close(&mut pool)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Direct access to the buffer pool, for driving a `select`-built
    /// operator tree's `open`/`next`/`close`.
    pub fn buffer_pool_mut(&mut self) -> &mut BufferPool {
        &mut self.pool
    }

    pub fn create_table(&mut self, name: &str, columns: &[(String, AttrType)]) -> DbResult<()> {
        self.catalog.create_table(&mut self.pool, name, columns)
    }

    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        self.catalog.drop_table(&mut self.pool, name)
    }

    pub fn create_index(&mut self, rel: &str, attr: &str) -> DbResult<()> {
        self.catalog.create_index(&mut self.pool, rel, attr)
    }

    pub fn drop_index(&mut self, rel: &str, attr: &str) -> DbResult<()> {
        self.catalog.drop_index(&mut self.pool, rel, attr)
    }

    pub fn load(&mut self, rel: &str, data_file: &Path) -> DbResult<LoadReport> {
        self.catalog.load(&mut self.pool, rel, data_file)
    }

    pub fn insert(&mut self, rel: &str, values: &[Value]) -> DbResult<RecordId> {
        InsertExecutor::execute(&mut self.pool, &self.catalog, rel, values)
    }

    pub fn delete(&mut self, rel: &str, conditions: &[Condition]) -> DbResult<usize> {
        DeleteExecutor::execute(&mut self.pool, &self.catalog, rel, conditions)
    }

    pub fn update(&mut self, rel: &str, attr: &str, rhs: Rhs, conditions: &[Condition]) -> DbResult<usize> {
        UpdateExecutor::execute(&mut self.pool, &self.catalog, rel, attr, rhs, conditions)
    }

    /// Build (but do not run) a scan operator over `rel`, optionally
    /// filtered by one pushed-down predicate. When `optimizeQuery` is set
    /// and the predicate names an indexed attribute, an `IndexScanOp` is
    /// built instead of a plain `FileScanOp` — the only query-shape
    /// decision this facade makes, since there is no cost-based optimizer.
    pub fn select(&self, rel: &str, predicate: Option<ScanPredicate>) -> DbResult<Box<dyn Operator>> {
        let schema = self.catalog.table(rel)?;
        if self.config.optimize_query {
            if let Some(p) = &predicate {
                if let Ok(attr) = schema.attr(&p.attr) {
                    if let Some(index_no) = attr.index_no {
                        let op = IndexScanOp::new(
                            schema,
                            self.catalog.relation_path(rel),
                            self.catalog.index_path(rel, index_no),
                            p.attr.clone(),
                            p.op,
                            p.value.clone(),
                        )?;
                        return Ok(Box::new(op));
                    }
                }
            }
        }
        let op = FileScanOp::new(schema, self.catalog.relation_path(rel), predicate)?;
        Ok(Box::new(op))
    }

    pub fn help(&self, rel: Option<&str>) -> DbResult<RecordBatch> {
        self.catalog.help(rel)
    }

    pub fn print(&mut self, rel: &str) -> DbResult<RecordBatch> {
        self.catalog.print(&mut self.pool, rel)
    }

    /// Apply a `SET paramName value` statement (`printCommands`,
    /// `optimizeQuery`, `bQueryPlans`).
    pub fn set_param(&mut self, param: &str, value: &str) -> DbResult<()> {
        self.config.set(param, value)
    }

    pub fn reset_buffer(&mut self) -> DbResult<()> {
        self.pool.reset_buffer()
    }

    pub fn print_buffer(&self) -> String {
        self.pool.print_buffer()
    }

    pub fn resize_buffer(&mut self, capacity: usize) -> DbResult<()> {
        self.pool.resize_buffer(capacity)
    }
}

#[cfg(test)]
mod tests;

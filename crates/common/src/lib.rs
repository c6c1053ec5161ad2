
pub mod pretty;

use std::path::PathBuf;

/// Maximum number of attributes a relation may declare.
pub const MAX_ATTRS: usize = 40;
/// Maximum length of a relation or attribute name.
pub const MAX_NAME: usize = 24;

/// A page number within a single paged file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PageNum(pub u32);

impl PageNum {
    pub const INVALID: PageNum = PageNum(u32::MAX);
}

impl Default for PageNum {
    fn default() -> Self {
        PageNum(0)
    }
}

/// A slot number within a page. Slots are numbered `1..=N`; `0` is reserved
/// as the not-viable sentinel `RecordId` uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SlotNum(pub u16);

impl Default for SlotNum {
    fn default() -> Self {
        SlotNum(0)
    }
}

/// A stable, file-scoped record address: `(page, slot)`.
///
/// `RecordId::default()` is the not-viable sentinel (slot `0`, never
/// assigned to a live record since slot numbers start at 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct RecordId {
    pub page: PageNum,
    pub slot: SlotNum,
}

impl RecordId {
    pub fn new(page: PageNum, slot: SlotNum) -> Self {
        Self { page, slot }
    }

    pub fn is_viable(&self) -> bool {
        self.slot.0 != 0
    }
}

/// PF-layer status: paged-file and buffer-pool conditions.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PfStatus {
    #[error("page {0:?} is not in the file")]
    PageNotInFile(PageNum),
    #[error("page {0:?} is already pinned")]
    AlreadyPinned(PageNum),
    #[error("page {0:?} has been disposed")]
    PageDisposed(PageNum),
    #[error("end of file")]
    Eof,
    #[error("no unpinned frame is available for eviction")]
    BufferFull,
    #[error("file has pages still pinned; cannot close")]
    PagesStillPinned,
    #[error("invalid page number {0:?}")]
    InvalidPageNumber(PageNum),
    #[error("file is not open")]
    FileNotOpen,
    #[error("file is already open")]
    FileAlreadyOpen,
}

impl PfStatus {
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            PfStatus::PageNotInFile(_)
                | PfStatus::AlreadyPinned(_)
                | PfStatus::PageDisposed(_)
                | PfStatus::Eof
        )
    }
}

/// RM-layer status: record-file and slotted-page conditions.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RmStatus {
    #[error("record size {0} is too large for a page")]
    RecordTooLarge(usize),
    #[error("record size {0} must be positive")]
    RecordTooSmall(isize),
    #[error("record is not valid")]
    RecordNotValid,
    #[error("invalid page number {0:?}")]
    InvalidPageNumber(PageNum),
    #[error("invalid slot number {0:?}")]
    InvalidSlotNumber(SlotNum),
    #[error("bitmap is inconsistent with stored record count")]
    InconsistentBitmap,
    #[error("end of file")]
    Eof,
    #[error("scan is not open")]
    ScanClosed,
    #[error("invalid file name {0:?}")]
    InvalidFileName(String),
}

impl RmStatus {
    pub fn is_warning(&self) -> bool {
        !matches!(
            self,
            RmStatus::InconsistentBitmap | RmStatus::InvalidFileName(_)
        )
    }
}

/// IX-layer status: B+-tree index conditions.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IxStatus {
    #[error("index attribute is inconsistent with the index header")]
    InconsistentAttribute,
    #[error("index node at {0:?} is invalid")]
    InconsistentNode(PageNum),
    #[error("key was not found")]
    KeyNotFound,
    #[error("entry already exists")]
    EntryExists,
    #[error("end of scan")]
    Eof,
    #[error("scan is not open")]
    ScanClosed,
    #[error("deleted entry was not found")]
    DeleteEntryNotFound,
    #[error("negative index number {0}")]
    NegativeIndexNumber(i32),
    #[error("invalid attribute")]
    InvalidAttribute,
}

impl IxStatus {
    pub fn is_warning(&self) -> bool {
        true
    }
}

/// SM-layer status: catalog and DDL conditions.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SmStatus {
    #[error("database does not exist")]
    DatabaseDoesNotExist,
    #[error("database is already open")]
    DatabaseOpen,
    #[error("database is closed")]
    DatabaseClosed,
    #[error("attribute count must be in 1..={MAX_ATTRS}, got {0}")]
    IncorrectAttributeCount(usize),
    #[error("invalid name {0:?}")]
    InvalidName(String),
    #[error("table {0:?} does not exist")]
    TableDoesNotExist(String),
    #[error("table {0:?} already exists")]
    TableAlreadyExists(String),
    #[error("invalid data file {0:?}: {1}")]
    InvalidDataFile(String, String),
    #[error("invalid system parameter {0:?}")]
    InvalidSystemParameter(String),
    #[error("invalid value {0:?} for parameter {1:?}")]
    InvalidValue(String, String),
    #[error("index already exists on {0}.{1}")]
    IndexExists(String, String),
    #[error("index does not exist on {0}.{1}")]
    IndexDoesNotExist(String, String),
    #[error("cannot modify the system catalog {0:?} directly")]
    SystemCatalog(String),
    #[error("attribute {1:?} not found on relation {0:?}")]
    AttributeNotFound(String, String),
}

impl SmStatus {
    pub fn is_warning(&self) -> bool {
        true
    }
}

/// QL-layer status: query-pipeline conditions.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QlStatus {
    #[error("database does not exist")]
    DatabaseDoesNotExist,
    #[error("database is closed")]
    DatabaseClosed,
    #[error("condition is invalid: {0}")]
    InvalidCondition(String),
    #[error("attribute {1:?} not found on relation {0:?}")]
    AttributeNotFound(String, String),
    #[error("incorrect attribute type for {0:?}")]
    IncorrectAttributeType(String),
    #[error("operator is already open")]
    OperatorOpen,
    #[error("operator is not open")]
    OperatorClosed,
    #[error("end of stream")]
    Eof,
    #[error("operation partially applied before failing: {0}")]
    PartiallyApplied(String),
}

impl QlStatus {
    pub fn is_warning(&self) -> bool {
        !matches!(self, QlStatus::PartiallyApplied(_))
    }
}

/// Canonical error type shared across the engine's layers.
///
/// Each layer surfaces its own status band unchanged; the top-level engine
/// is the only place that decides what to do with a warning versus an
/// error, via [`DbError::is_warning`].
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Pf(#[from] PfStatus),
    #[error(transparent)]
    Rm(#[from] RmStatus),
    #[error(transparent)]
    Ix(#[from] IxStatus),
    #[error(transparent)]
    Sm(#[from] SmStatus),
    #[error(transparent)]
    Ql(#[from] QlStatus),
    #[error(transparent)]
    Type(#[from] types::TypeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    pub fn is_warning(&self) -> bool {
        match self {
            DbError::Pf(s) => s.is_warning(),
            DbError::Rm(s) => s.is_warning(),
            DbError::Ix(s) => s.is_warning(),
            DbError::Sm(s) => s.is_warning(),
            DbError::Ql(s) => s.is_warning(),
            DbError::Type(_) => false,
            DbError::Io(_) => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for where a database lives and how big its
/// buffer pool is.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .page_size(4096)
///     .buffer_pool_pages(64)
///     .build();
/// ```
#[derive(Clone, Debug, bon::Builder)]
pub struct Config {
    /// Directory holding the catalog, relation, and index files.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Fixed page size in bytes, shared by every paged file.
    #[builder(default = 4096)]
    pub page_size: usize,
    /// Number of frames the PF buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_pages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            page_size: 4096,
            buffer_pool_pages: 256,
        }
    }
}

/// Process-wide behavior flags threaded explicitly through the engine
/// instead of living as global mutable state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Echo each parsed command before executing it.
    pub print_commands: bool,
    /// Allow QL to choose an index scan over a file scan when one applies.
    pub optimize_query: bool,
    /// Print the chosen physical plan before executing a query.
    pub query_plans: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            print_commands: false,
            optimize_query: true,
            query_plans: false,
        }
    }
}

impl EngineConfig {
    /// Apply a `SET paramName value` statement.
    pub fn set(&mut self, param: &str, value: &str) -> DbResult<()> {
        let as_bool = |v: &str| -> Option<bool> {
            match v {
                "TRUE" => Some(true),
                "FALSE" => Some(false),
                _ => None,
            }
        };
        match param {
            "printCommands" => {
                self.print_commands = as_bool(value)
                    .ok_or_else(|| SmStatus::InvalidValue(value.into(), param.into()))?;
            }
            "optimizeQuery" => {
                self.optimize_query = as_bool(value)
                    .ok_or_else(|| SmStatus::InvalidValue(value.into(), param.into()))?;
            }
            "bQueryPlans" => {
                self.query_plans = match value {
                    "0" | "FALSE" => false,
                    "1" | "TRUE" => true,
                    _ => return Err(SmStatus::InvalidValue(value.into(), param.into()).into()),
                };
            }
            other => return Err(SmStatus::InvalidSystemParameter(other.into()).into()),
        }
        Ok(())
    }
}

/// One row of attribute values, optionally tagged with the `RecordId` it
/// was fetched from. Scan operators set `rid`; literal/derived rows (the
/// output of a join or projection) leave it `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub values: Vec<types::Value>,
    rid: Option<RecordId>,
}

impl Row {
    pub fn new(values: Vec<types::Value>) -> Self {
        Self { values, rid: None }
    }

    pub fn with_rid(mut self, rid: RecordId) -> Self {
        self.rid = Some(rid);
        self
    }

    pub fn set_rid(&mut self, rid: Option<RecordId>) {
        self.rid = rid;
    }

    pub fn rid(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn into_values(self) -> Vec<types::Value> {
        self.values
    }
}

impl From<Vec<types::Value>> for Row {
    fn from(values: Vec<types::Value>) -> Self {
        Row::new(values)
    }
}

/// Rectangular result set carrying column labels and rows, ready for
/// `pretty::render_record_batch`.
#[derive(Clone, Debug)]
pub struct RecordBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Re-exports convenient for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, RecordBatch, RecordId, Row};
    pub use types::{AttrType, Value};
}

//! Record manager: a file of fixed-length records addressed by `RecordId`,
//! built directly on the paged-file layer's `BufferPool`. Maintains a
//! per-file free-list of pages with at least one empty slot so insertion is
//! O(1) amortised once a non-full page exists.


use buffer::{BufferPool, FileId};
use common::{DbError, PageNum, PfStatus, RecordId, RmStatus, SlotNum};
use std::path::Path;
use types::{AttrType, CompOp, Value};

type DbResult<T> = common::DbResult<T>;

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::legacy()
}

/// The RM file's own header, stored in the first page PF hands it (distinct
/// from PF's internal page-0 bookkeeping, which RM never sees directly).
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
struct RmFileHeader {
    record_size: u16,
    slots_per_page: u16,
    first_free_page: PageNum,
}

/// Per-data-page header: a link to the next page in RM's free list.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
struct RmPageHeader {
    next_free_page: PageNum,
}

fn encode_fixed<T: serde::Serialize>(value: &T, out: &mut [u8]) {
    let written = bincode::serde::encode_into_slice(value, out, bincode_config())
        .expect("fixed-size RM header encodes within its reserved bytes");
    debug_assert_eq!(written, out.len());
}

fn decode_fixed<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> T {
    let (value, read) = bincode::serde::decode_from_slice(bytes, bincode_config())
        .expect("RM header bytes were written by encode_fixed with the same layout");
    debug_assert_eq!(read, bytes.len());
    value
}

fn header_width<T: serde::Serialize + Default>() -> usize {
    bincode::serde::encode_to_vec(&T::default(), bincode_config())
        .expect("default header encodes")
        .len()
}

impl Default for RmFileHeader {
    fn default() -> Self {
        Self {
            record_size: 0,
            slots_per_page: 0,
            first_free_page: PageNum::INVALID,
        }
    }
}

impl Default for RmPageHeader {
    fn default() -> Self {
        Self {
            next_free_page: PageNum::INVALID,
        }
    }
}

fn bitmap_bytes(slots_per_page: usize) -> usize {
    (slots_per_page + 7) / 8
}

fn bit_is_set(bitmap: &[u8], idx: usize) -> bool {
    bitmap[idx / 8] & (1 << (idx % 8)) != 0
}

fn set_bit(bitmap: &mut [u8], idx: usize) {
    bitmap[idx / 8] |= 1 << (idx % 8);
}

fn clear_bit(bitmap: &mut [u8], idx: usize) {
    bitmap[idx / 8] &= !(1 << (idx % 8));
}

fn first_zero_bit(bitmap: &[u8], slots_per_page: usize) -> Option<usize> {
    (0..slots_per_page).find(|&i| !bit_is_set(bitmap, i))
}

fn is_full(bitmap: &[u8], slots_per_page: usize) -> bool {
    (0..slots_per_page).all(|i| bit_is_set(bitmap, i))
}

/// Compute the largest slot count that fits `page_size - page_header_bytes`
/// bytes of bitmap plus fixed-length records.
fn slots_per_page(page_size: usize, page_header_bytes: usize, record_size: usize) -> usize {
    let available = page_size.saturating_sub(page_header_bytes);
    if record_size == 0 || available == 0 {
        return 0;
    }
    let mut n = available / record_size;
    while n > 0 && n * record_size + bitmap_bytes(n) > available {
        n -= 1;
    }
    n
}

/// An open fixed-length record file.
///
/// Cheap to copy: every field is a small fixed-size descriptor (file id,
/// header location, slot geometry), never a buffer. Scans and QL operators
/// hold their own copy rather than borrowing one, so a handle can be reused
/// across an `open`/`next`/`close` lifetime without a self-referential
/// lifetime.
#[derive(Clone, Copy)]
pub struct RmFileHandle {
    file: FileId,
    header_page: PageNum,
    record_size: u16,
    slots_per_page: u16,
    page_header_bytes: usize,
    file_header_bytes: usize,
}

impl RmFileHandle {
    fn data_offset(&self) -> usize {
        self.page_header_bytes + bitmap_bytes(self.slots_per_page as usize)
    }

    fn slot_offset(&self, slot_idx: usize) -> usize {
        self.data_offset() + slot_idx * self.record_size as usize
    }

    /// Create a new record file with `record_size`-byte fixed-width tuples.
    pub fn create(pool: &mut BufferPool, path: &Path, record_size: usize) -> DbResult<Self> {
        if record_size == 0 {
            return Err(RmStatus::RecordTooSmall(record_size as isize).into());
        }
        let page_header_bytes = header_width::<RmPageHeader>();
        let file_header_bytes = header_width::<RmFileHeader>();
        let page_size = pool.page_size();
        let n = slots_per_page(page_size, page_header_bytes, record_size);
        if n == 0 {
            return Err(RmStatus::RecordTooLarge(record_size).into());
        }

        let file = pool.create(path)?;
        let header_page_ref = pool.allocate_page(file)?;
        let header_page = header_page_ref.num;
        let header = RmFileHeader {
            record_size: record_size as u16,
            slots_per_page: n as u16,
            first_free_page: PageNum::INVALID,
        };
        encode_fixed(&header, &mut header_page_ref.data[..file_header_bytes]);
        pool.mark_dirty(file, header_page)?;
        pool.unpin_page(file, header_page)?;

        log::debug!("created RM file {path:?}: record_size={record_size} slots_per_page={n}");
        Ok(Self {
            file,
            header_page,
            record_size: record_size as u16,
            slots_per_page: n as u16,
            page_header_bytes,
            file_header_bytes,
        })
    }

    /// Open an existing record file, reading its header.
    pub fn open(pool: &mut BufferPool, path: &Path) -> DbResult<Self> {
        let file = pool.open(path)?;
        let file_header_bytes = header_width::<RmFileHeader>();
        let page_header_bytes = header_width::<RmPageHeader>();
        let header_page = PageNum(1);
        let page = pool.get_page(file, header_page)?;
        let header: RmFileHeader = decode_fixed(&page.data[..file_header_bytes]);
        pool.unpin_page(file, header_page)?;
        Ok(Self {
            file,
            header_page,
            record_size: header.record_size,
            slots_per_page: header.slots_per_page,
            page_header_bytes,
            file_header_bytes,
        })
    }

    /// Flush dirty pages and close the underlying paged file.
    pub fn close(self, pool: &mut BufferPool) -> DbResult<()> {
        pool.force_pages(self.file, None)?;
        pool.close(self.file)
    }

    fn read_file_header(&self, pool: &mut BufferPool) -> DbResult<RmFileHeader> {
        let page = pool.get_page(self.file, self.header_page)?;
        let header = decode_fixed(&page.data[..self.file_header_bytes]);
        pool.unpin_page(self.file, self.header_page)?;
        Ok(header)
    }

    fn write_file_header(&self, pool: &mut BufferPool, header: &RmFileHeader) -> DbResult<()> {
        let page = pool.get_page(self.file, self.header_page)?;
        encode_fixed(header, &mut page.data[..self.file_header_bytes]);
        pool.mark_dirty(self.file, self.header_page)?;
        pool.unpin_page(self.file, self.header_page)?;
        Ok(())
    }

    fn validate_rid(&self, rid: RecordId) -> DbResult<()> {
        if rid.page == self.header_page || !rid.is_viable() {
            return Err(RmStatus::InvalidPageNumber(rid.page).into());
        }
        if rid.slot.0 == 0 || rid.slot.0 as usize > self.slots_per_page as usize {
            return Err(RmStatus::InvalidSlotNumber(rid.slot).into());
        }
        Ok(())
    }

    /// Fetch a copy of the record addressed by `rid`.
    pub fn get_record(&self, pool: &mut BufferPool, rid: RecordId) -> DbResult<Vec<u8>> {
        self.validate_rid(rid)?;
        let slot_idx = rid.slot.0 as usize - 1;
        let page = pool.get_page(self.file, rid.page)?;
        let bitmap_start = self.page_header_bytes;
        let bitmap_end = bitmap_start + bitmap_bytes(self.slots_per_page as usize);
        let occupied = bit_is_set(&page.data[bitmap_start..bitmap_end], slot_idx);
        if !occupied {
            pool.unpin_page(self.file, rid.page)?;
            return Err(RmStatus::RecordNotValid.into());
        }
        let off = self.slot_offset(slot_idx);
        let bytes = page.data[off..off + self.record_size as usize].to_vec();
        pool.unpin_page(self.file, rid.page)?;
        Ok(bytes)
    }

    /// Insert a record, allocating a page for the free-list if needed.
    pub fn insert_record(&self, pool: &mut BufferPool, bytes: &[u8]) -> DbResult<RecordId> {
        if bytes.len() != self.record_size as usize {
            return Err(RmStatus::RecordNotValid.into());
        }

        let mut file_header = self.read_file_header(pool)?;
        if file_header.first_free_page == PageNum::INVALID {
            let new_page = pool.allocate_page(self.file)?;
            let page_num = new_page.num;
            let page_header = RmPageHeader {
                next_free_page: PageNum::INVALID,
            };
            encode_fixed(&page_header, &mut new_page.data[..self.page_header_bytes]);
            pool.mark_dirty(self.file, page_num)?;
            pool.unpin_page(self.file, page_num)?;
            file_header.first_free_page = page_num;
            self.write_file_header(pool, &file_header)?;
        }

        let page_num = file_header.first_free_page;
        let page = pool.get_page(self.file, page_num)?;
        let bitmap_start = self.page_header_bytes;
        let bitmap_end = bitmap_start + bitmap_bytes(self.slots_per_page as usize);
        let slot_idx = first_zero_bit(&page.data[bitmap_start..bitmap_end], self.slots_per_page as usize)
            .ok_or(RmStatus::InconsistentBitmap)?;

        let off = self.slot_offset(slot_idx);
        page.data[off..off + self.record_size as usize].copy_from_slice(bytes);
        set_bit(&mut page.data[bitmap_start..bitmap_end], slot_idx);
        let now_full = is_full(&page.data[bitmap_start..bitmap_end], self.slots_per_page as usize);
        let page_header: RmPageHeader = decode_fixed(&page.data[..self.page_header_bytes]);
        pool.mark_dirty(self.file, page_num)?;
        pool.unpin_page(self.file, page_num)?;

        if now_full {
            let next_free = page_header.next_free_page;
            let cleared = RmPageHeader {
                next_free_page: PageNum::INVALID,
            };
            let full_page = pool.get_page(self.file, page_num)?;
            encode_fixed(&cleared, &mut full_page.data[..self.page_header_bytes]);
            pool.mark_dirty(self.file, page_num)?;
            pool.unpin_page(self.file, page_num)?;

            file_header.first_free_page = next_free;
            self.write_file_header(pool, &file_header)?;
        }

        log::debug!("inserted record at page {page_num:?} slot {}", slot_idx + 1);
        Ok(RecordId::new(page_num, SlotNum(slot_idx as u16 + 1)))
    }

    /// Overwrite the record in place. The RID is never reassigned.
    pub fn update_record(&self, pool: &mut BufferPool, rid: RecordId, bytes: &[u8]) -> DbResult<()> {
        if bytes.len() != self.record_size as usize {
            return Err(RmStatus::RecordNotValid.into());
        }
        self.validate_rid(rid)?;
        let slot_idx = rid.slot.0 as usize - 1;
        let page = pool.get_page(self.file, rid.page)?;
        let bitmap_start = self.page_header_bytes;
        let bitmap_end = bitmap_start + bitmap_bytes(self.slots_per_page as usize);
        if !bit_is_set(&page.data[bitmap_start..bitmap_end], slot_idx) {
            pool.unpin_page(self.file, rid.page)?;
            return Err(RmStatus::RecordNotValid.into());
        }
        let off = self.slot_offset(slot_idx);
        page.data[off..off + self.record_size as usize].copy_from_slice(bytes);
        pool.mark_dirty(self.file, rid.page)?;
        pool.unpin_page(self.file, rid.page)?;
        Ok(())
    }

    /// Clear the slot; if the page was full, push it to the head of the
    /// free list. Empty pages are never reclaimed back to PF.
    pub fn delete_record(&self, pool: &mut BufferPool, rid: RecordId) -> DbResult<()> {
        self.validate_rid(rid)?;
        let slot_idx = rid.slot.0 as usize - 1;
        let page = pool.get_page(self.file, rid.page)?;
        let bitmap_start = self.page_header_bytes;
        let bitmap_end = bitmap_start + bitmap_bytes(self.slots_per_page as usize);
        if !bit_is_set(&page.data[bitmap_start..bitmap_end], slot_idx) {
            pool.unpin_page(self.file, rid.page)?;
            return Err(RmStatus::RecordNotValid.into());
        }
        let was_full = is_full(&page.data[bitmap_start..bitmap_end], self.slots_per_page as usize);
        clear_bit(&mut page.data[bitmap_start..bitmap_end], slot_idx);
        pool.mark_dirty(self.file, rid.page)?;
        pool.unpin_page(self.file, rid.page)?;

        if was_full {
            let mut file_header = self.read_file_header(pool)?;
            let prev_head = file_header.first_free_page;
            let page = pool.get_page(self.file, rid.page)?;
            let linked = RmPageHeader {
                next_free_page: prev_head,
            };
            encode_fixed(&linked, &mut page.data[..self.page_header_bytes]);
            pool.mark_dirty(self.file, rid.page)?;
            pool.unpin_page(self.file, rid.page)?;

            file_header.first_free_page = rid.page;
            self.write_file_header(pool, &file_header)?;
        }
        log::debug!("deleted record at {rid:?}");
        Ok(())
    }

    /// Flush this file's dirty pages (or just one page) without closing it.
    pub fn force_pages(&self, pool: &mut BufferPool, page: Option<PageNum>) -> DbResult<()> {
        pool.force_pages(self.file, page)
    }

    pub fn record_size(&self) -> usize {
        self.record_size as usize
    }

    /// Open a scan over this file, optionally pushing an attribute
    /// comparison down into the page walk.
    pub fn scan(&self, condition: Option<ScanCondition>, keep_pinned: bool) -> RmFileScan {
        RmFileScan::new(*self, condition, keep_pinned)
    }
}

/// A single-attribute predicate pushed down into an [`RmFileScan`].
#[derive(Clone, Debug)]
pub struct ScanCondition {
    pub attr_type: AttrType,
    pub offset: usize,
    pub op: CompOp,
    pub value: Value,
}

impl ScanCondition {
    fn holds(&self, record: &[u8]) -> bool {
        if matches!(self.value, Value::Null) {
            return true; // NO_OP per spec: a null RHS never participates
        }
        let width = self.attr_type.width();
        let field = &record[self.offset..self.offset + width];
        let decoded = match Value::decode(&self.attr_type, field) {
            Ok(v) => v,
            Err(_) => return false,
        };
        match decoded.compare(&self.value) {
            Some(ordering) => self.op.holds(ordering),
            None => false,
        }
    }
}

enum ScanState {
    NotStarted,
    OnPage { page: PageNum, next_slot: u16, pinned: bool },
    Done,
}

/// Iterates live records of an `RmFileHandle` in page/slot order, pinning
/// at most one page at a time.
pub struct RmFileScan {
    handle: RmFileHandle,
    condition: Option<ScanCondition>,
    keep_pinned: bool,
    state: ScanState,
}

impl RmFileScan {
    fn new(handle: RmFileHandle, condition: Option<ScanCondition>, keep_pinned: bool) -> Self {
        Self {
            handle,
            condition,
            keep_pinned,
            state: ScanState::NotStarted,
        }
    }

    /// Fetch the next record satisfying the scan's condition, or
    /// `RmStatus::Eof` once the file is exhausted.
    pub fn next(&mut self, pool: &mut BufferPool) -> DbResult<(RecordId, Vec<u8>)> {
        loop {
            match self.state {
                ScanState::Done => return Err(RmStatus::Eof.into()),
                ScanState::NotStarted => {
                    match self.advance_page(pool, self.handle.header_page)? {
                        Some(page) => self.state = ScanState::OnPage {
                            page,
                            next_slot: 0,
                            pinned: true,
                        },
                        None => {
                            self.state = ScanState::Done;
                            return Err(RmStatus::Eof.into());
                        }
                    }
                }
                ScanState::OnPage { page, next_slot, pinned } => {
                    let data: &mut [u8] = if pinned {
                        pool.peek_page(self.handle.file, page)?
                    } else {
                        pool.get_page(self.handle.file, page)?.data
                    };
                    let bitmap_start = self.handle.page_header_bytes;
                    let bitmap_end = bitmap_start + bitmap_bytes(self.handle.slots_per_page as usize);
                    let mut found = None;
                    for slot_idx in next_slot as usize..self.handle.slots_per_page as usize {
                        if !bit_is_set(&data[bitmap_start..bitmap_end], slot_idx) {
                            continue;
                        }
                        let off = self.handle.slot_offset(slot_idx);
                        let record = &data[off..off + self.handle.record_size as usize];
                        let matches = self
                            .condition
                            .as_ref()
                            .map(|c| c.holds(record))
                            .unwrap_or(true);
                        if matches {
                            found = Some((slot_idx, record.to_vec()));
                            break;
                        }
                    }

                    match found {
                        Some((slot_idx, bytes)) => {
                            let rid = RecordId::new(page, SlotNum(slot_idx as u16 + 1));
                            if self.keep_pinned {
                                self.state = ScanState::OnPage {
                                    page,
                                    next_slot: slot_idx as u16 + 1,
                                    pinned: true,
                                };
                            } else {
                                pool.unpin_page(self.handle.file, page)?;
                                self.state = ScanState::OnPage {
                                    page,
                                    next_slot: slot_idx as u16 + 1,
                                    pinned: false,
                                };
                            }
                            return Ok((rid, bytes));
                        }
                        None => {
                            pool.unpin_page(self.handle.file, page)?;
                            match self.advance_page(pool, page)? {
                                Some(next_page) => {
                                    self.state = ScanState::OnPage {
                                        page: next_page,
                                        next_slot: 0,
                                        pinned: true,
                                    };
                                }
                                None => {
                                    self.state = ScanState::Done;
                                    return Err(RmStatus::Eof.into());
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Returns the next page after `after` (pinned), `None` at true EOF.
    /// Any other error (I/O failure, file closed mid-scan, ...) propagates
    /// instead of being mistaken for end-of-scan.
    fn advance_page(&self, pool: &mut BufferPool, after: PageNum) -> DbResult<Option<PageNum>> {
        match pool.get_next_page(self.handle.file, after) {
            Ok(p) => Ok(Some(p.num)),
            Err(DbError::Pf(PfStatus::Eof)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Close the scan, unpinning any page still held.
    pub fn close(&mut self, pool: &mut BufferPool) -> DbResult<()> {
        if let ScanState::OnPage { page, pinned: true, .. } = self.state {
            pool.unpin_page(self.handle.file, page)?;
        }
        self.state = ScanState::Done;
        Ok(())
    }
}

//! Index manager (IX): a disk-based B+-tree per indexed attribute, with
//! bucket overflow for duplicate keys.
//!
//! Built directly on [`buffer::BufferPool`], following the same layering
//! `storage::RmFileHandle` uses one level down: every node lives in exactly
//! one page, addressed through the pool so pinning/eviction stays PF's job.

mod node;
#[cfg(test)]
mod tests;

use std::cmp::Ordering;
use std::path::Path;

use buffer::{BufferPool, FileId};
use common::{DbResult, IxStatus, PageNum, RecordId};
use types::{AttrType, CompOp, Value};

pub use node::{Bucket, EntryValue, Node};

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::legacy()
}

fn encode_to_page<T: serde::Serialize>(value: &T, page: &mut [u8]) {
    let bytes = bincode::serde::encode_to_vec(value, bincode_config())
        .expect("node/bucket encodes to bytes");
    assert!(
        bytes.len() <= page.len(),
        "node/bucket ({} bytes) does not fit in a page ({} bytes) — capacity estimate was too generous",
        bytes.len(),
        page.len()
    );
    page[..bytes.len()].copy_from_slice(&bytes);
}

fn decode_from_page<T: serde::de::DeserializeOwned>(page: &[u8]) -> T {
    bincode::serde::decode_from_slice(page, bincode_config())
        .expect("page holds bytes written by encode_to_page with the same type")
        .0
}

/// The IX file's own header, stored at the fixed page `PageNum(1)` (page 0
/// stays PF's own bookkeeping, exactly as `storage::RmFileHandle` does).
#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
struct IxFileHeader {
    attr_type: AttrTypeWire,
    root_page: PageNum,
    capacity: u16,
}

/// `AttrType` doesn't implement `Default`, which the fixed-header encoding
/// helper requires; this thin wrapper supplies one.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
struct AttrTypeWire(AttrType);

impl Default for AttrTypeWire {
    fn default() -> Self {
        AttrTypeWire(AttrType::Int)
    }
}

fn header_width() -> usize {
    bincode::serde::encode_to_vec(&IxFileHeader::default(), bincode_config())
        .expect("default header encodes")
        .len()
        + 64 // headroom: AttrType::Str(n) encodes larger than the Int default
}

/// Compute the largest per-node key/child count that keeps a worst-case
/// node's serialized size within one page, by trial encoding exactly as
/// `storage::slots_per_page` tries slot counts until one overflows.
fn compute_capacity(page_size: usize, attr: AttrType) -> u16 {
    let width = attr.width();
    let mut n: usize = 2;
    loop {
        let probe_leaf = Node::Leaf {
            parent: PageNum::INVALID,
            next: PageNum::INVALID,
            entries: (0..=n)
                .map(|i| (vec![0xFFu8; width], EntryValue::Bucket(PageNum(i as u32))))
                .collect(),
        };
        let probe_internal = Node::Internal {
            parent: PageNum::INVALID,
            keys: (0..=n).map(|_| vec![0xFFu8; width]).collect(),
            children: (0..=(n + 1)).map(|i| PageNum(i as u32)).collect(),
        };
        let leaf_len = bincode::serde::encode_to_vec(&probe_leaf, bincode_config())
            .map(|v| v.len())
            .unwrap_or(usize::MAX);
        let internal_len = bincode::serde::encode_to_vec(&probe_internal, bincode_config())
            .map(|v| v.len())
            .unwrap_or(usize::MAX);
        if leaf_len > page_size || internal_len > page_size {
            break;
        }
        n += 1;
    }
    (n.max(3) - 1) as u16
}

fn encode_key(attr: &AttrType, value: &Value) -> DbResult<Vec<u8>> {
    let mut buf = vec![0u8; attr.width()];
    value.encode_into(attr, &mut buf)?;
    Ok(buf)
}

fn rid_key(r: RecordId) -> (u32, u16) {
    (r.page.0, r.slot.0)
}

/// An open index file: one B+-tree over a single attribute.
///
/// Cheap to copy: every field is a small fixed-size descriptor, so a scan
/// can hold its own copy rather than borrowing one, avoiding a
/// self-referential lifetime for QL operators that must outlive a single
/// call.
#[derive(Clone, Copy)]
pub struct IxFileHandle {
    file: FileId,
    attr: AttrType,
    root_page: PageNum,
    capacity: u16,
    header_width: usize,
}

impl IxFileHandle {
    fn decode_key(&self, bytes: &[u8]) -> Value {
        Value::decode(&self.attr, bytes).expect("index key bytes match the header's attribute type")
    }

    fn key_cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.decode_key(a)
            .compare(&self.decode_key(b))
            .expect("index keys are never Null")
    }

    fn read_node(&self, pool: &mut BufferPool, page: PageNum) -> DbResult<Node> {
        let p = pool.get_page(self.file, page)?;
        let node = decode_from_page(p.data);
        pool.unpin_page(self.file, page)?;
        Ok(node)
    }

    fn write_node(&self, pool: &mut BufferPool, page: PageNum, node: &Node) -> DbResult<()> {
        let p = pool.get_page(self.file, page)?;
        encode_to_page(node, p.data);
        pool.mark_dirty(self.file, page)?;
        pool.unpin_page(self.file, page)?;
        Ok(())
    }

    fn read_bucket(&self, pool: &mut BufferPool, page: PageNum) -> DbResult<Bucket> {
        let p = pool.get_page(self.file, page)?;
        let bucket = decode_from_page(p.data);
        pool.unpin_page(self.file, page)?;
        Ok(bucket)
    }

    fn write_bucket(&self, pool: &mut BufferPool, page: PageNum, bucket: &Bucket) -> DbResult<()> {
        let p = pool.get_page(self.file, page)?;
        encode_to_page(bucket, p.data);
        pool.mark_dirty(self.file, page)?;
        pool.unpin_page(self.file, page)?;
        Ok(())
    }

    fn set_parent(&self, pool: &mut BufferPool, child: PageNum, parent: PageNum) -> DbResult<()> {
        let mut node = self.read_node(pool, child)?;
        node.set_parent(parent);
        self.write_node(pool, child, &node)
    }

    fn write_header(&self, pool: &mut BufferPool) -> DbResult<()> {
        let header = IxFileHeader {
            attr_type: AttrTypeWire(self.attr),
            root_page: self.root_page,
            capacity: self.capacity,
        };
        let p = pool.get_page(self.file, PageNum(1))?;
        encode_to_page(&header, &mut p.data[..self.header_width]);
        pool.mark_dirty(self.file, PageNum(1))?;
        pool.unpin_page(self.file, PageNum(1))?;
        Ok(())
    }

    /// Create a new, empty index file over `attr`.
    pub fn create(pool: &mut BufferPool, path: &Path, attr: AttrType) -> DbResult<Self> {
        let capacity = compute_capacity(pool.page_size(), attr);
        let header_width = header_width();
        let file = pool.create(path)?;

        let header_page = pool.allocate_page(file)?;
        let header_page_num = header_page.num;

        let root_page = pool.allocate_page(file)?;
        let root_page_num = root_page.num;
        encode_to_page(&Node::new_root_leaf(), root_page.data);
        pool.mark_dirty(file, root_page_num)?;
        pool.unpin_page(file, root_page_num)?;

        let handle = Self {
            file,
            attr,
            root_page: root_page_num,
            capacity,
            header_width,
        };
        let header = IxFileHeader {
            attr_type: AttrTypeWire(attr),
            root_page: root_page_num,
            capacity,
        };
        encode_to_page(&header, &mut pool.get_page(file, header_page_num)?.data[..header_width]);
        pool.mark_dirty(file, header_page_num)?;
        pool.unpin_page(file, header_page_num)?;

        log::debug!("created IX file {path:?}: attr={attr:?} capacity={capacity}");
        Ok(handle)
    }

    /// Open an existing index file, reading its header.
    pub fn open(pool: &mut BufferPool, path: &Path) -> DbResult<Self> {
        let file = pool.open(path)?;
        let header_width = header_width();
        let p = pool.get_page(file, PageNum(1))?;
        let header: IxFileHeader = decode_from_page(&p.data[..header_width]);
        pool.unpin_page(file, PageNum(1))?;
        Ok(Self {
            file,
            attr: header.attr_type.0,
            root_page: header.root_page,
            capacity: header.capacity,
            header_width,
        })
    }

    /// Flush and close the underlying paged file.
    pub fn close(self, pool: &mut BufferPool) -> DbResult<()> {
        pool.force_pages(self.file, None)?;
        pool.close(self.file)
    }

    pub fn force_pages(&self, pool: &mut BufferPool) -> DbResult<()> {
        pool.force_pages(self.file, None)
    }

    /// Insert `(key, rid)`. Fails with [`IxStatus::EntryExists`] if the exact
    /// pair is already present.
    pub fn insert_entry(&mut self, pool: &mut BufferPool, key: &Value, rid: RecordId) -> DbResult<()> {
        let key_bytes = encode_key(&self.attr, key)?;
        if let Some((sep, new_child)) = self.insert_into(pool, self.root_page, &key_bytes, rid)? {
            let new_root = pool.allocate_page(self.file)?;
            let new_root_num = new_root.num;
            let node = Node::Internal {
                parent: PageNum::INVALID,
                keys: vec![sep],
                children: vec![self.root_page, new_child],
            };
            encode_to_page(&node, new_root.data);
            pool.mark_dirty(self.file, new_root_num)?;
            pool.unpin_page(self.file, new_root_num)?;

            self.set_parent(pool, self.root_page, new_root_num)?;
            self.set_parent(pool, new_child, new_root_num)?;
            self.root_page = new_root_num;
            self.write_header(pool)?;
            log::debug!("root split: new root {new_root_num:?}");
        }
        Ok(())
    }

    /// Returns `Some((separator_key, new_right_page))` if `page` split and
    /// its parent must absorb a new child.
    fn insert_into(
        &mut self,
        pool: &mut BufferPool,
        page: PageNum,
        key: &[u8],
        rid: RecordId,
    ) -> DbResult<Option<(Vec<u8>, PageNum)>> {
        let mut node = self.read_node(pool, page)?;
        match &mut node {
            Node::Internal { keys, children, .. } => {
                let idx = keys
                    .iter()
                    .position(|k| self.key_cmp(key, k) == Ordering::Less)
                    .unwrap_or(keys.len());
                let child = children[idx];
                let split = self.insert_into(pool, child, key, rid)?;
                if let Some((sep, new_child)) = split {
                    keys.insert(idx, sep);
                    children.insert(idx + 1, new_child);
                    self.set_parent(pool, new_child, page)?;

                    if keys.len() as u16 > self.capacity {
                        let mid = keys.len() / 2;
                        let sep_up = keys[mid].clone();
                        let right_keys = keys.split_off(mid + 1);
                        keys.pop(); // drop sep_up, already promoted
                        let right_children = children.split_off(mid + 1);

                        let right_page = pool.allocate_page(self.file)?;
                        let right_num = right_page.num;
                        let right_node = Node::Internal {
                            parent: PageNum::INVALID,
                            keys: right_keys,
                            children: right_children.clone(),
                        };
                        encode_to_page(&right_node, right_page.data);
                        pool.mark_dirty(self.file, right_num)?;
                        pool.unpin_page(self.file, right_num)?;
                        for c in &right_children {
                            self.set_parent(pool, *c, right_num)?;
                        }
                        self.write_node(pool, page, &node)?;
                        return Ok(Some((sep_up, right_num)));
                    }
                }
                self.write_node(pool, page, &node)?;
                Ok(None)
            }
            Node::Leaf { entries, next, parent } => {
                match entries.binary_search_by(|(k, _)| self.key_cmp(k, key)) {
                    Ok(i) => {
                        match &entries[i].1 {
                            EntryValue::Rid(existing) => {
                                if *existing == rid {
                                    return Err(IxStatus::EntryExists.into());
                                }
                                let existing = *existing;
                                let bucket_page = pool.allocate_page(self.file)?;
                                let bucket_num = bucket_page.num;
                                let bucket = Bucket {
                                    rids: vec![existing, rid],
                                    next: PageNum::INVALID,
                                };
                                encode_to_page(&bucket, bucket_page.data);
                                pool.mark_dirty(self.file, bucket_num)?;
                                pool.unpin_page(self.file, bucket_num)?;
                                entries[i].1 = EntryValue::Bucket(bucket_num);
                            }
                            EntryValue::Bucket(bp) => {
                                self.bucket_append(pool, *bp, rid)?;
                            }
                        }
                        self.write_node(pool, page, &node)?;
                        Ok(None)
                    }
                    Err(i) => {
                        entries.insert(i, (key.to_vec(), EntryValue::Rid(rid)));
                        if entries.len() as u16 > self.capacity {
                            let mid = entries.len() / 2;
                            let right_entries = entries.split_off(mid);
                            let sep = right_entries[0].0.clone();
                            let old_next = *next;
                            let right_page = pool.allocate_page(self.file)?;
                            let right_num = right_page.num;
                            let right_node = Node::Leaf {
                                parent: *parent,
                                next: old_next,
                                entries: right_entries,
                            };
                            encode_to_page(&right_node, right_page.data);
                            pool.mark_dirty(self.file, right_num)?;
                            pool.unpin_page(self.file, right_num)?;
                            *next = right_num;
                            self.write_node(pool, page, &node)?;
                            return Ok(Some((sep, right_num)));
                        }
                        self.write_node(pool, page, &node)?;
                        Ok(None)
                    }
                }
            }
        }
    }

    fn bucket_append(&self, pool: &mut BufferPool, head: PageNum, rid: RecordId) -> DbResult<()> {
        let mut page = head;
        loop {
            let mut bucket = self.read_bucket(pool, page)?;
            if bucket.rids.contains(&rid) {
                return Err(IxStatus::EntryExists.into());
            }
            if bucket.next == PageNum::INVALID {
                let mut candidate = bucket.clone();
                candidate.rids.push(rid);
                let fits = bincode::serde::encode_to_vec(&candidate, bincode_config())
                    .map(|b| b.len() <= pool.page_size())
                    .unwrap_or(false);
                if fits {
                    bucket.rids.push(rid);
                    self.write_bucket(pool, page, &bucket)?;
                } else {
                    let overflow_page = pool.allocate_page(self.file)?;
                    let overflow_num = overflow_page.num;
                    let overflow = Bucket {
                        rids: vec![rid],
                        next: PageNum::INVALID,
                    };
                    encode_to_page(&overflow, overflow_page.data);
                    pool.mark_dirty(self.file, overflow_num)?;
                    pool.unpin_page(self.file, overflow_num)?;
                    bucket.next = overflow_num;
                    self.write_bucket(pool, page, &bucket)?;
                }
                return Ok(());
            }
            page = bucket.next;
        }
    }

    fn bucket_rids(&self, pool: &mut BufferPool, head: PageNum) -> DbResult<Vec<RecordId>> {
        let mut out = Vec::new();
        let mut page = head;
        loop {
            let bucket = self.read_bucket(pool, page)?;
            out.extend(bucket.rids);
            if bucket.next == PageNum::INVALID {
                break;
            }
            page = bucket.next;
        }
        Ok(out)
    }

    /// Delete the exact `(key, rid)` pair.
    pub fn delete_entry(&mut self, pool: &mut BufferPool, key: &Value, rid: RecordId) -> DbResult<()> {
        let key_bytes = encode_key(&self.attr, key)?;
        let leaf_page = self.descend_to_leaf(pool, &key_bytes)?;
        let mut node = self.read_node(pool, leaf_page)?;
        let Node::Leaf { entries, .. } = &mut node else {
            unreachable!("descend_to_leaf always returns a leaf page");
        };
        let idx = entries
            .binary_search_by(|(k, _)| self.key_cmp(k, &key_bytes))
            .map_err(|_| IxStatus::DeleteEntryNotFound)?;

        let remove_entry = match &entries[idx].1 {
            EntryValue::Rid(r) => {
                if *r != rid {
                    return Err(IxStatus::DeleteEntryNotFound.into());
                }
                true
            }
            EntryValue::Bucket(bp) => {
                let bp = *bp;
                if !self.bucket_remove(pool, bp, rid)? {
                    return Err(IxStatus::DeleteEntryNotFound.into());
                }
                false
            }
        };
        if remove_entry {
            entries.remove(idx);
        }
        self.write_node(pool, leaf_page, &node)?;

        // An emptied leaf is left in the tree rather than deallocated: a
        // scan may still be parked on it (`IxScan::current_leaf`), and
        // deallocating out from under a live cursor would hand the next
        // `read_node` a disposed page's free-list link instead of a node.
        // Spec §9 permits leaves left sparse so long as searches still
        // work; an empty leaf is still found by descent and simply yields
        // no entries before the scan follows its `next` pointer onward.
        log::debug!("deleted entry at leaf {leaf_page:?}");
        Ok(())
    }

    /// Remove `rid` from a bucket chain. Returns whether it was found.
    fn bucket_remove(&self, pool: &mut BufferPool, head: PageNum, rid: RecordId) -> DbResult<bool> {
        let mut page = head;
        loop {
            let mut bucket = self.read_bucket(pool, page)?;
            if let Some(pos) = bucket.rids.iter().position(|r| *r == rid) {
                bucket.rids.remove(pos);
                self.write_bucket(pool, page, &bucket)?;
                return Ok(true);
            }
            if bucket.next == PageNum::INVALID {
                return Ok(false);
            }
            page = bucket.next;
        }
    }

    fn leftmost_leaf(&self, pool: &mut BufferPool, mut page: PageNum) -> DbResult<PageNum> {
        loop {
            let node = self.read_node(pool, page)?;
            match node {
                Node::Leaf { .. } => return Ok(page),
                Node::Internal { children, .. } => page = children[0],
            }
        }
    }

    /// Descend to the leaf that would contain `key_bytes`.
    fn descend_to_leaf(&self, pool: &mut BufferPool, key_bytes: &[u8]) -> DbResult<PageNum> {
        let mut page = self.root_page;
        loop {
            let node = self.read_node(pool, page)?;
            match node {
                Node::Leaf { .. } => return Ok(page),
                Node::Internal { keys, children, .. } => {
                    let idx = keys
                        .iter()
                        .position(|k| self.key_cmp(key_bytes, k) == Ordering::Less)
                        .unwrap_or(keys.len());
                    page = children[idx];
                }
            }
        }
    }

    /// Open a scan. `value` is ignored for [`CompOp::NoOp`].
    pub fn scan(&self, op: CompOp, value: Value) -> IxScan {
        IxScan {
            handle: *self,
            op,
            value,
            started: false,
            current_leaf: PageNum::INVALID,
            last_key: None,
            last_rid: None,
            done: false,
        }
    }
}

/// Iterates matching `(key, rid)` pairs in key order, buckets exhausting
/// before the cursor advances to the next key. Re-derives its position from
/// the last returned `(key, rid)` on every call rather than caching a slot
/// index, so a concurrent delete of the just-returned entry (the QL layer's
/// delete-under-scan pattern) cannot skip a sibling.
pub struct IxScan {
    handle: IxFileHandle,
    op: CompOp,
    value: Value,
    started: bool,
    current_leaf: PageNum,
    last_key: Option<Vec<u8>>,
    last_rid: Option<(u32, u16)>,
    done: bool,
}

impl IxScan {
    pub fn next(&mut self, pool: &mut BufferPool) -> DbResult<(Value, RecordId)> {
        if self.done {
            return Err(IxStatus::Eof.into());
        }
        if !self.started {
            self.started = true;
            self.current_leaf = self.start_leaf(pool)?;
        }

        loop {
            let node = self.handle.read_node(pool, self.current_leaf)?;
            let Node::Leaf { entries, next, .. } = node else {
                unreachable!("scan cursor always sits on a leaf")
            };

            let after = |k: &[u8], r: Option<(u32, u16)>| -> bool {
                match &self.last_key {
                    None => true,
                    Some(lk) => match self.handle.key_cmp(k, lk) {
                        Ordering::Greater => true,
                        Ordering::Less => false,
                        Ordering::Equal => match (r, self.last_rid) {
                            (Some(r), Some(lr)) => r > lr,
                            _ => false,
                        },
                    },
                }
            };

            let mut picked = None;
            'entries: for (key, val) in entries.iter() {
                match val {
                    EntryValue::Rid(r) => {
                        if after(key, Some(rid_key(*r))) {
                            picked = Some((key.clone(), vec![*r]));
                            break 'entries;
                        }
                    }
                    EntryValue::Bucket(bp) => {
                        let rids = self.handle.bucket_rids(pool, *bp)?;
                        let mut remaining: Vec<_> = rids
                            .into_iter()
                            .filter(|r| after(key, Some(rid_key(*r))))
                            .collect();
                        if !remaining.is_empty() {
                            remaining.sort_by_key(|r| rid_key(*r));
                            picked = Some((key.clone(), remaining));
                            break 'entries;
                        }
                    }
                }
            }

            if let Some((key, rids)) = picked {
                let decoded = self.handle.decode_key(&key);
                let ordering = decoded.compare(&self.value).unwrap_or(Ordering::Greater);
                let stop_ascending =
                    matches!(self.op, CompOp::Lt | CompOp::Le) && !self.op.holds(ordering);
                if stop_ascending {
                    self.done = true;
                    return Err(IxStatus::Eof.into());
                }
                if matches!(self.op, CompOp::Eq) && ordering != Ordering::Equal {
                    self.done = true;
                    return Err(IxStatus::Eof.into());
                }
                let rid = rids[0];
                self.last_key = Some(key);
                self.last_rid = Some(rid_key(rid));
                if self.op.holds(ordering) {
                    return Ok((decoded, rid));
                }
                continue; // NoOp/Ne entry didn't match the pushed value: keep advancing
            }

            if next == PageNum::INVALID {
                self.done = true;
                return Err(IxStatus::Eof.into());
            }
            self.current_leaf = next;
            self.last_key = None;
            self.last_rid = None;
        }
    }

    fn start_leaf(&self, pool: &mut BufferPool) -> DbResult<PageNum> {
        match self.op {
            CompOp::NoOp | CompOp::Lt | CompOp::Le | CompOp::Ne => {
                self.handle.leftmost_leaf(pool, self.handle.root_page)
            }
            CompOp::Eq | CompOp::Gt | CompOp::Ge => {
                let key_bytes = encode_key(&self.handle.attr, &self.value)?;
                self.handle.descend_to_leaf(pool, &key_bytes)
            }
        }
    }

    pub fn close(&mut self) {
        self.done = true;
    }
}

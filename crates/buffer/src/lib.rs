//! Paged-file layer: translates `(file, page-number)` requests into memory
//! buffers, caps memory use at a configured number of frames, and preserves
//! dirty pages to disk on eviction or force.
//!
//! Every page is either pinned (held by exactly one caller chain, pin count
//! >= 1) or a candidate for eviction. Replacement walks an LRU queue of
//! unpinned frames only; attempting to evict while every frame is pinned is
//! a hard error.

#[cfg(test)]
mod tests;

use common::pretty::{render_string_table, TableStyleKind};
use common::{DbResult, PageNum, PfStatus};
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Opaque handle to a file opened through a [`BufferPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileId(u32);

struct OpenFile {
    handle: File,
    path: PathBuf,
    page_size: usize,
    page_count: u32,
    first_free_page: PageNum,
}

impl OpenFile {
    /// Page 0 holds `{ page_count: u32, first_free_page: u32 }` as the
    /// first 8 bytes, zero-padded to `page_size`.
    fn header_bytes(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.page_count.to_le_bytes());
        buf[4..8].copy_from_slice(&self.first_free_page.0.to_le_bytes());
    }

    fn read_header(page_size: usize, handle: &mut File) -> std::io::Result<(u32, PageNum)> {
        let mut buf = vec![0u8; page_size];
        handle.seek(SeekFrom::Start(0))?;
        handle.read_exact(&mut buf)?;
        let page_count = u32::from_le_bytes(buf[..4].try_into().unwrap());
        let first_free_page = PageNum(u32::from_le_bytes(buf[4..8].try_into().unwrap()));
        Ok((page_count, first_free_page))
    }

    fn write_header(&mut self) -> std::io::Result<()> {
        let mut buf = vec![0u8; self.page_size];
        self.header_bytes(&mut buf);
        self.handle.seek(SeekFrom::Start(0))?;
        self.handle.write_all(&buf)?;
        Ok(())
    }

    fn page_offset(&self, page: PageNum) -> u64 {
        page.0 as u64 * self.page_size as u64
    }
}

struct Frame {
    key: Option<(FileId, PageNum)>,
    data: Vec<u8>,
    pin_count: u32,
    dirty: bool,
}

/// A pinned page on loan from the pool. Holding one keeps the underlying
/// frame's `pin_count` above zero for as long as the borrow lives; call
/// [`BufferPool::unpin_page`] with the same `(file, num)` once done with it.
pub struct PageRef<'a> {
    pub num: PageNum,
    pub data: &'a mut [u8],
}

/// Fixed-capacity pool of page frames shared by every open file.
pub struct BufferPool {
    frames: Vec<Frame>,
    free_frames: Vec<usize>,
    directory: HashMap<(FileId, PageNum), usize>,
    lru: VecDeque<usize>,
    files: HashMap<FileId, OpenFile>,
    next_file_id: u32,
    page_size: usize,
}

impl BufferPool {
    /// The fixed page size every file in this pool is read/written with.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn new(capacity: usize, page_size: usize) -> Self {
        assert!(capacity > 0, "buffer pool capacity must be > 0");
        let frames = (0..capacity)
            .map(|_| Frame {
                key: None,
                data: vec![0u8; page_size],
                pin_count: 0,
                dirty: false,
            })
            .collect();
        Self {
            frames,
            free_frames: (0..capacity).rev().collect(),
            directory: HashMap::new(),
            lru: VecDeque::new(),
            files: HashMap::new(),
            next_file_id: 0,
            page_size,
        }
    }

    /// Create a new paged file with a zeroed page-0 header. Fails if a file
    /// already exists at `path`.
    pub fn create(&mut self, path: &Path) -> DbResult<FileId> {
        let handle = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        let id = FileId(self.next_file_id);
        self.next_file_id += 1;
        let mut file = OpenFile {
            handle,
            path: path.to_path_buf(),
            page_size: self.page_size,
            page_count: 1,
            first_free_page: PageNum::INVALID,
        };
        file.write_header()?;
        log::debug!("created paged file {path:?} as {id:?}");
        self.files.insert(id, file);
        Ok(id)
    }

    /// Open an existing paged file, reading its page-0 header.
    pub fn open(&mut self, path: &Path) -> DbResult<FileId> {
        let mut handle = OpenOptions::new().read(true).write(true).open(path)?;
        let (page_count, first_free_page) = OpenFile::read_header(self.page_size, &mut handle)?;
        let id = FileId(self.next_file_id);
        self.next_file_id += 1;
        self.files.insert(
            id,
            OpenFile {
                handle,
                path: path.to_path_buf(),
                page_size: self.page_size,
                page_count,
                first_free_page,
            },
        );
        log::debug!("opened paged file {path:?} as {id:?} ({page_count} pages)");
        Ok(id)
    }

    /// Close a file: fails if any of its pages are still pinned. Flushes
    /// every dirty page and the header first.
    pub fn close(&mut self, file: FileId) -> DbResult<()> {
        let any_pinned = self
            .directory
            .iter()
            .filter(|((f, _), _)| *f == file)
            .any(|(_, &idx)| self.frames[idx].pin_count > 0);
        if any_pinned {
            return Err(PfStatus::PagesStillPinned.into());
        }
        self.force_pages(file, None)?;

        let keys: Vec<_> = self
            .directory
            .keys()
            .filter(|(f, _)| *f == file)
            .copied()
            .collect();
        for key in keys {
            let idx = self.directory.remove(&key).unwrap();
            self.frames[idx].key = None;
            self.free_frames.push(idx);
            self.lru.retain(|&i| i != idx);
        }
        self.files
            .remove(&file)
            .ok_or(PfStatus::FileNotOpen)?;
        Ok(())
    }

    /// Allocate a new page, pinned and zero-initialised. Reuses a disposed
    /// page number from the file's free list if one is available.
    pub fn allocate_page(&mut self, file: FileId) -> DbResult<PageRef<'_>> {
        let page_size = self.page_size;
        let reused = {
            let f = self.files.get(&file).ok_or(PfStatus::FileNotOpen)?;
            f.first_free_page
        };

        // The free-list link lives in the disposed page's own (possibly
        // still-dirty, not-yet-flushed) buffer, so read it through the pool
        // rather than going straight to disk.
        let (page_num, idx) = if reused != PageNum::INVALID {
            let idx = self.frame_for(file, reused, false)?;
            let next_free = PageNum(u32::from_le_bytes(
                self.frames[idx].data[..4].try_into().unwrap(),
            ));
            let f = self.files.get_mut(&file).ok_or(PfStatus::FileNotOpen)?;
            f.first_free_page = next_free;
            f.write_header()?;
            (reused, idx)
        } else {
            let f = self.files.get_mut(&file).ok_or(PfStatus::FileNotOpen)?;
            let num = PageNum(f.page_count);
            f.page_count += 1;
            f.write_header()?;
            let idx = self.frame_for(file, num, true)?;
            (num, idx)
        };

        self.frames[idx].data.fill(0);
        self.frames[idx].data.resize(page_size, 0);
        self.frames[idx].dirty = true;
        log::debug!("allocated page {page_num:?} in {file:?}");
        Ok(PageRef {
            num: page_num,
            data: &mut self.frames[idx].data,
        })
    }

    /// Load, pin, and return the requested page.
    pub fn get_page(&mut self, file: FileId, page: PageNum) -> DbResult<PageRef<'_>> {
        {
            let f = self.files.get(&file).ok_or(PfStatus::FileNotOpen)?;
            if page.0 >= f.page_count {
                return Err(PfStatus::InvalidPageNumber(page).into());
            }
        }
        let idx = self.frame_for(file, page, false)?;
        Ok(PageRef {
            num: page,
            data: &mut self.frames[idx].data,
        })
    }

    /// Borrow the data of a page that the caller already holds pinned,
    /// without touching its pin count. Errors if the page isn't resident.
    pub fn peek_page(&mut self, file: FileId, page: PageNum) -> DbResult<&mut [u8]> {
        let idx = *self
            .directory
            .get(&(file, page))
            .ok_or(PfStatus::PageNotInFile(page))?;
        Ok(&mut self.frames[idx].data)
    }

    /// Return the lowest-numbered live (non-disposed) page, or
    /// `PfStatus::Eof` if the file has none past the header page.
    pub fn get_first_page(&mut self, file: FileId) -> DbResult<PageRef<'_>> {
        self.get_next_from(file, PageNum(0))
    }

    /// Return the lowest-numbered live page after `after`, skipping pages
    /// disposed since the last scan.
    pub fn get_next_page(&mut self, file: FileId, after: PageNum) -> DbResult<PageRef<'_>> {
        self.get_next_from(file, PageNum(after.0 + 1))
    }

    fn get_next_from(&mut self, file: FileId, start: PageNum) -> DbResult<PageRef<'_>> {
        let page_count = self.files.get(&file).ok_or(PfStatus::FileNotOpen)?.page_count;
        let mut candidate = start.0.max(1);
        while candidate < page_count {
            let p = PageNum(candidate);
            if !self.is_disposed(file, p)? {
                return self.get_page(file, p);
            }
            candidate += 1;
        }
        Err(PfStatus::Eof.into())
    }

    /// Walk PF's disposed-page free list, reading each link through the
    /// pool so an in-memory, not-yet-flushed link is still seen.
    fn is_disposed(&mut self, file: FileId, page: PageNum) -> DbResult<bool> {
        let mut next = self.files.get(&file).ok_or(PfStatus::FileNotOpen)?.first_free_page;
        while next != PageNum::INVALID {
            if next == page {
                return Ok(true);
            }
            let idx = self.frame_for(file, next, false)?;
            let link = PageNum(u32::from_le_bytes(self.frames[idx].data[..4].try_into().unwrap()));
            self.unpin_page(file, next)?;
            next = link;
        }
        Ok(false)
    }

    /// Mark a disposed (deallocated) page for later reuse by `allocate_page`.
    /// PF's own free list is separate from any free list RM keeps inside
    /// page content: the disposed page's first 4 bytes store the previous
    /// free-list head, forming a singly-linked chain off the file header.
    pub fn dispose_page(&mut self, file: FileId, page: PageNum) -> DbResult<()> {
        let prev_head = {
            let f = self.files.get(&file).ok_or(PfStatus::FileNotOpen)?;
            f.first_free_page
        };
        {
            let idx = self.frame_for(file, page, false)?;
            self.frames[idx].data[..4].copy_from_slice(&prev_head.0.to_le_bytes());
            self.frames[idx].dirty = true;
        }
        self.unpin_page(file, page)?;
        let f = self.files.get_mut(&file).ok_or(PfStatus::FileNotOpen)?;
        f.first_free_page = page;
        f.write_header()?;
        log::debug!("disposed page {page:?} in {file:?}");
        Ok(())
    }

    /// Mark the frame holding `(file, page)` dirty.
    pub fn mark_dirty(&mut self, file: FileId, page: PageNum) -> DbResult<()> {
        let idx = *self
            .directory
            .get(&(file, page))
            .ok_or(PfStatus::PageNotInFile(page))?;
        self.frames[idx].dirty = true;
        Ok(())
    }

    /// Decrement the pin count of `(file, page)`. Once it reaches zero the
    /// frame becomes an eviction candidate.
    pub fn unpin_page(&mut self, file: FileId, page: PageNum) -> DbResult<()> {
        let idx = *self
            .directory
            .get(&(file, page))
            .ok_or(PfStatus::PageNotInFile(page))?;
        let frame = &mut self.frames[idx];
        if frame.pin_count == 0 {
            return Err(PfStatus::PageNotInFile(page).into());
        }
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.lru.push_back(idx);
        }
        Ok(())
    }

    /// Write every dirty page of `file` to disk (or just `page` if given).
    pub fn force_pages(&mut self, file: FileId, page: Option<PageNum>) -> DbResult<()> {
        let keys: Vec<_> = self
            .directory
            .iter()
            .filter(|((f, p), _)| *f == file && page.map_or(true, |target| *p == target))
            .map(|(k, &idx)| (*k, idx))
            .collect();
        for ((_, p), idx) in keys {
            if self.frames[idx].dirty {
                self.write_through(file, p, idx)?;
                self.frames[idx].dirty = false;
            }
        }
        Ok(())
    }

    fn write_through(&mut self, file: FileId, page: PageNum, idx: usize) -> DbResult<()> {
        let f = self.files.get_mut(&file).ok_or(PfStatus::FileNotOpen)?;
        f.handle.seek(SeekFrom::Start(f.page_offset(page)))?;
        f.handle.write_all(&self.frames[idx].data)?;
        Ok(())
    }

    /// Find (loading if necessary) the frame for `(file, page)` and pin it.
    fn frame_for(&mut self, file: FileId, page: PageNum, fresh: bool) -> DbResult<usize> {
        if let Some(&idx) = self.directory.get(&(file, page)) {
            self.frames[idx].pin_count += 1;
            self.lru.retain(|&i| i != idx);
            return Ok(idx);
        }

        let idx = self.claim_frame()?;
        if !fresh {
            let f = self.files.get_mut(&file).ok_or(PfStatus::FileNotOpen)?;
            f.handle.seek(SeekFrom::Start(f.page_offset(page)))?;
            f.handle.read_exact(&mut self.frames[idx].data)?;
        }
        self.frames[idx].key = Some((file, page));
        self.frames[idx].pin_count = 1;
        self.frames[idx].dirty = false;
        self.directory.insert((file, page), idx);
        Ok(idx)
    }

    /// Obtain a frame index, evicting an unpinned frame if the pool is full.
    fn claim_frame(&mut self) -> DbResult<usize> {
        if let Some(idx) = self.free_frames.pop() {
            return Ok(idx);
        }
        loop {
            let idx = self.lru.pop_front().ok_or(PfStatus::BufferFull)?;
            if self.frames[idx].pin_count != 0 {
                continue; // stale entry: frame was re-pinned after queuing
            }
            let (file, page) = self.frames[idx].key.expect("resident frame has a key");
            if self.frames[idx].dirty {
                self.write_through(file, page, idx)?;
            }
            self.directory.remove(&(file, page));
            log::debug!("evicted page {page:?} of {file:?} from frame {idx}");
            return Ok(idx);
        }
    }

    /// Evict every resident page, flushing dirty ones first. Fails without
    /// touching anything if any page across any open file is still pinned.
    pub fn reset_buffer(&mut self) -> DbResult<()> {
        if self.frames.iter().any(|f| f.pin_count > 0) {
            return Err(PfStatus::PagesStillPinned.into());
        }
        let keys: Vec<_> = self.directory.keys().copied().collect();
        for (file, page) in keys {
            let idx = self.directory[&(file, page)];
            if self.frames[idx].dirty {
                self.write_through(file, page, idx)?;
                self.frames[idx].dirty = false;
            }
        }
        self.directory.clear();
        self.lru.clear();
        self.free_frames = (0..self.frames.len()).rev().collect();
        for frame in &mut self.frames {
            frame.key = None;
        }
        log::info!("buffer pool reset ({} frames freed)", self.frames.len());
        Ok(())
    }

    /// A table of every resident page: which file it belongs to, its page
    /// number, pin count, and dirty flag.
    pub fn print_buffer(&self) -> String {
        let mut entries: Vec<_> = self.directory.iter().collect();
        entries.sort_by_key(|(&(file, page), _)| (file.0, page.0));
        let rows = entries
            .into_iter()
            .map(|(&(file, page), &idx)| {
                let frame = &self.frames[idx];
                vec![
                    format!("{}", file.0),
                    format!("{}", page.0),
                    frame.pin_count.to_string(),
                    frame.dirty.to_string(),
                ]
            })
            .collect();
        render_string_table(&["file", "page", "pinCount", "dirty"], rows, TableStyleKind::Modern)
    }

    /// Grow or shrink the pool's frame count. Shrinking evicts unpinned
    /// frames (flushing dirty ones) to make room; it fails, leaving the
    /// pool unchanged, if fewer than `capacity` frames can be freed.
    pub fn resize_buffer(&mut self, capacity: usize) -> DbResult<()> {
        assert!(capacity > 0, "buffer pool capacity must be > 0");
        if capacity >= self.frames.len() {
            for _ in self.frames.len()..capacity {
                self.free_frames.push(self.frames.len());
                self.frames.push(Frame { key: None, data: vec![0u8; self.page_size], pin_count: 0, dirty: false });
            }
            log::info!("buffer pool resized to {capacity} frames");
            return Ok(());
        }

        // Evict unpinned frames (flushing dirty ones) until at least
        // `to_free` frames sit in the free list, then physically drop that
        // many frames from the Vec via `swap_remove`, fixing up the one
        // index each removal invalidates (whatever frame previously sat at
        // the Vec's end).
        let to_free = self.frames.len() - capacity;
        while self.free_frames.len() < to_free {
            let idx = loop {
                let idx = self.lru.pop_front().ok_or(PfStatus::PagesStillPinned)?;
                if self.frames[idx].pin_count == 0 {
                    break idx;
                }
            };
            let (file, page) = self.frames[idx].key.expect("resident frame has a key");
            if self.frames[idx].dirty {
                self.write_through(file, page, idx)?;
            }
            self.directory.remove(&(file, page));
            self.frames[idx].key = None;
            self.frames[idx].dirty = false;
            self.free_frames.push(idx);
        }

        for _ in 0..to_free {
            let idx = self.free_frames.pop().expect("enough frames freed above");
            let last = self.frames.len() - 1;
            self.frames.swap_remove(idx);
            if idx != last {
                for slot in self.directory.values_mut() {
                    if *slot == last {
                        *slot = idx;
                    }
                }
                for slot in self.lru.iter_mut() {
                    if *slot == last {
                        *slot = idx;
                    }
                }
                for slot in self.free_frames.iter_mut() {
                    if *slot == last {
                        *slot = idx;
                    }
                }
            }
        }
        log::info!("buffer pool resized to {capacity} frames");
        Ok(())
    }
}

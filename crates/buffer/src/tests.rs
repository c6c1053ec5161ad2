use super::*;
use tempfile::tempdir;

#[test]
fn allocate_pins_and_persists_across_pools() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(2, 64);
    let file = pool.create(&path).unwrap();
    let page = pool.allocate_page(file).unwrap();
    let num = page.num;
    page.data[0] = 7;
    pool.mark_dirty(file, num).unwrap();
    pool.unpin_page(file, num).unwrap();
    pool.force_pages(file, None).unwrap();
    pool.close(file).unwrap();

    let mut pool2 = BufferPool::new(2, 64);
    let file2 = pool2.open(&path).unwrap();
    let page2 = pool2.get_page(file2, num).unwrap();
    assert_eq!(page2.data[0], 7);
}

#[test]
fn get_page_out_of_range_is_invalid_page_number() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(2, 64);
    let file = pool.create(&path).unwrap();
    let err = pool.get_page(file, PageNum(9)).unwrap_err();
    assert!(matches!(err, common::DbError::Pf(PfStatus::InvalidPageNumber(_))));
}

#[test]
fn close_fails_while_pinned() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(2, 64);
    let file = pool.create(&path).unwrap();
    let _page = pool.allocate_page(file).unwrap();
    let err = pool.close(file).unwrap_err();
    assert!(matches!(err, common::DbError::Pf(PfStatus::PagesStillPinned)));
}

#[test]
fn eviction_writes_back_dirty_pages() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(1, 64);
    let file = pool.create(&path).unwrap();

    let p0 = pool.allocate_page(file).unwrap();
    let n0 = p0.num;
    p0.data[0] = 11;
    pool.mark_dirty(file, n0).unwrap();
    pool.unpin_page(file, n0).unwrap();

    // Only one frame: allocating a second page must evict page n0, flushing it.
    let p1 = pool.allocate_page(file).unwrap();
    let n1 = p1.num;
    pool.unpin_page(file, n1).unwrap();

    let reloaded = pool.get_page(file, n0).unwrap();
    assert_eq!(reloaded.data[0], 11);
}

#[test]
fn evicting_with_everything_pinned_is_buffer_full() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(1, 64);
    let file = pool.create(&path).unwrap();
    let _pinned = pool.allocate_page(file).unwrap();

    let err = pool.allocate_page(file).unwrap_err();
    assert!(matches!(err, common::DbError::Pf(PfStatus::BufferFull)));
}

#[test]
fn get_first_and_next_page_skip_disposed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(4, 64);
    let file = pool.create(&path).unwrap();

    let n0 = pool.allocate_page(file).unwrap().num;
    pool.unpin_page(file, n0).unwrap();
    let n1 = pool.allocate_page(file).unwrap().num;
    pool.unpin_page(file, n1).unwrap();
    let n2 = pool.allocate_page(file).unwrap().num;
    pool.unpin_page(file, n2).unwrap();

    pool.dispose_page(file, n1).unwrap();

    let first = pool.get_first_page(file).unwrap();
    assert_eq!(first.num, n0);
    pool.unpin_page(file, n0).unwrap();

    let next = pool.get_next_page(file, n0).unwrap();
    assert_eq!(next.num, n2, "disposed page n1 must be skipped");
    pool.unpin_page(file, n2).unwrap();

    let err = pool.get_next_page(file, n2).unwrap_err();
    assert!(matches!(err, common::DbError::Pf(PfStatus::Eof)));
}

#[test]
fn disposed_page_number_is_reused_on_next_allocate() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(4, 64);
    let file = pool.create(&path).unwrap();

    let n0 = pool.allocate_page(file).unwrap().num;
    pool.unpin_page(file, n0).unwrap();
    let n1 = pool.allocate_page(file).unwrap().num;
    pool.unpin_page(file, n1).unwrap();

    pool.dispose_page(file, n1).unwrap();

    let reused = pool.allocate_page(file).unwrap();
    assert_eq!(reused.num, n1, "allocate should prefer a disposed page number");
    assert!(reused.data.iter().all(|&b| b == 0), "reused page must be zeroed");
}

#[test]
fn unpin_without_pin_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(2, 64);
    let file = pool.create(&path).unwrap();
    let n0 = pool.allocate_page(file).unwrap().num;
    pool.unpin_page(file, n0).unwrap();

    let err = pool.unpin_page(file, n0).unwrap_err();
    assert!(matches!(err, common::DbError::Pf(PfStatus::PageNotInFile(_))));
}

#[test]
fn multiple_files_are_isolated() {
    let dir = tempdir().unwrap();
    let mut pool = BufferPool::new(4, 64);
    let f1 = pool.create(&dir.path().join("a.dat")).unwrap();
    let f2 = pool.create(&dir.path().join("b.dat")).unwrap();

    let p1 = pool.allocate_page(f1).unwrap();
    let n1 = p1.num;
    p1.data[0] = 1;
    pool.unpin_page(f1, n1).unwrap();

    let p2 = pool.allocate_page(f2).unwrap();
    let n2 = p2.num;
    p2.data[0] = 2;
    pool.unpin_page(f2, n2).unwrap();

    assert_eq!(pool.get_page(f1, n1).unwrap().data[0], 1);
    assert_eq!(pool.get_page(f2, n2).unwrap().data[0], 2);
}

#[test]
fn reset_buffer_flushes_dirty_pages_and_empties_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(4, 64);
    let file = pool.create(&path).unwrap();
    let page = pool.allocate_page(file).unwrap();
    let num = page.num;
    page.data[0] = 9;
    pool.unpin_page(file, num).unwrap();

    pool.reset_buffer().unwrap();
    assert!(!pool.print_buffer().contains(&num.0.to_string()));

    // The dirty page was flushed before eviction, so re-reading it through
    // a fresh pool over the same file sees the write.
    let mut pool2 = BufferPool::new(4, 64);
    let file2 = pool2.open(&path).unwrap();
    assert_eq!(pool2.get_page(file2, num).unwrap().data[0], 9);
}

#[test]
fn reset_buffer_rejects_pinned_pages() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(2, 64);
    let file = pool.create(&path).unwrap();
    pool.allocate_page(file).unwrap();
    assert!(matches!(pool.reset_buffer(), Err(common::DbError::Pf(PfStatus::PagesStillPinned))));
}

#[test]
fn print_buffer_lists_resident_pages() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(2, 64);
    let file = pool.create(&path).unwrap();
    let num = pool.allocate_page(file).unwrap().num;
    pool.unpin_page(file, num).unwrap();
    let printed = pool.print_buffer();
    assert!(printed.contains("file"));
    assert!(printed.contains("page"));
}

#[test]
fn resize_buffer_grows_capacity() {
    let dir = tempdir().unwrap();
    let mut pool = BufferPool::new(1, 64);
    let f1 = pool.create(&dir.path().join("a.dat")).unwrap();
    let f2 = pool.create(&dir.path().join("b.dat")).unwrap();
    let p1 = pool.allocate_page(f1).unwrap().num;
    pool.unpin_page(f1, p1).unwrap();

    pool.resize_buffer(2).unwrap();
    // Both pages fit resident at once now, where capacity 1 would have
    // forced the first out before the second could be pinned.
    let p2 = pool.allocate_page(f2).unwrap().num;
    assert_eq!(pool.get_page(f1, p1).unwrap().data.len(), 64);
    pool.unpin_page(f1, p1).unwrap();
    pool.unpin_page(f2, p2).unwrap();
}

#[test]
fn resize_buffer_shrinks_by_evicting_unpinned_frames() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(4, 64);
    let file = pool.create(&path).unwrap();
    let num = pool.allocate_page(file).unwrap().num;
    pool.unpin_page(file, num).unwrap();

    pool.resize_buffer(1).unwrap();
    assert_eq!(pool.get_page(file, num).unwrap().data.len(), 64);
}

#[test]
fn resize_buffer_shrink_rejects_when_everything_is_pinned() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.dat");
    let mut pool = BufferPool::new(2, 64);
    let file = pool.create(&path).unwrap();
    pool.allocate_page(file).unwrap();
    pool.allocate_page(file).unwrap();
    assert!(matches!(pool.resize_buffer(1), Err(common::DbError::Pf(PfStatus::PagesStillPinned))));
}

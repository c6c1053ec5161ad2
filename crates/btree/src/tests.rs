use super::*;
use buffer::BufferPool;
use common::{PageNum, RecordId, SlotNum};
use tempfile::tempdir;
use types::{AttrType, CompOp, Value};

fn rid(page: u32, slot: u16) -> RecordId {
    RecordId::new(PageNum(page), SlotNum(slot))
}

fn scan_all(handle: &IxFileHandle, pool: &mut BufferPool) -> Vec<(Value, RecordId)> {
    let mut scan = handle.scan(CompOp::NoOp, Value::Null);
    let mut out = Vec::new();
    loop {
        match scan.next(pool) {
            Ok(pair) => out.push(pair),
            Err(common::DbError::Ix(IxStatus::Eof)) => break,
            Err(e) => panic!("unexpected scan error: {e}"),
        }
    }
    out
}

#[test]
fn empty_index_scans_to_eof() {
    let dir = tempdir().unwrap();
    let mut pool = BufferPool::new(16, 4096);
    let handle = IxFileHandle::create(&mut pool, &dir.path().join("a.0"), AttrType::Int).unwrap();
    assert!(scan_all(&handle, &mut pool).is_empty());
}

#[test]
fn insert_and_equality_scan() {
    let dir = tempdir().unwrap();
    let mut pool = BufferPool::new(16, 4096);
    let mut handle = IxFileHandle::create(&mut pool, &dir.path().join("a.0"), AttrType::Int).unwrap();

    for i in 0..20 {
        handle.insert_entry(&mut pool, &Value::Int(i), rid(1, i as u16 + 1)).unwrap();
    }

    let mut scan = handle.scan(CompOp::Eq, Value::Int(7));
    let (v, r) = scan.next(&mut pool).unwrap();
    assert_eq!(v, Value::Int(7));
    assert_eq!(r, rid(1, 8));
    assert!(matches!(
        scan.next(&mut pool),
        Err(common::DbError::Ix(IxStatus::Eof))
    ));
}

#[test]
fn full_scan_is_key_ordered_after_many_splits() {
    let dir = tempdir().unwrap();
    let mut pool = BufferPool::new(16, 4096);
    let mut handle = IxFileHandle::create(&mut pool, &dir.path().join("a.0"), AttrType::Int).unwrap();

    let mut keys: Vec<i32> = (0..500).collect();
    // Insert out of order to exercise splits at both ends.
    keys.reverse();
    for (i, k) in keys.iter().enumerate() {
        handle.insert_entry(&mut pool, &Value::Int(*k), rid(1, (i % 2000) as u16 + 1)).unwrap();
    }

    let all = scan_all(&handle, &mut pool);
    assert_eq!(all.len(), 500);
    let mut prev = None;
    for (v, _) in &all {
        if let (Value::Int(p), Value::Int(c)) = (&prev, v) {
            assert!(p <= c, "scan must be non-decreasing in key order");
        }
        prev = Some(v.clone());
    }
}

#[test]
fn duplicate_keys_chain_through_a_bucket() {
    let dir = tempdir().unwrap();
    let mut pool = BufferPool::new(16, 4096);
    let mut handle = IxFileHandle::create(&mut pool, &dir.path().join("a.0"), AttrType::Int).unwrap();

    handle.insert_entry(&mut pool, &Value::Int(1), rid(1, 1)).unwrap();
    handle.insert_entry(&mut pool, &Value::Int(1), rid(1, 2)).unwrap();
    handle.insert_entry(&mut pool, &Value::Int(1), rid(1, 3)).unwrap();

    let mut scan = handle.scan(CompOp::Eq, Value::Int(1));
    let mut found = Vec::new();
    loop {
        match scan.next(&mut pool) {
            Ok((_, r)) => found.push(r),
            Err(_) => break,
        }
    }
    found.sort_by_key(|r| (r.page.0, r.slot.0));
    assert_eq!(found, vec![rid(1, 1), rid(1, 2), rid(1, 3)]);
}

#[test]
fn reinserting_the_same_pair_is_entry_exists() {
    let dir = tempdir().unwrap();
    let mut pool = BufferPool::new(16, 4096);
    let mut handle = IxFileHandle::create(&mut pool, &dir.path().join("a.0"), AttrType::Int).unwrap();
    handle.insert_entry(&mut pool, &Value::Int(1), rid(1, 1)).unwrap();
    let err = handle.insert_entry(&mut pool, &Value::Int(1), rid(1, 1)).unwrap_err();
    assert!(matches!(err, common::DbError::Ix(IxStatus::EntryExists)));
}

#[test]
fn delete_then_scan_excludes_the_removed_entry() {
    let dir = tempdir().unwrap();
    let mut pool = BufferPool::new(16, 4096);
    let mut handle = IxFileHandle::create(&mut pool, &dir.path().join("a.0"), AttrType::Int).unwrap();

    for i in 0..50 {
        handle.insert_entry(&mut pool, &Value::Int(i), rid(1, i as u16 + 1)).unwrap();
    }
    for i in 0..25 {
        handle.delete_entry(&mut pool, &Value::Int(i), rid(1, i as u16 + 1)).unwrap();
    }

    let all = scan_all(&handle, &mut pool);
    assert_eq!(all.len(), 25);
    assert!(all.iter().all(|(v, _)| matches!(v, Value::Int(n) if *n >= 25)));
}

#[test]
fn deleting_missing_entry_is_a_warning() {
    let dir = tempdir().unwrap();
    let mut pool = BufferPool::new(16, 4096);
    let mut handle = IxFileHandle::create(&mut pool, &dir.path().join("a.0"), AttrType::Int).unwrap();
    handle.insert_entry(&mut pool, &Value::Int(1), rid(1, 1)).unwrap();
    let err = handle.delete_entry(&mut pool, &Value::Int(2), rid(1, 1)).unwrap_err();
    assert!(matches!(err, common::DbError::Ix(IxStatus::DeleteEntryNotFound)));
}

#[test]
fn range_and_ne_scans_over_strings() {
    let dir = tempdir().unwrap();
    let mut pool = BufferPool::new(16, 4096);
    let attr = AttrType::new_string(8).unwrap();
    let mut handle = IxFileHandle::create(&mut pool, &dir.path().join("a.0"), attr).unwrap();

    for (i, w) in ["aa", "bb", "cc", "dd"].iter().enumerate() {
        handle
            .insert_entry(&mut pool, &Value::Str(w.to_string()), rid(1, i as u16 + 1))
            .unwrap();
    }

    let mut gt = handle.scan(CompOp::Gt, Value::Str("bb".into()));
    let mut got = Vec::new();
    while let Ok((v, _)) = gt.next(&mut pool) {
        got.push(v);
    }
    assert_eq!(got, vec![Value::Str("cc".into()), Value::Str("dd".into())]);

    let mut ne = handle.scan(CompOp::Ne, Value::Str("bb".into()));
    let mut got = Vec::new();
    while let Ok((v, _)) = ne.next(&mut pool) {
        got.push(v);
    }
    assert_eq!(
        got,
        vec![
            Value::Str("aa".into()),
            Value::Str("cc".into()),
            Value::Str("dd".into())
        ]
    );
}

#[test]
fn deleting_every_entry_leaves_an_empty_but_searchable_tree() {
    let dir = tempdir().unwrap();
    let mut pool = BufferPool::new(16, 4096);
    let mut handle = IxFileHandle::create(&mut pool, &dir.path().join("a.0"), AttrType::Int).unwrap();
    for i in 0..200 {
        handle.insert_entry(&mut pool, &Value::Int(i), rid(1, (i % 2000) as u16 + 1)).unwrap();
    }
    for i in 0..200 {
        handle.delete_entry(&mut pool, &Value::Int(i), rid(1, (i % 2000) as u16 + 1)).unwrap();
    }
    assert!(scan_all(&handle, &mut pool).is_empty());
}

#[test]
fn scan_survives_deleting_the_entry_it_is_parked_on() {
    let dir = tempdir().unwrap();
    let mut pool = BufferPool::new(16, 4096);
    let mut handle = IxFileHandle::create(&mut pool, &dir.path().join("a.0"), AttrType::Int).unwrap();
    for i in 0..1000 {
        handle.insert_entry(&mut pool, &Value::Int(i), rid(1, (i % 2000) as u16 + 1)).unwrap();
    }

    let mut scan = handle.scan(CompOp::Lt, Value::Int(500));
    let mut seen = Vec::new();
    while let Ok((v, r)) = scan.next(&mut pool) {
        seen.push(v.clone());
        handle.delete_entry(&mut pool, &v, r).unwrap();
    }

    assert_eq!(seen.len(), 500);
    let remaining = scan_all(&handle, &mut pool);
    assert_eq!(remaining.len(), 500);
    assert!(remaining.iter().all(|(v, _)| matches!(v, Value::Int(n) if *n >= 500)));
}

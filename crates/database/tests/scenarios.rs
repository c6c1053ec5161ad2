//! End-to-end coverage of the six numbered scenarios: bootstrap a database,
//! drive it purely through `Engine`'s public surface, and check the
//! observable state after each step.

use common::{Config, DbError, QlStatus};
use database::Engine;
use executor::{Condition, Operator, Rhs, ScanPredicate};
use tempfile::tempdir;
use types::{AttrType, CompOp, Value};

fn config(dir: &std::path::Path) -> Config {
    Config { data_dir: dir.to_path_buf(), page_size: 4096, buffer_pool_pages: 32 }
}

fn cols(pairs: &[(&str, AttrType)]) -> Vec<(String, AttrType)> {
    pairs.iter().map(|(n, t)| (n.to_string(), *t)).collect()
}

fn scan_all(engine: &mut Engine, rel: &str, predicate: Option<ScanPredicate>) -> Vec<Vec<Value>> {
    let mut op = engine.select(rel, predicate).unwrap();
    let pool = engine.buffer_pool_mut();
    op.open(pool).unwrap();
    let mut out = Vec::new();
    loop {
        match op.next(pool) {
            Ok(row) => out.push(row.values),
            Err(DbError::Ql(QlStatus::Eof)) => break,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    op.close(pool).unwrap();
    out
}

#[test]
fn scenario_1_catalog_bootstrap() {
    let dir = tempdir().unwrap();
    let engine = Engine::bootstrap(config(dir.path())).unwrap();

    let help = engine.help(None).unwrap();
    assert_eq!(help.rows.len(), 2);
    assert_eq!(engine.help(Some("relcat")).unwrap().rows.len(), 4);
    assert_eq!(engine.help(Some("attrcat")).unwrap().rows.len(), 6);

    engine.close().unwrap();
}

#[test]
fn scenario_2_insert_scan_round_trip() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    engine.create_table("t", &cols(&[("a", AttrType::Int), ("b", AttrType::new_string(8).unwrap())])).unwrap();

    for (a, b) in [(1, "x"), (2, "yy"), (3, "zzz")] {
        engine.insert("t", &[Value::Int(a), Value::Str(b.into())]).unwrap();
    }

    let rows = scan_all(&mut engine, "t", None);
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(1), Value::Str("x".into())],
            vec![Value::Int(2), Value::Str("yy".into())],
            vec![Value::Int(3), Value::Str("zzz".into())],
        ]
    );
}

#[test]
fn scenario_3_index_scan_then_drop_index() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    engine.create_table("t", &cols(&[("a", AttrType::Int), ("b", AttrType::new_string(8).unwrap())])).unwrap();
    for (a, b) in [(1, "x"), (2, "yy"), (3, "zzz")] {
        engine.insert("t", &[Value::Int(a), Value::Str(b.into())]).unwrap();
    }
    engine.create_index("t", "a").unwrap();

    let predicate = ScanPredicate { attr: "a".into(), op: CompOp::Gt, value: Value::Int(1) };
    let via_index = scan_all(&mut engine, "t", Some(predicate.clone()));
    assert_eq!(
        via_index,
        vec![vec![Value::Int(2), Value::Str("yy".into())], vec![Value::Int(3), Value::Str("zzz".into())]]
    );

    engine.drop_index("t", "a").unwrap();
    assert_eq!(scan_all(&mut engine, "t", Some(predicate)), via_index);
}

#[test]
fn scenario_4_delete_under_index() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    engine.create_table("t", &cols(&[("a", AttrType::Int), ("s", AttrType::new_string(4).unwrap())])).unwrap();
    engine.create_index("t", "a").unwrap();
    for i in 0..1000 {
        engine.insert("t", &[Value::Int(i), Value::Str("s".into())]).unwrap();
    }

    let condition = Condition { attr: "a".into(), op: CompOp::Lt, rhs: Rhs::Value(Value::Int(500)) };
    let deleted = engine.delete("t", std::slice::from_ref(&condition)).unwrap();
    assert_eq!(deleted, 500);
    assert_eq!(scan_all(&mut engine, "t", None).len(), 500);

    let gone = ScanPredicate { attr: "a".into(), op: CompOp::Eq, value: Value::Int(499) };
    assert!(scan_all(&mut engine, "t", Some(gone)).is_empty());
    let present = ScanPredicate { attr: "a".into(), op: CompOp::Eq, value: Value::Int(500) };
    assert_eq!(scan_all(&mut engine, "t", Some(present)).len(), 1);
}

#[test]
fn scenario_5_update_reshuffling_within_a_page() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    engine.create_table("t", &cols(&[("a", AttrType::Int), ("b", AttrType::new_string(8).unwrap())])).unwrap();
    engine.create_index("t", "a").unwrap();
    let rid = engine.insert("t", &[Value::Int(2), Value::Str("yy".into())]).unwrap();

    let condition = Condition { attr: "a".into(), op: CompOp::Eq, rhs: Rhs::Value(Value::Int(2)) };
    let updated = engine
        .update("t", "b", Rhs::Value(Value::Str("aaaaaaaa".into())), std::slice::from_ref(&condition))
        .unwrap();
    assert_eq!(updated, 1);

    let mut op = engine.select("t", None).unwrap();
    let pool = engine.buffer_pool_mut();
    op.open(pool).unwrap();
    let row = op.next(pool).unwrap();
    assert_eq!(row.rid(), Some(rid));
    op.close(pool).unwrap();

    let by_b = scan_all(&mut engine, "t", Some(ScanPredicate { attr: "b".into(), op: CompOp::Eq, value: Value::Str("aaaaaaaa".into()) }));
    assert_eq!(by_b, vec![vec![Value::Int(2), Value::Str("aaaaaaaa".into())]]);
}

#[test]
fn scenario_6_buffer_pressure() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    engine.create_table("t", &cols(&[("a", AttrType::Int)])).unwrap();
    for i in 0..3000 {
        engine.insert("t", &[Value::Int(i)]).unwrap();
    }

    engine.resize_buffer(4).unwrap();
    assert_eq!(scan_all(&mut engine, "t", None).len(), 3000);
}

use common::{Config, DbError, QlStatus};
use executor::{Condition, Operator, Rhs, ScanPredicate};
use tempfile::tempdir;
use types::{AttrType, CompOp, Value};

use super::Engine;

fn config(dir: &std::path::Path) -> Config {
    Config { data_dir: dir.to_path_buf(), page_size: 4096, buffer_pool_pages: 32 }
}

fn cols(pairs: &[(&str, AttrType)]) -> Vec<(String, AttrType)> {
    pairs.iter().map(|(n, t)| (n.to_string(), *t)).collect()
}

fn rows_of(engine: &mut Engine, rel: &str, predicate: Option<ScanPredicate>) -> Vec<Vec<Value>> {
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
fn bootstrap_writes_dbinfo_and_empty_catalog() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    assert_eq!(engine.dbinfo().unwrap(), (0, 1));

    let help = engine.help(None).unwrap();
    let names: Vec<_> = help.rows.iter().map(|r| r.values[0].clone()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&Value::Str("relcat".into())));
    assert!(names.contains(&Value::Str("attrcat".into())));

    let relcat_help = engine.help(Some("relcat")).unwrap();
    assert_eq!(relcat_help.rows.len(), 4);
    let attrcat_help = engine.help(Some("attrcat")).unwrap();
    assert_eq!(attrcat_help.rows.len(), 6);

    engine.close().unwrap();
}

#[test]
fn open_reattaches_to_a_bootstrapped_directory() {
    let dir = tempdir().unwrap();
    let engine = Engine::bootstrap(config(dir.path())).unwrap();
    engine.close().unwrap();

    let mut engine = Engine::open(config(dir.path())).unwrap();
    assert_eq!(engine.dbinfo().unwrap(), (0, 1));
    engine.close().unwrap();
}

#[test]
fn insert_and_scan_round_trip_preserves_insertion_order() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    engine.create_table("t", &cols(&[("a", AttrType::Int), ("b", AttrType::new_string(8).unwrap())])).unwrap();

    engine.insert("t", &[Value::Int(1), Value::Str("x".into())]).unwrap();
    engine.insert("t", &[Value::Int(2), Value::Str("yy".into())]).unwrap();
    engine.insert("t", &[Value::Int(3), Value::Str("zzz".into())]).unwrap();

    let rows = rows_of(&mut engine, "t", None);
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
fn index_scan_then_drop_index_returns_the_same_set() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    engine.create_table("t", &cols(&[("a", AttrType::Int), ("b", AttrType::new_string(8).unwrap())])).unwrap();
    engine.insert("t", &[Value::Int(1), Value::Str("x".into())]).unwrap();
    engine.insert("t", &[Value::Int(2), Value::Str("yy".into())]).unwrap();
    engine.insert("t", &[Value::Int(3), Value::Str("zzz".into())]).unwrap();
    engine.create_index("t", "a").unwrap();

    let predicate = ScanPredicate { attr: "a".into(), op: CompOp::Gt, value: Value::Int(1) };
    let via_index = rows_of(&mut engine, "t", Some(predicate.clone()));
    assert_eq!(
        via_index,
        vec![vec![Value::Int(2), Value::Str("yy".into())], vec![Value::Int(3), Value::Str("zzz".into())]]
    );

    engine.drop_index("t", "a").unwrap();
    let via_file_scan = rows_of(&mut engine, "t", Some(predicate));
    assert_eq!(via_file_scan, via_index);
}

#[test]
fn delete_under_index_leaves_matching_live_tuples_and_index_entries() {
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

    let remaining = rows_of(&mut engine, "t", None);
    assert_eq!(remaining.len(), 500);

    let not_found = ScanPredicate { attr: "a".into(), op: CompOp::Eq, value: Value::Int(499) };
    assert!(rows_of(&mut engine, "t", Some(not_found)).is_empty());

    let found = ScanPredicate { attr: "a".into(), op: CompOp::Eq, value: Value::Int(500) };
    assert_eq!(rows_of(&mut engine, "t", Some(found)).len(), 1);
}

#[test]
fn update_reshuffling_within_a_page_keeps_rid_and_index_stable() {
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

    let by_index = rows_of(&mut engine, "t", Some(ScanPredicate { attr: "a".into(), op: CompOp::Eq, value: Value::Int(2) }));
    assert_eq!(by_index, vec![vec![Value::Int(2), Value::Str("aaaaaaaa".into())]]);

    let by_b = rows_of(&mut engine, "t", Some(ScanPredicate { attr: "b".into(), op: CompOp::Eq, value: Value::Str("aaaaaaaa".into()) }));
    assert_eq!(by_b.len(), 1);
    assert_eq!(by_b[0][0], Value::Int(2));

    let mut op = engine.select("t", None).unwrap();
    let pool = engine.buffer_pool_mut();
    op.open(pool).unwrap();
    let row = op.next(pool).unwrap();
    assert_eq!(row.rid(), Some(rid));
    op.close(pool).unwrap();
}

#[test]
fn buffer_pressure_scan_completes_with_a_tiny_pool() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    engine.create_table("t", &cols(&[("a", AttrType::Int)])).unwrap();
    for i in 0..2000 {
        engine.insert("t", &[Value::Int(i)]).unwrap();
    }

    engine.resize_buffer(4).unwrap();
    let rows = rows_of(&mut engine, "t", None);
    assert_eq!(rows.len(), 2000);
}

#[test]
fn set_param_toggles_optimize_query() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    assert!(engine.config().optimize_query);
    engine.set_param("optimizeQuery", "FALSE").unwrap();
    assert!(!engine.config().optimize_query);
}

#[test]
fn reset_and_print_buffer_pass_through_to_the_pool() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    engine.create_table("t", &cols(&[("a", AttrType::Int)])).unwrap();
    engine.insert("t", &[Value::Int(1)]).unwrap();

    engine.reset_buffer().unwrap();
    let printed = engine.print_buffer();
    assert!(printed.contains("file"));
}

#[test]
fn print_renders_every_row_of_a_relation() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    engine.create_table("t", &cols(&[("a", AttrType::Int)])).unwrap();
    engine.insert("t", &[Value::Int(1)]).unwrap();
    engine.insert("t", &[Value::Int(2)]).unwrap();

    let batch = engine.print("t").unwrap();
    assert_eq!(batch.rows.len(), 2);
}

#[test]
fn drop_table_removes_it_from_help() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::bootstrap(config(dir.path())).unwrap();
    engine.create_table("t", &cols(&[("a", AttrType::Int)])).unwrap();
    engine.drop_table("t").unwrap();

    let help = engine.help(None).unwrap();
    let names: Vec<_> = help.rows.iter().map(|r| r.values[0].clone()).collect();
    assert!(!names.contains(&Value::Str("t".into())));
}

use super::*;

use crate::{
    store::{Config, Store, Transaction},
    Address, Extent, TypedAddress,
};

use std::env;

fn config(name: &str) -> Config {
    let mut config = Config::new(env::temp_dir().as_os_str(), name);
    config.set_region_size(64 * 1024);
    config
}

// Store `value` in the arena and index it under `key`; mirrors how a
// toolchain records artifacts it has just written.
fn add(db: &Store, txn: &mut Transaction, key: &str, value: &str) -> (String, Extent<u8>) {
    let addr = txn.alloc_bytes(value.as_bytes(), 1).unwrap();
    let extent = Extent::new(TypedAddress::new(addr), value.len() as u64);

    let ix = db.write_index(true).unwrap().unwrap();
    let mut ix = ix.borrow_mut();
    ix.insert_or_assign(txn, key.to_string(), extent).unwrap();
    (key.to_string(), extent)
}

fn materialize(db: &Store, addrs: &[Address]) -> Vec<(String, Extent<u8>)> {
    let ix = db.write_index(true).unwrap().unwrap();
    let ix = ix.borrow();
    let mut values: Vec<(String, Extent<u8>)> =
        addrs.iter().map(|addr| ix.load_leaf(db, *addr).unwrap()).collect();
    values.sort_by(|a, b| a.0.cmp(&b.0));
    values
}

#[test]
fn test_diff_write_index() {
    let db = Store::create(config("test-diff-write")).unwrap();

    let v1 = {
        let mut txn = Transaction::begin(&db).unwrap();
        let v1 = add(&db, &mut txn, "key1", "first value");
        txn.commit().unwrap();
        v1
    };
    let v2 = {
        let mut txn = Transaction::begin(&db).unwrap();
        let v2 = add(&db, &mut txn, "key2", "second value");
        txn.commit().unwrap();
        v2
    };
    assert_eq!(db.get_current_revision().unwrap(), 2);

    let ix = db.write_index(true).unwrap().unwrap();

    // r2 against r0: both entries
    let addrs = ix.borrow().diff(&db, 0).unwrap();
    assert_eq!(materialize(&db, &addrs), vec![v1.clone(), v2.clone()]);

    // r2 against r1: only the second
    let addrs = ix.borrow().diff(&db, 1).unwrap();
    assert_eq!(materialize(&db, &addrs), vec![v2.clone()]);

    // r2 against r2: nothing
    let addrs = ix.borrow().diff(&db, 2).unwrap();
    assert!(addrs.is_empty());
}

#[test]
fn test_diff_uncommitted_transaction() {
    let conf = config("test-diff-uncommitted");
    let db = Store::create(conf.clone()).unwrap();

    let v1 = {
        let mut txn = Transaction::begin(&db).unwrap();
        let v1 = add(&db, &mut txn, "key1", "first value");
        txn.commit().unwrap();
        v1
    };

    // t2 stays uncommitted while we diff
    let mut txn = Transaction::begin(&db).unwrap();
    let v2 = add(&db, &mut txn, "key2", "second value");

    let ix = db.write_index(true).unwrap().unwrap();

    // now against r0: both, the uncommitted entry included
    let addrs = ix.borrow().diff(&db, 0).unwrap();
    assert_eq!(materialize(&db, &addrs), vec![v1.clone(), v2.clone()]);

    // now against r1: the uncommitted entry alone
    let addrs = ix.borrow().diff(&db, 1).unwrap();
    assert_eq!(materialize(&db, &addrs), vec![v2.clone()]);

    // the open transaction does not move the revision
    assert_eq!(db.get_current_revision().unwrap(), 1);
    let addrs = ix.borrow().diff(&db, 2).unwrap();
    assert!(addrs.is_empty());

    drop(ix);
    txn.rollback().unwrap();
    drop(txn);

    // a fresh handle observes only the committed entry
    drop(db);
    let db = Store::open(conf).unwrap();
    assert_eq!(db.get_current_revision().unwrap(), 1);
    let ix = db.write_index(true).unwrap().unwrap();
    let addrs = ix.borrow().diff(&db, 0).unwrap();
    assert_eq!(materialize(&db, &addrs), vec![v1.clone()]);
    assert_eq!(ix.borrow().len(), 1);
}

#[test]
fn test_diff_deep_sharing() {
    // entries spread over many subtrees; a diff against the previous
    // revision visits only the touched path
    let db = Store::create(config("test-diff-deep")).unwrap();

    {
        let mut txn = Transaction::begin(&db).unwrap();
        for i in 0..100 {
            add(&db, &mut txn, &format!("base-{}", i), "payload");
        }
        txn.commit().unwrap();
    }
    {
        let mut txn = Transaction::begin(&db).unwrap();
        add(&db, &mut txn, "straggler", "late payload");
        txn.commit().unwrap();
    }

    let ix = db.write_index(true).unwrap().unwrap();
    let addrs = ix.borrow().diff(&db, 1).unwrap();
    let values = materialize(&db, &addrs);
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].0, "straggler");

    let addrs = ix.borrow().diff(&db, 0).unwrap();
    assert_eq!(addrs.len(), 101);
}

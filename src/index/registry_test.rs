use super::*;

use crate::store::{Config, Store, Transaction};

use std::env;

fn config(name: &str) -> Config {
    let mut config = Config::new(env::temp_dir().as_os_str(), name);
    config.set_region_size(64 * 1024);
    config
}

#[test]
fn test_index_kinds() {
    let kinds = IndexKind::all();
    assert_eq!(kinds.len(), crate::store::NUM_INDICES);
    for (i, kind) in kinds.iter().enumerate() {
        assert_eq!(*kind as usize, i);
    }
    assert_eq!(IndexKind::Name as usize, 0);
    assert_eq!(IndexKind::Write as usize, 5);
}

#[test]
fn test_lazy_load() {
    let db = Store::create(config("test-registry-lazy")).unwrap();

    // no index exists yet; create=false yields nothing
    assert!(db.write_index(false).unwrap().is_none());
    assert!(db.fragment_index(false).unwrap().is_none());

    // create=true builds an empty one and caches the handle
    let ix = db.write_index(true).unwrap().unwrap();
    assert!(ix.borrow().is_empty());
    let again = db.write_index(false).unwrap().unwrap();
    assert!(std::rc::Rc::ptr_eq(&ix, &again));
}

#[test]
fn test_unmodified_indices_keep_records() {
    let db = Store::create(config("test-registry-records")).unwrap();

    {
        let mut txn = Transaction::begin(&db).unwrap();
        let ix = db.fragment_index(true).unwrap().unwrap();
        ix.borrow_mut()
            .insert(&mut txn, Digest(0xfeed_f00d), Extent::from_parts(64, 16).unwrap())
            .unwrap();
        txn.commit().unwrap();
    }

    let t1 = db.current_trailer().unwrap();
    assert!(!t1.index_records[IndexKind::Fragment as usize].is_null());
    for kind in [IndexKind::Name, IndexKind::Path, IndexKind::Compilation,
                 IndexKind::DebugLineHeader, IndexKind::Write] {
        assert!(t1.index_records[kind as usize].is_null(), "{:?}", kind);
    }

    // a second commit touching nothing else keeps the fragment record
    {
        let mut txn = Transaction::begin(&db).unwrap();
        txn.alloc_bytes(b"unrelated bytes", 1).unwrap();
        txn.commit().unwrap();
    }
    let t2 = db.current_trailer().unwrap();
    assert_eq!(
        t2.index_records[IndexKind::Fragment as usize],
        t1.index_records[IndexKind::Fragment as usize]
    );
}

#[test]
fn test_digest_index_roundtrip() {
    let conf = config("test-registry-digest");
    let db = Store::create(conf.clone()).unwrap();

    let digests: Vec<Digest> = (0..64_u128).map(|i| Digest((i << 64) | i)).collect();
    {
        let mut txn = Transaction::begin(&db).unwrap();
        let ix = db.compilation_index(true).unwrap().unwrap();
        let mut ix = ix.borrow_mut();
        for (i, digest) in digests.iter().enumerate() {
            ix.insert(&mut txn, *digest, Extent::from_parts(64, i).unwrap()).unwrap();
        }
        drop(ix);
        txn.commit().unwrap();
    }

    drop(db);
    let db = Store::open(conf).unwrap();
    let ix = db.compilation_index(false).unwrap().unwrap();
    let ix = ix.borrow();
    assert_eq!(ix.len(), digests.len());
    for (i, digest) in digests.iter().enumerate() {
        let value = ix.get(&db, digest).unwrap().unwrap();
        assert_eq!(value, Extent::from_parts(64, i).unwrap());
    }
    assert_eq!(ix.get(&db, &Digest(0xdead)).unwrap(), None);
}

#[test]
fn test_pinned_revision_reads() {
    let db = Store::create(config("test-registry-pinned")).unwrap();

    {
        let mut txn = Transaction::begin(&db).unwrap();
        let ix = db.write_index(true).unwrap().unwrap();
        ix.borrow_mut()
            .insert(&mut txn, "one".to_string(), Extent::from_parts(64, 1).unwrap())
            .unwrap();
        txn.commit().unwrap();
    }
    {
        let mut txn = Transaction::begin(&db).unwrap();
        let ix = db.write_index(true).unwrap().unwrap();
        ix.borrow_mut()
            .insert(&mut txn, "two".to_string(), Extent::from_parts(64, 2).unwrap())
            .unwrap();
        txn.commit().unwrap();
    }

    // pin the view to revision 1; lookups answer as of that revision
    db.sync_to(1).unwrap();
    assert_eq!(db.get_current_revision().unwrap(), 1);
    let ix = db.write_index(true).unwrap().unwrap();
    assert_eq!(ix.borrow().len(), 1);
    assert!(ix.borrow().find(&db, &"one".to_string()).unwrap().is_some());
    assert!(ix.borrow().find(&db, &"two".to_string()).unwrap().is_none());

    // an index handle loaded under the pin refuses writes, even after
    // the store handle itself has moved on to the head
    {
        let stale = db.write_index(true).unwrap().unwrap();
        let mut txn = Transaction::begin(&db).unwrap();
        let res = stale.borrow_mut().insert(
            &mut txn,
            "three".to_string(),
            Extent::from_parts(64, 3).unwrap(),
        );
        match res {
            Err(crate::Error::IndexNotLatestRevision(_, _)) => (),
            res => panic!("unexpected {:?}", res),
        }
        txn.rollback().unwrap();
    }

    // back to the head
    db.sync().unwrap();
    assert_eq!(db.get_current_revision().unwrap(), 2);
    let ix = db.write_index(true).unwrap().unwrap();
    assert_eq!(ix.borrow().len(), 2);
    assert!(ix.borrow().find(&db, &"two".to_string()).unwrap().is_some());
}

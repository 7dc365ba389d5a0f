use super::*;

use crate::store::{Config, Store, Transaction};

use std::env;

fn config(name: &str) -> Config {
    let mut config = Config::new(env::temp_dir().as_os_str(), name);
    config.set_region_size(64 * 1024);
    config
}

#[test]
fn test_set_insert_find() {
    let db = Store::create(config("test-set-insert")).unwrap();

    let keys: Vec<String> = (0..50).map(|i| format!("member-{}", i)).collect();

    let mut set = Set::<String, crate::CityHash>::new(true);
    let record = {
        let mut txn = Transaction::begin(&db).unwrap();
        for key in keys.iter() {
            let (_, inserted) = set.insert(&mut txn, key.clone()).unwrap();
            assert!(inserted, "{}", key);
        }

        // duplicate insertion is a no-op pointing at the original leaf
        let before = set.find(&db, &keys[7]).unwrap().unwrap();
        let (addr, inserted) = set.insert(&mut txn, keys[7].clone()).unwrap();
        assert!(!inserted);
        assert_eq!(addr, before);
        assert_eq!(set.len(), keys.len());

        let record = set.flush(&mut txn, 1).unwrap();
        txn.commit().unwrap();
        record
    };

    let set = Set::<String, crate::CityHash>::open(&db, record, true).unwrap();
    assert_eq!(set.len(), keys.len());
    assert!(!set.is_empty());
    for key in keys.iter() {
        let addr = set.find(&db, key).unwrap().unwrap();
        assert_eq!(&set.load_leaf(&db, addr).unwrap(), key);
    }
    assert_eq!(set.find(&db, &"stranger".to_string()).unwrap(), None);

    let count = set.iter(&db).count();
    assert_eq!(count, keys.len());
}

#[test]
fn test_set_empty() {
    let db = Store::create(config("test-set-empty")).unwrap();

    let mut set = Set::<String, crate::CityHash>::new(true);
    assert!(set.is_empty());
    assert_eq!(set.len(), 0);
    assert!(set.root().is_null());

    // flushing an empty set yields the null record
    let mut txn = Transaction::begin(&db).unwrap();
    txn.alloc_bytes(b"keep the transaction active", 1).unwrap();
    let record = set.flush(&mut txn, 1).unwrap();
    assert!(record.is_null());
    txn.rollback().unwrap();
}

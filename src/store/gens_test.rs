use super::*;

use crate::store::{Config, Transaction};

use std::env;

fn config(name: &str) -> Config {
    let mut config = Config::new(env::temp_dir().as_os_str(), name);
    config.set_region_size(64 * 1024);
    config
}

#[test]
fn test_generation_iter() {
    let db = Store::create(config("test-gens-iter")).unwrap();

    for i in 0..3_u32 {
        let mut txn = Transaction::begin(&db).unwrap();
        txn.alloc_bytes(&i.to_le_bytes(), 4).unwrap();
        assert_eq!(txn.commit().unwrap(), (i + 1) as u64);
    }

    // walks from the head back to revision zero, generations strictly
    // decreasing by one
    let gens: Vec<u64> = db
        .generations()
        .map(|item| item.unwrap().1.generation)
        .collect();
    assert_eq!(gens, vec![3, 2, 1, 0]);

    let (pos, trailer) = db.generations().next().unwrap().unwrap();
    assert_eq!(pos, db.footer_pos());
    assert_eq!(trailer.generation, 3);

    // chain addresses decrease strictly, every revision sits behind its
    // successor in the file
    let addrs: Vec<u64> = db
        .generations()
        .map(|item| item.unwrap().0.to_u64())
        .collect();
    for pair in addrs.windows(2) {
        assert!(pair[0] > pair[1], "{} > {}", pair[0], pair[1]);
    }

    let (_, last) = db.generations().last().unwrap().unwrap();
    assert_eq!(last.generation, 0);
    assert!(last.prev_generation.is_null());
}

#[test]
fn test_revision_trailer() {
    let db = Store::create(config("test-gens-revision")).unwrap();

    for i in 0..4_u32 {
        let mut txn = Transaction::begin(&db).unwrap();
        txn.alloc_bytes(&i.to_le_bytes(), 4).unwrap();
        txn.commit().unwrap();
    }

    for revision in 0..5_u64 {
        let (_, trailer) = db.revision_trailer(revision).unwrap();
        assert_eq!(trailer.generation, revision);
    }
    assert!(db.revision_trailer(5).is_err());
}

use super::*;

use crate::{
    store::{Config, Store, HEADER_SIZE},
    TypedAddress,
};

use std::env;

fn config(name: &str) -> Config {
    let mut config = Config::new(env::temp_dir().as_os_str(), name);
    config.set_region_size(64 * 1024);
    config
}

#[test]
fn test_commit_empty_does_nothing() {
    let db = Store::create(config("test-txn-empty")).unwrap();

    let mut txn = Transaction::begin(&db).unwrap();
    assert!(!txn.is_active());
    let revision = txn.commit().unwrap();

    assert_eq!(revision, 0);
    assert_eq!(db.footer_pos().to_u64(), HEADER_SIZE);
    assert_eq!(db.get_current_revision().unwrap(), 0);
}

#[test]
fn test_commit_int() {
    let db = Store::create(config("test-txn-int")).unwrap();
    let value = 32749_u32;

    let addr = {
        let mut txn = Transaction::begin(&db).unwrap();
        let addr = txn.allocate(4, 4).unwrap();
        assert_eq!(addr.to_u64() % 4, 0, "alignment for u32");
        txn.getrw(addr, 4).unwrap().copy_from_slice(&value.to_le_bytes());
        assert_eq!(txn.commit().unwrap(), 1);
        addr
    };

    // first byte after the r0 trailer
    assert_eq!(addr.to_u64(), HEADER_SIZE + TRAILER_SIZE);

    // r1 trailer lands behind the int, padded to 8 bytes
    let mut footer1 = HEADER_SIZE + TRAILER_SIZE + 4;
    footer1 += crate::calc_alignment(footer1, 8);
    assert_eq!(db.footer_pos().to_u64(), footer1);

    let r1 = db.current_trailer().unwrap();
    assert_eq!(r1.generation, 1);
    assert!(r1.size >= 4, "size {} must cover the int", r1.size);
    assert_eq!(r1.prev_generation, TypedAddress::new(crate::Address::new(HEADER_SIZE)));

    let r0 = Trailer::validate(&db, r1.prev_generation).unwrap().unwrap();
    assert_eq!(r0.generation, 0);
    assert_eq!(r0.size, 0);
    assert!(r0.prev_generation.is_null());
    assert!(r1.time >= r0.time);

    let view = db.getro(addr, 4).unwrap();
    assert_eq!(&view[..], &value.to_le_bytes());
}

#[test]
fn test_commit_two_transactions() {
    let db = Store::create(config("test-txn-two")).unwrap();

    {
        let mut txn = Transaction::begin(&db).unwrap();
        txn.alloc_bytes(&1_u32.to_le_bytes(), 4).unwrap();
        txn.commit().unwrap();
    }
    {
        let mut txn = Transaction::begin(&db).unwrap();
        txn.alloc_bytes(&2_u32.to_le_bytes(), 4).unwrap();
        txn.commit().unwrap();
    }

    let mut footer2 = HEADER_SIZE + TRAILER_SIZE;
    footer2 += crate::calc_alignment(footer2, 4);
    footer2 += 4;
    footer2 += crate::calc_alignment(footer2, 8);
    footer2 += TRAILER_SIZE;
    footer2 += crate::calc_alignment(footer2, 4);
    footer2 += 4;
    footer2 += crate::calc_alignment(footer2, 8);

    assert_eq!(db.footer_pos().to_u64(), footer2);
    assert_eq!(db.get_current_revision().unwrap(), 2);
}

#[test]
fn test_rollback() {
    let db = Store::create(config("test-txn-rollback")).unwrap();

    {
        let mut txn = Transaction::begin(&db).unwrap();
        let addr = txn.allocate(4, 4).unwrap();
        txn.getrw(addr, 4).unwrap().copy_from_slice(&42_u32.to_le_bytes());
        txn.rollback().unwrap();
    }

    assert_eq!(db.footer_pos().to_u64(), HEADER_SIZE);
    assert_eq!(db.get_current_revision().unwrap(), 0);

    // the store reopens clean; rolled back bytes are unreachable
    drop(db);
    let db = Store::open(config("test-txn-rollback")).unwrap();
    assert_eq!(db.get_current_revision().unwrap(), 0);

    // rolled back space is reused by the next transaction
    let mut txn = Transaction::begin(&db).unwrap();
    let addr = txn.allocate(4, 4).unwrap();
    assert_eq!(addr.to_u64(), HEADER_SIZE + TRAILER_SIZE);
    txn.rollback().unwrap();
}

#[test]
fn test_drop_rolls_back() {
    let db = Store::create(config("test-txn-drop")).unwrap();
    {
        let mut txn = Transaction::begin(&db).unwrap();
        txn.alloc_bytes(&7_u64.to_le_bytes(), 8).unwrap();
        // dropped without commit
    }
    assert_eq!(db.footer_pos().to_u64(), HEADER_SIZE);
    assert_eq!(db.get_current_revision().unwrap(), 0);
}

#[test]
fn test_allocate_after_commit() {
    let db = Store::create(config("test-txn-after-commit")).unwrap();

    let mut txn = Transaction::begin(&db).unwrap();
    txn.alloc_bytes(&9_u32.to_le_bytes(), 4).unwrap();
    txn.commit().unwrap();

    match txn.allocate(8, 8) {
        Err(Error::CannotAllocateAfterCommit(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }
}

#[test]
fn test_getrw_outside_transaction() {
    let db = Store::create(config("test-txn-outside")).unwrap();

    let mut txn = Transaction::begin(&db).unwrap();
    let addr = txn.allocate(8, 8).unwrap();

    // committed bytes are not writable
    match txn.getrw(crate::Address::new(HEADER_SIZE), 8) {
        Err(Error::WriteOutsideTransaction(_, _)) => (),
        res => panic!("unexpected {:?}", res.map(|v| v.len())),
    }
    // neither is unallocated space past the transaction
    match txn.getrw(addr, 1024) {
        Err(Error::WriteOutsideTransaction(_, _)) => (),
        res => panic!("unexpected {:?}", res.map(|v| v.len())),
    }

    txn.rollback().unwrap();
}

#[test]
fn test_append_only() {
    use std::{fs, path};

    let conf = config("test-txn-append-only");
    let db = Store::create(conf.clone()).unwrap();

    {
        let mut txn = Transaction::begin(&db).unwrap();
        txn.alloc_bytes(b"first revision payload", 1).unwrap();
        txn.commit().unwrap();
    }
    let committed_end = db.footer_pos().to_u64() + TRAILER_SIZE;
    let before = fs::read(path::Path::new(&conf.to_location())).unwrap();

    {
        let mut txn = Transaction::begin(&db).unwrap();
        txn.alloc_bytes(b"second revision payload", 1).unwrap();
        txn.commit().unwrap();
    }
    let after = fs::read(path::Path::new(&conf.to_location())).unwrap();

    // every committed byte is unchanged, except the footer_pos word
    assert_eq!(before[..32], after[..32]);
    assert_eq!(
        before[40..committed_end as usize],
        after[40..committed_end as usize]
    );
}

#[test]
fn test_spanning_allocation() {
    // allocations larger than a region are served from scratch buffers
    // and written back transparently
    let db = Store::create(config("test-txn-spanning")).unwrap();
    let page = 64 * 1024;

    let payload: Vec<u8> = (0..(page + page / 2) as u32)
        .map(|i| (i % 251) as u8)
        .collect();

    let addr = {
        let mut txn = Transaction::begin(&db).unwrap();
        let addr = txn.alloc_bytes(&payload, 8).unwrap();
        txn.commit().unwrap();
        addr
    };

    let view = db.getro(addr, payload.len() as u64).unwrap();
    assert_eq!(&view[..], &payload[..]);
}

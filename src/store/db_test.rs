use super::*;

use crate::store::{AccessMode, Config, Transaction};

use std::env;

fn config(name: &str) -> Config {
    let mut config = Config::new(env::temp_dir().as_os_str(), name);
    config.set_region_size(64 * 1024);
    config
}

#[test]
fn test_create() {
    let db = Store::create(config("test-db-create")).unwrap();

    assert_eq!(db.get_current_revision().unwrap(), 0);
    assert_eq!(db.footer_pos().to_u64(), HEADER_SIZE);

    let trailer = db.current_trailer().unwrap();
    assert_eq!(trailer.generation, 0);
    assert_eq!(trailer.size, 0);
    assert!(trailer.prev_generation.is_null());
    for record in trailer.index_records.iter() {
        assert!(record.is_null());
    }

    // raw header bytes
    let view = db.getro(Address::NULL, HEADER_SIZE).unwrap();
    assert_eq!(&view[0..4], &[0x70, 0x53, 0x74, 0x72]);
    assert_eq!(&view[32..40], &HEADER_SIZE.to_le_bytes());
}

#[test]
fn test_open() {
    let uuid = {
        let db = Store::create(config("test-db-open")).unwrap();
        db.to_uuid()
    };

    let db = Store::open(config("test-db-open")).unwrap();
    assert_eq!(db.get_current_revision().unwrap(), 0);
    assert_eq!(db.to_uuid(), uuid);

    let mut ro = config("test-db-open");
    ro.set_access_mode(AccessMode::ReadOnly);
    let db = Store::open(ro).unwrap();
    match Transaction::begin(&db) {
        Err(Error::ReadOnlyStore(_, _)) => (),
        res => panic!("unexpected {:?}", res.map(|_| ())),
    };
}

#[test]
fn test_open_missing() {
    assert!(Store::open(config("test-db-no-such-store")).is_err());
}

#[test]
fn test_open_corrupt_header() {
    use std::{fs, io::{Seek, SeekFrom, Write}, path};

    let conf = config("test-db-corrupt");
    Store::create(conf.clone()).unwrap();

    {
        let loc = conf.to_location();
        let flipped = {
            let data = fs::read(path::Path::new(&loc)).unwrap();
            !data[13] // uuid byte
        };
        let mut opts = fs::OpenOptions::new();
        let mut fd = opts.write(true).open(path::Path::new(&loc)).unwrap();
        fd.seek(SeekFrom::Start(13)).unwrap();
        fd.write_all(&[flipped]).unwrap();
        fd.sync_all().unwrap();
    }

    match Store::open(conf) {
        Err(Error::HeaderCorrupt(_, _)) => (),
        res => panic!("unexpected {:?}", res.map(|_| ())),
    }
}

#[test]
fn test_arbitrary_config() {
    use arbitrary::Unstructured;
    use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

    let seed: u64 = random();
    println!("test_arbitrary_config seed {}", seed);
    let mut rng = SmallRng::seed_from_u64(seed);

    let mut config: Config = {
        let bytes = rng.gen::<[u8; 32]>();
        let mut uns = Unstructured::new(&bytes);
        uns.arbitrary().unwrap()
    };
    config.name = "test-db-arbitrary".to_string();
    config.dir = env::temp_dir().into_os_string();

    println!("test_arbitrary_config {:?}", config);
    let db = Store::create(config).unwrap();
    assert_eq!(db.get_current_revision().unwrap(), 0);
}

#[test]
fn test_bad_address() {
    let db = Store::create(config("test-db-bad-address")).unwrap();
    match db.getro(Address::new(1 << 40), 8) {
        Err(Error::BadAddress(_, _)) => (),
        res => panic!("unexpected {:?}", res.map(|v| v.len())),
    }
}

use super::*;

#[test]
fn test_header_roundtrip() {
    let uuid = [7_u8; 16];
    let header = Header::new(uuid);
    let buf = header.encode();

    assert_eq!(buf.len() as u64, HEADER_SIZE);
    assert_eq!(&buf[0..4], &[0x70, 0x53, 0x74, 0x72]);
    // footer_pos and padding stay zero in the encoded form.
    assert!(buf[32..64].iter().all(|b| *b == 0));

    let decoded = Header::decode(&buf).unwrap();
    assert_eq!(decoded, header);
}

#[test]
fn test_header_corrupt() {
    let header = Header::new([1_u8; 16]);

    let mut buf = header.encode();
    buf[0] = b'x';
    match Header::decode(&buf) {
        Err(Error::HeaderCorrupt(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    let mut buf = header.encode();
    buf[13] ^= 0xFF; // uuid byte, crc no longer matches
    match Header::decode(&buf) {
        Err(Error::HeaderCorrupt(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    match Header::decode(&buf[..32]) {
        Err(Error::HeaderCorrupt(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }
}

#[test]
fn test_header_version_mismatch() {
    let mut buf = Header::new([2_u8; 16]).encode();
    buf[8..10].copy_from_slice(&99_u16.to_le_bytes());
    // patch the crc so only the version check can fail
    let crc = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC).checksum(&buf[0..28]);
    buf[28..32].copy_from_slice(&crc.to_le_bytes());

    match Header::decode(&buf) {
        Err(Error::VersionMismatch(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }
}

#[test]
fn test_trailer_roundtrip() {
    let mut trailer = Trailer::initial(1234567);
    assert_eq!(trailer.generation, 0);
    assert_eq!(trailer.size, 0);
    assert!(trailer.prev_generation.is_null());

    trailer.generation = 42;
    trailer.size = 4096;
    trailer.prev_generation = TypedAddress::new(Address::new(64));
    trailer.index_records[3] = Address::new(8192);

    let buf = trailer.encode();
    assert_eq!(buf.len() as u64, TRAILER_SIZE);
    assert_eq!(&buf[0..8], b"hPPyfooT");
    assert_eq!(&buf[96..104], b"hPPyTail");

    let decoded = Trailer::decode(&buf).unwrap();
    assert_eq!(decoded, trailer);
}

#[test]
fn test_trailer_corrupt() {
    let trailer = Trailer::initial(99);

    let mut buf = trailer.encode();
    buf[16] ^= 0x01; // size field, crc mismatch
    match Trailer::decode(&buf) {
        Err(Error::FooterCorrupt(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    let mut buf = trailer.encode();
    buf[100] = b'!';
    match Trailer::decode(&buf) {
        Err(Error::FooterCorrupt(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }
}

use super::*;
use proptest::prelude::*;

// -------------------- Fixed width --------------------

#[test]
fn fixed32_is_little_endian() {
    let mut buf = Vec::new();
    put_fixed32(&mut buf, 0x0403_0201);
    assert_eq!(buf, [0x01, 0x02, 0x03, 0x04]);
    assert_eq!(decode_fixed32(&buf).unwrap(), 0x0403_0201);
}

#[test]
fn fixed64_is_little_endian() {
    let mut buf = [0u8; 8];
    encode_fixed64(&mut buf, 0x0807_0605_0403_0201);
    assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(decode_fixed64(&buf).unwrap(), 0x0807_0605_0403_0201);
}

#[test]
fn fixed_decode_on_short_buffer_fails() {
    assert_eq!(
        decode_fixed32(&[1, 2, 3]),
        Err(CodingError::Truncated {
            needed: 4,
            available: 3
        })
    );
    assert!(decode_fixed64(&[0; 7]).is_err());
}

// -------------------- Varint boundaries --------------------

#[test]
fn varint_length_at_group_boundaries() {
    let mut expected = 1;
    for shift in (7..64).step_by(7) {
        let edge = 1u64 << shift;
        assert_eq!(varint_length(edge - 1), expected, "2^{} - 1", shift);
        expected += 1;
        assert_eq!(varint_length(edge), expected, "2^{}", shift);
    }
    assert_eq!(varint_length(u64::MAX), MAX_VARINT64_LEN);
    assert_eq!(varint_length(u64::from(u32::MAX)), MAX_VARINT32_LEN);
}

#[test]
fn varint32_known_encodings() {
    let cases: &[(u32, &[u8])] = &[
        (0, &[0x00]),
        (1, &[0x01]),
        (127, &[0x7f]),
        (128, &[0x80, 0x01]),
        (300, &[0xac, 0x02]),
        (16_383, &[0xff, 0x7f]),
        (16_384, &[0x80, 0x80, 0x01]),
        (u32::MAX, &[0xff, 0xff, 0xff, 0xff, 0x0f]),
    ];
    for &(value, bytes) in cases {
        let mut buf = Vec::new();
        put_varint32(&mut buf, value);
        assert_eq!(buf, bytes, "encoding {}", value);
        assert_eq!(decode_varint32(bytes).unwrap(), (value, bytes.len()));
    }
}

#[test]
fn varint_decode_stops_at_terminator() {
    // trailing bytes are not consumed
    let (v, n) = decode_varint64(&[0x96, 0x01, 0xff, 0xff]).unwrap();
    assert_eq!((v, n), (150, 2));
}

#[test]
fn truncated_varint_fails() {
    assert!(matches!(
        decode_varint32(&[]),
        Err(CodingError::Truncated { .. })
    ));
    assert!(matches!(
        decode_varint32(&[0x80, 0x80]),
        Err(CodingError::Truncated { .. })
    ));
    assert!(matches!(
        decode_varint64(&[0xff; 9]),
        Err(CodingError::Truncated { .. })
    ));
}

#[test]
fn overlong_varint32_fails() {
    // fifth byte carries bits above 2^32
    assert_eq!(
        decode_varint32(&[0xff, 0xff, 0xff, 0xff, 0x1f]),
        Err(CodingError::VarintOverflow { bits: 32 })
    );
    // six continuation bytes
    assert_eq!(
        decode_varint32(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x00]),
        Err(CodingError::VarintOverflow { bits: 32 })
    );
}

#[test]
fn overlong_varint64_fails() {
    let mut bytes = vec![0xff; 9];
    bytes.push(0x02);
    assert_eq!(
        decode_varint64(&bytes),
        Err(CodingError::VarintOverflow { bits: 64 })
    );
    assert!(decode_varint64(&[0xff; 11]).is_err());
}

#[test]
fn get_varint_advances_input() {
    let mut buf = Vec::new();
    put_varint32(&mut buf, 1_000);
    put_varint64(&mut buf, 1 << 40);
    let mut input = &buf[..];
    assert_eq!(get_varint32(&mut input).unwrap(), 1_000);
    assert_eq!(get_varint64(&mut input).unwrap(), 1 << 40);
    assert!(input.is_empty());
}

// -------------------- Length-prefixed slices --------------------

#[test]
fn empty_slice_is_a_single_zero_byte() {
    let mut buf = Vec::new();
    put_length_prefixed_slice(&mut buf, b"");
    assert_eq!(buf, [0]);
    assert_eq!(decode_length_prefixed_slice(&buf).unwrap(), (&b""[..], 1));
}

#[test]
fn length_prefix_past_end_fails_and_leaves_input() {
    let buf = [5u8, b'a', b'b'];
    let mut input = &buf[..];
    assert_eq!(
        get_length_prefixed_slice(&mut input),
        Err(CodingError::LengthOverrun {
            len: 5,
            remaining: 2
        })
    );
    assert_eq!(input.len(), 3);
}

#[test]
fn consecutive_slices_decode_in_order() {
    let mut buf = Vec::new();
    put_length_prefixed_slice(&mut buf, b"key");
    put_length_prefixed_slice(&mut buf, &[7u8; 200]);
    let mut input = &buf[..];
    assert_eq!(get_length_prefixed_slice(&mut input).unwrap(), b"key");
    assert_eq!(get_length_prefixed_slice(&mut input).unwrap(), &[7u8; 200][..]);
    assert!(input.is_empty());
}

// -------------------- Properties --------------------

proptest! {
    #[test]
    fn varint32_roundtrip(v in any::<u32>()) {
        let mut buf = Vec::new();
        put_varint32(&mut buf, v);
        prop_assert_eq!(buf.len(), varint_length(u64::from(v)));
        prop_assert_eq!(decode_varint32(&buf).unwrap(), (v, buf.len()));
    }

    #[test]
    fn varint64_roundtrip(v in any::<u64>()) {
        let mut buf = Vec::new();
        put_varint64(&mut buf, v);
        prop_assert_eq!(buf.len(), varint_length(v));
        prop_assert_eq!(decode_varint64(&buf).unwrap(), (v, buf.len()));
    }

    #[test]
    fn length_prefixed_roundtrip(s in proptest::collection::vec(any::<u8>(), 0..600)) {
        let mut buf = Vec::new();
        put_length_prefixed_slice(&mut buf, &s);
        let (decoded, consumed) = decode_length_prefixed_slice(&buf).unwrap();
        prop_assert_eq!(decoded, &s[..]);
        prop_assert_eq!(consumed, varint_length(s.len() as u64) + s.len());
    }

    #[test]
    fn decoding_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..16)) {
        let _ = decode_varint32(&bytes);
        let _ = decode_varint64(&bytes);
        let _ = decode_length_prefixed_slice(&bytes);
    }
}

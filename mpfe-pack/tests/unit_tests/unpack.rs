use mpfe_pack::{pack_to_vec, PackError, Unpack, UnpackBuffer};

#[test]
fn truncated_input_is_unexpected_end() {
    let bytes = [1u8, 2, 3];
    let mut reader = UnpackBuffer::new(&bytes);
    assert_eq!(
        reader.extract_pod::<i32>().unwrap_err(),
        PackError::UnexpectedEnd {
            requested: 4,
            available: 3
        }
    );
    // A failed read leaves the position untouched
    assert_eq!(reader.position(), 0);
    assert_eq!(reader.extract_pod::<u8>().unwrap(), 1);
}

#[test]
fn negative_object_header_is_rejected() {
    let bytes = (-4i32).to_le_bytes();
    let mut reader = UnpackBuffer::new(&bytes);
    assert_eq!(
        reader.extract_object().unwrap_err(),
        PackError::InvalidObjectHeader { size: -4 }
    );
}

#[test]
fn object_larger_than_remaining_input_is_unexpected_end() {
    let mut bytes = 16i32.to_le_bytes().to_vec();
    bytes.extend_from_slice(&[0u8; 8]);
    let mut reader = UnpackBuffer::new(&bytes);
    assert!(matches!(
        reader.skip_object(),
        Err(PackError::UnexpectedEnd {
            requested: 16,
            available: 8
        })
    ));
}

#[test]
fn strings_and_vectors_unpack() {
    let values = vec![1.5, -2.5, 1e300];
    let mut bytes = pack_to_vec(&values).unwrap();
    bytes.extend(pack_to_vec("thermo").unwrap());

    let mut reader = UnpackBuffer::new(&bytes);
    assert_eq!(Vec::<f64>::unpack(&mut reader).unwrap(), values);
    assert_eq!(String::unpack(&mut reader).unwrap(), "thermo");
    assert!(reader.is_at_end());
}

#[test]
fn invalid_utf8_is_invalid_data() {
    let mut bytes = 2usize.to_le_bytes().to_vec();
    bytes.extend_from_slice(&[0xff, 0xfe]);
    let mut reader = UnpackBuffer::new(&bytes);
    assert!(matches!(String::unpack(&mut reader), Err(PackError::InvalidData(_))));
}

#[test]
fn array_length_overflowing_the_byte_count_is_unexpected_end() {
    let bytes = [0u8; 16];
    let mut reader = UnpackBuffer::new(&bytes);
    assert_eq!(
        reader.extract_array::<f64>(usize::MAX / 4).unwrap_err(),
        PackError::UnexpectedEnd {
            requested: usize::MAX,
            available: 16
        }
    );
    assert_eq!(reader.position(), 0);
}

#[test]
fn corrupt_length_prefix_is_an_error() {
    let mut bytes = usize::MAX.to_le_bytes().to_vec();
    bytes.extend_from_slice(&1.0f64.to_le_bytes());
    assert!(matches!(
        Vec::<f64>::unpack(&mut UnpackBuffer::new(&bytes)),
        Err(PackError::UnexpectedEnd { available: 8, .. })
    ));
    assert!(matches!(
        String::unpack(&mut UnpackBuffer::new(&bytes)),
        Err(PackError::UnexpectedEnd { available: 8, .. })
    ));
}

use mpfe_pack::{pack_to_vec, Pack, PackBuffer, PackError, UnpackBuffer, OBJECT_HEADER_SIZE};
use proptest::prelude::*;

struct Record {
    id: i32,
    values: Vec<f64>,
}

impl Pack for Record {
    fn pack(&self, buffer: &mut PackBuffer) -> Result<(), PackError> {
        let mut object = buffer.begin_object()?;
        object.add_pod(self.id)?;
        object.add_array(&self.values)?;
        Ok(())
    }
}

#[test]
fn sizing_phase_reports_header_int_and_doubles() {
    let record = Record {
        id: 17,
        values: (0..7).map(|i| i as f64 * 0.5).collect(),
    };

    let mut buffer = PackBuffer::new();
    record.pack(&mut buffer).unwrap();
    assert!(buffer.is_sizing());
    assert_eq!(buffer.required_size(), 64);
    assert!(buffer.bytes().is_empty());

    buffer.start_packing();
    record.pack(&mut buffer).unwrap();
    let bytes = buffer.finish().unwrap();
    assert_eq!(bytes.len(), 64);

    let mut reader = UnpackBuffer::new(&bytes);
    let mut object = reader.extract_object().unwrap();
    assert!(reader.is_at_end());
    assert_eq!(object.extract_pod::<i32>().unwrap(), 17);
    assert_eq!(object.extract_array::<f64>(7).unwrap(), record.values);
    assert!(object.is_at_end());
}

#[test]
fn object_header_equals_payload_size() {
    let bytes = pack_to_vec(&Record {
        id: 1,
        values: vec![1.0, 2.0],
    })
    .unwrap();
    let header = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    assert_eq!(header as usize, bytes.len() - OBJECT_HEADER_SIZE);
}

#[test]
fn nested_objects_are_patched_independently() {
    struct Nested;

    impl Pack for Nested {
        fn pack(&self, buffer: &mut PackBuffer) -> Result<(), PackError> {
            let mut outer = buffer.begin_object()?;
            outer.add_pod(1u8)?;
            {
                let mut inner = outer.begin_object()?;
                inner.add_pod(2.0f64)?;
            }
            outer.add_pod(3u8)?;
            Ok(())
        }
    }

    let bytes = pack_to_vec(&Nested).unwrap();
    // outer header + u8 + (inner header + f64) + u8
    assert_eq!(bytes.len(), 4 + 1 + 4 + 8 + 1);

    let mut reader = UnpackBuffer::new(&bytes);
    let mut outer = reader.extract_object().unwrap();
    assert_eq!(outer.extract_pod::<u8>().unwrap(), 1);
    let mut inner = outer.extract_object().unwrap();
    assert_eq!(inner.extract_pod::<f64>().unwrap(), 2.0);
    assert_eq!(outer.extract_pod::<u8>().unwrap(), 3);
}

#[test]
fn explicit_end_patches_header() {
    let run = |buffer: &mut PackBuffer| -> Result<(), PackError> {
        let mut object = buffer.begin_object()?;
        object.add_pod(5i64)?;
        object.end();
        buffer.add_pod(9i32)
    };
    let mut buffer = PackBuffer::new();
    run(&mut buffer).unwrap();
    buffer.start_packing();
    run(&mut buffer).unwrap();
    let bytes = buffer.finish().unwrap();

    let mut reader = UnpackBuffer::new(&bytes);
    assert_eq!(reader.peek_object_size().unwrap(), 12);
    assert_eq!(reader.skip_object().unwrap(), 8);
    assert_eq!(reader.extract_pod::<i32>().unwrap(), 9);
}

#[test]
fn writing_more_than_reserved_is_buffer_overflow() {
    let mut buffer = PackBuffer::new();
    buffer.add_pod(1i32).unwrap();
    buffer.start_packing();
    buffer.add_pod(1i32).unwrap();
    let err = buffer.add_pod(2i32).unwrap_err();
    assert_eq!(
        err,
        PackError::BufferOverflow {
            reserved: 4,
            requested: 8
        }
    );
}

#[test]
fn writing_less_than_reserved_is_size_mismatch() {
    let mut buffer = PackBuffer::new();
    buffer.add_array(&[1.0f64, 2.0]).unwrap();
    buffer.start_packing();
    buffer.add_pod(1.0f64).unwrap();
    assert_eq!(
        buffer.finish().unwrap_err(),
        PackError::SizeMismatch {
            reserved: 16,
            written: 8
        }
    );
}

#[test]
fn finishing_without_packing_phase_is_size_mismatch() {
    let mut buffer = PackBuffer::new();
    buffer.add_pod(true).unwrap();
    assert!(matches!(buffer.finish(), Err(PackError::SizeMismatch { .. })));
}

#[test]
fn usize_is_encoded_with_eight_bytes() {
    let bytes = pack_to_vec("abc").unwrap();
    assert_eq!(bytes.len(), 8 + 3);
    assert_eq!(&bytes[..8], &3u64.to_le_bytes());
}

proptest! {
    #[test]
    fn header_matches_bytes_between_markers(id in any::<i32>(), values in prop::collection::vec(any::<f64>(), 0..32)) {
        let record = Record { id, values: values.clone() };
        let bytes = pack_to_vec(&record).unwrap();
        prop_assert_eq!(bytes.len(), OBJECT_HEADER_SIZE + 4 + 8 * values.len());

        let mut reader = UnpackBuffer::new(&bytes);
        let mut object = reader.extract_object().unwrap();
        prop_assert_eq!(object.extract_pod::<i32>().unwrap(), id);
        let extracted = object.extract_array::<f64>(values.len()).unwrap();
        // Compare bit patterns so that NaN payloads are covered as well
        let expected_bits: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
        let extracted_bits: Vec<u64> = extracted.iter().map(|v| v.to_bits()).collect();
        prop_assert_eq!(extracted_bits, expected_bits);
    }
}

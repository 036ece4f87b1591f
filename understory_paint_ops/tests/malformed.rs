// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hostile and damaged input.
//!
//! The deserializer must reject every malformed stream with an error, never
//! a panic, and must leave the destination buffer untouched when it aborts.

use std::sync::Arc;

use kurbo::BezPath;
use understory_paint_ops::ops::{
    DrawAnimationOp, DrawImageOp, DrawPathOp, DrawRecordOp, DrawRectOp, DrawTextRunOp, RestoreOp,
    SaveOp, TranslateOp,
};
use understory_paint_ops::{
    Affine, AnimationOverrides, AnimationPayload, Color, DeserializeError, DeserializeOptions,
    ErrorPolicy, FillRule, ImageData, ImageId, OpKind, PaintFlags, PaintImage,
    PaintOpBuffer, PaintPath, PointF, RectF, SerializeOptions, TextRun, deserialize_buffer,
    deserialize_into, deserialize_op, pack_header, serialize_buffer, validate_header,
};

fn header(kind: OpKind, skip: u32) -> [u8; 4] {
    pack_header(kind.tag(), skip).to_le_bytes()
}

fn serialize(buffer: &PaintOpBuffer) -> Vec<u8> {
    serialize_buffer(buffer, &SerializeOptions::default(), Affine::IDENTITY).unwrap()
}

fn sample() -> PaintOpBuffer {
    let mut path = BezPath::new();
    path.move_to((1.0, 1.0));
    path.line_to((9.0, 1.0));
    path.quad_to((9.0, 9.0), (1.0, 9.0));
    path.close_path();

    let mut nested = PaintOpBuffer::new();
    nested.push(TranslateOp { dx: 1.0, dy: 2.0 });
    nested.push(DrawRectOp::new(
        RectF::new(0.0, 0.0, 3.0, 3.0),
        PaintFlags::default(),
    ));

    let mut buffer = PaintOpBuffer::new();
    buffer.push(SaveOp);
    buffer.push(DrawPathOp {
        path: PaintPath::new(path, FillRule::NonZero),
        flags: PaintFlags::stroke(Color::BLACK, 1.0),
    });
    buffer.push(DrawImageOp::new(
        PaintImage::from_data(ImageId(1), ImageData::filled(2, 1, [5, 6, 7, 8]).unwrap()),
        0.0,
        0.0,
    ));
    buffer.push(DrawTextRunOp {
        run: Arc::new(TextRun {
            font_id: 1,
            font_size: 12.0,
            glyphs: vec![1, 2],
            positions: vec![PointF::new(0.0, 0.0), PointF::new(6.0, 0.0)],
            bounds: RectF::new(0.0, -10.0, 12.0, 2.0),
        }),
        x: 0.0,
        y: 0.0,
        flags: PaintFlags::default(),
    });
    buffer.push(DrawRecordOp {
        record: Arc::new(nested),
    });
    buffer.push(RestoreOp);
    buffer
}

fn record_boundaries(bytes: &[u8]) -> Vec<usize> {
    let mut boundaries = vec![0];
    let mut offset = 0;
    while offset < bytes.len() {
        let (_, skip) = validate_header(&bytes[offset..]).unwrap();
        offset += skip;
        boundaries.push(offset);
    }
    boundaries
}

#[test]
fn tag_one_past_the_last_kind_is_rejected() {
    let past_last = u8::try_from(OpKind::COUNT).unwrap();
    let mut bytes = pack_header(past_last, 8).to_le_bytes().to_vec();
    bytes.resize(8, 0);
    assert_eq!(
        validate_header(&bytes),
        Err(DeserializeError::InvalidTag(past_last))
    );

    let mut buffer = PaintOpBuffer::new();
    buffer.push(SaveOp);
    let result = deserialize_into(
        &mut buffer,
        &bytes,
        &DeserializeOptions::default(),
        ErrorPolicy::Abort,
    );
    assert_eq!(result, Err(DeserializeError::InvalidTag(past_last)));
    assert_eq!(buffer.op_count(), 1);
}

#[test]
fn framing_errors_are_reported() {
    let cases: [(Vec<u8>, DeserializeError); 4] = [
        (
            vec![0; 3],
            DeserializeError::TruncatedHeader { remaining: 3 },
        ),
        (
            [header(OpKind::Save, 16), [0; 4]].concat(),
            DeserializeError::LengthOutOfBounds {
                skip: 16,
                remaining: 8,
            },
        ),
        (
            [&header(OpKind::Save, 12)[..], &[0_u8; 12][..]].concat(),
            DeserializeError::MisalignedLength(12),
        ),
        (
            [header(OpKind::Save, 0), [0; 4]].concat(),
            DeserializeError::MisalignedLength(0),
        ),
    ];
    for (bytes, expected) in cases {
        let result = deserialize_op(&bytes, &DeserializeOptions::default());
        assert_eq!(result.err(), Some(expected.clone()), "{bytes:?}");
    }
}

#[test]
fn oversized_length_is_rejected() {
    let mut bytes = vec![0; 1 << 24];
    bytes[..4].copy_from_slice(&header(OpKind::Save, 0xFF_FFFF));
    assert_eq!(
        validate_header(&bytes),
        Err(DeserializeError::LengthTooLarge(0xFF_FFFF))
    );
}

#[test]
fn nested_count_cannot_outrun_the_record() {
    let mut bytes = header(OpKind::DrawRecord, 16).to_vec();
    bytes.extend_from_slice(&1000_u32.to_le_bytes());
    bytes.resize(16, 0);
    assert_eq!(
        deserialize_op(&bytes, &DeserializeOptions::default()).err(),
        Some(DeserializeError::UnexpectedEof("nested ops"))
    );
}

#[test]
fn nested_op_count_is_bounded() {
    let mut nested = PaintOpBuffer::new();
    nested.push(SaveOp);
    nested.push(RestoreOp);
    let mut buffer = PaintOpBuffer::new();
    buffer.push(DrawRecordOp {
        record: Arc::new(nested),
    });
    let bytes = serialize(&buffer);

    let options = DeserializeOptions {
        max_nested_ops: 1,
        ..DeserializeOptions::default()
    };
    assert_eq!(
        deserialize_buffer(&bytes, &options).err(),
        Some(DeserializeError::CollectionTooLarge {
            what: "nested ops",
            count: 2,
            max: 1,
        })
    );
    assert_eq!(
        deserialize_buffer(&bytes, &DeserializeOptions::default()),
        Ok(buffer)
    );
}

#[test]
fn inflated_nested_count_fails_on_the_first_bad_child() {
    let len: u32 = 1 << 20;
    let count = (len - 8) / 8;
    let mut bytes = header(OpKind::DrawRecord, len).to_vec();
    bytes.extend_from_slice(&count.to_le_bytes());
    bytes.resize(len as usize, 0);
    assert_eq!(
        deserialize_op(&bytes, &DeserializeOptions::default()).err(),
        Some(DeserializeError::MisalignedLength(0))
    );
}

#[test]
fn every_truncation_fails_or_stops_on_a_boundary() {
    let buffer = sample();
    let bytes = serialize(&buffer);
    let boundaries = record_boundaries(&bytes);
    for len in 0..bytes.len() {
        let result = deserialize_buffer(&bytes[..len], &DeserializeOptions::default());
        match boundaries.iter().position(|b| *b == len) {
            Some(records) => assert_eq!(result.map(|b| b.op_count()), Ok(records)),
            None => assert!(result.is_err(), "prefix of {len} bytes decoded"),
        }
    }
}

#[test]
fn corrupted_bytes_never_panic() {
    let bytes = serialize(&sample());
    let options = DeserializeOptions::default();
    for index in 0..bytes.len() {
        for mask in [0x01, 0x10, 0x80, 0xFF] {
            let mut damaged = bytes.clone();
            damaged[index] ^= mask;
            if let Ok(decoded) = deserialize_buffer(&damaged, &options) {
                // Whatever survives validation must serialize again.
                serialize(&decoded);
            }
            let mut buffer = PaintOpBuffer::new();
            let summary = deserialize_into(&mut buffer, &damaged, &options, ErrorPolicy::SkipRecord)
                .unwrap();
            assert!(summary.bytes_consumed <= damaged.len());
            assert_eq!(buffer.op_count(), summary.ops_read);
        }
    }
}

#[test]
fn skip_policy_steps_over_invalid_records() {
    let mut stream = PaintOpBuffer::new();
    stream.push(SaveOp);
    stream.push(DrawRectOp::new(
        RectF::new(0.0, f32::NAN, 1.0, 1.0),
        PaintFlags::default(),
    ));
    stream.push(RestoreOp);
    let bytes = serialize(&stream);

    let mut buffer = PaintOpBuffer::new();
    buffer.push(TranslateOp { dx: 1.0, dy: 1.0 });
    let aborted = deserialize_into(
        &mut buffer,
        &bytes,
        &DeserializeOptions::default(),
        ErrorPolicy::Abort,
    );
    assert_eq!(
        aborted,
        Err(DeserializeError::InvalidRecord {
            kind: OpKind::DrawRect,
            reason: "non-finite rect",
        })
    );
    assert_eq!(buffer.op_count(), 1);

    let summary = deserialize_into(
        &mut buffer,
        &bytes,
        &DeserializeOptions::default(),
        ErrorPolicy::SkipRecord,
    )
    .unwrap();
    assert_eq!(summary.ops_read, 2);
    assert_eq!(summary.records_skipped, 1);
    assert_eq!(summary.bytes_consumed, bytes.len());
    assert_eq!(summary.stopped, None);
    let kinds: Vec<_> = buffer.iter().map(|op| op.kind()).collect();
    assert_eq!(kinds, [OpKind::Translate, OpKind::Save, OpKind::Restore]);
}

#[test]
fn skip_policy_stops_at_untrusted_framing() {
    let mut bytes = serialize(&sample());
    let valid = bytes.len();
    bytes.extend_from_slice(&header(OpKind::Save, 64));
    bytes.extend_from_slice(&[0; 4]);

    let mut buffer = PaintOpBuffer::new();
    let summary = deserialize_into(
        &mut buffer,
        &bytes,
        &DeserializeOptions::default(),
        ErrorPolicy::SkipRecord,
    )
    .unwrap();
    assert_eq!(summary.ops_read, sample().op_count());
    assert_eq!(summary.bytes_consumed, valid);
    assert_eq!(
        summary.stopped,
        Some((
            valid,
            DeserializeError::LengthOutOfBounds {
                skip: 64,
                remaining: 8,
            }
        ))
    );
}

fn animation_with(overrides: AnimationOverrides) -> PaintOpBuffer {
    let payload = AnimationPayload::encode(10.0, 10.0, 1.0, &[11], b"body").unwrap();
    let mut buffer = PaintOpBuffer::new();
    buffer.push(DrawAnimationOp {
        animation: Arc::new(payload),
        dst: RectF::new(0.0, 0.0, 10.0, 10.0),
        t: 0.5,
        overrides,
    });
    buffer
}

#[test]
fn animation_overrides_must_name_declared_assets() {
    let mut overrides = AnimationOverrides::default();
    overrides
        .images
        .insert(77, PaintImage::new(ImageId(1), 2, 2));
    let bytes = serialize(&animation_with(overrides));
    assert_eq!(
        deserialize_buffer(&bytes, &DeserializeOptions::default()).err(),
        Some(DeserializeError::InvalidRecord {
            kind: OpKind::DrawAnimation,
            reason: "image override for an undeclared asset",
        })
    );
}

#[test]
fn animation_color_overrides_are_bounded() {
    let mut overrides = AnimationOverrides::default();
    overrides.colors.insert(1, Color::WHITE);
    overrides.colors.insert(2, Color::BLACK);
    let bytes = serialize(&animation_with(overrides));

    let options = DeserializeOptions {
        max_animation_color_overrides: 1,
        ..DeserializeOptions::default()
    };
    assert_eq!(
        deserialize_buffer(&bytes, &options).err(),
        Some(DeserializeError::CollectionTooLarge {
            what: "animation color overrides",
            count: 2,
            max: 1,
        })
    );
    assert!(deserialize_buffer(&bytes, &DeserializeOptions::default()).is_ok());
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Playback against the recording surface.
//!
//! These tests drive buffers, single ops and decoded streams through
//! [`RefSurface`] and assert on the recorded call sequence and on the
//! surface state each call observed.

use std::sync::Arc;

use understory_paint_ops::ops::{
    CustomDataOp, DrawColorOp, DrawImageOp, DrawImageRectOp, DrawRecordOp, DrawRectOp, RestoreOp,
    SaveOp, ScaleOp, SetMatrixOp, SetNodeIdOp, TranslateOp,
};
use understory_paint_ops::{
    Affine, BlendMode, Color, DecodedImage, DeserializeOptions, DrawSurface, ImageData, ImageId,
    ImageProvider, PaintFlags, PaintImage, PaintOp, PaintOpBuffer, PlaybackContext, PlaybackFlags,
    RectF, SerializeOptions, deserialize_buffer, serialize_buffer,
};
use understory_paint_ops_ref::{DrawCall, Event, RefSurface, StateCall};

fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> DrawRectOp {
    DrawRectOp::new(
        RectF::new(x0, y0, x1, y1),
        PaintFlags::from_color(Color::from_rgb8(0, 128, 0)),
    )
}

fn replay(buffer: &PaintOpBuffer, surface: &mut RefSurface) {
    let mut cx = PlaybackContext::new(surface.transform());
    buffer.replay(surface, &mut cx);
}

/// Resolves nothing.
struct Missing;

impl ImageProvider for Missing {
    fn decode_for_transform(&self, _: &PaintImage, _: &Affine) -> Option<DecodedImage> {
        None
    }
}

/// Decodes every image at half its nominal size.
struct HalfSize;

impl ImageProvider for HalfSize {
    fn decode_for_transform(&self, image: &PaintImage, _: &Affine) -> Option<DecodedImage> {
        let data = ImageData::filled(image.width / 2, image.height / 2, [9, 9, 9, 255])?;
        Some(DecodedImage::for_image(image, Arc::new(data)))
    }
}

#[test]
fn nested_record_draws_its_color_once() {
    let mut nested = PaintOpBuffer::new();
    nested.push(DrawColorOp {
        color: Color::from_rgb8(255, 255, 0),
        mode: BlendMode::SrcOver,
    });
    let mut outer = PaintOpBuffer::new();
    outer.push(DrawRecordOp {
        record: Arc::new(nested),
    });

    let bytes = serialize_buffer(&outer, &SerializeOptions::default(), Affine::IDENTITY).unwrap();
    let decoded = deserialize_buffer(&bytes, &DeserializeOptions::default()).unwrap();

    let mut surface = RefSurface::new();
    replay(&decoded, &mut surface);
    let colors: Vec<_> = surface
        .draws()
        .filter(|call| matches!(call, DrawCall::Color { .. }))
        .collect();
    assert_eq!(colors.len(), 1);
    assert_eq!(surface.events().len(), 1, "no state calls expected");
    let Event::Draw { state, .. } = &surface.events()[0] else {
        panic!("expected a draw");
    };
    assert_eq!(state.clip_count, 0);
}

#[test]
fn unresolved_image_draws_nothing() {
    let mut buffer = PaintOpBuffer::new();
    buffer.push(DrawImageOp::new(
        PaintImage::from_data(ImageId(3), ImageData::filled(4, 4, [1, 2, 3, 4]).unwrap()),
        0.0,
        0.0,
    ));
    buffer.push(DrawImageRectOp::new(
        PaintImage::new(ImageId(4), 8, 8),
        RectF::new(0.0, 0.0, 16.0, 16.0),
    ));

    // The provider is authoritative even when pixels are embedded.
    let mut surface = RefSurface::new();
    let mut cx = PlaybackContext::new(Affine::IDENTITY).with_image_provider(&Missing);
    buffer.replay(&mut surface, &mut cx);
    assert!(surface.events().is_empty());

    // Without a provider only the embedded pixels are drawn.
    let mut surface = RefSurface::new();
    replay(&buffer, &mut surface);
    let draws: Vec<_> = surface.draws().collect();
    assert_eq!(draws.len(), 1);
    assert!(matches!(
        draws[0],
        DrawCall::Image {
            width: 4,
            height: 4,
            ..
        }
    ));
}

#[test]
fn downscaled_image_is_counter_scaled_to_nominal_size() {
    let mut buffer = PaintOpBuffer::new();
    buffer.push(DrawImageOp::new(
        PaintImage::new(ImageId(1), 20, 10),
        5.0,
        7.0,
    ));
    let options = SerializeOptions {
        image_provider: Some(&HalfSize),
        ..SerializeOptions::default()
    };
    let bytes = serialize_buffer(&buffer, &options, Affine::IDENTITY).unwrap();
    let decoded = deserialize_buffer(&bytes, &DeserializeOptions::default()).unwrap();

    let mut surface = RefSurface::new();
    replay(&decoded, &mut surface);
    let calls: Vec<_> = surface.events().iter().collect();
    assert_eq!(calls.len(), 4, "{calls:#?}");
    assert!(matches!(
        calls[0],
        Event::State {
            call: StateCall::Save,
            ..
        }
    ));
    let Event::Draw {
        call: DrawCall::Image {
            width,
            height,
            left,
            top,
            ..
        },
        state,
    } = calls[2]
    else {
        panic!("expected an image draw, got {:?}", calls[2]);
    };
    assert_eq!((*width, *height), (10, 5));
    assert_eq!((*left, *top), (0.0, 0.0));
    let expected = Affine::translate((5.0, 7.0)) * Affine::scale(2.0);
    assert_eq!(state.transform, expected);
    assert!(matches!(
        calls[3],
        Event::State {
            call: StateCall::Restore,
            ..
        }
    ));
    assert_eq!(surface.state().transform, Affine::IDENTITY);
}

#[test]
fn image_rect_maps_source_into_decoded_pixels() {
    let mut op = DrawImageRectOp::new(
        PaintImage::new(ImageId(2), 40, 40),
        RectF::new(0.0, 0.0, 10.0, 10.0),
    );
    op.src = RectF::new(10.0, 10.0, 30.0, 30.0);
    let mut surface = RefSurface::new();
    let mut cx = PlaybackContext::new(Affine::IDENTITY).with_image_provider(&HalfSize);
    PaintOp::from(op).replay(&mut surface, &mut cx);

    let draws: Vec<_> = surface.draws().collect();
    let DrawCall::ImageRect {
        width, src, dst, ..
    } = draws[0]
    else {
        panic!("expected an image rect draw");
    };
    assert_eq!(*width, 20);
    assert_eq!(*src, RectF::new(5.0, 5.0, 15.0, 15.0));
    assert_eq!(*dst, RectF::new(0.0, 0.0, 10.0, 10.0));
}

#[test]
fn set_matrix_composes_with_the_original_transform() {
    let original = Affine::translate((100.0, 0.0));
    let mut buffer = PaintOpBuffer::new();
    buffer.push(TranslateOp { dx: 3.0, dy: 3.0 });
    buffer.push(SetMatrixOp {
        matrix: Affine::scale(2.0),
    });
    buffer.push(rect(0.0, 0.0, 1.0, 1.0));

    let mut surface = RefSurface::with_transform(original);
    let mut cx = PlaybackContext::new(original);
    buffer.replay(&mut surface, &mut cx);

    let Some(Event::Draw { state, .. }) = surface.events().last() else {
        panic!("expected a trailing draw");
    };
    // The earlier translate is replaced, not composed.
    assert_eq!(state.transform, original * Affine::scale(2.0));
    assert_ne!(state.transform, Affine::scale(2.0) * original);
}

#[test]
fn set_matrix_is_baked_into_the_stream() {
    let original = Affine::translate((0.0, 50.0));
    let mut buffer = PaintOpBuffer::new();
    buffer.push(SetMatrixOp {
        matrix: Affine::scale(3.0),
    });
    let bytes = serialize_buffer(&buffer, &SerializeOptions::default(), original).unwrap();
    let decoded = deserialize_buffer(&bytes, &DeserializeOptions::default()).unwrap();
    let PaintOp::SetMatrix(op) = &decoded.ops()[0] else {
        panic!("expected a set-matrix op");
    };
    assert_eq!(op.matrix, original * Affine::scale(3.0));
}

#[test]
fn quick_reject_skips_draws_outside_the_device_clip() {
    let mut buffer = PaintOpBuffer::new();
    buffer.push(rect(200.0, 200.0, 300.0, 300.0));
    buffer.push(rect(50.0, 50.0, 150.0, 150.0));
    buffer.push(SaveOp);
    buffer.push(TranslateOp {
        dx: -250.0,
        dy: -250.0,
    });
    buffer.push(rect(200.0, 200.0, 300.0, 300.0));
    buffer.push(RestoreOp);

    let mut surface = RefSurface::with_device_clip(RectF::new(0.0, 0.0, 100.0, 100.0));
    replay(&buffer, &mut surface);
    let drawn: Vec<_> = surface
        .draws()
        .map(|call| match call {
            DrawCall::Rect { rect, .. } => *rect,
            other => panic!("unexpected draw {other:?}"),
        })
        .collect();
    assert_eq!(
        drawn,
        [
            RectF::new(50.0, 50.0, 150.0, 150.0),
            RectF::new(200.0, 200.0, 300.0, 300.0)
        ]
    );
}

#[test]
fn unbalanced_restores_are_ignored_and_saves_are_closed() {
    let mut buffer = PaintOpBuffer::new();
    buffer.push(RestoreOp);
    buffer.push(SaveOp);
    buffer.push(ScaleOp { sx: 2.0, sy: 2.0 });
    buffer.push(SaveOp);

    let mut surface = RefSurface::new();
    surface.save();
    surface.clear_events();
    replay(&buffer, &mut surface);

    assert_eq!(surface.save_count(), 1);
    assert_eq!(surface.state().transform, Affine::IDENTITY);
    let restores = surface
        .events()
        .iter()
        .filter(|event| {
            matches!(
                event,
                Event::State {
                    call: StateCall::Restore,
                    ..
                }
            )
        })
        .count();
    assert_eq!(restores, 2);
}

#[test]
fn node_id_survives_restore() {
    let mut buffer = PaintOpBuffer::new();
    buffer.push(SaveOp);
    buffer.push(SetNodeIdOp { node_id: 12 });
    buffer.push(RestoreOp);
    let mut surface = RefSurface::new();
    replay(&buffer, &mut surface);
    assert_eq!(surface.state().node_id, Some(12));
}

#[test]
fn custom_data_reaches_the_callback() {
    let mut buffer = PaintOpBuffer::new();
    buffer.push(CustomDataOp { id: 7 });
    buffer.push(CustomDataOp { id: 8 });

    let mut seen = Vec::new();
    let mut callback = |surface: &mut dyn DrawSurface, id: u32| {
        surface.draw_color(Color::WHITE, BlendMode::Src);
        seen.push(id);
    };
    let mut surface = RefSurface::new();
    let mut cx = PlaybackContext::new(Affine::IDENTITY).with_custom_data(&mut callback);
    buffer.replay(&mut surface, &mut cx);
    drop(cx);

    assert_eq!(seen, [7, 8]);
    assert_eq!(surface.draws().count(), 2);
}

#[test]
fn analysis_playback_replaces_images_and_skips_custom_data() {
    let mut buffer = PaintOpBuffer::new();
    buffer.push(CustomDataOp { id: 1 });
    buffer.push(DrawImageOp::new(
        PaintImage::new(ImageId(1), 30, 20),
        10.0,
        10.0,
    ));
    buffer.push(DrawImageRectOp::new(
        PaintImage::new(ImageId(2), 8, 8),
        RectF::new(0.0, 0.0, 4.0, 4.0),
    ));

    let mut calls = 0;
    let mut callback = |_: &mut dyn DrawSurface, _: u32| calls += 1;
    let mut surface = RefSurface::new();
    let mut cx = PlaybackContext::new(Affine::IDENTITY)
        .with_custom_data(&mut callback)
        .with_image_provider(&Missing)
        .with_flags(PlaybackFlags::IS_ANALYZING);
    buffer.replay(&mut surface, &mut cx);
    drop(cx);

    assert_eq!(calls, 0);
    let rects: Vec<_> = surface
        .draws()
        .map(|call| match call {
            DrawCall::Rect { rect, .. } => *rect,
            other => panic!("unexpected draw {other:?}"),
        })
        .collect();
    assert_eq!(
        rects,
        [
            RectF::new(10.0, 10.0, 40.0, 30.0),
            RectF::new(0.0, 0.0, 4.0, 4.0)
        ]
    );
}

#[test]
fn flags_override_replaces_recorded_flags() {
    let op = PaintOp::from(rect(0.0, 0.0, 5.0, 5.0));
    let flags = PaintFlags::stroke(Color::from_rgb8(0, 0, 255), 3.0);
    let mut surface = RefSurface::new();
    let mut cx = PlaybackContext::new(Affine::IDENTITY);
    op.replay_with_flags(&flags, &mut surface, &mut cx);
    let draws: Vec<_> = surface.draws().collect();
    assert!(matches!(draws[0], DrawCall::Rect { flags: drawn, .. } if *drawn == flags));
}

#[test]
#[should_panic(expected = "has no paint flags to override")]
fn flags_override_rejects_ops_without_flags() {
    let mut surface = RefSurface::new();
    let mut cx = PlaybackContext::new(Affine::IDENTITY);
    PaintOp::from(SaveOp).replay_with_flags(&PaintFlags::default(), &mut surface, &mut cx);
}

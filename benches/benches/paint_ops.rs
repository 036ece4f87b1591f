// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};
use kurbo::BezPath;
use understory_paint_ops::ops::{
    ClipRectOp, DrawPathOp, DrawRectOp, RestoreOp, SaveOp, TranslateOp,
};
use understory_paint_ops::{
    Affine, ClipOp, Color, DeserializeOptions, FillRule, PaintFlags, PaintOpBuffer, PaintPath,
    PathCache, PlaybackContext, RectF, SerializeOptions, deserialize_buffer, serialize_buffer,
};
use understory_paint_ops_ref::RefSurface;

/// A row-of-cells scene: each cell saves, clips, translates, fills and
/// strokes a shared outline.
fn scene(cells: usize) -> PaintOpBuffer {
    let mut outline = BezPath::new();
    outline.move_to((0.0, 0.0));
    outline.line_to((16.0, 0.0));
    outline.quad_to((20.0, 8.0), (16.0, 16.0));
    outline.line_to((0.0, 16.0));
    outline.close_path();
    let outline = PaintPath::new(outline, FillRule::NonZero);

    let fill = PaintFlags::from_color(Color::from_rgb8(30, 144, 255));
    let stroke = PaintFlags::stroke(Color::BLACK, 1.0);
    let mut buffer = PaintOpBuffer::with_capacity(cells * 6);
    for i in 0..cells {
        let x = (i % 64) as f32 * 20.0;
        let y = (i / 64) as f32 * 20.0;
        buffer.push(SaveOp);
        buffer.push(ClipRectOp {
            rect: RectF::from_origin_size(x, y, 20.0, 20.0),
            op: ClipOp::Intersect,
            antialias: false,
        });
        buffer.push(TranslateOp { dx: x, dy: y });
        buffer.push(DrawRectOp::new(RectF::new(0.0, 0.0, 16.0, 16.0), fill.clone()));
        buffer.push(DrawPathOp {
            path: outline.clone(),
            flags: stroke.clone(),
        });
        buffer.push(RestoreOp);
    }
    buffer
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("paint_ops/append");
    for cells in [64usize, 1_024] {
        let source = scene(cells);
        group.throughput(Throughput::Elements(source.op_count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(cells), &source, |b, source| {
            b.iter_batched(
                || source.ops().to_vec(),
                |ops| black_box(ops.into_iter().collect::<PaintOpBuffer>()),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("paint_ops/serialize");
    for cells in [64usize, 1_024] {
        let buffer = scene(cells);
        let len = serialize_buffer(&buffer, &SerializeOptions::default(), Affine::IDENTITY)
            .unwrap()
            .len();
        group.throughput(Throughput::Bytes(len as u64));

        group.bench_with_input(BenchmarkId::new("inline", cells), &buffer, |b, buffer| {
            b.iter(|| {
                black_box(
                    serialize_buffer(buffer, &SerializeOptions::default(), Affine::IDENTITY)
                        .unwrap(),
                )
            });
        });

        // Only the first path record carries geometry; the rest are references.
        group.bench_with_input(BenchmarkId::new("path_cache", cells), &buffer, |b, buffer| {
            b.iter_batched(
                PathCache::new,
                |cache| {
                    let options = SerializeOptions {
                        path_cache: Some(&cache),
                        ..SerializeOptions::default()
                    };
                    black_box(serialize_buffer(buffer, &options, Affine::IDENTITY).unwrap())
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_deserialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("paint_ops/deserialize");
    for cells in [64usize, 1_024] {
        let bytes =
            serialize_buffer(&scene(cells), &SerializeOptions::default(), Affine::IDENTITY)
                .unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(cells), &bytes, |b, bytes| {
            b.iter(|| {
                black_box(deserialize_buffer(bytes, &DeserializeOptions::default()).unwrap())
            });
        });
    }
    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("paint_ops/replay");
    for cells in [64usize, 1_024] {
        let buffer = scene(cells);
        group.throughput(Throughput::Elements(buffer.op_count() as u64));

        group.bench_with_input(BenchmarkId::new("unclipped", cells), &buffer, |b, buffer| {
            b.iter_batched(
                RefSurface::new,
                |mut surface| {
                    let mut cx = PlaybackContext::new(Affine::IDENTITY);
                    buffer.replay(&mut surface, &mut cx);
                    black_box(surface)
                },
                BatchSize::LargeInput,
            );
        });

        // Most cells fall outside the viewport and are quick-rejected.
        group.bench_with_input(BenchmarkId::new("viewport", cells), &buffer, |b, buffer| {
            b.iter_batched(
                || RefSurface::with_device_clip(RectF::new(0.0, 0.0, 200.0, 200.0)),
                |mut surface| {
                    let mut cx = PlaybackContext::new(Affine::IDENTITY);
                    buffer.replay(&mut surface, &mut cx);
                    black_box(surface)
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_append,
    bench_serialize,
    bench_deserialize,
    bench_replay
);
criterion_main!(benches);

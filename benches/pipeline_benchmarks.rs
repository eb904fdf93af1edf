use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use imgly_studio::{
    AlphaMask, AspectRatio, Cutout, ExportEncoder, ExportSpec, ImageIOService,
    MaskRefinementProfile, MaskRefiner, MockBackend, OutputFormat, ProcessorConfig, RasterBuffer,
    ReflectionConfig, RenderRequest, SceneComposer, SceneSpec, ShadowConfig, StudioProcessor,
};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn product_cutout(size: u32) -> Cutout {
    Cutout::from_rgba(RgbaImage::from_fn(size, size, |x, y| {
        let (dx, dy) = (x as i64 - i64::from(size / 2), y as i64 - i64::from(size / 2));
        if dx * dx + dy * dy < i64::from(size / 3).pow(2) {
            Rgba([180, 90, 40, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    }))
}

fn bench_mask_refinement(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask_refinement");
    group.sample_size(10);

    let refiner = MaskRefiner::new(MaskRefinementProfile::default());
    for size in [512u32, 1200] {
        let mask = AlphaMask::from_rgba(&product_cutout(size).to_rgba());
        group.bench_with_input(BenchmarkId::from_parameter(size), &mask, |b, mask| {
            b.iter(|| refiner.refine(black_box(mask)));
        });
    }
    group.finish();
}

fn bench_composition(c: &mut Criterion) {
    let mut group = c.benchmark_group("composition");
    group.sample_size(10);

    let composer = SceneComposer::new(ShadowConfig::default(), ReflectionConfig::default());
    let cutout = product_cutout(1200);
    for (name, shadow, reflection) in [
        ("plain", false, false),
        ("shadow", true, false),
        ("shadow_reflection", true, true),
    ] {
        let spec = SceneSpec::builder().shadow(shadow).reflection(reflection).build();
        group.bench_function(name, |b| {
            b.iter(|| composer.compose(black_box(&cutout), &spec));
        });
    }
    group.finish();
}

fn bench_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("export");
    group.sample_size(10);

    let raster = RasterBuffer::from_rgba(product_cutout(1024).to_rgba());
    for format in [OutputFormat::Png, OutputFormat::Jpeg] {
        let spec = ExportSpec::builder()
            .format(format)
            .target_edge(2048)
            .build()
            .expect("valid export spec");
        group.bench_function(format.as_str(), |b| {
            b.iter(|| ExportEncoder::export(black_box(&raster), &spec));
        });
    }
    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let photo = RgbImage::from_fn(1600, 1200, |x, y| {
        if (400..1200).contains(&x) && (300..900).contains(&y) {
            Rgb([30, 60, 140])
        } else {
            Rgb([250, 250, 250])
        }
    });
    let upload = ImageIOService::to_png_bytes(&RasterBuffer::from_rgb(photo)).expect("fixture");

    let processor = StudioProcessor::with_backend(ProcessorConfig::default(), Arc::new(MockBackend::new()))
        .expect("processor");
    let request = RenderRequest::new(
        SceneSpec::builder().shadow(true).build(),
        ExportSpec::builder().format(OutputFormat::Jpeg).build().expect("valid export spec"),
    )
    .with_aspect(AspectRatio::Portrait4x5);

    let mut group = c.benchmark_group("render");
    group.sample_size(10);
    group.bench_function("jpeg_4x5_shadow", |b| {
        b.iter(|| runtime.block_on(processor.render(black_box(&upload), &request)));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_mask_refinement,
    bench_composition,
    bench_export,
    bench_end_to_end
);
criterion_main!(benches);

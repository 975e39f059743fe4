use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use kiosk_mvp::{
    ConfigEntry, DashboardConfig, FramePreview, LayoutBuilder, PreviewFrame, ResolverMap,
    StateHub, SwapGroupConfig, ViewHandle, WidgetConfig, WidgetRegistry,
};

const REGIONS: [&str; 4] = ["top", "left", "right", "bottom"];

fn dashboard(widgets: usize) -> (DashboardConfig, ResolverMap) {
    let mut entries = Vec::new();
    let mut resolver = ResolverMap::new();
    let mut groups = Vec::new();

    for idx in 0..widgets {
        let name = format!("Widget{idx}");
        let path = format!("@/modules/widget{idx}");
        let region = REGIONS[idx % REGIONS.len()];
        resolver.insert_view(path.clone(), ViewHandle::new(idx));
        entries.push(ConfigEntry::Widget(WidgetConfig::new(&name, &path, region)));

        if idx % 3 == 0 {
            let swap = format!("Swap{idx}");
            let swap_path = format!("@/modules/swap{idx}");
            resolver.insert_view(swap_path.clone(), ViewHandle::new(idx));
            groups.push(
                SwapGroupConfig::new(&name, &swap, region, Duration::from_secs(30))
                    .with_paths(&path, &swap_path),
            );
        }
    }
    entries.push(ConfigEntry::SwapGroups(groups));
    (DashboardConfig::new(entries), resolver)
}

fn layout_build(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime");
    let (config, resolver) = dashboard(64);
    let resolver = Arc::new(resolver);

    c.bench_function("layout_build_64", |b| {
        b.iter(|| {
            let registry = WidgetRegistry::new(resolver.clone());
            let layout = runtime.block_on(LayoutBuilder::new(registry).build(black_box(&config)));
            black_box(layout.slot_count());
        });
    });
}

fn preview_lines(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime");
    let (config, resolver) = dashboard(64);
    let registry = WidgetRegistry::new(Arc::new(resolver));
    let hub = StateHub::new();
    hub.publish_layout(runtime.block_on(LayoutBuilder::new(registry).build(&config)));
    let preview = FramePreview::new(80);

    c.bench_function("preview_lines_64", |b| {
        b.iter(|| {
            let frame = PreviewFrame::capture(&hub);
            black_box(preview.lines(&frame));
        });
    });
}

criterion_group!(benches, layout_build, preview_lines);
criterion_main!(benches);

//! RGC Benchmarks
//!
//! Hot paths of the region space: address resolution, marking, bump
//! allocation and full parallel cycles.
//! Run with: `cargo bench --package rgc`

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rgc::allocator::RegionBumpAllocator;
use rgc::{
    EmptySelector, HeaderObjectModel, LiveRatioSelector, MmapPageSource, ObjectModel,
    ObjectReference, RegionCollector, RegionSpace, SpaceConfig,
};

fn create_space(regions: usize) -> RegionSpace {
    let config = SpaceConfig {
        pages_per_region: 16,
        region_count: regions,
        ..Default::default()
    };
    RegionSpace::new(config, Box::new(MmapPageSource::new()), HeaderObjectModel).unwrap()
}

fn object(space: &RegionSpace, size: usize, refs: usize) -> ObjectReference {
    let address = space.allocate(size).unwrap();
    let object = unsafe { HeaderObjectModel::initialize(address, size, refs) }.unwrap();
    space.post_alloc(object);
    object
}

/// Linked list of `len` nodes, each also pointing back at the head
fn build_list(space: &RegionSpace, len: usize) -> ObjectReference {
    let model = space.model();
    let head = object(space, 48, 2);
    let mut tail = head;
    for _ in 1..len {
        let node = object(space, 48, 2);
        model.store_slot(model.slot_address(tail, 0), node);
        model.store_slot(model.slot_address(node, 1), head);
        tail = node;
    }
    head
}

fn bench_region_of(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_of");

    for &regions in &[16, 256, 1024] {
        let space = create_space(regions);
        let addresses: Vec<usize> = space
            .table()
            .iter()
            .map(|r| r.base() + r.size() / 2)
            .collect();
        group.throughput(Throughput::Elements(addresses.len() as u64));
        group.bench_function(format!("regions_{}", regions), |b| {
            b.iter(|| {
                for &address in &addresses {
                    black_box(space.region_of(address));
                }
            })
        });
    }

    group.finish();
}

fn bench_test_and_mark(c: &mut Criterion) {
    let space = create_space(4);
    let objects: Vec<_> = (0..1024).map(|_| object(&space, 32, 0)).collect();

    let mut group = c.benchmark_group("mark");
    group.throughput(Throughput::Elements(objects.len() as u64));
    group.bench_function("first_and_repeat", |b| {
        b.iter(|| {
            space.prepare();
            let mut queue = Vec::with_capacity(objects.len());
            for &object in &objects {
                space.trace_mark_object(&mut queue, object);
                space.trace_mark_object(&mut queue, object);
            }
            space.release();
            black_box(queue.len())
        })
    });
    group.finish();
}

fn bench_bump_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("bump_allocation");
    let space = create_space(64);

    for &size in &[16, 64, 256, 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("size_{}", size), |b| {
            let mut allocator = RegionBumpAllocator::new();
            b.iter(|| match allocator.alloc(&space, size) {
                Ok(address) => black_box(address),
                Err(_) => {
                    for region in space.table().iter() {
                        if space.is_consumed(region.id()) {
                            space.release_region(region.id());
                        }
                    }
                    allocator.retire();
                    0
                }
            })
        });
    }

    group.finish();
}

fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect");
    group.sample_size(20);

    for &workers in &[1, 4] {
        group.bench_function(format!("mark_only_workers_{}", workers), |b| {
            let space = create_space(64).with_selector(EmptySelector);
            let mut root = build_list(&space, 10_000).to_address();
            let slots = [&mut root as *mut usize as usize];
            let collector = RegionCollector::new(&space).with_workers(workers);
            b.iter(|| black_box(collector.mark(&slots).unwrap()))
        });

        group.bench_function(format!("evacuate_workers_{}", workers), |b| {
            b.iter_batched(
                || {
                    let space = create_space(64).with_selector(LiveRatioSelector::new(1.0, 0.9));
                    let root = build_list(&space, 10_000).to_address();
                    (space, Box::new(root))
                },
                |(space, mut root)| {
                    let slots = [&mut *root as *mut usize as usize];
                    let summary = RegionCollector::new(&space)
                        .with_workers(workers)
                        .collect(&slots)
                        .unwrap();
                    black_box(summary.objects_evacuated)
                },
                BatchSize::PerIteration,
            )
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_region_of,
    bench_test_and_mark,
    bench_bump_allocation,
    bench_collect
);
criterion_main!(benches);

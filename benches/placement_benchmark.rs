use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use placement_engine::application::services::{
    DualTeamPlacer, DualTeamRequest, PlacementFinder, TreeQueryService,
};
use placement_engine::domain::position::{descendant_range, is_descendant, path_between, Coordinate};
use placement_engine::infrastructure::memory::{
    InMemoryChangeAudit, InMemoryDirectory, InMemoryDualTeamStore, InMemorySlotStore,
};
use placement_engine::shared::EngineConfig;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn coordinate_math_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Coordinate Math");
    let ancestor = Coordinate::new(3, 5).unwrap();
    let deep = Coordinate::new(40, 5 << 37).unwrap();

    group.bench_function("is_descendant 37 levels apart", |b| {
        b.iter(|| is_descendant(black_box(ancestor), black_box(deep)));
    });
    group.bench_function("descendant_range", |b| {
        b.iter(|| descendant_range(black_box(ancestor), black_box(40)));
    });
    group.bench_function("path_between 37 levels", |b| {
        b.iter(|| path_between(black_box(ancestor), black_box(deep)));
    });
    group.finish();
}

fn forced_matrix_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("Forced Matrix");

    for size in [1_000u64, 10_000] {
        // 预填充：根节点下 size 个分销商
        let slots = Arc::new(InMemorySlotStore::new());
        let config = EngineConfig::default();
        let finder = PlacementFinder::new(slots.clone(), Arc::new(InMemoryChangeAudit::new()), config.clone());
        let query = TreeQueryService::new(slots, Arc::new(InMemoryDirectory::new()), config);
        rt.block_on(async {
            finder.place_at(1, Coordinate::ROOT).await.unwrap();
            for id in 2..=size + 1 {
                finder.place(id, 1, None).await.unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::new("find_open_slot from root", size), &size, |b, _| {
            b.iter(|| rt.block_on(finder.find_open_slot(black_box(1), 1)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("subtree depth 4", size), &size, |b, _| {
            b.iter(|| rt.block_on(query.subtree(1, Coordinate::ROOT, Some(4))).unwrap());
        });
    }
    group.finish();
}

fn dual_team_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("Dual Team");

    let placer = DualTeamPlacer::new(Arc::new(InMemoryDualTeamStore::new()), EngineConfig::default());
    rt.block_on(async {
        placer.place(DualTeamRequest::root(1)).await.unwrap();
        for id in 2..=5_000 {
            placer.place(DualTeamRequest::recruit(id, 1)).await.unwrap();
        }
    });

    // 树持续增长：每次迭代放置一个新的下线
    let mut next_id = 5_001u64;
    group.bench_function("lighter-leg placement under a 5000-node root", |b| {
        b.iter(|| {
            next_id += 1;
            rt.block_on(placer.place(DualTeamRequest::recruit(black_box(next_id), 1)))
                .unwrap()
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    coordinate_math_benchmark,
    forced_matrix_benchmark,
    dual_team_benchmark
);
criterion_main!(benches);

use criterion::{criterion_group, criterion_main, Criterion};
use mercount::binary_search::partition_point;

#[expect(clippy::indexing_slicing)]
fn bench_partition_point(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_point");

    for item_count in [10, 100, 1_000, 10_000, 100_000, 1_000_000] {
        let items = (0..item_count).collect::<Vec<u64>>();

        group.bench_function(format!("native {item_count}"), |b| {
            b.iter(|| items.partition_point(|&x| x <= 5_000))
        });

        group.bench_function(format!("index range {item_count}"), |b| {
            b.iter(|| partition_point(0..items.len(), |i| items[i] <= 5_000))
        });
    }
}

criterion_group!(benches, bench_partition_point);
criterion_main!(benches);

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

#[cfg(feature = "test_private")]
mod alloc_bench;

pub fn bench_main(_c: &mut Criterion) {
    cfg_if::cfg_if! {
        if #[cfg(feature = "test_private")] {
            alloc_bench::bench(_c);
        } else {
            eprintln!("ERROR: benchmarks require the test_private feature (it exposes util::test_util).");
            eprintln!("  Rerun with `cargo bench --features test_private`.");
            std::process::exit(1);
        }
    }
}

criterion_group!(benches, bench_main);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chigraph::mangle::{mangle, unmangle};

fn sample_names(depth: usize) -> (String, String) {
    let module = (0..depth).map(|i| format!("pkg{i}")).collect::<Vec<_>>().join("/");
    let symbol = format!("do_the_thing_{depth}");
    (module, symbol)
}

fn bench_mangle(c: &mut Criterion) {
    let mut group = c.benchmark_group("mangle");

    for depth in [1, 4, 16, 64].iter() {
        let (module, symbol) = sample_names(*depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, _| {
            b.iter(|| black_box(mangle(black_box(&module), black_box(&symbol))));
        });
    }
    group.finish();
}

fn bench_unmangle(c: &mut Criterion) {
    let mut group = c.benchmark_group("unmangle");

    for depth in [1, 4, 16, 64].iter() {
        let (module, symbol) = sample_names(*depth);
        let mangled = mangle(&module, &symbol);
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, _| {
            b.iter(|| black_box(unmangle(black_box(&mangled)).unwrap()));
        });
    }
    group.finish();
}

fn bench_main_entry_point(c: &mut Criterion) {
    c.bench_function("mangle_main_entry_point", |b| {
        b.iter(|| black_box(mangle(black_box("github.com/x/main"), black_box("main"))));
    });
}

criterion_group!(benches, bench_mangle, bench_unmangle, bench_main_entry_point);
criterion_main!(benches);

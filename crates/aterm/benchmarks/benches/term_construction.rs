use aterm::get_applied_term;
use aterm::get_function_symbol;
use aterm::get_int_term;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

fn criterion_benchmark_term_construction(c: &mut Criterion) {
    c.bench_function("get_int_term repeated", |bencher| {
        bencher.iter(|| {
            for value in 0..1000u64 {
                black_box(get_int_term(value));
            }
        })
    });

    c.bench_function("get_applied_term cache hit", |bencher| {
        let f = get_function_symbol("bench-f", 2);
        let a = get_int_term(1);
        let b = get_int_term(2);

        bencher.iter(|| {
            black_box(get_applied_term(&f, &[a.borrow(), b.borrow()]).unwrap());
        })
    });

    c.bench_function("get_applied_term fresh terms", |bencher| {
        let f = get_function_symbol("bench-fresh", 1);

        bencher.iter(|| {
            for value in 0..200u64 {
                let arg = get_int_term(value);
                black_box(get_applied_term(&f, &[arg.borrow()]).unwrap());
            }
        })
    });
}

criterion_group!(benches, criterion_benchmark_term_construction);
criterion_main!(benches);

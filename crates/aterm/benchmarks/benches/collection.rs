use aterm::collect;
use aterm::get_applied_term;
use aterm::get_function_symbol;
use aterm::get_int_term;
use aterm::ProtectedSequence;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

fn criterion_benchmark_collection(c: &mut Criterion) {
    c.bench_function("collect with mostly garbage", |bencher| {
        let marker = get_function_symbol("bench-garbage", 1);

        bencher.iter(|| {
            for value in 0..5000u64 {
                let arg = get_int_term(value);
                black_box(get_applied_term(&marker, &[arg.borrow()]).unwrap());
            }
            collect();
        })
    });

    c.bench_function("collect with protected survivors", |bencher| {
        let marker = get_function_symbol("bench-survivor", 1);
        let sequence = ProtectedSequence::new();

        for value in 0..500u64 {
            let arg = get_int_term(value);
            let term = get_applied_term(&marker, &[arg.borrow()]).unwrap();
            sequence.push(term.borrow());
        }

        bencher.iter(|| {
            for value in 5000..5500u64 {
                let arg = get_int_term(value);
                black_box(get_applied_term(&marker, &[arg.borrow()]).unwrap());
            }
            collect();
        })
    });
}

criterion_group!(benches, criterion_benchmark_collection);
criterion_main!(benches);

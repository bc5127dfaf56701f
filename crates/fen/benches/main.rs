//! Evaluation benchmarks: arithmetic folding, call dispatch, closures.

use criterion::{criterion_group, criterion_main, Criterion};
use fen::Interpreter;

fn bench_arithmetic(c: &mut Criterion) {
    c.bench_function("arithmetic", |b| {
        b.iter(|| {
            let mut interp = Interpreter::new();
            interp.eval("1 + 2 * 3 - 4 / 2 + 7 % 3").unwrap()
        });
    });
}

fn bench_recursion(c: &mut Criterion) {
    let source = "fact = fun |n:Int32| -> Int32 { if n == 0 then 1 else n * (fact (n - 1)) }; fact 12";
    c.bench_function("recursive calls", |b| {
        b.iter(|| {
            let mut interp = Interpreter::new();
            interp.eval(source).unwrap()
        });
    });
}

fn bench_closures(c: &mut Criterion) {
    let source = "make = fun |n:Int32| -> (|| -> Int32) { fun || -> Int32 { n + 1 } }; (make 41)";
    c.bench_function("closure create and execute", |b| {
        b.iter(|| {
            let mut interp = Interpreter::new();
            interp.eval(source).unwrap()
        });
    });
}

criterion_group!(benches, bench_arithmetic, bench_recursion, bench_closures);
criterion_main!(benches);

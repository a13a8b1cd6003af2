//! Stage latency of the stencil pipeline:
//! 1. Derivative expansion (laplacian, growing space order)
//! 2. Lowering one update equation to a callable
//! 3. C printing of the lowered callable

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use stencil_ir::{Equation, Expr, FunctionSpec, Language, Options, Session};

fn heat(session: &mut Session, ndim: usize, space_order: u32) -> Equation {
    let grid = session.grid("grid", &vec![64; ndim]);
    let u = session.function(FunctionSpec::time_function("u", &grid).space_order(space_order));
    let dt = Expr::from(grid.time_dim().spacing());
    let rhs = u.access() + dt * u.access().laplace().expect("laplacian of a grid function");
    Equation::new(u.forward().expect("time function"), rhs)
}

/// Benchmark: laplacian → explicit weighted stencil.
fn bench_expand(c: &mut Criterion) {
    let mut group = c.benchmark_group("expand_laplace_3d");
    for so in [2u32, 4, 8, 16] {
        let mut session = Session::default();
        let grid = session.grid("grid", &[64, 64, 64]);
        let u = session.function(FunctionSpec::function("u", &grid).space_order(so));
        let lap = u.access().laplace().expect("laplacian of a grid function");
        group.bench_with_input(BenchmarkId::from_parameter(so), &lap, |b, lap| {
            b.iter(|| black_box(lap).evaluate())
        });
    }
    group.finish();
}

/// Benchmark: equation → Callable, sequential and OpenMP.
fn bench_lower(c: &mut Criterion) {
    let mut group = c.benchmark_group("lower_heat_3d");
    for (label, language) in [("c", Language::C), ("openmp", Language::OpenMp)] {
        let mut session = Session::new(Options::default().with_language(language));
        let eq = heat(&mut session, 3, 4);
        group.bench_function(label, |b| b.iter(|| session.lower(black_box(&[eq.clone()]))));
    }
    group.finish();
}

/// Benchmark: printing an already lowered kernel.
fn bench_ccode(c: &mut Criterion) {
    let mut session = Session::new(Options::default().with_language(Language::OpenMp));
    let eq = heat(&mut session, 3, 8);
    let kernel = match session.lower(&[eq]) {
        Ok(k) => k,
        Err(ds) => panic!("lowering failed: {}", ds[0].message),
    };
    c.bench_function("ccode_heat_3d_so8", |b| b.iter(|| black_box(&kernel).ccode()));
}

criterion_group!(benches, bench_expand, bench_lower, bench_ccode);
criterion_main!(benches);

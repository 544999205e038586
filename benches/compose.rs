use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;
use splitsolve::config::OptionTree;
use splitsolve::context::{KspContext, SolverCompiler};
use splitsolve::dof::{DofSubset, IntervalLayout, compose};
use splitsolve::parallel::SerialComm;

fn bench_compose(c: &mut Criterion) {
    let n = 200_000;
    let parent = DofSubset::full(0..n);
    let claimed = DofSubset::from_unsorted((0..n).step_by(3), 0..n);
    let child = DofSubset::from_unsorted((0..n).filter(|i| i % 5 != 0), 0..n);

    c.bench_function("compose 200k", |ben| {
        ben.iter(|| {
            compose("split", black_box(&child), Some(&claimed), Some(&parent), 0, &SerialComm).unwrap()
        })
    });
}

fn bench_fieldsplit_setup(c: &mut Criterion) {
    let layout = IntervalLayout::new(99).with_field("u", 0).with_field("p", 0);
    let lu = json!({"iterative_method": {"name": "preonly"},
                    "preconditioner": {"name": "lu", "factorization_package": {"name": "mumps"}}});
    let store = OptionTree::from_value(json!({"ls": {
        "iterative_method": {"name": "gmres", "relative_error": 1e-8, "max_iterations": 50},
        "preconditioner": {"name": "fieldsplit", "composite_type": {"name": "multiplicative"},
                           "fieldsplit": [{"name": "u", "field": {"name": "u"}, "linear_solver": lu},
                                          {"name": "p", "field": {"name": "p"}, "linear_solver": lu}]}}}));
    let n = 200;
    let a = faer::Mat::from_fn(n, n, |i, j| match i.abs_diff(j) {
        0 => 4.0,
        1 => -1.0,
        100 => 0.5,
        _ => 0.0,
    });

    c.bench_function("compile fieldsplit", |ben| {
        ben.iter(|| SolverCompiler::new(&store, &layout, &SerialComm).compile("ls", "B_", None).unwrap())
    });

    let node = SolverCompiler::new(&store, &layout, &SerialComm).compile("ls", "B_", None).unwrap();
    c.bench_function("fieldsplit setup", |ben| {
        ben.iter(|| {
            let mut ksp = KspContext::from_node(&node).unwrap();
            ksp.set_operators(black_box(a.clone()), None).unwrap();
        })
    });
}

criterion_group!(benches, bench_compose, bench_fieldsplit_setup);
criterion_main!(benches);

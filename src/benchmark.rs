use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use probmc::model_checking::builder::ModelBuilder;
use probmc::model_checking::markov_chain::MarkovChain;
use probmc::model_checking::mdp::MarkovDecisionProcess;
use probmc::Model;

/// Declaration order starting from the middle state, which is the one the
/// engines verify from.
fn start_in_middle(states: &[String]) -> Vec<String> {
    let mut order = states.to_vec();
    order.rotate_left(states.len() / 2);
    order
}

/// Gambler's ruin on `n` states: both ends absorb, inner states move left
/// or right with probability 1/2.
fn gamblers_ruin(n: usize) -> MarkovChain {
    let states: Vec<String> = (0..n).map(|i| format!("s{}", i)).collect();
    let mut b = ModelBuilder::new();
    b.states_declared(start_in_middle(&states), None);
    for i in 1..n - 1 {
        b.transition_declared(&states[i], &states[i - 1], 1.0);
        b.transition_declared(&states[i], &states[i + 1], 1.0);
    }
    match b.generate_seeded(0) {
        Ok(Model::MarkovChain(mc)) => mc,
        _ => panic!("gambler's ruin must build as a Markov chain")
    }
}

/// Same walk with a second action that jumps straight to ruin.
fn gamblers_choice(n: usize) -> MarkovDecisionProcess {
    let states: Vec<String> = (0..n).map(|i| format!("s{}", i)).collect();
    let mut b = ModelBuilder::new();
    b.states_declared(start_in_middle(&states), None);
    b.actions_declared(vec!["bet", "quit"]);
    for i in 1..n - 1 {
        b.action_transition_declared(&states[i], "bet", &states[i - 1], 1.0);
        b.action_transition_declared(&states[i], "bet", &states[i + 1], 1.0);
        b.action_transition_declared(&states[i], "quit", &states[0], 1.0);
    }
    match b.generate_seeded(0) {
        Ok(Model::MarkovDecisionProcess(mdp)) => mdp,
        _ => panic!("gambler's choice must build as an MDP")
    }
}

pub fn reachability_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("mc reachability");
    for n in [20usize, 50, 100].iter() {
        let mc = gamblers_ruin(*n);
        let target = format!("s{}", n - 1);
        let start = format!("s{}", n / 2);
        group.bench_with_input(BenchmarkId::new("linear system", n), n, |b, _| {
            b.iter(|| mc.verify_property_linear_system(black_box(&target)))
        });
        group.bench_with_input(BenchmarkId::new("iterative", n), n, |b, _| {
            b.iter(|| mc.verify_property_iterative(&[black_box(target.as_str())], &start, 1e-6, 100_000))
        });
    }
    group.finish();
}

pub fn mdp_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("mdp reachability");
    for n in [20usize, 50].iter() {
        let mdp = gamblers_choice(*n);
        let target = format!("s{}", n - 1);
        group.bench_with_input(BenchmarkId::new("lp", n), n, |b, _| {
            b.iter(|| mdp.verify_property_linear(black_box(&target)))
        });
        group.bench_with_input(BenchmarkId::new("value iteration", n), n, |b, _| {
            b.iter(|| mdp.verify_property_value_iteration(black_box(&target), 1e-6, 100_000))
        });
    }
    group.finish();
}

criterion_group!(benches, reachability_benchmark, mdp_benchmark);
criterion_main!(benches);

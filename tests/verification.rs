use approx::assert_abs_diff_eq;
use probmc::driver::{self, Mode, Report, RunConfig};
use probmc::{read_model_json, Model, ModelBuilder, ModelError, ModelType, QLearningConfig, SprtOutcome};

const KNUTH_YAO: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/knuth_yao.json");
const REPAIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/repair.json");

/// Load a fixture and generate it with a fixed seed.
fn load(path: &str, seed: u64) -> Model {
    let spec = read_model_json(path).expect("fixture should parse");
    ModelBuilder::from_spec(spec).generate_seeded(seed).expect("fixture should validate")
}

// ---------------------------------------------------------------------------
// Knuth-Yao die: a fair coin simulating a fair six sided die
// ---------------------------------------------------------------------------

#[test]
fn die_loads_as_markov_chain() {
    let model = load(KNUTH_YAO, 0);
    assert_eq!(model.model_type(), ModelType::MC);
    let mc = model.as_markov_chain().unwrap();
    assert_eq!(mc.states().len(), 13);
    // the six faces are dead ends and get their self loops
    assert_eq!(mc.transitions().len(), 14 + 6);
    for row in mc.transition_matrix().genrows() {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
    }
}

#[test]
fn each_face_has_probability_one_sixth() {
    let model = load(KNUTH_YAO, 0);
    let mc = model.as_markov_chain().unwrap();
    for face in ["d1", "d2", "d3", "d4", "d5", "d6"].iter() {
        let exact = mc.verify_property_linear_system(face).unwrap();
        let iterative = mc.verify_property_iterative(&[*face], "s0", 1e-10, 10_000).unwrap();
        assert_abs_diff_eq!(exact, 1.0 / 6.0, epsilon = 1e-9);
        assert_abs_diff_eq!(exact, iterative, epsilon = 1e-3);
    }
}

#[test]
fn some_face_is_reached_surely() {
    let model = load(KNUTH_YAO, 0);
    let mc = model.as_markov_chain().unwrap();
    let faces = ["d1", "d2", "d3", "d4", "d5", "d6"];
    let p = mc.verify_property_iterative(&faces, "s0", 1e-12, 10_000).unwrap();
    assert_abs_diff_eq!(p, 1.0, epsilon = 1e-9);
}

#[test]
fn smc_estimates_a_face() {
    let mut model = load(KNUTH_YAO, 17);
    if let Model::MarkovChain(mc) = &mut model {
        let estimate = mc.verify_property_smc_quant("d1", 0.01, 0.01, 100).unwrap();
        assert!((estimate - 1.0 / 6.0).abs() < 0.03, "estimate {}", estimate);
    } else {
        panic!("expected a Markov chain");
    }
}

#[test]
fn sprt_verdicts_on_a_face() {
    let mut model = load(KNUTH_YAO, 23);
    if let Model::MarkovChain(mc) = &mut model {
        let high = mc.verify_property_smc_qual("d1", 0.5, 0.1, 0.01, 0.01, 10_000, 100).unwrap();
        assert_eq!(high, SprtOutcome::Reject);
        let low = mc.verify_property_smc_qual("d1", 0.05, 0.02, 0.01, 0.01, 10_000, 100).unwrap();
        assert_eq!(low, SprtOutcome::Accept);
    } else {
        panic!("expected a Markov chain");
    }
}

#[test]
fn expected_number_of_flips() {
    let mut model = load(KNUTH_YAO, 5);
    if let Model::MarkovChain(mc) = &mut model {
        let faces = ["d1", "d2", "d3", "d4", "d5", "d6"];
        let flips = mc.expected_reward_mc("s0", &faces, 5000, 1000).unwrap();
        assert!((flips - 11.0 / 3.0).abs() < 0.3, "expected 11/3 flips, got {}", flips);
    } else {
        panic!("expected a Markov chain");
    }
}

#[test]
fn equal_seeds_reproduce_paths() {
    let walk = |seed: u64| {
        let mut model = load(KNUTH_YAO, seed);
        match &mut model {
            Model::MarkovChain(mc) => {
                mc.simulation_init();
                for _ in 0..20 {
                    mc.simulation_step().unwrap();
                }
            }
            Model::MarkovDecisionProcess(_) => panic!("expected a Markov chain")
        }
        model.snapshot().path
    };
    assert_eq!(walk(99), walk(99));
    assert_eq!(walk(99).len(), 21);
}

// ---------------------------------------------------------------------------
// Maintenance MDP
// ---------------------------------------------------------------------------

#[test]
fn repair_loads_as_mdp_with_sentinel() {
    let model = load(REPAIR, 0);
    assert_eq!(model.model_type(), ModelType::MDP);
    let mdp = model.as_mdp().unwrap();
    assert_eq!(mdp.actions().last().map(String::as_str), Some(probmc::NO_ACTION));
    assert_eq!(mdp.possible_actions("broken").unwrap(), vec![probmc::NO_ACTION.to_string()]);
    assert_eq!(
        mdp.possible_actions("degraded").unwrap(),
        vec!["wait".to_string(), "service".to_string(), "replace".to_string()]
    );
}

#[test]
fn best_repair_probability() {
    let model = load(REPAIR, 0);
    let mdp = model.as_mdp().unwrap();
    let lp = mdp.verify_property_linear("repaired").unwrap();
    let vi = mdp.verify_property_value_iteration("repaired", 1e-12, 100_000).unwrap();
    assert_abs_diff_eq!(lp, 0.7, epsilon = 1e-6);
    assert_abs_diff_eq!(lp, vi, epsilon = 1e-6);
}

#[test]
fn learned_policy_services_degraded_machines() {
    let mut model = load(REPAIR, 8);
    if let Model::MarkovDecisionProcess(mdp) = &mut model {
        let config = QLearningConfig::new(0.9, 2000).with_episode_length(100).with_restart_every(1);
        let q = mdp.q_learning_with(&config).unwrap();
        let policy = q.greedy_policy();
        let degraded = policy.iter().find(|(s, _)| s == "degraded").map(|(_, a)| a.as_str());
        assert_eq!(degraded, Some("service"));
        let service = q.get("degraded", "service").unwrap();
        let replace = q.get("degraded", "replace").unwrap();
        assert!(service > replace, "service {} replace {}", service, replace);
    } else {
        panic!("expected an MDP");
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[test]
fn driver_runs_smc_on_loaded_model() {
    let mut model = driver::load_model(KNUTH_YAO, Some(4)).unwrap();
    let mut config = RunConfig::new(Mode::SmcQuant).with_target("d6");
    config.epsilon = 0.02;
    config.delta = 0.05;
    match driver::run(&mut model, &config).unwrap() {
        Report::Probability { mode, value, .. } => {
            assert_eq!(mode, Mode::SmcQuant);
            assert!((value - 1.0 / 6.0).abs() < 0.05, "estimate {}", value);
        }
        other => panic!("unexpected report {:?}", other)
    }
}

#[test]
fn driver_linear_on_mdp_uses_lp() {
    let mut model = driver::load_model(REPAIR, Some(1)).unwrap();
    let report = driver::run(&mut model, &RunConfig::new(Mode::Linear).with_target("repaired")).unwrap();
    assert!(report.to_string().starts_with("linear: P(reach repaired) = "));
    match report {
        Report::Probability { value, .. } => assert_abs_diff_eq!(value, 0.7, epsilon = 1e-6),
        other => panic!("unexpected report {:?}", other)
    }
}

#[test]
fn missing_fixture_is_an_io_error() {
    let missing = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/missing.json");
    assert!(matches!(read_model_json(missing), Err(ModelError::Io(_))));
}

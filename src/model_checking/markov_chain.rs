use std::collections::HashMap;

use ndarray::{arr1, Array1, Array2};
use petgraph::Graph;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use super::error::{check_positive, ModelError};
use super::helper_methods::*;
use super::model::Transition;
use super::simulation::{SimulationSnapshot, Simulator};
use super::smc::{chernoff_sample_size, Sprt, SprtOutcome};

/// Iteration cap of the reachability check that guards reward estimation.
const REACHABILITY_CHECK_ITERATIONS: usize = 100_000;
const REACHABILITY_CHECK_EPSILON: f64 = 1e-12;
/// How close to 1 the reachability probability must be for rewards to be defined.
const ALMOST_SURE_TOLERANCE: f64 = 1e-6;
const ABSORBING_TOLERANCE: f64 = 1e-12;

#[derive(Debug)]
pub struct MarkovChain {
    states: Vec<String>,
    state_index: HashMap<String, usize>,
    transitions: Vec<Transition>,
    rewards: HashMap<String, f64>,
    reward_vector: Vec<f64>,
    outgoing: Vec<(Vec<usize>, Vec<f64>)>,
    matrix: Array2<f64>,
    simulator: Simulator
}

impl MarkovChain {
    /// Builds a chain from normalised declarations; every state must have an
    /// outgoing transition.
    pub fn new(states: Vec<String>, transitions: Vec<Transition>, rewards: HashMap<String, f64>, rng: StdRng)
        -> Result<MarkovChain, ModelError> {
        let state_index: HashMap<String, usize> = states.iter().enumerate()
            .map(|(i, s)| (s.to_string(), i))
            .collect();
        let reward_vector: Vec<f64> = states.iter().map(|s| *rewards.get(s).unwrap_or(&0.0)).collect();
        let n = states.len();
        let mut mc = MarkovChain {
            states,
            state_index,
            transitions,
            rewards,
            reward_vector,
            outgoing: Vec::with_capacity(n),
            matrix: Array2::zeros((n, n)),
            simulator: Simulator::new(rng)
        };
        mc.outgoing = (0..n).map(|i| mc.allowed_indices(i)).collect::<Result<Vec<_>, _>>()?;
        mc.matrix = mc.build_transition_matrix()?;
        Ok(mc)
    }

    pub fn states(&self) -> &[String] {
        &self.states[..]
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions[..]
    }

    pub fn rewards(&self) -> &HashMap<String, f64> {
        &self.rewards
    }

    pub fn transition_matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn index_of(&self, state: &str) -> Result<usize, ModelError> {
        self.state_index.get(state).copied().ok_or_else(|| ModelError::UnknownState {
            state: state.to_string()
        })
    }

    fn allowed_indices(&self, i: usize) -> Result<(Vec<usize>, Vec<f64>), ModelError> {
        let state = &self.states[i];
        let pairs: Vec<(usize, f64)> = self.transitions.iter()
            .filter(|t| t.from == *state)
            .map(|t| self.index_of(&t.to).map(|j| (j, t.weight)))
            .collect::<Result<_, _>>()?;
        let (targets, weights): (Vec<usize>, Vec<f64>) = pairs.into_iter().unzip();
        let probabilities = normalise(&weights[..]).ok_or_else(|| ModelError::NoOutgoingTransitions {
            state: state.to_string()
        })?;
        Ok((targets, probabilities))
    }

    /// Successor states of `state` with their normalised probabilities.
    pub fn allowed_transitions(&self, state: &str) -> Result<(Vec<String>, Vec<f64>), ModelError> {
        let (targets, probabilities) = self.allowed_indices(self.index_of(state)?)?;
        Ok((targets.iter().map(|j| self.states[*j].to_string()).collect(), probabilities))
    }

    pub fn build_transition_matrix(&self) -> Result<Array2<f64>, ModelError> {
        let n = self.states.len();
        let mut matrix: Array2<f64> = Array2::zeros((n, n));
        for i in 0..n {
            let (targets, probabilities) = self.allowed_indices(i)?;
            for (j, p) in targets.iter().zip(probabilities.iter()) {
                matrix[[i, *j]] += *p;
            }
        }
        Ok(matrix)
    }

    pub fn generate_graph(&self) -> Graph<String, String> {
        let edges = self.transitions.iter()
            .filter_map(|t| match (self.state_index.get(&t.from), self.state_index.get(&t.to)) {
                (Some(i), Some(j)) => Some((*i, *j, format!("{}", t.weight))),
                _ => None
            });
        state_graph(&self.states[..], edges)
    }

    /// States whose only successor is themselves.
    pub fn absorbing(&self) -> Vec<bool> {
        (0..self.states.len())
            .map(|i| (self.matrix[[i, i]] - 1.0).abs() < ABSORBING_TOLERANCE)
            .collect()
    }

    // --- Simulation ---

    pub fn simulation_init(&mut self) -> String {
        self.simulator.reset(0);
        self.states[0].to_string()
    }

    pub fn simulation_init_from(&mut self, state: &str) -> Result<String, ModelError> {
        let i = self.index_of(state)?;
        self.simulator.reset(i);
        Ok(self.states[i].to_string())
    }

    pub fn simulation_step(&mut self) -> Result<String, ModelError> {
        let next = self.step_index()?;
        Ok(self.states[next].to_string())
    }

    fn step_index(&mut self) -> Result<usize, ModelError> {
        let current = self.simulator.actual().ok_or(ModelError::SimulationNotStarted)?;
        let (targets, probabilities) = &self.outgoing[current];
        let k = self.simulator.sample(probabilities).ok_or_else(|| ModelError::NoOutgoingTransitions {
            state: self.states[current].to_string()
        })?;
        let next = targets[k];
        self.simulator.advance(next, None);
        if self.simulator.trace() {
            debug!(from = %self.states[current], to = %self.states[next], "simulation step");
        }
        Ok(next)
    }

    pub fn actual_state(&self) -> Option<&str> {
        self.simulator.actual().map(|i| self.states[i].as_str())
    }

    pub fn path(&self) -> Vec<&str> {
        self.simulator.path().iter().map(|i| self.states[*i].as_str()).collect()
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        self.simulator.snapshot(&self.states[..], &[])
    }

    pub fn set_trace(&mut self, on: bool) -> bool {
        self.simulator.set_trace(on)
    }

    /// Runs `f` with step tracing switched off, restoring the previous setting afterwards.
    fn quietly<T, F>(&mut self, f: F) -> Result<T, ModelError>
    where
        F: FnOnce(&mut MarkovChain) -> Result<T, ModelError>,
    {
        let trace = self.simulator.set_trace(false);
        let out = f(self);
        self.simulator.set_trace(trace);
        out
    }

    /// Simulates at most `steps` steps from `start`; true once a target is visited.
    fn run_reaches(&mut self, start: usize, targets: &[bool], steps: usize) -> Result<bool, ModelError> {
        self.simulator.reset(start);
        if targets[start] {
            return Ok(true);
        }
        for _ in 0..steps {
            if targets[self.step_index()?] {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn target_mask(&self, targets: &[&str]) -> Result<Vec<bool>, ModelError> {
        let mut mask = vec![false; self.states.len()];
        for t in targets.iter() {
            mask[self.index_of(t)?] = true;
        }
        Ok(mask)
    }

    // --- Verification ---

    /// Probability of eventually visiting `target` from the first state, by
    /// solving the hitting-probability linear system.
    ///
    /// Absorbing states, the target and every state that cannot reach the
    /// target in the transition graph are fixed and eliminated; the remaining
    /// states satisfy `(I - A) x = b` with `b` the one-step probability of
    /// entering the target.
    pub fn verify_property_linear_system(&self, target: &str) -> Result<f64, ModelError> {
        let t = self.index_of(target)?;
        let init = 0;
        if init == t {
            return Ok(1.0);
        }
        let absorbing = self.absorbing();
        let reaches = reaches_target(&self.generate_graph(), t);
        let keep: Vec<usize> = (0..self.states.len())
            .filter(|i| *i != t && !absorbing[*i] && reaches[*i])
            .collect();
        let pos = match keep.iter().position(|i| *i == init) {
            Some(p) => p,
            None => return Ok(0.0)
        };
        let m = keep.len();
        let mut a: Array2<f64> = Array2::eye(m);
        let mut b: Array1<f64> = Array1::zeros(m);
        for (r, i) in keep.iter().enumerate() {
            b[r] = self.matrix[[*i, t]];
            for (c, j) in keep.iter().enumerate() {
                a[[r, c]] -= self.matrix[[*i, *j]];
            }
        }
        let x = solve_linear_system(a, b)?;
        info!(state = %target, probability = x[pos], "linear system solved");
        Ok(x[pos])
    }

    /// Jacobi iteration for the probability of reaching any of `targets` from `initial`.
    ///
    /// Returns the current estimate, with a warning, when `max_iterations` is
    /// exhausted before the largest update drops below `epsilon`.
    pub fn verify_property_iterative(&self, targets: &[&str], initial: &str, epsilon: f64, max_iterations: usize)
        -> Result<f64, ModelError> {
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(ModelError::invalid("epsilon", epsilon, "must be positive"));
        }
        let init = self.index_of(initial)?;
        let is_target = self.target_mask(targets)?;
        let absorbing = self.absorbing();
        let n = self.states.len();

        let mut x_vect: Vec<f64> = is_target.iter().map(|t| if *t { 1.0 } else { 0.0 }).collect();
        let mut iterations: usize = 0;
        let mut change: f64 = f64::INFINITY;
        while iterations < max_iterations {
            let x_arr = arr1(&x_vect[..]);
            let y_vect: Vec<f64> = (0..n)
                .map(|i| {
                    if is_target[i] {
                        1.0
                    } else if absorbing[i] {
                        x_vect[i]
                    } else {
                        self.matrix.row(i).dot(&x_arr)
                    }
                })
                .collect();
            change = max_abs_diff(&x_vect[..], &y_vect[..]);
            x_vect = y_vect;
            iterations += 1;
            if change < epsilon {
                break;
            }
        }
        if change >= epsilon {
            warn!(iterations, change, "iterative verification did not converge");
        } else {
            debug!(iterations, "iterative verification converged");
        }
        Ok(x_vect[init])
    }

    /// Chernoff-Hoeffding estimate of the probability of visiting `property`
    /// within `steps` steps from the first state.
    pub fn verify_property_smc_quant(&mut self, property: &str, epsilon: f64, delta: f64, steps: usize)
        -> Result<f64, ModelError> {
        let n = chernoff_sample_size(epsilon, delta)?;
        check_positive("steps", steps)?;
        let targets = self.target_mask(&[property])?;
        let successes = self.quietly(|mc| {
            let mut successes: usize = 0;
            for _ in 0..n {
                if mc.run_reaches(0, &targets[..], steps)? {
                    successes += 1;
                }
            }
            Ok(successes)
        })?;
        let estimate = successes as f64 / n as f64;
        info!(property = %property, runs = n, estimate, "quantitative SMC finished");
        Ok(estimate)
    }

    /// Sequential probability ratio test of "the probability of visiting
    /// `property` within `max_steps` steps is at least `theta`", with
    /// indifference region `theta +/- epsilon`.
    #[allow(clippy::too_many_arguments)]
    pub fn verify_property_smc_qual(&mut self, property: &str, theta: f64, epsilon: f64, alpha: f64, beta: f64,
                                    max_simulations: usize, max_steps: usize) -> Result<SprtOutcome, ModelError> {
        let mut sprt = Sprt::new(theta, epsilon, alpha, beta)?;
        check_positive("max_simulations", max_simulations)?;
        check_positive("max_steps", max_steps)?;
        let targets = self.target_mask(&[property])?;
        let outcome = self.quietly(|mc| {
            for _ in 0..max_simulations {
                let success = mc.run_reaches(0, &targets[..], max_steps)?;
                if let Some(verdict) = sprt.observe(success) {
                    return Ok(verdict);
                }
            }
            Ok(SprtOutcome::Inconclusive)
        })?;
        info!(property = %property, runs = sprt.runs(), successes = sprt.successes(), outcome = %outcome,
              "qualitative SMC finished");
        Ok(outcome)
    }

    /// Monte-Carlo estimate of the reward collected from `init` until one of
    /// `targets` is reached.
    ///
    /// A state's reward is collected each time a transition leaves it, so the
    /// target's own reward is never counted and a run starting in a target
    /// earns nothing. Returns 0 when the targets are not reached almost surely.
    pub fn expected_reward_mc(&mut self, init: &str, targets: &[&str], num_simulations: usize, max_iterations: usize)
        -> Result<f64, ModelError> {
        check_positive("num_simulations", num_simulations)?;
        check_positive("max_iterations", max_iterations)?;
        let start = self.index_of(init)?;
        let is_target = self.target_mask(targets)?;
        let p = self.verify_property_iterative(targets, init, REACHABILITY_CHECK_EPSILON,
                                               REACHABILITY_CHECK_ITERATIONS)?;
        if (p - 1.0).abs() > ALMOST_SURE_TOLERANCE {
            warn!(probability = p, "targets are not reached almost surely, expected reward is undefined");
            return Ok(0.0);
        }
        let total = self.quietly(|mc| {
            let mut total: f64 = 0.0;
            for _ in 0..num_simulations {
                mc.simulator.reset(start);
                let mut current = start;
                for _ in 0..max_iterations {
                    if is_target[current] {
                        break;
                    }
                    total += mc.reward_vector[current];
                    current = mc.step_index()?;
                }
            }
            Ok(total)
        })?;
        let expected = total / num_simulations as f64;
        info!(init = %init, expected, "expected reward estimated");
        Ok(expected)
    }
}

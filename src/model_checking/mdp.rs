use std::collections::HashMap;

use ndarray::{arr1, Array2};
use ordered_float::OrderedFloat;
use petgraph::Graph;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use super::error::ModelError;
use super::helper_methods::*;
use super::lp::max_reachability;
use super::model::{ActionTransition, Transition};
use super::simulation::{SimulationSnapshot, Simulator};

/// A Markov decision process whose rows are `(state, action)` pairs.
///
/// Unconditioned transitions have already been merged under
/// [`NO_ACTION`](super::model::NO_ACTION) by the builder; `transitions` keeps
/// the plain declarations for renderers.
#[derive(Debug)]
pub struct MarkovDecisionProcess {
    pub(crate) states: Vec<String>,
    pub(crate) state_index: HashMap<String, usize>,
    pub(crate) actions: Vec<String>,
    pub(crate) action_index: HashMap<String, usize>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) action_transitions: Vec<ActionTransition>,
    pub(crate) rewards: HashMap<String, f64>,
    pub(crate) reward_vector: Vec<f64>,
    /// Enabled action indices per state, in action declaration order.
    pub(crate) choices: Vec<Vec<usize>>,
    /// Matrix row of each enabled `(state, action)` pair.
    pub(crate) row_index: HashMap<(usize, usize), usize>,
    pub(crate) outgoing: Vec<(Vec<usize>, Vec<f64>)>,
    pub(crate) matrix: Array2<f64>,
    pub(crate) row_labels: Vec<(usize, usize)>,
    pub(crate) simulator: Simulator
}

impl MarkovDecisionProcess {
    pub fn new(states: Vec<String>, actions: Vec<String>, transitions: Vec<Transition>,
               action_transitions: Vec<ActionTransition>, rewards: HashMap<String, f64>, rng: StdRng)
        -> Result<MarkovDecisionProcess, ModelError> {
        let state_index: HashMap<String, usize> = states.iter().enumerate()
            .map(|(i, s)| (s.to_string(), i))
            .collect();
        let action_index: HashMap<String, usize> = actions.iter().enumerate()
            .map(|(i, a)| (a.to_string(), i))
            .collect();
        let reward_vector: Vec<f64> = states.iter().map(|s| *rewards.get(s).unwrap_or(&0.0)).collect();
        let n = states.len();
        let mut mdp = MarkovDecisionProcess {
            states,
            state_index,
            actions,
            action_index,
            transitions,
            action_transitions,
            rewards,
            reward_vector,
            choices: Vec::with_capacity(n),
            row_index: HashMap::new(),
            outgoing: Vec::new(),
            matrix: Array2::zeros((0, n)),
            row_labels: Vec::new(),
            simulator: Simulator::new(rng)
        };
        mdp.choices = (0..n).map(|s| mdp.enabled_actions(s)).collect::<Result<Vec<_>, _>>()?;
        if let Some(s) = mdp.choices.iter().position(|c| c.is_empty()) {
            return Err(ModelError::NoOutgoingTransitions { state: mdp.states[s].to_string() });
        }
        let (matrix, row_labels) = mdp.build_transition_matrix()?;
        mdp.outgoing = row_labels.iter()
            .map(|(s, a)| mdp.allowed_indices(*s, *a))
            .collect::<Result<Vec<_>, _>>()?;
        mdp.row_index = row_labels.iter().enumerate().map(|(r, sa)| (*sa, r)).collect();
        mdp.matrix = matrix;
        mdp.row_labels = row_labels;
        Ok(mdp)
    }

    pub fn states(&self) -> &[String] {
        &self.states[..]
    }

    pub fn actions(&self) -> &[String] {
        &self.actions[..]
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions[..]
    }

    pub fn action_transitions(&self) -> &[ActionTransition] {
        &self.action_transitions[..]
    }

    pub fn rewards(&self) -> &HashMap<String, f64> {
        &self.rewards
    }

    pub fn transition_matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// `(state, action)` name of every matrix row.
    pub fn row_labels(&self) -> Vec<(&str, &str)> {
        self.row_labels.iter()
            .map(|(s, a)| (self.states[*s].as_str(), self.actions[*a].as_str()))
            .collect()
    }

    pub fn index_of(&self, state: &str) -> Result<usize, ModelError> {
        self.state_index.get(state).copied().ok_or_else(|| ModelError::UnknownState {
            state: state.to_string()
        })
    }

    pub fn action_index_of(&self, action: &str) -> Result<usize, ModelError> {
        self.action_index.get(action).copied().ok_or_else(|| ModelError::UnknownAction {
            action: action.to_string()
        })
    }

    fn enabled_actions(&self, s: usize) -> Result<Vec<usize>, ModelError> {
        let state = &self.states[s];
        let mut enabled: Vec<usize> = Vec::new();
        for t in self.action_transitions.iter().filter(|t| t.from == *state) {
            let a = self.action_index_of(&t.action)?;
            if !enabled.contains(&a) {
                enabled.push(a);
            }
        }
        enabled.sort_unstable();
        Ok(enabled)
    }

    pub fn possible_actions(&self, state: &str) -> Result<Vec<String>, ModelError> {
        let s = self.index_of(state)?;
        Ok(self.action_names(s))
    }

    fn action_names(&self, s: usize) -> Vec<String> {
        self.choices[s].iter().map(|a| self.actions[*a].to_string()).collect()
    }

    fn allowed_indices(&self, s: usize, a: usize) -> Result<(Vec<usize>, Vec<f64>), ModelError> {
        let state = &self.states[s];
        let action = &self.actions[a];
        let pairs: Vec<(usize, f64)> = self.action_transitions.iter()
            .filter(|t| t.from == *state && t.action == *action)
            .map(|t| self.index_of(&t.to).map(|j| (j, t.weight)))
            .collect::<Result<_, _>>()?;
        let (targets, weights): (Vec<usize>, Vec<f64>) = pairs.into_iter().unzip();
        let probabilities = normalise(&weights[..]).ok_or_else(|| ModelError::ActionNotAvailable {
            state: state.to_string(),
            action: action.to_string()
        })?;
        Ok((targets, probabilities))
    }

    pub fn allowed_transitions(&self, state: &str, action: &str) -> Result<(Vec<String>, Vec<f64>), ModelError> {
        let (targets, probabilities) = self.allowed_indices(self.index_of(state)?, self.action_index_of(action)?)?;
        Ok((targets.iter().map(|j| self.states[*j].to_string()).collect(), probabilities))
    }

    /// One row per enabled `(state, action)` pair, states in declaration order.
    pub fn build_transition_matrix(&self) -> Result<(Array2<f64>, Vec<(usize, usize)>), ModelError> {
        let n = self.states.len();
        let row_labels: Vec<(usize, usize)> = self.choices.iter().enumerate()
            .flat_map(|(s, c)| c.iter().map(move |a| (s, *a)))
            .collect();
        let mut matrix: Array2<f64> = Array2::zeros((row_labels.len(), n));
        for (r, (s, a)) in row_labels.iter().enumerate() {
            let (targets, probabilities) = self.allowed_indices(*s, *a)?;
            for (j, p) in targets.iter().zip(probabilities.iter()) {
                matrix[[r, *j]] += *p;
            }
        }
        Ok((matrix, row_labels))
    }

    pub fn generate_graph(&self) -> Graph<String, String> {
        let edges = self.action_transitions.iter()
            .filter_map(|t| match (self.state_index.get(&t.from), self.state_index.get(&t.to)) {
                (Some(i), Some(j)) => Some((*i, *j, format!("{}({})", t.action, t.weight))),
                _ => None
            });
        state_graph(&self.states[..], edges)
    }

    // --- Simulation ---

    /// Restarts from the first state and returns the actions enabled there.
    pub fn simulation_init(&mut self) -> Vec<String> {
        self.simulator.reset(0);
        self.action_names(0)
    }

    pub fn simulation_init_from(&mut self, state: &str) -> Result<Vec<String>, ModelError> {
        let s = self.index_of(state)?;
        self.simulator.reset(s);
        Ok(self.action_names(s))
    }

    pub fn simulation_step(&mut self, action: &str) -> Result<(String, Vec<String>), ModelError> {
        let a = self.action_index_of(action)?;
        let next = self.step_index(a)?;
        Ok((self.states[next].to_string(), self.action_names(next)))
    }

    /// Steps with an action drawn uniformly from those enabled at the actual state.
    pub fn simulation_step_uniform(&mut self) -> Result<(String, Vec<String>), ModelError> {
        let current = self.simulator.actual().ok_or(ModelError::SimulationNotStarted)?;
        let a = *self.choices[current].choose(self.simulator.rng()).ok_or_else(|| {
            ModelError::NoOutgoingTransitions { state: self.states[current].to_string() }
        })?;
        let next = self.step_index(a)?;
        Ok((self.states[next].to_string(), self.action_names(next)))
    }

    pub(crate) fn step_index(&mut self, a: usize) -> Result<usize, ModelError> {
        let current = self.simulator.actual().ok_or(ModelError::SimulationNotStarted)?;
        let row = *self.row_index.get(&(current, a)).ok_or_else(|| ModelError::ActionNotAvailable {
            state: self.states[current].to_string(),
            action: self.actions[a].to_string()
        })?;
        let (targets, probabilities) = &self.outgoing[row];
        let k = self.simulator.sample(probabilities).ok_or_else(|| ModelError::NoOutgoingTransitions {
            state: self.states[current].to_string()
        })?;
        let next = targets[k];
        self.simulator.advance(next, Some(a));
        if self.simulator.trace() {
            debug!(from = %self.states[current], action = %self.actions[a], to = %self.states[next],
                   "simulation step");
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
        self.simulator.snapshot(&self.states[..], &self.actions[..])
    }

    pub fn set_trace(&mut self, on: bool) -> bool {
        self.simulator.set_trace(on)
    }

    pub(crate) fn quietly<T, F>(&mut self, f: F) -> Result<T, ModelError>
    where
        F: FnOnce(&mut MarkovDecisionProcess) -> Result<T, ModelError>,
    {
        let trace = self.simulator.set_trace(false);
        let out = f(self);
        self.simulator.set_trace(trace);
        out
    }

    // --- Verification ---

    /// Maximal probability, over all schedulers, of reaching `target` from the
    /// first state, as the optimum of the Bellman linear program.
    pub fn verify_property_linear(&self, target: &str) -> Result<f64, ModelError> {
        let t = self.index_of(target)?;
        let values = max_reachability(&self.matrix, &self.row_labels[..], self.states.len(), t)?;
        let p = values[0].max(0.0).min(1.0);
        info!(state = %target, probability = p, "reachability LP solved");
        Ok(p)
    }

    /// Maximal reachability probability of `target` from the first state by
    /// value iteration from below.
    pub fn verify_property_value_iteration(&self, target: &str, epsilon: f64, max_iterations: usize)
        -> Result<f64, ModelError> {
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(ModelError::invalid("epsilon", epsilon, "must be positive"));
        }
        let t = self.index_of(target)?;
        let n = self.states.len();
        let mut x_cost_vectors: Vec<f64> = vec![0f64; n];
        x_cost_vectors[t] = 1.0;
        let mut epsilon_now: f64 = f64::INFINITY;
        let mut iterations: usize = 0;
        while epsilon_now >= epsilon && iterations < max_iterations {
            let x_arr = arr1(&x_cost_vectors[..]);
            let y_cost_vectors: Vec<f64> = (0..n)
                .map(|s| {
                    if s == t {
                        return 1.0;
                    }
                    self.choices[s].iter()
                        .map(|a| OrderedFloat(self.matrix.row(self.row_index[&(s, *a)]).dot(&x_arr)))
                        .max()
                        .map_or(0.0, |v| v.into_inner())
                })
                .collect();
            epsilon_now = max_abs_diff(&x_cost_vectors[..], &y_cost_vectors[..]);
            x_cost_vectors = y_cost_vectors;
            iterations += 1;
        }
        if epsilon_now >= epsilon {
            warn!(iterations, change = epsilon_now, "value iteration did not converge");
        }
        Ok(x_cost_vectors[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_checking::builder::ModelBuilder;
    use crate::model_checking::model::{Model, NO_ACTION};
    use approx::assert_abs_diff_eq;

    fn build(states: &[&str], actions: &[&str], plain: &[(&str, &str, f64)],
                        conditioned: &[(&str, &str, &str, f64)], rewards: &[(&str, f64)], seed: u64)
        -> MarkovDecisionProcess {
        let mut b = ModelBuilder::new();
        b.states_declared(states.to_vec(), Some(rewards.iter().map(|(s, r)| (s.to_string(), *r)).collect()));
        b.actions_declared(actions.to_vec());
        for (from, to, w) in plain.iter() {
            b.transition_declared(from, to, *w);
        }
        for (from, a, to, w) in conditioned.iter() {
            b.action_transition_declared(from, a, to, *w);
        }
        match b.generate_seeded(seed).unwrap() {
            Model::MarkovDecisionProcess(mdp) => mdp,
            Model::MarkovChain(_) => panic!("expected an MDP")
        }
    }

    fn two_state() -> MarkovDecisionProcess {
        build(&["S0", "S1"], &["a"], &[], &[("S0", "a", "S1", 1.0), ("S1", "a", "S1", 1.0)], &[], 1)
    }

    /// From S0, `safe` reaches T with 0.5 and otherwise sinks in F; `risky`
    /// goes to M, from which `retry` reaches T with 0.9.
    fn choice() -> MarkovDecisionProcess {
        build(
            &["S0", "M", "T", "F"],
            &["safe", "risky", "retry"],
            &[],
            &[
                ("S0", "safe", "T", 1.0),
                ("S0", "safe", "F", 1.0),
                ("S0", "risky", "M", 1.0),
                ("M", "retry", "T", 9.0),
                ("M", "retry", "F", 1.0),
            ],
            &[],
            4
        )
    }

    #[test]
    fn rows_follow_state_major_order() {
        let mdp = choice();
        assert_eq!(
            mdp.row_labels(),
            vec![("S0", "safe"), ("S0", "risky"), ("M", "retry"), ("T", NO_ACTION), ("F", NO_ACTION)]
        );
        for row in mdp.transition_matrix().genrows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn possible_actions_include_sentinel_for_plain_states() {
        let mdp = build(&["A", "B"], &["go"], &[("B", "A", 1.0)], &[("A", "go", "B", 1.0)], &[], 0);
        assert_eq!(mdp.possible_actions("A").unwrap(), vec!["go".to_string()]);
        assert_eq!(mdp.possible_actions("B").unwrap(), vec![NO_ACTION.to_string()]);
        assert_eq!(mdp.transitions().len(), 1);
    }

    #[test]
    fn allowed_transitions_filter_by_action() {
        let mdp = choice();
        let (targets, probs) = mdp.allowed_transitions("M", "retry").unwrap();
        assert_eq!(targets, vec!["T".to_string(), "F".to_string()]);
        assert_abs_diff_eq!(probs[0], 0.9);
        assert!(matches!(mdp.allowed_transitions("M", "safe"), Err(ModelError::ActionNotAvailable { .. })));
    }

    #[test]
    fn simulation_records_last_action() {
        let mut mdp = choice();
        assert_eq!(mdp.simulation_init(), vec!["safe".to_string(), "risky".to_string()]);
        let (next, actions) = mdp.simulation_step("risky").unwrap();
        assert_eq!(next, "M");
        assert_eq!(actions, vec!["retry".to_string()]);
        let snap = mdp.snapshot();
        assert_eq!(snap.last_action.as_deref(), Some("risky"));
        assert_eq!(snap.last_next_state.as_deref(), Some("M"));
        assert_eq!(snap.path, vec!["S0".to_string(), "M".to_string()]);
    }

    #[test]
    fn disabled_action_is_rejected() {
        let mut mdp = choice();
        mdp.simulation_init();
        assert!(matches!(mdp.simulation_step("retry"), Err(ModelError::ActionNotAvailable { .. })));
        assert!(matches!(mdp.simulation_step("jump"), Err(ModelError::UnknownAction { .. })));
    }

    #[test]
    fn lp_certain_reachability() {
        let mdp = two_state();
        assert_abs_diff_eq!(mdp.verify_property_linear("S1").unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn lp_picks_the_better_action() {
        let mdp = choice();
        assert_abs_diff_eq!(mdp.verify_property_linear("T").unwrap(), 0.9, epsilon = 1e-9);
    }

    #[test]
    fn lp_and_value_iteration_agree() {
        let mdp = choice();
        let lp = mdp.verify_property_linear("T").unwrap();
        let vi = mdp.verify_property_value_iteration("T", 1e-10, 1000).unwrap();
        assert_abs_diff_eq!(lp, vi, epsilon = 1e-6);
    }

    #[test]
    fn value_iteration_with_loops() {
        // `wait` loops with probability 1/2 and reaches T otherwise: supremum 1.
        let mdp = build(
            &["S0", "T", "F"],
            &["wait", "quit"],
            &[],
            &[("S0", "wait", "S0", 1.0), ("S0", "wait", "T", 1.0), ("S0", "quit", "F", 1.0)],
            &[],
            0
        );
        assert_abs_diff_eq!(mdp.verify_property_value_iteration("T", 1e-12, 10_000).unwrap(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(mdp.verify_property_linear("T").unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn unreachable_target_has_zero_probability() {
        let mdp = build(&["S0", "T"], &["a"], &[], &[("S0", "a", "S0", 1.0)], &[], 0);
        assert_abs_diff_eq!(mdp.verify_property_linear("T").unwrap(), 0.0, epsilon = 1e-9);
    }
}

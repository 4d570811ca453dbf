//! Tabular Q-learning over a simulated MDP.
//!
//! Episode `i` walks `episode_length` steps (one by default) from wherever
//! the previous episode stopped, choosing uniformly among the enabled
//! actions, with learning rate `1 / (i + 1)`. The simulation goes back to the
//! first state on every episode whose index is a multiple of `restart_every`.

use ordered_float::OrderedFloat;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use super::error::{check_positive, ModelError};
use super::mdp::MarkovDecisionProcess;

pub const DEFAULT_GAMMA: f64 = 0.9;
pub const DEFAULT_EPISODES: usize = 1000;
pub const DEFAULT_EPISODE_LENGTH: usize = 1;
pub const DEFAULT_RESTART_EVERY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QLearningConfig {
    pub gamma: f64,
    pub episodes: usize,
    /// Sampled steps per episode; all of them share the episode's learning rate.
    pub episode_length: usize,
    /// Episodes between two restarts in the first state.
    pub restart_every: usize
}

impl Default for QLearningConfig {
    fn default() -> Self {
        QLearningConfig {
            gamma: DEFAULT_GAMMA,
            episodes: DEFAULT_EPISODES,
            episode_length: DEFAULT_EPISODE_LENGTH,
            restart_every: DEFAULT_RESTART_EVERY
        }
    }
}

impl QLearningConfig {
    pub fn new(gamma: f64, episodes: usize) -> QLearningConfig {
        QLearningConfig { gamma, episodes, ..Default::default() }
    }

    pub fn with_episode_length(mut self, episode_length: usize) -> QLearningConfig {
        self.episode_length = episode_length;
        self
    }

    pub fn with_restart_every(mut self, restart_every: usize) -> QLearningConfig {
        self.restart_every = restart_every;
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !(self.gamma >= 0.0 && self.gamma < 1.0) {
            return Err(ModelError::invalid("gamma", self.gamma, "must lie in [0, 1)"));
        }
        check_positive("episodes", self.episodes)?;
        check_positive("episode_length", self.episode_length)?;
        check_positive("restart_every", self.restart_every)
    }
}

/// Learned action values, one row per state and one column per declared
/// action. Entries for disabled actions stay at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct QTable {
    states: Vec<String>,
    actions: Vec<String>,
    choices: Vec<Vec<usize>>,
    values: Vec<f64>
}

impl QTable {
    fn new(mdp: &MarkovDecisionProcess) -> QTable {
        QTable {
            states: mdp.states.clone(),
            actions: mdp.actions.clone(),
            choices: mdp.choices.clone(),
            values: vec![0f64; mdp.states.len() * mdp.actions.len()]
        }
    }

    fn slot(&self, s: usize, a: usize) -> usize {
        s * self.actions.len() + a
    }

    /// Row-major values, `states x actions`.
    pub fn as_slice(&self) -> &[f64] {
        &self.values[..]
    }

    pub fn value(&self, s: usize, a: usize) -> f64 {
        self.values[self.slot(s, a)]
    }

    pub fn get(&self, state: &str, action: &str) -> Option<f64> {
        let s = self.states.iter().position(|x| x == state)?;
        let a = self.actions.iter().position(|x| x == action)?;
        Some(self.value(s, a))
    }

    /// Largest value over the actions enabled in `s`.
    pub fn state_value(&self, s: usize) -> f64 {
        self.best(s).map_or(0.0, |(_, v)| v)
    }

    fn best(&self, s: usize) -> Option<(usize, f64)> {
        self.choices[s].iter()
            .map(|a| (*a, self.value(s, *a)))
            .max_by_key(|(_, v)| OrderedFloat(*v))
    }

    /// Action with the highest learned value in every state.
    pub fn greedy_policy(&self) -> Vec<(String, String)> {
        (0..self.states.len())
            .filter_map(|s| self.best(s).map(|(a, _)| (self.states[s].to_string(), self.actions[a].to_string())))
            .collect()
    }

    /// `(state, action, value)` for every enabled pair.
    pub fn entries(&self) -> Vec<(&str, &str, f64)> {
        self.choices.iter().enumerate()
            .flat_map(|(s, c)| c.iter().map(move |a| (s, *a)))
            .map(|(s, a)| (self.states[s].as_str(), self.actions[a].as_str(), self.value(s, a)))
            .collect()
    }
}

impl MarkovDecisionProcess {
    pub fn q_learning(&mut self, gamma: f64, episodes: usize) -> Result<QTable, ModelError> {
        self.q_learning_with(&QLearningConfig::new(gamma, episodes))
    }

    pub fn q_learning_with(&mut self, config: &QLearningConfig) -> Result<QTable, ModelError> {
        config.validate()?;
        let mut q = QTable::new(self);
        let gamma = config.gamma;
        self.quietly(|mdp| {
            for i in 0..config.episodes {
                let alpha = 1.0 / (i as f64 + 1.0);
                if i % config.restart_every == 0 {
                    mdp.simulator.reset(0);
                }
                let mut s = mdp.simulator.actual().unwrap_or(0);
                for _ in 0..config.episode_length {
                    let a = *mdp.choices[s].choose(mdp.simulator.rng()).ok_or_else(|| {
                        ModelError::NoOutgoingTransitions { state: mdp.states[s].to_string() }
                    })?;
                    let next = mdp.step_index(a)?;
                    let update = mdp.reward_vector[s] + gamma * q.state_value(next);
                    let k = q.slot(s, a);
                    q.values[k] += alpha * (update - q.values[k]);
                    s = next;
                }
                if (i + 1) % config.restart_every == 0 {
                    debug!(episode = i + 1, alpha, "q-learning progress");
                }
            }
            Ok(())
        })?;
        info!(episodes = config.episodes, gamma, restart_every = config.restart_every, "q-learning finished");
        Ok(q)
    }
}

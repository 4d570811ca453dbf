//! Step-by-step sampling of trajectories.
//!
//! Every model owns one [`Simulator`]. It holds the injected random number
//! generator together with the mutable part of a model: the actual state, the
//! visited path and the most recent action. States and actions are kept as
//! indices into the owning model; [`Simulator::snapshot`] resolves them to
//! names for renderers.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// A detached copy of the simulation state, safe to hold while the model keeps stepping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulationSnapshot {
    pub actual_state: Option<String>,
    pub path: Vec<String>,
    pub last_action: Option<String>,
    pub last_next_state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Simulator {
    rng: StdRng,
    actual: Option<usize>,
    path: Vec<usize>,
    last_action: Option<usize>,
    last_next_state: Option<usize>,
    trace: bool,
}

impl Simulator {
    pub fn new(rng: StdRng) -> Simulator {
        Simulator {
            rng,
            actual: None,
            path: Vec::new(),
            last_action: None,
            last_next_state: None,
            trace: true,
        }
    }

    pub fn seeded(seed: u64) -> Simulator {
        Simulator::new(StdRng::seed_from_u64(seed))
    }

    /// Moves to `initial` and clears the path and the last step.
    pub fn reset(&mut self, initial: usize) {
        self.actual = Some(initial);
        self.path.clear();
        self.path.push(initial);
        self.last_action = None;
        self.last_next_state = None;
    }

    pub fn actual(&self) -> Option<usize> {
        self.actual
    }

    pub fn path(&self) -> &[usize] {
        &self.path[..]
    }

    pub fn last_action(&self) -> Option<usize> {
        self.last_action
    }

    /// Draws a position of `probabilities` according to their categorical
    /// distribution. `None` when the slice is empty or carries no mass.
    pub fn sample(&mut self, probabilities: &[f64]) -> Option<usize> {
        let dist = WeightedIndex::new(probabilities).ok()?;
        Some(dist.sample(&mut self.rng))
    }

    /// Records a completed step into `next`, taken under `action` if any.
    pub fn advance(&mut self, next: usize, action: Option<usize>) {
        self.actual = Some(next);
        self.path.push(next);
        self.last_action = action;
        self.last_next_state = Some(next);
    }

    pub fn trace(&self) -> bool {
        self.trace
    }

    /// Switches step tracing and returns the previous setting.
    pub fn set_trace(&mut self, on: bool) -> bool {
        std::mem::replace(&mut self.trace, on)
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn snapshot(&self, states: &[String], actions: &[String]) -> SimulationSnapshot {
        SimulationSnapshot {
            actual_state: self.actual.map(|s| states[s].to_string()),
            path: self.path.iter().map(|s| states[*s].to_string()).collect(),
            last_action: self.last_action.map(|a| actions[a].to_string()),
            last_next_state: self.last_next_state.map(|s| states[s].to_string()),
        }
    }
}

use serde::{Deserialize, Serialize};

use super::markov_chain::MarkovChain;
use super::mdp::MarkovDecisionProcess;
use super::simulation::SimulationSnapshot;

/// Placeholder action carried by unconditioned transitions once a model is an MDP.
pub const NO_ACTION: &str = "no_action";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub weight: f64
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ActionTransition {
    pub from: String,
    pub action: String,
    pub to: String,
    pub weight: f64
}

impl ActionTransition {
    /// Re-tags a plain transition with the sentinel action.
    pub fn unconditioned(t: &Transition) -> ActionTransition {
        ActionTransition {
            from: t.from.to_string(),
            action: NO_ACTION.to_string(),
            to: t.to.to_string(),
            weight: t.weight
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ModelType {
    MC,
    MDP
}

/// A finalised model, produced once by [`ModelBuilder::generate`](super::builder::ModelBuilder::generate).
#[derive(Debug)]
pub enum Model {
    MarkovChain(MarkovChain),
    MarkovDecisionProcess(MarkovDecisionProcess)
}

impl Model {
    pub fn model_type(&self) -> ModelType {
        match self {
            Model::MarkovChain(_) => ModelType::MC,
            Model::MarkovDecisionProcess(_) => ModelType::MDP
        }
    }

    pub fn states(&self) -> &[String] {
        match self {
            Model::MarkovChain(mc) => mc.states(),
            Model::MarkovDecisionProcess(mdp) => mdp.states()
        }
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        match self {
            Model::MarkovChain(mc) => mc.snapshot(),
            Model::MarkovDecisionProcess(mdp) => mdp.snapshot()
        }
    }

    pub fn as_markov_chain(&self) -> Option<&MarkovChain> {
        match self {
            Model::MarkovChain(mc) => Some(mc),
            Model::MarkovDecisionProcess(_) => None
        }
    }

    pub fn as_mdp(&self) -> Option<&MarkovDecisionProcess> {
        match self {
            Model::MarkovChain(_) => None,
            Model::MarkovDecisionProcess(mdp) => Some(mdp)
        }
    }
}

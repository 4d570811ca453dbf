//! Collection, validation and normalisation of raw model declarations.
//!
//! A front end (the textual grammar, or [`read_model_json`]) reports what it
//! finds through the `*_declared` methods. [`ModelBuilder::validate`] then
//! checks the declarations once, decides whether the result is a Markov
//! chain or an MDP and completes missing transitions, after which
//! [`ModelBuilder::generate`] hands out the finished [`Model`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{debug, info};

use super::error::ModelError;
use super::markov_chain::MarkovChain;
use super::mdp::MarkovDecisionProcess;
use super::model::*;

/// Serialised form of a model, one field per kind of declaration.
///
/// ```json
/// {
///   "states": ["S0", "S1"],
///   "rewards": {"S1": 1.0},
///   "actions": ["a"],
///   "action_transitions": [
///     {"from": "S0", "action": "a", "to": "S1", "weight": 1},
///     {"from": "S1", "action": "a", "to": "S1", "weight": 1}
///   ]
/// }
/// ```
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ModelSpec {
    pub states: Vec<String>,
    pub rewards: BTreeMap<String, f64>,
    pub actions: Vec<String>,
    pub transitions: Vec<Transition>,
    pub action_transitions: Vec<ActionTransition>
}

pub fn read_model_json<P: AsRef<Path>>(path: P) -> Result<ModelSpec, ModelError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let u = serde_json::from_reader(reader)?;
    Ok(u)
}

/// Declarations as reported by the front end. Normalisation never touches
/// them; [`ModelBuilder::validate`] works on copies kept in [`Normalised`].
#[derive(Debug, Default, Clone)]
pub struct ModelBuilder {
    pub states: Vec<String>,
    pub rewards: HashMap<String, f64>,
    pub actions: Vec<String>,
    pub transitions: Vec<Transition>,
    pub action_transitions: Vec<ActionTransition>,
    normalised: Option<Normalised>
}

/// Output of a successful validation: the completed action set and
/// transition lists the model is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalised {
    pub model_type: ModelType,
    pub actions: Vec<String>,
    pub transitions: Vec<Transition>,
    pub action_transitions: Vec<ActionTransition>
}

impl ModelBuilder {
    pub fn new() -> ModelBuilder {
        ModelBuilder::default()
    }

    /// Replays a deserialised model as declaration events.
    pub fn from_spec(spec: ModelSpec) -> ModelBuilder {
        let mut builder = ModelBuilder::new();
        builder.states_declared(spec.states, Some(spec.rewards.into_iter().collect()));
        builder.actions_declared(spec.actions);
        for t in spec.transitions.iter() {
            builder.transition_declared(&t.from, &t.to, t.weight);
        }
        for t in spec.action_transitions.iter() {
            builder.action_transition_declared(&t.from, &t.action, &t.to, t.weight);
        }
        builder
    }

    /// Replaces the state list and the rewards attached to it.
    pub fn states_declared<I, S>(&mut self, states: I, rewards: Option<Vec<(String, f64)>>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states = states.into_iter().map(Into::into).collect();
        self.rewards = rewards.map(|r| r.into_iter().collect()).unwrap_or_default();
        self.normalised = None;
    }

    pub fn actions_declared<I, S>(&mut self, actions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self.normalised = None;
    }

    pub fn transition_declared(&mut self, from: &str, to: &str, weight: f64) {
        self.transitions.push(Transition {
            from: from.to_string(),
            to: to.to_string(),
            weight
        });
        self.normalised = None;
    }

    pub fn action_transition_declared(&mut self, from: &str, action: &str, to: &str, weight: f64) {
        self.action_transitions.push(ActionTransition {
            from: from.to_string(),
            action: action.to_string(),
            to: to.to_string(),
            weight
        });
        self.normalised = None;
    }

    pub fn model_type(&self) -> Option<ModelType> {
        self.normalised.as_ref().map(|n| n.model_type)
    }

    /// Result of the last successful validation, if no declaration came after it.
    pub fn normalised(&self) -> Option<&Normalised> {
        self.normalised.as_ref()
    }

    /// Checks the declarations, classifies the model and normalises a copy
    /// of them.
    ///
    /// Calling it again without new declarations returns the cached type.
    pub fn validate(&mut self) -> Result<ModelType, ModelError> {
        if let Some(n) = &self.normalised {
            return Ok(n.model_type);
        }
        let normalised = self.normalise()?;
        let model_type = normalised.model_type;
        self.normalised = Some(normalised);
        Ok(model_type)
    }

    fn normalise(&self) -> Result<Normalised, ModelError> {
        if self.states.is_empty() {
            return Err(ModelError::NoStates);
        }
        let mut declared: HashSet<&str> = HashSet::with_capacity(self.states.len());
        for s in self.states.iter() {
            if !declared.insert(s.as_str()) {
                return Err(ModelError::DuplicateState { state: s.to_string() });
            }
        }
        let undeclared = |s: &str| ModelError::UndeclaredState { state: s.to_string() };

        for t in self.transitions.iter() {
            for s in [t.from.as_str(), t.to.as_str()].iter() {
                if !declared.contains(s) {
                    return Err(undeclared(*s));
                }
            }
            check_weight(&t.from, &t.to, t.weight)?;
        }
        for t in self.action_transitions.iter() {
            for s in [t.from.as_str(), t.to.as_str()].iter() {
                if !declared.contains(s) {
                    return Err(undeclared(*s));
                }
            }
            check_weight(&t.from, &t.to, t.weight)?;
        }
        for s in self.rewards.keys() {
            if !declared.contains(s.as_str()) {
                return Err(undeclared(s.as_str()));
            }
        }
        for t in self.action_transitions.iter() {
            if t.action != NO_ACTION && !self.actions.iter().any(|a| *a == t.action) {
                return Err(ModelError::UndeclaredAction { action: t.action.to_string() });
            }
        }

        let model_type = if self.action_transitions.is_empty() {
            ModelType::MC
        } else {
            ModelType::MDP
        };

        let plain_sources: HashSet<&str> = self.transitions.iter().map(|t| t.from.as_str()).collect();
        let action_sources: HashSet<&str> = self.action_transitions.iter().map(|t| t.from.as_str()).collect();
        if let Some(s) = self.states.iter()
            .find(|s| plain_sources.contains(s.as_str()) && action_sources.contains(s.as_str())) {
            return Err(ModelError::MixedTransitionStyle { state: s.to_string() });
        }

        let mut out = Normalised {
            model_type,
            actions: self.actions.clone(),
            transitions: self.transitions.clone(),
            action_transitions: self.action_transitions.clone()
        };
        if model_type == ModelType::MDP {
            out.action_transitions.extend(self.transitions.iter().map(ActionTransition::unconditioned));
            if !out.actions.iter().any(|a| a == NO_ACTION) {
                out.actions.push(NO_ACTION.to_string());
            }
        }

        let dead_ends: Vec<&String> = self.states.iter()
            .filter(|s| match model_type {
                ModelType::MC => out.transitions.iter().all(|t| t.from != **s),
                ModelType::MDP => out.action_transitions.iter().all(|t| t.from != **s)
            })
            .collect();
        for s in dead_ends.into_iter() {
            debug!(state = %s, "adding self-loop to state without outgoing transitions");
            match model_type {
                ModelType::MC => out.transitions.push(Transition {
                    from: s.to_string(),
                    to: s.to_string(),
                    weight: 1.0
                }),
                ModelType::MDP => out.action_transitions.push(ActionTransition {
                    from: s.to_string(),
                    action: NO_ACTION.to_string(),
                    to: s.to_string(),
                    weight: 1.0
                })
            }
        }
        info!(model_type = ?model_type, states = self.states.len(), "model validated");
        Ok(out)
    }

    /// Builds the finished model, validating first if needed.
    pub fn generate(mut self, rng: StdRng) -> Result<Model, ModelError> {
        let normalised = match self.normalised.take() {
            Some(n) => n,
            None => self.normalise()?
        };
        let model = match normalised.model_type {
            ModelType::MC => Model::MarkovChain(MarkovChain::new(
                self.states,
                normalised.transitions,
                self.rewards,
                rng
            )?),
            ModelType::MDP => Model::MarkovDecisionProcess(MarkovDecisionProcess::new(
                self.states,
                normalised.actions,
                self.transitions,
                normalised.action_transitions,
                self.rewards,
                rng
            )?)
        };
        Ok(model)
    }

    pub fn generate_seeded(self, seed: u64) -> Result<Model, ModelError> {
        self.generate(StdRng::seed_from_u64(seed))
    }
}

fn check_weight(from: &str, to: &str, weight: f64) -> Result<(), ModelError> {
    if weight.is_finite() && weight > 0.0 {
        Ok(())
    } else {
        Err(ModelError::InvalidWeight {
            from: from.to_string(),
            to: to.to_string(),
            weight
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ModelBuilder {
        let mut b = ModelBuilder::new();
        b.states_declared(vec!["A", "B", "C"], None);
        b.transition_declared("A", "B", 2.0);
        b.transition_declared("A", "C", 1.0);
        b
    }

    #[test]
    fn plain_transitions_make_a_chain() {
        let mut b = chain();
        assert_eq!(b.validate().unwrap(), ModelType::MC);
    }

    #[test]
    fn dead_ends_get_one_self_loop() {
        let mut b = chain();
        b.validate().unwrap();
        let n = b.normalised().unwrap();
        for s in ["B", "C"].iter() {
            let loops: Vec<&Transition> = n.transitions.iter().filter(|t| t.from == *s).collect();
            assert_eq!(loops.len(), 1);
            assert_eq!(loops[0].to, *s);
            assert_eq!(loops[0].weight, 1.0);
        }
        assert_eq!(n.transitions.iter().filter(|t| t.from == "A").count(), 2);
        assert_eq!(b.transitions.len(), 2);
    }

    #[test]
    fn validate_twice_does_not_add_more_loops() {
        let mut b = chain();
        b.validate().unwrap();
        let n = b.normalised().unwrap().transitions.len();
        b.validate().unwrap();
        assert_eq!(b.normalised().unwrap().transitions.len(), n);
    }

    #[test]
    fn undeclared_state_is_rejected() {
        let mut b = chain();
        b.transition_declared("A", "Z", 1.0);
        match b.validate() {
            Err(ModelError::UndeclaredState { state }) => assert_eq!(state, "Z"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn undeclared_reward_state_is_rejected() {
        let mut b = ModelBuilder::new();
        b.states_declared(vec!["A"], Some(vec![("Q".to_string(), 1.0)]));
        assert!(matches!(b.validate(), Err(ModelError::UndeclaredState { .. })));
    }

    #[test]
    fn undeclared_action_is_rejected() {
        let mut b = ModelBuilder::new();
        b.states_declared(vec!["A", "B"], None);
        b.actions_declared(vec!["a"]);
        b.action_transition_declared("A", "b", "B", 1.0);
        match b.validate() {
            Err(ModelError::UndeclaredAction { action }) => assert_eq!(action, "b"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn mixed_styles_are_rejected() {
        let mut b = ModelBuilder::new();
        b.states_declared(vec!["A", "B"], None);
        b.actions_declared(vec!["a"]);
        b.transition_declared("A", "B", 1.0);
        b.action_transition_declared("A", "a", "B", 1.0);
        match b.validate() {
            Err(ModelError::MixedTransitionStyle { state }) => assert_eq!(state, "A"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn duplicate_and_empty_state_lists_are_rejected() {
        let mut b = ModelBuilder::new();
        assert!(matches!(b.validate(), Err(ModelError::NoStates)));
        b.states_declared(vec!["A", "A"], None);
        assert!(matches!(b.validate(), Err(ModelError::DuplicateState { .. })));
    }

    #[test]
    fn non_positive_weights_are_rejected() {
        let mut b = chain();
        b.transition_declared("B", "C", 0.0);
        assert!(matches!(b.validate(), Err(ModelError::InvalidWeight { .. })));
    }

    #[test]
    fn mdp_merges_plain_transitions_under_sentinel() {
        let mut b = ModelBuilder::new();
        b.states_declared(vec!["A", "B", "C"], None);
        b.actions_declared(vec!["go"]);
        b.action_transition_declared("A", "go", "B", 1.0);
        b.transition_declared("B", "C", 1.0);
        assert_eq!(b.validate().unwrap(), ModelType::MDP);
        let n = b.normalised().unwrap();
        assert!(n.actions.iter().any(|a| a == NO_ACTION));
        assert!(n.action_transitions.iter()
            .any(|t| t.from == "B" && t.to == "C" && t.action == NO_ACTION));
        assert!(!b.actions.iter().any(|a| a == NO_ACTION));
        let loops: Vec<&ActionTransition> = n.action_transitions.iter().filter(|t| t.from == "C").collect();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].to, "C");
        assert_eq!(loops[0].action, NO_ACTION);
    }

    #[test]
    fn spec_replays_as_declarations() {
        let json = r#"{
            "states": ["S0", "S1"],
            "rewards": {"S1": 1.0},
            "actions": ["a"],
            "action_transitions": [
                {"from": "S0", "action": "a", "to": "S1", "weight": 1},
                {"from": "S1", "action": "a", "to": "S1", "weight": 1}
            ]
        }"#;
        let spec: ModelSpec = serde_json::from_str(json).unwrap();
        let mut b = ModelBuilder::from_spec(spec);
        assert_eq!(b.validate().unwrap(), ModelType::MDP);
        assert_eq!(b.rewards.get("S1"), Some(&1.0));
    }

    #[test]
    fn mdp_revalidates_after_new_declaration() {
        let mut b = ModelBuilder::new();
        b.states_declared(vec!["A", "B", "C"], None);
        b.actions_declared(vec!["go"]);
        b.action_transition_declared("A", "go", "B", 1.0);
        b.transition_declared("B", "C", 1.0);
        assert_eq!(b.validate().unwrap(), ModelType::MDP);
        b.action_transition_declared("A", "go", "C", 1.0);
        assert_eq!(b.model_type(), None);
        assert_eq!(b.validate().unwrap(), ModelType::MDP);
        let n = b.normalised().unwrap();
        assert_eq!(n.action_transitions.iter().filter(|t| t.from == "B").count(), 1);
        assert_eq!(n.actions.iter().filter(|a| *a == NO_ACTION).count(), 1);
    }

    #[test]
    fn chain_drops_stale_self_loop_after_new_transition() {
        let mut b = ModelBuilder::new();
        b.states_declared(vec!["A", "B"], None);
        b.transition_declared("A", "B", 1.0);
        b.validate().unwrap();
        assert!(b.normalised().unwrap().transitions.iter().any(|t| t.from == "B" && t.to == "B"));
        b.transition_declared("B", "A", 1.0);
        b.validate().unwrap();
        let from_b: Vec<&Transition> = b.normalised().unwrap().transitions.iter()
            .filter(|t| t.from == "B")
            .collect();
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_b[0].to, "A");
        match b.generate_seeded(0).unwrap() {
            Model::MarkovChain(mc) => {
                let (targets, probs) = mc.allowed_transitions("B").unwrap();
                assert_eq!(targets, vec!["A".to_string()]);
                assert_eq!(probs, vec![1.0]);
            }
            Model::MarkovDecisionProcess(_) => panic!("expected a Markov chain")
        }
    }

    #[test]
    fn redeclared_states_replace_rewards() {
        let mut b = ModelBuilder::new();
        b.states_declared(vec!["A", "Q"], Some(vec![("Q".to_string(), 2.0)]));
        b.states_declared(vec!["A"], Some(vec![("A".to_string(), 1.0)]));
        assert_eq!(b.validate().unwrap(), ModelType::MC);
        assert_eq!(b.rewards.get("Q"), None);
        assert_eq!(b.rewards.get("A"), Some(&1.0));
        b.states_declared(vec!["A"], None);
        assert!(b.rewards.is_empty());
    }

    #[test]
    fn generate_returns_tagged_model() {
        let model = chain().generate_seeded(3).unwrap();
        assert_eq!(model.model_type(), ModelType::MC);
        assert!(model.as_markov_chain().is_some());
        assert!(model.as_mdp().is_none());
    }
}

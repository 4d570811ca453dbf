//! One entry point for every analysis the binary offers.
//!
//! [`run`] dispatches on [`Mode`] and returns a [`Report`]; loading the model
//! and exporting results live alongside it so the binary only parses
//! arguments.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use itertools::Itertools;
use petgraph::dot::Dot;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

use crate::model_checking::builder::{read_model_json, ModelBuilder};
use crate::model_checking::error::{check_open_unit, check_positive, ModelError};
use crate::model_checking::model::{Model, ModelType};
use crate::model_checking::q_learning::{QLearningConfig, QTable};
use crate::model_checking::simulation::SimulationSnapshot;
use crate::model_checking::smc::SprtOutcome;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("unknown mode {0}")]
    UnknownMode(String),

    #[error("mode {mode} is not supported for {model:?} models")]
    UnsupportedMode { mode: Mode, model: ModelType },

    #[error("mode {0} needs a --target")]
    MissingTarget(Mode),

    #[error("mode {0} always starts in the first declared state and takes no --initial")]
    InitialNotSupported(Mode),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Mode {
    Simulate,
    Linear,
    Iterative,
    SmcQuant,
    SmcQual,
    Reward,
    QLearning,
    ValueIteration
}

impl Mode {
    pub const ALL: [Mode; 8] = [
        Mode::Simulate,
        Mode::Linear,
        Mode::Iterative,
        Mode::SmcQuant,
        Mode::SmcQual,
        Mode::Reward,
        Mode::QLearning,
        Mode::ValueIteration,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Mode::Simulate => "simulate",
            Mode::Linear => "linear",
            Mode::Iterative => "iterative",
            Mode::SmcQuant => "smc-quant",
            Mode::SmcQual => "smc-qual",
            Mode::Reward => "reward",
            Mode::QLearning => "q-learning",
            Mode::ValueIteration => "value-iteration"
        }
    }

    /// Whether the mode applies to the given kind of model.
    pub fn supports(self, model: ModelType) -> bool {
        match self {
            Mode::Simulate | Mode::Linear => true,
            Mode::Iterative | Mode::SmcQuant | Mode::SmcQual | Mode::Reward => model == ModelType::MC,
            Mode::QLearning | Mode::ValueIteration => model == ModelType::MDP
        }
    }

    fn needs_target(self) -> bool {
        !matches!(self, Mode::Simulate | Mode::QLearning)
    }

    /// Whether the mode reads a start state other than the first declared one.
    pub fn takes_initial(self) -> bool {
        matches!(self, Mode::Simulate | Mode::Iterative | Mode::Reward)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL.iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| DriverError::UnknownMode(s.to_string()))
    }
}

/// Everything a run needs besides the model.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub mode: Mode,
    /// Target state, or a comma separated list for `iterative` and `reward`.
    pub target: Option<String>,
    /// Start state for `simulate`, `iterative` and `reward`; the first
    /// declared state when absent.
    pub initial: Option<String>,
    pub steps: usize,
    pub epsilon: f64,
    pub delta: f64,
    pub theta: f64,
    pub alpha: f64,
    pub beta: f64,
    pub max_iterations: usize,
    pub simulations: usize,
    pub gamma: f64,
    pub episodes: usize,
    pub episode_length: usize,
    pub restart_every: usize,
    pub seed: Option<u64>
}

impl Default for RunConfig {
    fn default() -> Self {
        let q = QLearningConfig::default();
        RunConfig {
            mode: Mode::Simulate,
            target: None,
            initial: None,
            steps: 100,
            epsilon: 0.01,
            delta: 0.01,
            theta: 0.5,
            alpha: 0.01,
            beta: 0.01,
            max_iterations: 1000,
            simulations: 1000,
            gamma: q.gamma,
            episodes: q.episodes,
            episode_length: q.episode_length,
            restart_every: q.restart_every,
            seed: None
        }
    }
}

impl RunConfig {
    pub fn new(mode: Mode) -> RunConfig {
        RunConfig { mode, ..Default::default() }
    }

    pub fn with_target(mut self, target: &str) -> RunConfig {
        self.target = Some(target.to_string());
        self
    }

    pub fn q_learning(&self) -> QLearningConfig {
        QLearningConfig::new(self.gamma, self.episodes)
            .with_episode_length(self.episode_length)
            .with_restart_every(self.restart_every)
    }

    /// Checks the parameters the selected mode reads.
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.mode.needs_target() && self.target.is_none() {
            return Err(DriverError::MissingTarget(self.mode));
        }
        if self.initial.is_some() && !self.mode.takes_initial() {
            return Err(DriverError::InitialNotSupported(self.mode));
        }
        match self.mode {
            Mode::Simulate => check_positive("steps", self.steps)?,
            Mode::Linear => {}
            Mode::Iterative | Mode::ValueIteration => {
                check_open_unit("epsilon", self.epsilon)?;
                check_positive("max_iterations", self.max_iterations)?;
            }
            Mode::SmcQuant => {
                check_open_unit("epsilon", self.epsilon)?;
                check_open_unit("delta", self.delta)?;
                check_positive("steps", self.steps)?;
            }
            Mode::SmcQual => {
                check_open_unit("theta", self.theta)?;
                check_open_unit("epsilon", self.epsilon)?;
                check_open_unit("alpha", self.alpha)?;
                check_open_unit("beta", self.beta)?;
                check_positive("simulations", self.simulations)?;
                check_positive("steps", self.steps)?;
            }
            Mode::Reward => {
                check_positive("simulations", self.simulations)?;
                check_positive("max_iterations", self.max_iterations)?;
            }
            Mode::QLearning => self.q_learning().validate()?
        }
        Ok(())
    }

    fn targets(&self) -> Vec<&str> {
        self.target.as_deref()
            .map(|t| t.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// Result of one run.
#[derive(Debug, Clone)]
pub enum Report {
    Path(SimulationSnapshot),
    Probability { mode: Mode, target: String, value: f64 },
    Verdict { target: String, theta: f64, outcome: SprtOutcome },
    Reward { init: String, targets: Vec<String>, value: f64 },
    Policy(QTable)
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Path(snapshot) => {
                write!(f, "path: {}", snapshot.path.iter().join(" -> "))?;
                if let Some(action) = &snapshot.last_action {
                    write!(f, "\nlast action: {}", action)?;
                }
                Ok(())
            }
            Report::Probability { mode, target, value } => {
                write!(f, "{}: P(reach {}) = {}", mode, target, value)
            }
            Report::Verdict { target, theta, outcome } => {
                write!(f, "P(reach {}) >= {}: {}", target, theta, outcome)
            }
            Report::Reward { init, targets, value } => {
                write!(f, "expected reward from {} to {{{}}}: {}", init, targets.iter().join(", "), value)
            }
            Report::Policy(q) => {
                writeln!(f, "{:<16} {:<16} {:>12}", "state", "action", "q")?;
                for (s, a, v) in q.entries() {
                    writeln!(f, "{:<16} {:<16} {:>12.6}", s, a, v)?;
                }
                write!(f, "policy: {}", q.greedy_policy().iter().map(|(s, a)| format!("{}={}", s, a)).join(", "))
            }
        }
    }
}

pub fn load_model<P: AsRef<Path>>(path: P, seed: Option<u64>) -> Result<Model, DriverError> {
    let spec = read_model_json(path)?;
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy()
    };
    info!(states = spec.states.len(), seeded = seed.is_some(), "model loaded");
    Ok(ModelBuilder::from_spec(spec).generate(rng)?)
}

/// Runs the analysis selected by `config.mode` on `model`.
pub fn run(model: &mut Model, config: &RunConfig) -> Result<Report, DriverError> {
    config.validate()?;
    let mode = config.mode;
    if !mode.supports(model.model_type()) {
        return Err(DriverError::UnsupportedMode { mode, model: model.model_type() });
    }
    let target = config.target.clone().unwrap_or_default();
    info!(mode = %mode, "running");
    let report = match model {
        Model::MarkovChain(mc) => match mode {
            Mode::Simulate => {
                match &config.initial {
                    Some(s) => { mc.simulation_init_from(s)?; }
                    None => { mc.simulation_init(); }
                }
                mc.set_trace(true);
                for _ in 0..config.steps {
                    mc.simulation_step()?;
                }
                Report::Path(mc.snapshot())
            }
            Mode::Linear => Report::Probability {
                mode,
                value: mc.verify_property_linear_system(&target)?,
                target
            },
            Mode::Iterative => {
                let initial = config.initial.clone().unwrap_or_else(|| mc.states()[0].to_string());
                let value = mc.verify_property_iterative(&config.targets()[..], &initial, config.epsilon,
                                                         config.max_iterations)?;
                Report::Probability { mode, target, value }
            }
            Mode::SmcQuant => Report::Probability {
                mode,
                value: mc.verify_property_smc_quant(&target, config.epsilon, config.delta, config.steps)?,
                target
            },
            Mode::SmcQual => Report::Verdict {
                outcome: mc.verify_property_smc_qual(&target, config.theta, config.epsilon, config.alpha,
                                                     config.beta, config.simulations, config.steps)?,
                theta: config.theta,
                target
            },
            Mode::Reward => {
                let init = config.initial.clone().unwrap_or_else(|| mc.states()[0].to_string());
                let targets = config.targets();
                let value = mc.expected_reward_mc(&init, &targets[..], config.simulations, config.max_iterations)?;
                Report::Reward { init, targets: targets.iter().map(|t| t.to_string()).collect(), value }
            }
            Mode::QLearning | Mode::ValueIteration => unreachable!("rejected by Mode::supports")
        },
        Model::MarkovDecisionProcess(mdp) => match mode {
            Mode::Simulate => {
                match &config.initial {
                    Some(s) => { mdp.simulation_init_from(s)?; }
                    None => { mdp.simulation_init(); }
                }
                mdp.set_trace(true);
                for _ in 0..config.steps {
                    mdp.simulation_step_uniform()?;
                }
                Report::Path(mdp.snapshot())
            }
            Mode::Linear => Report::Probability {
                mode,
                value: mdp.verify_property_linear(&target)?,
                target
            },
            Mode::ValueIteration => Report::Probability {
                mode,
                value: mdp.verify_property_value_iteration(&target, config.epsilon, config.max_iterations)?,
                target
            },
            Mode::QLearning => Report::Policy(mdp.q_learning_with(&config.q_learning())?),
            _ => unreachable!("rejected by Mode::supports")
        }
    };
    Ok(report)
}

#[derive(Serialize)]
struct PathRow<'a> {
    step: usize,
    state: &'a str
}

#[derive(Serialize)]
struct QRow<'a> {
    state: &'a str,
    action: &'a str,
    q: f64
}

/// Writes a simulated path or a Q-table as CSV. Other reports have nothing
/// tabular to export and are skipped.
pub fn write_csv<P: AsRef<Path>>(report: &Report, path: P) -> Result<bool, DriverError> {
    match report {
        Report::Path(snapshot) => {
            let mut wtr = csv::Writer::from_path(path)?;
            for (step, state) in snapshot.path.iter().enumerate() {
                wtr.serialize(PathRow { step, state })?;
            }
            wtr.flush()?;
            Ok(true)
        }
        Report::Policy(q) => {
            let mut wtr = csv::Writer::from_path(path)?;
            for (state, action, q) in q.entries() {
                wtr.serialize(QRow { state, action, q })?;
            }
            wtr.flush()?;
            Ok(true)
        }
        _ => Ok(false)
    }
}

/// Graphviz rendering of the model graph.
pub fn dot(model: &Model) -> String {
    let g = match model {
        Model::MarkovChain(mc) => mc.generate_graph(),
        Model::MarkovDecisionProcess(mdp) => mdp.generate_graph()
    };
    format!("{}", Dot::new(&g))
}

pub fn write_dot<P: AsRef<Path>>(model: &Model, path: P) -> Result<(), DriverError> {
    let mut file = File::create(path)?;
    file.write_all(dot(model).as_bytes())?;
    Ok(())
}

//! Construction, simulation and verification of finite Markov chains and
//! Markov decision processes.
//!
//! Models are declared through [`ModelBuilder`] (or loaded with
//! [`read_model_json`]) and generated into a [`Model`]. A Markov chain
//! answers reachability questions exactly, iteratively and statistically;
//! an MDP answers maximal reachability by linear programming or value
//! iteration and can be explored with Q-learning.

pub mod driver;
pub mod logging;
pub mod model_checking;

pub use model_checking::builder::{read_model_json, ModelBuilder, ModelSpec};
pub use model_checking::error::ModelError;
pub use model_checking::markov_chain::MarkovChain;
pub use model_checking::mdp::MarkovDecisionProcess;
pub use model_checking::model::{ActionTransition, Model, ModelType, Transition, NO_ACTION};
pub use model_checking::q_learning::{QLearningConfig, QTable};
pub use model_checking::simulation::SimulationSnapshot;
pub use model_checking::smc::SprtOutcome;

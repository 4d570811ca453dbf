pub mod error;
pub mod helper_methods;
pub mod model;
pub mod simulation;
pub mod smc;
pub mod builder;
pub mod markov_chain;
pub mod mdp;
pub mod lp;
pub mod q_learning;

use std::error::Error;
use std::fmt;
use std::process;
use std::str::FromStr;

use clap::{clap_app, ArgMatches};
use probmc::driver::{self, Mode, RunConfig};
use probmc::logging;
use tracing::{error, info};

fn main() {
    let matches = clap_app!(probmc =>
        (version: "0.1")
        (author: "Thomas Robinson")
        (about: "Simulation and verification of Markov chains and Markov decision processes")
        (@arg MODEL: +required "Model file in JSON form, e.g.
            {
              \"states\": [\"S0\", \"S1\"],
              \"rewards\": {\"S1\": 1.0},
              \"actions\": [\"a\"],
              \"action_transitions\": [
                {\"from\": \"S0\", \"action\": \"a\", \"to\": \"S1\", \"weight\": 1},
                {\"from\": \"S1\", \"action\": \"a\", \"to\": \"S1\", \"weight\": 1}
              ]
            }
           ")
        (@arg MODE: -m --mode [MODE] default_value("simulate") "Analysis to run: \
           simulate, linear, iterative, smc-quant, smc-qual, reward, q-learning, value-iteration")
        (@arg TARGET: -t --target [STATE] "Target state; a comma separated list for iterative and reward")
        (@arg INITIAL: -i --initial [STATE] "Start state for simulate, iterative and reward; \
           defaults to the first declared state")
        (@arg STEPS: --steps [N] "Simulation length, or run length for statistical checks")
        (@arg EPSILON: --epsilon [EPSILON] "Convergence threshold or indifference half width")
        (@arg DELTA: --delta [DELTA] "Confidence parameter of the Chernoff bound")
        (@arg THETA: --theta [THETA] "Probability threshold of the sequential test")
        (@arg ALPHA: --alpha [ALPHA] "Type I error bound of the sequential test")
        (@arg BETA: --beta [BETA] "Type II error bound of the sequential test")
        (@arg MAXITER: --("max-iter") [N] "Iteration cap")
        (@arg SIMULATIONS: --simulations [N] "Simulation cap")
        (@arg GAMMA: --gamma [GAMMA] "Q-learning discount factor")
        (@arg EPISODES: --episodes [N] "Q-learning episodes")
        (@arg EPISODELENGTH: --("episode-length") [N] "Sampled steps per Q-learning episode")
        (@arg RESTART: --("restart-every") [N] "Q-learning episodes between restarts in the first state")
        (@arg SEED: --seed [SEED] "Seed for the random number generator")
        (@arg CSV: --csv [PATH] "Write the simulated path or the Q-table as CSV")
        (@arg DOT: --dot [PATH] "Write the model graph in Graphviz format")
        (@arg VERBOSE: -v ... "Level of verbosity, repeat for more")
    ).get_matches();

    logging::init(matches.occurrences_of("VERBOSE"));

    if let Err(e) = execute(&matches) {
        error!("{}", e);
        process::exit(1);
    }
}

fn execute(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let config = run_config(matches)?;
    let model_path = matches.value_of("MODEL").unwrap_or_default();
    let mut model = driver::load_model(model_path, config.seed)?;

    if let Some(path) = matches.value_of("DOT") {
        driver::write_dot(&model, path)?;
        info!(path, "graph written");
    }

    let report = driver::run(&mut model, &config)?;
    println!("{}", report);

    if let Some(path) = matches.value_of("CSV") {
        if driver::write_csv(&report, path)? {
            info!(path, "csv written");
        }
    }
    Ok(())
}

fn run_config(matches: &ArgMatches) -> Result<RunConfig, Box<dyn Error>> {
    let defaults = RunConfig::default();
    Ok(RunConfig {
        mode: Mode::from_str(matches.value_of("MODE").unwrap_or("simulate"))?,
        target: matches.value_of("TARGET").map(String::from),
        initial: matches.value_of("INITIAL").map(String::from),
        steps: parsed(matches, "STEPS", defaults.steps)?,
        epsilon: parsed(matches, "EPSILON", defaults.epsilon)?,
        delta: parsed(matches, "DELTA", defaults.delta)?,
        theta: parsed(matches, "THETA", defaults.theta)?,
        alpha: parsed(matches, "ALPHA", defaults.alpha)?,
        beta: parsed(matches, "BETA", defaults.beta)?,
        max_iterations: parsed(matches, "MAXITER", defaults.max_iterations)?,
        simulations: parsed(matches, "SIMULATIONS", defaults.simulations)?,
        gamma: parsed(matches, "GAMMA", defaults.gamma)?,
        episodes: parsed(matches, "EPISODES", defaults.episodes)?,
        episode_length: parsed(matches, "EPISODELENGTH", defaults.episode_length)?,
        restart_every: parsed(matches, "RESTART", defaults.restart_every)?,
        seed: match matches.value_of("SEED") {
            Some(s) => Some(s.parse()?),
            None => None
        }
    })
}

fn parsed<T>(matches: &ArgMatches, name: &str, default: T) -> Result<T, Box<dyn Error>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match matches.value_of(name) {
        Some(v) => v.parse::<T>().map_err(|e| Box::<dyn Error>::from(format!("--{}: {}", name.to_lowercase(), e))),
        None => Ok(default)
    }
}

//! Statistical model checking helpers.
//!
//! The engines run the simulations; this module only holds the arithmetic of
//! the Chernoff-Hoeffding sample size and of Wald's sequential probability
//! ratio test.

use std::fmt;

use super::error::{check_open_unit, ModelError};

/// Number of runs after which the empirical frequency is within `epsilon` of
/// the true probability with confidence at least `1 - delta`.
pub fn chernoff_sample_size(epsilon: f64, delta: f64) -> Result<usize, ModelError> {
    check_open_unit("epsilon", epsilon)?;
    check_open_unit("delta", delta)?;
    let n = ((2f64.ln() - delta.ln()) / (2.0 * epsilon * epsilon)).ceil();
    Ok(n as usize)
}

/// Verdict of the qualitative test.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SprtOutcome {
    /// The probability is at least theta.
    Accept,
    /// The probability is below theta.
    Reject,
    /// `max_simulations` ran out before either threshold was crossed.
    Inconclusive
}

impl SprtOutcome {
    pub fn as_i8(self) -> i8 {
        match self {
            SprtOutcome::Accept => 1,
            SprtOutcome::Reject => 0,
            SprtOutcome::Inconclusive => -1
        }
    }
}

impl fmt::Display for SprtOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SprtOutcome::Accept => "probability >= theta",
            SprtOutcome::Reject => "probability < theta",
            SprtOutcome::Inconclusive => "inconclusive"
        };
        write!(f, "{} ({})", self.as_i8(), text)
    }
}

/// Running state of Wald's test between `p >= theta + epsilon` and
/// `p <= theta - epsilon`, kept in log space.
#[derive(Debug, Clone)]
pub struct Sprt {
    log_success: f64,
    log_failure: f64,
    log_a: f64,
    log_b: f64,
    log_ratio: f64,
    runs: usize,
    successes: usize,
}

impl Sprt {
    pub fn new(theta: f64, epsilon: f64, alpha: f64, beta: f64) -> Result<Sprt, ModelError> {
        check_open_unit("alpha", alpha)?;
        check_open_unit("beta", beta)?;
        check_open_unit("epsilon", epsilon)?;
        let gamma1 = theta - epsilon;
        let gamma0 = theta + epsilon;
        check_open_unit("theta - epsilon", gamma1)?;
        check_open_unit("theta + epsilon", gamma0)?;
        Ok(Sprt {
            log_success: (gamma1 / gamma0).ln(),
            log_failure: ((1.0 - gamma1) / (1.0 - gamma0)).ln(),
            log_a: ((1.0 - beta) / alpha).ln(),
            log_b: (beta / (1.0 - alpha)).ln(),
            log_ratio: 0.0,
            runs: 0,
            successes: 0,
        })
    }

    /// Folds one run into the likelihood ratio and returns the verdict so far.
    ///
    /// The ratio weighs the low hypothesis `gamma1` against the high one
    /// `gamma0`: crossing `A` is evidence for a probability below theta,
    /// dropping under `B` for a probability at or above it.
    pub fn observe(&mut self, success: bool) -> Option<SprtOutcome> {
        self.runs += 1;
        if success {
            self.successes += 1;
            self.log_ratio += self.log_success;
        } else {
            self.log_ratio += self.log_failure;
        }
        if self.log_ratio >= self.log_a {
            Some(SprtOutcome::Reject)
        } else if self.log_ratio <= self.log_b {
            Some(SprtOutcome::Accept)
        } else {
            None
        }
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn successes(&self) -> usize {
        self.successes
    }

    pub fn log_ratio(&self) -> f64 {
        self.log_ratio
    }
}

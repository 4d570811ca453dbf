use minilp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem, Variable};
use ndarray::Array2;
use tracing::debug;

use super::error::ModelError;

const COEFFICIENT_TOLERANCE: f64 = 1e-15;

/// Least solution of the Bellman inequalities for maximal reachability:
///
/// minimise `sum y_s` subject to `y_s - sum_{s' != t} P(s,a,s') y_s' >= P(s,a,t)`
/// for every row `(s, a)` with `s != t`, and `0 <= y_s <= 1`.
///
/// `matrix` has one row per entry of `row_labels`. The returned vector is
/// indexed by state, with the target fixed at 1.
pub fn max_reachability(matrix: &Array2<f64>, row_labels: &[(usize, usize)], num_states: usize, target: usize)
    -> Result<Vec<f64>, ModelError> {
    let mut problem = Problem::new(OptimizationDirection::Minimize);
    let vars: Vec<Option<Variable>> = (0..num_states)
        .map(|s| if s == target { None } else { Some(problem.add_var(1.0, (0.0, 1.0))) })
        .collect();

    let mut constraints: usize = 0;
    for (r, (s, _)) in row_labels.iter().enumerate() {
        if *s == target {
            continue;
        }
        // coefficients are accumulated so a self loop folds into the diagonal
        let mut coefs: Vec<f64> = vec![0f64; num_states];
        coefs[*s] += 1.0;
        for (j, p) in matrix.row(r).iter().enumerate() {
            if j != target {
                coefs[j] -= *p;
            }
        }
        let rhs = matrix[[r, target]];
        let mut expr = LinearExpr::empty();
        let mut terms: usize = 0;
        for (j, c) in coefs.iter().enumerate() {
            if let Some(v) = vars[j] {
                if c.abs() > COEFFICIENT_TOLERANCE {
                    expr.add(v, *c);
                    terms += 1;
                }
            }
        }
        if terms == 0 {
            if rhs > COEFFICIENT_TOLERANCE {
                return Err(ModelError::LinearProgram {
                    reason: format!("row {} has no variables but requires {}", r, rhs)
                });
            }
            continue;
        }
        problem.add_constraint(expr, ComparisonOp::Ge, rhs);
        constraints += 1;
    }
    debug!(variables = num_states - 1, constraints, "reachability LP built");

    let solution = problem.solve().map_err(|e| ModelError::LinearProgram { reason: e.to_string() })?;
    Ok(vars.iter()
        .map(|v| match v {
            Some(v) => solution[*v],
            None => 1.0
        })
        .collect())
}

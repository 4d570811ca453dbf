use ndarray::{arr1, Array1, Array2};
use ordered_float::OrderedFloat;
use petgraph::{Graph, graph::NodeIndex};
use petgraph::algo::has_path_connecting;

use super::error::ModelError;

const PIVOT_TOLERANCE: f64 = 1e-12;

pub fn opt_absolute_diff_vect(a: &[f64], b: &[f64]) -> Array1<f64> {
    let c: Array1<f64> = arr1(b) - &arr1(a);
    c
}

/// Largest entrywise change between two successive iterates.
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    opt_absolute_diff_vect(a, b)
        .iter()
        .fold(0f64, |max, x| max.max(x.abs()))
}

/// Divides each weight by the total. Returns `None` when there is nothing to normalise.
pub fn normalise(weights: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = weights.iter().sum();
    if weights.is_empty() || total <= 0.0 {
        return None;
    }
    Some(weights.iter().map(|w| w / total).collect())
}

/// Solves `a x = b` by Gaussian elimination with partial pivoting.
pub fn solve_linear_system(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, ModelError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by_key(|r| OrderedFloat(a[[*r, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < PIVOT_TOLERANCE {
            return Err(ModelError::SingularSystem { column: col });
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
            }
            b.swap(pivot, col);
        }
        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                let delta = factor * a[[col, k]];
                a[[row, k]] -= delta;
            }
            let delta = factor * b[col];
            b[row] -= delta;
        }
    }
    let mut x: Array1<f64> = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[[row, k]] * x[k];
        }
        x[row] = sum / a[[row, row]];
    }
    Ok(x)
}

/// Builds the state graph; node `i` is state `i`, edges are labelled.
pub fn state_graph<I>(states: &[String], edges: I) -> Graph<String, String>
where
    I: IntoIterator<Item = (usize, usize, String)>,
{
    let mut g: Graph<String, String> = Graph::new();
    let nodes: Vec<NodeIndex> = states.iter().map(|s| g.add_node(s.to_string())).collect();
    for (from, to, label) in edges {
        g.add_edge(nodes[from], nodes[to], label);
    }
    g
}

/// For every node, whether `target` is reachable from it (a node reaches itself).
pub fn reaches_target(g: &Graph<String, String>, target: usize) -> Vec<bool> {
    let target = NodeIndex::new(target);
    g.node_indices()
        .map(|n| has_path_connecting(g, n, target, None))
        .collect()
}

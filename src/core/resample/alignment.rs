use faer::{Mat, MatRef};

use crate::core::base::utils::row_sq_distance;

///////////////
// Functions //
///////////////

/// Minimum-cost assignment between the rows and columns of a square cost
/// matrix (Hungarian algorithm with potentials, O(k^3))
///
/// ### Params
///
/// * `cost` - Square k x k cost matrix
///
/// ### Returns
///
/// Tuple of the assignment (`assignment[row] = column`) and the total cost.
pub fn min_cost_assignment(cost: MatRef<f64>) -> (Vec<usize>, f64) {
    let n = cost.nrows();
    assert_eq!(n, cost.ncols(), "cost matrix must be square");

    // 1-indexed potentials and matching in the classical formulation
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; n + 1];
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=n {
                if !used[j] {
                    let cur = cost[(i0 - 1, j - 1)] - u[i0] - v[j];
                    if cur < minv[j] {
                        minv[j] = cur;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; n];
    let mut total = 0.0;
    for j in 1..=n {
        if p[j] > 0 {
            assignment[p[j] - 1] = j - 1;
            total += cost[(p[j] - 1, j - 1)];
        }
    }

    (assignment, total)
}

/// Align the vertices of a candidate fit to a reference fit
///
/// Vertex order from independent fits is arbitrary; this solves the
/// bipartite matching minimising total squared distance and returns the
/// candidate vertices reordered to match the reference.
///
/// ### Params
///
/// * `reference` - k x d reference vertex matrix
/// * `candidate` - k x d candidate vertex matrix to reorder
///
/// ### Returns
///
/// Tuple of the reordered candidate matrix and the total squared distance
/// after alignment.
pub fn align_vertices(reference: MatRef<f64>, candidate: MatRef<f64>) -> (Mat<f64>, f64) {
    crate::assert_same_dims!(reference, candidate);
    let k = reference.nrows();

    let cost = Mat::from_fn(k, k, |i, j| row_sq_distance(reference, i, candidate, j));
    let (assignment, total) = min_cost_assignment(cost.as_ref());

    let aligned = Mat::from_fn(k, reference.ncols(), |i, j| {
        candidate[(assignment[i], j)]
    });

    (aligned, total)
}

///////////
// Tests //
///////////

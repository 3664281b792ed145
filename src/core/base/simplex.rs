use faer::{Mat, MatRef};
use rayon::prelude::*;

/////////////////
// Projections //
/////////////////

/// Euclidean projection onto the scaled probability simplex
///
/// Projects onto `{w : w >= 0, sum(w) = total}` via the sort-based algorithm
/// of Held/Condat. Ties in the sorted order resolve towards the smaller
/// index, making the projection fully deterministic.
///
/// ### Params
///
/// * `v` - The vector to project
/// * `total` - The target mass of the simplex (1.0 for the probability
///   simplex); must be positive
///
/// ### Returns
///
/// The projected vector.
pub fn project_to_simplex(v: &[f64], total: f64) -> Vec<f64> {
    let n = v.len();
    debug_assert!(total > 0.0);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_unstable_by(|&a, &b| {
        v[b].partial_cmp(&v[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut cumsum = 0.0;
    let mut tau = 0.0;
    for (rank, &idx) in order.iter().enumerate() {
        cumsum += v[idx];
        let candidate = (cumsum - total) / (rank + 1) as f64;
        if v[idx] - candidate > 0.0 {
            tau = candidate;
        }
    }

    v.iter().map(|&x| (x - tau).max(0.0)).collect()
}

/////////////////////////////
// Constrained least squares //
/////////////////////////////

/// Solve rows of `targets` as convex combinations of `basis` rows
///
/// Minimises `||t_i - w_i * basis||^2` subject to `w_i` lying on the
/// probability simplex, independently for every target row (parallelised
/// across rows). Uses projected gradient descent with a step size derived
/// from the trace of the Gram matrix, which guarantees monotone descent.
///
/// ### Params
///
/// * `targets` - q x m matrix of points to reconstruct
/// * `basis` - p x m matrix whose rows span the simplex
/// * `init` - Optional q x p warm start; uniform weights otherwise
/// * `max_iter` - Maximum inner gradient steps per row
/// * `tol` - Stop once the largest absolute weight change falls below this
///
/// ### Returns
///
/// The q x p row-stochastic weight matrix.
pub fn simplex_weights(
    targets: MatRef<f64>,
    basis: MatRef<f64>,
    init: Option<MatRef<f64>>,
    max_iter: usize,
    tol: f64,
) -> Mat<f64> {
    let q = targets.nrows();
    let p = basis.nrows();
    let m = basis.ncols();

    let gram = basis * basis.transpose();
    let mut trace = 0.0;
    for a in 0..p {
        trace += gram[(a, a)];
    }
    let step = 1.0 / (2.0 * trace).max(1e-12);

    let rows: Vec<Vec<f64>> = (0..q)
        .into_par_iter()
        .map(|i| {
            let mut w: Vec<f64> = match init {
                Some(w0) => (0..p).map(|a| w0[(i, a)]).collect(),
                None => vec![1.0 / p as f64; p],
            };

            // Linear term of the quadratic objective for this row
            let lin: Vec<f64> = (0..p)
                .map(|a| (0..m).map(|j| basis[(a, j)] * targets[(i, j)]).sum())
                .collect();

            let mut grad = vec![0.0; p];
            for _ in 0..max_iter {
                for a in 0..p {
                    let mut acc = 0.0;
                    for b in 0..p {
                        acc += w[b] * gram[(b, a)];
                    }
                    grad[a] = 2.0 * (acc - lin[a]);
                }

                let shifted: Vec<f64> =
                    (0..p).map(|a| w[a] - step * grad[a]).collect();
                let w_new = project_to_simplex(&shifted, 1.0);

                let mut delta: f64 = 0.0;
                for a in 0..p {
                    delta = delta.max((w_new[a] - w[a]).abs());
                }
                w = w_new;
                if delta < tol {
                    break;
                }
            }
            w
        })
        .collect();

    Mat::from_fn(q, p, |i, j| rows[i][j])
}

/// Distance of a point to the convex hull of a point set
///
/// Solves the simplex-constrained least squares problem for a single point
/// and returns the residual norm. Zero (up to solver tolerance) means the
/// point lies inside the hull.
///
/// ### Params
///
/// * `point` - The query point
/// * `points` - The point set spanning the hull (rows)
///
/// ### Returns
///
/// The Euclidean distance to the closest convex combination.
pub fn hull_distance(point: &[f64], points: MatRef<f64>) -> f64 {
    let m = point.len();
    let target = Mat::from_fn(1, m, |_, j| point[j]);
    let weights = simplex_weights(target.as_ref(), points, None, 500, 1e-10);

    let mut dist_sq = 0.0;
    for j in 0..m {
        let mut reconstructed = 0.0;
        for a in 0..points.nrows() {
            reconstructed += weights[(0, a)] * points[(a, j)];
        }
        let diff = point[j] - reconstructed;
        dist_sq += diff * diff;
    }
    dist_sq.sqrt()
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn test_simplex_projection_sums_to_total() {
        let proj = project_to_simplex(&[0.3, 0.9, -0.5], 1.0);
        let sum: f64 = proj.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(proj.iter().all(|&w| w >= 0.0));
    }

    #[test]
    fn test_simplex_projection_identity_on_feasible() {
        let feasible = [0.2, 0.3, 0.5];
        let proj = project_to_simplex(&feasible, 1.0);
        for (a, b) in feasible.iter().zip(proj.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_simplex_weights_recover_vertex() {
        // A target sitting exactly on a basis row gets all its weight there
        let basis = mat![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let target = mat![[1.0, 0.0]];
        let w = simplex_weights(target.as_ref(), basis.as_ref(), None, 500, 1e-12);
        assert!((w[(0, 1)] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hull_distance_inside_and_outside() {
        let square = mat![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let inside = hull_distance(&[0.5, 0.5], square.as_ref());
        assert!(inside < 1e-6);
        let outside = hull_distance(&[2.0, 0.5], square.as_ref());
        assert!((outside - 1.0).abs() < 1e-4);
    }
}

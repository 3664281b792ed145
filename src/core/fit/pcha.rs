use faer::{Mat, MatRef};
use log::debug;
use rand::prelude::*;
use serde::Serialize;

use crate::core::base::simplex::{project_to_simplex, simplex_weights};
use crate::core::base::utils::{row_sq_distance, squared_difference, total_sum_of_squares};
use crate::core::data::observations::ObservationMatrix;
use crate::errors::{ArchetypeError, ArchetypeResult};

//////////////////////////////
// ENUMS, TYPES, STRUCTURES //
//////////////////////////////

/// Enum for the archetype initialisation strategies
#[derive(Clone, Debug, PartialEq)]
pub enum InitStrategy {
    /// Deterministic furthest-sum heuristic started from a seeded random
    /// observation; spreads the initial archetypes across the cloud
    FurthestSum,
    /// k distinct observation indices drawn with the seeded RNG
    RandomObservations,
}

/// Structure to save the polytope fit parameters
///
/// ### Fields
///
/// * `relaxation` - Permitted deviation delta of the archetype mixing
///   coefficients from the exact convex hull; 0 keeps every archetype a
///   strict convex combination of observations
/// * `conv_tolerance` - Relative SSE decrease below which the fit counts as
///   converged
/// * `max_iterations` - Maximum number of alternating update rounds
/// * `init` - Initialisation strategy for the archetypes
/// * `weight_inner_iter` - Inner projected-gradient steps per weight update
#[derive(Clone, Debug)]
pub struct FitParams {
    pub relaxation: f64,
    pub conv_tolerance: f64,
    pub max_iterations: usize,
    pub init: InitStrategy,
    pub weight_inner_iter: usize,
}

impl Default for FitParams {
    fn default() -> Self {
        FitParams {
            relaxation: 0.0,
            conv_tolerance: 1e-6,
            max_iterations: 500,
            init: InitStrategy::FurthestSum,
            weight_inner_iter: 30,
        }
    }
}

impl FitParams {
    /// Validate the parameter combination
    pub fn validate(&self) -> ArchetypeResult<()> {
        if !(0.0..1.0).contains(&self.relaxation) {
            return Err(ArchetypeError::invalid_param(
                "relaxation",
                "must lie in [0, 1)",
            ));
        }
        if self.conv_tolerance <= 0.0 {
            return Err(ArchetypeError::invalid_param(
                "conv_tolerance",
                "must be positive",
            ));
        }
        if self.max_iterations == 0 {
            return Err(ArchetypeError::invalid_param(
                "max_iterations",
                "must be at least 1",
            ));
        }
        if self.weight_inner_iter == 0 {
            return Err(ArchetypeError::invalid_param(
                "weight_inner_iter",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// A fitted polytope
///
/// ### Fields
///
/// * `vertices` - k x d matrix of archetype coordinates
/// * `weights` - n x k row-stochastic matrix expressing every observation as
///   a convex combination of the archetypes
#[derive(Clone, Debug)]
pub struct Polytope {
    pub vertices: Mat<f64>,
    pub weights: Mat<f64>,
}

/// Result of a single polytope fit
///
/// ### Fields
///
/// * `polytope` - The fitted archetypes and observation weights
/// * `variance_explained` - `1 - SSE / TSS` with the TSS taken about the
///   column means
/// * `sse` - Final sum of squared reconstruction errors
/// * `iterations` - Number of alternating rounds that ran
/// * `converged` - Whether the relative SSE decrease fell below the
///   tolerance; a `false` here is a soft failure, the result stays usable
/// * `seed` - The seed that produced this fit
#[derive(Clone, Debug)]
pub struct FitResult {
    pub polytope: Polytope,
    pub variance_explained: f64,
    pub sse: f64,
    pub iterations: usize,
    pub converged: bool,
    pub seed: u64,
}

/// Scalar diagnostics of a fit, detached from the matrices for flat-file
/// reporting
#[derive(Clone, Debug, Serialize)]
pub struct FitDiagnostics {
    pub n_archetypes: usize,
    pub variance_explained: f64,
    pub sse: f64,
    pub iterations: usize,
    pub converged: bool,
    pub seed: u64,
}

impl FitResult {
    pub fn diagnostics(&self) -> FitDiagnostics {
        FitDiagnostics {
            n_archetypes: self.polytope.vertices.nrows(),
            variance_explained: self.variance_explained,
            sse: self.sse,
            iterations: self.iterations,
            converged: self.converged,
            seed: self.seed,
        }
    }
}

////////////////////
// Initialisation //
////////////////////

/// Furthest-sum selection of k observation indices
///
/// Starts from a seeded random observation, then greedily adds the
/// observation with the largest summed distance to the already chosen set.
/// The randomly chosen starting point is dropped and re-selected at the end,
/// which removes most of the dependence on the initial draw.
fn furthest_sum_indices(data: MatRef<f64>, k: usize, rng: &mut StdRng) -> Vec<usize> {
    let n = data.nrows();
    let start = rng.random_range(0..n);

    let mut chosen = vec![start];
    while chosen.len() < k {
        let next = furthest_from(data, &chosen, &chosen);
        chosen.push(next);
    }

    if k > 1 {
        chosen.remove(0);
        let replacement = furthest_from(data, &chosen, &chosen);
        chosen.push(replacement);
    }

    chosen
}

/// Index with the largest summed distance to `reference`, excluding `taken`
fn furthest_from(data: MatRef<f64>, reference: &[usize], taken: &[usize]) -> usize {
    let n = data.nrows();
    let mut best_idx = 0;
    let mut best_sum = f64::NEG_INFINITY;
    for j in 0..n {
        if taken.contains(&j) {
            continue;
        }
        let sum: f64 = reference
            .iter()
            .map(|&s| row_sq_distance(data, j, data, s).sqrt())
            .sum();
        if sum > best_sum {
            best_sum = sum;
            best_idx = j;
        }
    }
    best_idx
}

/////////
// Fit //
/////////

/// Fit k archetypes to an observation matrix
///
/// Principal convex hull analysis via alternating projected gradients: the
/// observation weights solve a simplex-constrained least squares problem for
/// fixed archetypes, and the archetypes are convex (or, under relaxation,
/// near-convex) combinations of observations updated with an adaptive step
/// size that grows on improvement and halves on overshoot.
///
/// ### Params
///
/// * `observations` - The n x d observation matrix
/// * `n_archetypes` - Number of polytope vertices k to fit
/// * `params` - Fit parameters, see `FitParams`
/// * `seed` - Seed for the initialisation; the optimisation itself is
///   deterministic
///
/// ### Returns
///
/// The `FitResult`. Hitting the iteration cap is reported through the
/// `converged` flag rather than an error; degenerate inputs (too few
/// observations or distinct points for the requested k) fail fast.
pub fn fit(
    observations: &ObservationMatrix,
    n_archetypes: usize,
    params: &FitParams,
    seed: u64,
) -> ArchetypeResult<FitResult> {
    params.validate()?;

    let x = observations.data();
    let n = x.nrows();
    let d = x.ncols();
    let k = n_archetypes;

    if k == 0 {
        return Err(ArchetypeError::invalid_param(
            "n_archetypes",
            "must be at least 1",
        ));
    }
    if n < d + 1 {
        return Err(ArchetypeError::degenerate(
            n,
            d,
            k,
            "need at least d + 1 observations",
        ));
    }
    if k > n || k > observations.n_distinct_rows() {
        return Err(ArchetypeError::degenerate(
            n,
            d,
            k,
            "more archetypes requested than distinct observations",
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let chosen = match params.init {
        InitStrategy::FurthestSum => furthest_sum_indices(x, k, &mut rng),
        InitStrategy::RandomObservations => {
            rand::seq::index::sample(&mut rng, n, k).into_vec()
        }
    };

    // Archetypes as mixtures of observations: columns of the n x k mixing
    // matrix start as indicators of the chosen observations
    let mut mix: Mat<f64> = Mat::zeros(n, k);
    for (j, &obs_idx) in chosen.iter().enumerate() {
        mix[(obs_idx, j)] = 1.0;
    }
    let mut vertices = mix.transpose() * x;

    let mut weights = simplex_weights(x, vertices.as_ref(), None, params.weight_inner_iter, 1e-9);
    let mut sse = squared_difference(x, (&weights * &vertices).as_ref());

    let tss = total_sum_of_squares(x);
    let delta = params.relaxation;
    let mut mu_mix = 1.0;

    let mut iterations = 0;
    let mut converged = false;

    for iter in 1..=params.max_iterations {
        iterations = iter;
        let sse_prev = sse;

        // Vertex step: projected gradient on the mixing matrix with
        // adaptive step size
        let residual = &weights * &vertices - x;
        let grad_mix = x * (residual.transpose() * &weights);

        let mut attempts = 0;
        loop {
            let mut candidate: Mat<f64> = Mat::zeros(n, k);
            for j in 0..k {
                let col: Vec<f64> = (0..n)
                    .map(|i| mix[(i, j)] - 2.0 * mu_mix * grad_mix[(i, j)])
                    .collect();
                let positive_mass: f64 = col.iter().filter(|&&v| v > 0.0).sum();
                let total = positive_mass.clamp(1.0 - delta, 1.0 + delta);
                let projected = project_to_simplex(&col, total);
                for i in 0..n {
                    candidate[(i, j)] = projected[i];
                }
            }
            let vertices_cand = candidate.transpose() * x;
            let sse_cand = squared_difference(x, (&weights * &vertices_cand).as_ref());

            if sse_cand <= sse_prev || attempts >= 24 {
                if sse_cand <= sse_prev {
                    mix = candidate;
                    vertices = vertices_cand;
                    sse = sse_cand;
                    mu_mix *= 1.2;
                }
                break;
            }
            mu_mix /= 2.0;
            attempts += 1;
        }

        // Weight step: warm-started simplex-constrained least squares
        weights = simplex_weights(
            x,
            vertices.as_ref(),
            Some(weights.as_ref()),
            params.weight_inner_iter,
            1e-9,
        );
        sse = squared_difference(x, (&weights * &vertices).as_ref());

        let rel_decrease = (sse_prev - sse) / sse_prev.max(f64::EPSILON);
        debug!(
            "pcha iteration {}: sse = {:.6e}, relative decrease = {:.3e}",
            iter, sse, rel_decrease
        );

        if rel_decrease.abs() < params.conv_tolerance {
            converged = true;
            break;
        }
    }

    let variance_explained = if tss > 0.0 { 1.0 - sse / tss } else { 1.0 };

    Ok(FitResult {
        polytope: Polytope { vertices, weights },
        variance_explained,
        sse,
        iterations,
        converged,
        seed,
    })
}

///////////
// Tests //
///////////

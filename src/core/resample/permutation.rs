use faer::Mat;
use log::{info, warn};
use rand::prelude::*;
use rayon::prelude::*;
use serde::Serialize;

use crate::core::base::geometry::{VolumeEstimator, MAX_EXACT_HULL_DIM};
use crate::core::base::stats::empirical_pval_upper;
use crate::core::data::observations::ObservationMatrix;
use crate::core::fit::pcha::{fit, FitParams, FitResult};
use crate::core::fit::quality::{shape_quality, t_ratio_dimension};
use crate::core::resample::{CancelToken, ResampleOutcome};
use crate::errors::{ArchetypeError, ArchetypeResult};
use crate::utils::general::derive_seed;

////////////
// Params //
////////////

/// Parameters of the permutation significance test
///
/// ### Fields
///
/// * `n_permutations` - Number of column-permuted refits
/// * `fit` - Fit parameters applied to every permuted refit
/// * `volume` - Hull volume strategy for the t-ratio; the exact path bounds
///   the feasible subspace dimension
#[derive(Clone, Debug)]
pub struct PermutationParams {
    pub n_permutations: usize,
    pub fit: FitParams,
    pub volume: VolumeEstimator,
}

impl Default for PermutationParams {
    fn default() -> Self {
        PermutationParams {
            n_permutations: 100,
            fit: FitParams::default(),
            volume: VolumeEstimator::Exact,
        }
    }
}

////////////////////
// Result structs //
////////////////////

/// Null distribution of the t-ratio under independent column permutations
///
/// ### Fields
///
/// * `observed_t_ratio` - The t-ratio of the observed fit
/// * `null_t_ratios` - One t-ratio per converged permuted refit
/// * `p_value` - Smoothed empirical p-value,
///   `(#{null >= observed} + 1) / (n + 1)`
/// * `n_excluded` - Permutations dropped for non-convergence
/// * `n_skipped` - Permutations never run because the batch was cancelled
#[derive(Clone, Debug, Serialize)]
pub struct NullDistribution {
    pub observed_t_ratio: f64,
    pub null_t_ratios: Vec<f64>,
    pub p_value: f64,
    pub n_excluded: usize,
    pub n_skipped: usize,
}

///////////////
// Functions //
///////////////

/// Permutation significance test for a fitted polytope
///
/// The null model permutes the values within every feature column
/// independently, which destroys the between-feature correlation driving the
/// polytope shape while preserving each feature's marginal distribution. A
/// k-archetype polytope is refitted on every permuted matrix and its t-ratio
/// recorded; the observed t-ratio is then ranked inside this null sample.
///
/// ### Params
///
/// * `observations` - The observation matrix the fit was produced on
/// * `observed_fit` - The fit whose shape is being tested
/// * `params` - Permutation parameters, see `PermutationParams`
/// * `seed` - Master seed; every permutation derives its own stream
/// * `cancel` - Optional cooperative cancellation handle
///
/// ### Returns
///
/// The `NullDistribution`. Fails fast with `DimensionalityTooHigh` when the
/// t-ratio would need an exact hull volume beyond the supported dimension
/// and no Monte Carlo estimator was supplied.
pub fn permutation_test(
    observations: &ObservationMatrix,
    observed_fit: &FitResult,
    params: &PermutationParams,
    seed: u64,
    cancel: Option<&CancelToken>,
) -> ArchetypeResult<NullDistribution> {
    params.fit.validate()?;
    if params.n_permutations == 0 {
        return Err(ArchetypeError::invalid_param(
            "n_permutations",
            "must be at least 1",
        ));
    }

    let k = observed_fit.polytope.vertices.nrows();
    let dim = t_ratio_dimension(k, observations.ncols());
    if dim > MAX_EXACT_HULL_DIM && params.volume == VolumeEstimator::Exact {
        return Err(ArchetypeError::DimensionalityTooHigh {
            dim,
            max_dim: MAX_EXACT_HULL_DIM,
        });
    }

    let observed_t_ratio = shape_quality(observed_fit, observations, &params.volume)?.t_ratio;

    let outcomes: Vec<ResampleOutcome<f64>> = (1..=params.n_permutations)
        .into_par_iter()
        .map(|iter| {
            if cancel.map(|c| c.is_cancelled()).unwrap_or(false) {
                return ResampleOutcome::Skipped;
            }

            let iter_seed = derive_seed(seed, iter as u64);
            let permuted = match permute_columns(observations, iter_seed) {
                Ok(permuted) => permuted,
                Err(e) => {
                    warn!("permutation {} failed to build ({}), excluding", iter, e);
                    return ResampleOutcome::Excluded;
                }
            };

            let null_fit = match fit(&permuted, k, &params.fit, iter_seed) {
                Ok(fit_result) if fit_result.converged => fit_result,
                Ok(_) => {
                    warn!("permutation {} did not converge, excluding", iter);
                    return ResampleOutcome::Excluded;
                }
                Err(e) => {
                    warn!("permutation {} failed to fit ({}), excluding", iter, e);
                    return ResampleOutcome::Excluded;
                }
            };

            match shape_quality(&null_fit, &permuted, &params.volume) {
                Ok(quality) => ResampleOutcome::Done(quality.t_ratio),
                Err(e) => {
                    warn!("permutation {} volume failed ({}), excluding", iter, e);
                    ResampleOutcome::Excluded
                }
            }
        })
        .collect();

    let mut null_t_ratios = Vec::new();
    let mut n_excluded = 0;
    let mut n_skipped = 0;
    for outcome in outcomes {
        match outcome {
            ResampleOutcome::Done(t) => null_t_ratios.push(t),
            ResampleOutcome::Excluded => n_excluded += 1,
            ResampleOutcome::Skipped => n_skipped += 1,
        }
    }

    let p_value = empirical_pval_upper(observed_t_ratio, &null_t_ratios);

    info!(
        "permutation test: observed t-ratio {:.4}, p = {:.4} over {} null fits ({} excluded)",
        observed_t_ratio,
        p_value,
        null_t_ratios.len(),
        n_excluded
    );

    Ok(NullDistribution {
        observed_t_ratio,
        null_t_ratios,
        p_value,
        n_excluded,
        n_skipped,
    })
}

/// Independently permute the values within each feature column
fn permute_columns(observations: &ObservationMatrix, seed: u64) -> ArchetypeResult<ObservationMatrix> {
    let n = observations.nrows();
    let d = observations.ncols();
    let data = observations.data();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut permuted: Mat<f64> = Mat::zeros(n, d);
    for j in 0..d {
        let mut col: Vec<f64> = (0..n).map(|i| data[(i, j)]).collect();
        col.shuffle(&mut rng);
        for (i, v) in col.into_iter().enumerate() {
            permuted[(i, j)] = v;
        }
    }

    ObservationMatrix::new(permuted, None)
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;

    fn correlated_cloud() -> ObservationMatrix {
        // Two features tracing a triangle: strong correlation structure
        let vertices = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];
        let mut rng = StdRng::seed_from_u64(17);
        let rows: Vec<Vec<f64>> = (0..100)
            .map(|_| {
                let a: f64 = rng.random::<f64>();
                let b: f64 = rng.random::<f64>() * (1.0 - a);
                let c = 1.0 - a - b;
                vec![
                    a * vertices[0][0] + b * vertices[1][0] + c * vertices[2][0],
                    a * vertices[0][1] + b * vertices[1][1] + c * vertices[2][1],
                ]
            })
            .collect();
        ObservationMatrix::from_rows(&rows).unwrap()
    }

    #[test]
    fn test_permutation_preserves_marginals() {
        let obs = correlated_cloud();
        let permuted = permute_columns(&obs, 5).unwrap();
        for j in 0..obs.ncols() {
            let mut original: Vec<f64> = (0..obs.nrows()).map(|i| obs.data()[(i, j)]).collect();
            let mut shuffled: Vec<f64> =
                (0..obs.nrows()).map(|i| permuted.data()[(i, j)]).collect();
            original.sort_by(|a, b| a.partial_cmp(b).unwrap());
            shuffled.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(original, shuffled);
        }
    }

    #[test]
    fn test_permutation_test_runs_and_smooths() {
        let obs = correlated_cloud();
        let observed = fit(&obs, 3, &FitParams::default(), 21).unwrap();
        let params = PermutationParams {
            n_permutations: 19,
            ..PermutationParams::default()
        };
        let null = permutation_test(&obs, &observed, &params, 77, None).unwrap();
        assert!(null.p_value > 0.0 && null.p_value <= 1.0);
        assert_eq!(
            null.null_t_ratios.len() + null.n_excluded,
            19
        );
    }

    #[test]
    fn test_dimensionality_guard() {
        // Six archetypes in five dimensions need a 5D hull volume
        let mut rng = StdRng::seed_from_u64(2);
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|_| (0..5).map(|_| rng.random::<f64>()).collect())
            .collect();
        let obs = ObservationMatrix::from_rows(&rows).unwrap();
        let observed = fit(&obs, 6, &FitParams::default(), 3).unwrap();
        let res = permutation_test(
            &obs,
            &observed,
            &PermutationParams::default(),
            1,
            None,
        );
        assert!(matches!(
            res,
            Err(ArchetypeError::DimensionalityTooHigh { .. })
        ));
    }

    #[test]
    fn test_permutation_deterministic() {
        let obs = correlated_cloud();
        let observed = fit(&obs, 2, &FitParams::default(), 21).unwrap();
        let params = PermutationParams {
            n_permutations: 7,
            ..PermutationParams::default()
        };
        let a = permutation_test(&obs, &observed, &params, 5, None).unwrap();
        let b = permutation_test(&obs, &observed, &params, 5, None).unwrap();
        assert_eq!(a.null_t_ratios, b.null_t_ratios);
        assert_eq!(a.p_value, b.p_value);
    }
}

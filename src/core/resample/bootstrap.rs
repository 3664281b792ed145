use faer::Mat;
use log::{info, warn};
use rand::prelude::*;
use rayon::prelude::*;

use crate::core::data::observations::ObservationMatrix;
use crate::core::fit::pcha::{fit, FitParams, FitResult};
use crate::core::resample::alignment::align_vertices;
use crate::core::resample::{CancelToken, ResampleOutcome};
use crate::errors::{ArchetypeError, ArchetypeResult};
use crate::utils::general::derive_seed;

////////////
// Params //
////////////

/// Parameters of the stability bootstrap
///
/// ### Fields
///
/// * `bootstrap_count` - Number of subsample-and-refit iterations
/// * `sample_fraction` - Fraction of observations per subsample, drawn
///   without replacement
/// * `fit` - Fit parameters applied to the reference fit and every resample
#[derive(Clone, Debug)]
pub struct BootstrapParams {
    pub bootstrap_count: usize,
    pub sample_fraction: f64,
    pub fit: FitParams,
}

impl Default for BootstrapParams {
    fn default() -> Self {
        BootstrapParams {
            bootstrap_count: 50,
            sample_fraction: 0.8,
            fit: FitParams::default(),
        }
    }
}

impl BootstrapParams {
    /// Validate the parameter combination
    pub fn validate(&self) -> ArchetypeResult<()> {
        self.fit.validate()?;
        if self.bootstrap_count == 0 {
            return Err(ArchetypeError::invalid_param(
                "bootstrap_count",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.sample_fraction) || self.sample_fraction == 0.0 {
            return Err(ArchetypeError::invalid_param(
                "sample_fraction",
                "must lie in (0, 1]",
            ));
        }
        Ok(())
    }
}

////////////////////
// Result structs //
////////////////////

/// Result of a stability bootstrap batch
///
/// ### Fields
///
/// * `reference` - The full-data fit every resample was aligned to
/// * `fits` - The converged resample fits, in iteration order, with their
///   vertices in whatever order the optimiser returned them
/// * `aligned_vertices` - Per converged resample, the k x d vertex matrix
///   reordered to match the reference
/// * `alignment_costs` - Total squared vertex distance to the reference per
///   converged resample
/// * `vertex_variance` - Per vertex, the variance of its aligned position
///   across resamples (mean squared distance to the mean position); empty if
///   no resample converged
/// * `n_excluded` - Resamples dropped for non-convergence or degenerate
///   subsamples
/// * `n_skipped` - Resamples never run because the batch was cancelled
#[derive(Clone, Debug)]
pub struct BootstrapResult {
    pub reference: FitResult,
    pub fits: Vec<FitResult>,
    pub aligned_vertices: Vec<Mat<f64>>,
    pub alignment_costs: Vec<f64>,
    pub vertex_variance: Vec<f64>,
    pub n_excluded: usize,
    pub n_skipped: usize,
}

///////////////
// Functions //
///////////////

/// Run a stability bootstrap for a fixed archetype count
///
/// Fits the full data once as a reference, then refits `bootstrap_count`
/// subsamples in parallel. Every converged resample is aligned to the
/// reference by minimum-cost vertex matching before the positional variance
/// is aggregated. Non-converged resamples are excluded and counted, never
/// fatal; a fired `CancelToken` skips the iterations that have not started.
///
/// ### Params
///
/// * `observations` - The full observation matrix
/// * `n_archetypes` - Number of archetypes k per fit
/// * `params` - Bootstrap parameters, see `BootstrapParams`
/// * `seed` - Master seed; every iteration derives its own stream
/// * `cancel` - Optional cooperative cancellation handle
///
/// ### Returns
///
/// The `BootstrapResult`.
pub fn bootstrap_fits(
    observations: &ObservationMatrix,
    n_archetypes: usize,
    params: &BootstrapParams,
    seed: u64,
    cancel: Option<&CancelToken>,
) -> ArchetypeResult<BootstrapResult> {
    params.validate()?;

    let n = observations.nrows();
    let d = observations.ncols();
    let sample_size = (n as f64 * params.sample_fraction).round() as usize;

    if sample_size < d + 1 || sample_size < n_archetypes {
        return Err(ArchetypeError::invalid_param(
            "sample_fraction",
            "subsample too small for the requested fit",
        ));
    }

    let reference = fit(observations, n_archetypes, &params.fit, derive_seed(seed, 0))?;

    let outcomes: Vec<ResampleOutcome<FitResult>> = (1..=params.bootstrap_count)
        .into_par_iter()
        .map(|iter| {
            if cancel.map(|c| c.is_cancelled()).unwrap_or(false) {
                return ResampleOutcome::Skipped;
            }

            let iter_seed = derive_seed(seed, iter as u64);
            let mut rng = StdRng::seed_from_u64(iter_seed);
            let indices = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
            let subsample = observations.subset_rows(&indices);

            match fit(&subsample, n_archetypes, &params.fit, iter_seed) {
                Ok(fit_result) if fit_result.converged => ResampleOutcome::Done(fit_result),
                Ok(_) => {
                    warn!("bootstrap iteration {} did not converge, excluding", iter);
                    ResampleOutcome::Excluded
                }
                Err(e) => {
                    warn!("bootstrap iteration {} failed ({}), excluding", iter, e);
                    ResampleOutcome::Excluded
                }
            }
        })
        .collect();

    let mut fits = Vec::new();
    let mut aligned_vertices = Vec::new();
    let mut alignment_costs = Vec::new();
    let mut n_excluded = 0;
    let mut n_skipped = 0;

    for outcome in outcomes {
        match outcome {
            ResampleOutcome::Done(fit_result) => {
                let (aligned, cost) = align_vertices(
                    reference.polytope.vertices.as_ref(),
                    fit_result.polytope.vertices.as_ref(),
                );
                aligned_vertices.push(aligned);
                alignment_costs.push(cost);
                fits.push(fit_result);
            }
            ResampleOutcome::Excluded => n_excluded += 1,
            ResampleOutcome::Skipped => n_skipped += 1,
        }
    }

    info!(
        "bootstrap for k = {}: {} aligned, {} excluded, {} skipped",
        n_archetypes,
        aligned_vertices.len(),
        n_excluded,
        n_skipped
    );

    let vertex_variance = vertex_position_variance(&aligned_vertices, n_archetypes, d);

    Ok(BootstrapResult {
        reference,
        fits,
        aligned_vertices,
        alignment_costs,
        vertex_variance,
        n_excluded,
        n_skipped,
    })
}

/// Per-vertex positional variance across aligned vertex matrices
fn vertex_position_variance(aligned: &[Mat<f64>], k: usize, d: usize) -> Vec<f64> {
    if aligned.is_empty() {
        return Vec::new();
    }

    let n_fits = aligned.len() as f64;
    (0..k)
        .map(|v| {
            let mut mean = vec![0.0; d];
            for mat in aligned {
                for (j, m) in mean.iter_mut().enumerate() {
                    *m += mat[(v, j)] / n_fits;
                }
            }
            let mut var = 0.0;
            for mat in aligned {
                for (j, m) in mean.iter().enumerate() {
                    let diff = mat[(v, j)] - m;
                    var += diff * diff;
                }
            }
            var / n_fits
        })
        .collect()
}

///////////
// Tests //
///////////

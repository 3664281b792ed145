use log::info;
use serde::Serialize;
use std::ops::RangeInclusive;

use crate::core::base::geometry::VolumeEstimator;
use crate::core::data::observations::ObservationMatrix;
use crate::core::fit::pcha::FitParams;
use crate::core::fit::quality::shape_quality;
use crate::core::resample::bootstrap::{bootstrap_fits, BootstrapParams};
use crate::core::resample::CancelToken;
use crate::errors::{ArchetypeError, ArchetypeResult};
use crate::utils::general::{array_mean, derive_seed};

////////////
// Params //
////////////

/// Parameters of the model selection sweep
///
/// ### Fields
///
/// * `bootstrap_count` - Stability resamples per archetype count
/// * `sample_fraction` - Subsample fraction per resample
/// * `fit` - Fit parameters shared by all fits in the sweep
/// * `volume` - Hull volume strategy for the per-k t-ratio; archetype counts
///   whose subspace exceeds the exact cap simply report no t-ratio
#[derive(Clone, Debug)]
pub struct SelectionParams {
    pub bootstrap_count: usize,
    pub sample_fraction: f64,
    pub fit: FitParams,
    pub volume: VolumeEstimator,
}

impl Default for SelectionParams {
    fn default() -> Self {
        SelectionParams {
            bootstrap_count: 20,
            sample_fraction: 0.8,
            fit: FitParams::default(),
            volume: VolumeEstimator::Exact,
        }
    }
}

////////////////////
// Result structs //
////////////////////

/// Per-k summary of the model selection sweep
///
/// ### Fields
///
/// * `k` - Archetype count of this row
/// * `variance_explained` - Variance explained of the full-data fit
/// * `marginal_variance_explained` - Gain over the previous k in the sweep;
///   absent for the first row
/// * `mean_variance_explained` - Mean variance explained across the
///   converged resamples; absent if none converged
/// * `t_ratio` - t-ratio of the full-data fit; absent where the hull volume
///   was refused as too expensive
/// * `mean_vertex_variance` - Mean aligned vertex-position variance across
///   resamples; absent if no resample converged
/// * `n_excluded` - Resamples excluded for this k
#[derive(Clone, Debug, Serialize)]
pub struct ModelSelectionRow {
    pub k: usize,
    pub variance_explained: f64,
    pub marginal_variance_explained: Option<f64>,
    pub mean_variance_explained: Option<f64>,
    pub t_ratio: Option<f64>,
    pub mean_vertex_variance: Option<f64>,
    pub n_excluded: usize,
}

/// Report of a model selection sweep over a range of archetype counts
///
/// The selection heuristic itself is left to the caller: prefer the smallest
/// k where the marginal variance explained drops sharply while the vertex
/// variance stays low.
#[derive(Clone, Debug, Serialize)]
pub struct ModelSelectionReport {
    pub rows: Vec<ModelSelectionRow>,
}

///////////////
// Functions //
///////////////

/// Sweep a range of archetype counts and report fit and stability metrics
///
/// For every k the observations are fitted once in full (variance explained
/// and t-ratio trend) and `bootstrap_count` times on subsamples (vertex
/// stability), with all resampled fits aligned to the full-data reference
/// before aggregation.
///
/// ### Params
///
/// * `observations` - The observation matrix
/// * `k_range` - Inclusive range of archetype counts to sweep
/// * `params` - Sweep parameters, see `SelectionParams`
/// * `seed` - Master seed; each k derives its own stream
/// * `cancel` - Optional cooperative cancellation handle shared across the
///   sweep
///
/// ### Returns
///
/// The `ModelSelectionReport` with one row per k.
pub fn select(
    observations: &ObservationMatrix,
    k_range: RangeInclusive<usize>,
    params: &SelectionParams,
    seed: u64,
    cancel: Option<&CancelToken>,
) -> ArchetypeResult<ModelSelectionReport> {
    let k_min = *k_range.start();
    let k_max = *k_range.end();

    if k_min == 0 || k_min > k_max {
        return Err(ArchetypeError::invalid_param(
            "k_range",
            "must be a non-empty range starting at 1 or above",
        ));
    }
    let n_distinct = observations.n_distinct_rows();
    if k_max > n_distinct {
        return Err(ArchetypeError::degenerate(
            observations.nrows(),
            observations.ncols(),
            k_max,
            "largest k exceeds the number of distinct observations",
        ));
    }

    let bootstrap_params = BootstrapParams {
        bootstrap_count: params.bootstrap_count,
        sample_fraction: params.sample_fraction,
        fit: params.fit.clone(),
    };

    let mut rows = Vec::with_capacity(k_max - k_min + 1);
    for k in k_range {
        let batch = bootstrap_fits(
            observations,
            k,
            &bootstrap_params,
            derive_seed(seed, k as u64),
            cancel,
        )?;

        let t_ratio = match shape_quality(&batch.reference, observations, &params.volume) {
            Ok(quality) => Some(quality.t_ratio),
            Err(ArchetypeError::VolumeComputationTooExpensive { .. })
            | Err(ArchetypeError::DimensionalityTooHigh { .. }) => None,
            Err(e) => return Err(e),
        };

        let mean_vertex_variance = if batch.vertex_variance.is_empty() {
            None
        } else {
            Some(array_mean(&batch.vertex_variance))
        };

        let mean_variance_explained = if batch.fits.is_empty() {
            None
        } else {
            let resample_ve: Vec<f64> =
                batch.fits.iter().map(|f| f.variance_explained).collect();
            Some(array_mean(&resample_ve))
        };

        info!(
            "model selection k = {}: variance explained {:.4}, t-ratio {:?}",
            k, batch.reference.variance_explained, t_ratio
        );

        rows.push(ModelSelectionRow {
            k,
            variance_explained: batch.reference.variance_explained,
            marginal_variance_explained: None,
            mean_variance_explained,
            t_ratio,
            mean_vertex_variance,
            n_excluded: batch.n_excluded,
        });
    }

    for i in 1..rows.len() {
        rows[i].marginal_variance_explained =
            Some(rows[i].variance_explained - rows[i - 1].variance_explained);
    }

    Ok(ModelSelectionReport { rows })
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn triangle_cloud() -> ObservationMatrix {
        let vertices = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];
        let mut rng = StdRng::seed_from_u64(23);
        let rows: Vec<Vec<f64>> = (0..150)
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
    fn test_selection_elbow_at_three() {
        let obs = triangle_cloud();
        let params = SelectionParams {
            bootstrap_count: 5,
            ..SelectionParams::default()
        };
        let report = select(&obs, 1..=4, &params, 13, None).unwrap();
        assert_eq!(report.rows.len(), 4);
        assert!(report.rows[0].marginal_variance_explained.is_none());

        // Variance explained climbs steeply until k = 3, then flattens
        let marginal_to_three = report.rows[2].marginal_variance_explained.unwrap();
        let marginal_to_four = report.rows[3].marginal_variance_explained.unwrap();
        assert!(marginal_to_three > marginal_to_four);
        assert!(report.rows[2].variance_explained > 0.9);
        // Subsample fits track the full-data fit on clean data
        assert!(report.rows[2].mean_variance_explained.unwrap() > 0.9);
    }

    #[test]
    fn test_selection_rejects_empty_range() {
        let obs = triangle_cloud();
        assert!(matches!(
            select(&obs, 3..=2, &SelectionParams::default(), 1, None),
            Err(ArchetypeError::InvalidParameter { .. })
        ));
    }
}

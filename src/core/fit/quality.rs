use serde::Serialize;

use crate::core::base::geometry::{
    affine_basis, convex_hull_volume, project_into_basis, simplex_volume, VolumeEstimator,
};
use crate::core::data::observations::ObservationMatrix;
use crate::core::fit::pcha::FitResult;
use crate::errors::ArchetypeResult;

////////////////////
// Result structs //
////////////////////

/// Shape diagnostics of a fitted polytope
///
/// ### Fields
///
/// * `variance_explained` - Reconstruction variance explained by the fit
/// * `t_ratio` - Fitted polytope volume divided by the convex hull volume of
///   the observations, both taken in the affine subspace of the archetypes;
///   values near 1 mean the polytope is as compact as the data allows
#[derive(Clone, Debug, Serialize)]
pub struct ShapeQuality {
    pub variance_explained: f64,
    pub t_ratio: f64,
}

///////////////
// Functions //
///////////////

/// Compute the shape quality of a fitted polytope
///
/// With k archetypes in d dimensions the comparison runs in the (k - 1)
/// dimensional affine subspace of the archetypes when k - 1 < d; with
/// k - 1 > d the polytope volume falls back to the hull volume of the
/// archetypes themselves. Degenerate hulls yield a t-ratio of zero.
///
/// ### Params
///
/// * `fit_result` - A fitted polytope
/// * `observations` - The observations the polytope was fitted on
/// * `estimator` - Exact or Monte Carlo hull volume computation; the exact
///   path refuses subspaces beyond `MAX_EXACT_HULL_DIM` dimensions
///
/// ### Returns
///
/// The `ShapeQuality`; volume-related failures only abort this diagnostic,
/// the fit itself stays valid.
pub fn shape_quality(
    fit_result: &FitResult,
    observations: &ObservationMatrix,
    estimator: &VolumeEstimator,
) -> ArchetypeResult<ShapeQuality> {
    let vertices = fit_result.polytope.vertices.as_ref();
    let k = vertices.nrows();
    let d = vertices.ncols();
    assert_eq!(
        observations.ncols(),
        d,
        "Observation and archetype dimensionality differ: {} != {}",
        observations.ncols(),
        d
    );

    if k < 2 {
        return Ok(ShapeQuality {
            variance_explained: fit_result.variance_explained,
            t_ratio: 0.0,
        });
    }

    let (polytope_volume, hull_volume) = if k - 1 < d {
        // Compare inside the archetypes' own affine subspace
        let (origin, basis) = affine_basis(vertices);
        let vertices_sub = project_into_basis(vertices, &origin, basis.as_ref());
        let obs_sub = project_into_basis(observations.data(), &origin, basis.as_ref());
        (
            simplex_volume(vertices_sub.as_ref()),
            convex_hull_volume(obs_sub.as_ref(), estimator)?,
        )
    } else if k - 1 == d {
        (
            simplex_volume(vertices),
            convex_hull_volume(observations.data(), estimator)?,
        )
    } else {
        // More archetypes than a simplex needs: the polytope volume is the
        // hull volume of the archetypes
        (
            convex_hull_volume(vertices, estimator)?,
            convex_hull_volume(observations.data(), estimator)?,
        )
    };

    let t_ratio = if hull_volume > 0.0 {
        polytope_volume / hull_volume
    } else {
        0.0
    };

    Ok(ShapeQuality {
        variance_explained: fit_result.variance_explained,
        t_ratio,
    })
}

/// Subspace dimension in which the t-ratio for a k-archetype fit runs
///
/// Used to check volume feasibility before expensive resampling batches.
pub fn t_ratio_dimension(n_archetypes: usize, n_features: usize) -> usize {
    n_archetypes.saturating_sub(1).min(n_features)
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fit::pcha::{fit, FitParams};

    fn triangle_observations() -> ObservationMatrix {
        let mut rows = vec![
            vec![0.0, 0.0],
            vec![10.0, 0.0],
            vec![0.0, 10.0],
        ];
        // Interior points on a grid inside the triangle
        for i in 1..8 {
            for j in 1..(8 - i) {
                rows.push(vec![i as f64, j as f64]);
            }
        }
        ObservationMatrix::from_rows(&rows).unwrap()
    }

    #[test]
    fn test_t_ratio_near_one_for_tight_fit() {
        let obs = triangle_observations();
        let res = fit(&obs, 3, &FitParams::default(), 5).unwrap();
        let quality = shape_quality(&res, &obs, &VolumeEstimator::Exact).unwrap();
        // The data hull is itself a triangle; the fitted simplex should
        // cover most of it
        assert!(quality.t_ratio > 0.6, "t-ratio was {}", quality.t_ratio);
        assert!(quality.t_ratio < 1.5);
    }

    #[test]
    fn test_single_archetype_t_ratio_zero() {
        let obs = triangle_observations();
        let res = fit(&obs, 1, &FitParams::default(), 5).unwrap();
        let quality = shape_quality(&res, &obs, &VolumeEstimator::Exact).unwrap();
        assert_eq!(quality.t_ratio, 0.0);
    }

    #[test]
    fn test_t_ratio_dimension() {
        assert_eq!(t_ratio_dimension(3, 10), 2);
        assert_eq!(t_ratio_dimension(5, 2), 2);
        assert_eq!(t_ratio_dimension(1, 4), 0);
    }
}

use faer::Mat;
use rustc_hash::FxHashMap;

use crate::core::base::utils::row_sq_distance;
use crate::core::data::observations::{ExternalFeatures, ObservationMatrix};
use crate::core::fit::pcha::FitResult;
use crate::errors::{ArchetypeError, ArchetypeResult};

///////////
// Enums //
///////////

/// How observation-to-archetype proximity is scored
#[derive(Clone, Debug, PartialEq)]
pub enum DistanceMetric {
    /// Euclidean distance in feature space
    Euclidean,
    /// `1 - weight` from the fitted weight matrix; no recomputation, and
    /// bounded to [0, 1]
    ArchetypeWeight,
}

/// Parsing the distance metric
///
/// ### Params
///
/// * `s` - string defining the distance metric
///
/// ### Returns
///
/// The `DistanceMetric`.
pub fn parse_distance_metric(s: &str) -> Option<DistanceMetric> {
    match s.to_lowercase().as_str() {
        "euclidean" => Some(DistanceMetric::Euclidean),
        "archetype_weight" => Some(DistanceMetric::ArchetypeWeight),
        _ => None,
    }
}

////////////////////
// Result structs //
////////////////////

/// Per-observation proximity to every archetype, merged with external
/// feature data
///
/// ### Fields
///
/// * `keys` - Observation identifiers (generated positional keys when the
///   observations carry none)
/// * `metric` - The metric behind `vertex_scores`
/// * `vertex_scores` - n x k matrix, smaller value = closer to the archetype
/// * `feature_names` - Names of the merged external feature columns
/// * `feature_values` - n x f matrix of external feature values, reordered
///   to the observation order
#[derive(Clone, Debug)]
pub struct AttributionTable {
    pub keys: Vec<String>,
    pub metric: DistanceMetric,
    pub vertex_scores: Mat<f64>,
    pub feature_names: Vec<String>,
    pub feature_values: Mat<f64>,
}

impl AttributionTable {
    pub fn n_observations(&self) -> usize {
        self.vertex_scores.nrows()
    }

    pub fn n_archetypes(&self) -> usize {
        self.vertex_scores.ncols()
    }
}

///////////////
// Functions //
///////////////

/// Build the attribution table for a fitted polytope
///
/// Scores every observation against every archetype and joins optional
/// external feature data (expression values, gene-set activities) on the
/// shared observation key.
///
/// ### Params
///
/// * `fit_result` - The fitted polytope
/// * `observations` - The observations the polytope was fitted on
/// * `external` - Optional per-observation feature data to merge
/// * `metric` - Proximity scoring, see `DistanceMetric`
///
/// ### Returns
///
/// The `AttributionTable`. Fails with `KeyMismatch` when the observation
/// keys of the two inputs do not form a bijection.
pub fn attribute(
    fit_result: &FitResult,
    observations: &ObservationMatrix,
    external: Option<&ExternalFeatures>,
    metric: DistanceMetric,
) -> ArchetypeResult<AttributionTable> {
    let n = observations.nrows();
    let vertices = fit_result.polytope.vertices.as_ref();
    let k = vertices.nrows();

    crate::assert_nrows!(fit_result.polytope.weights, observations.data());

    let vertex_scores = match metric {
        DistanceMetric::Euclidean => Mat::from_fn(n, k, |i, v| {
            row_sq_distance(observations.data(), i, vertices, v).sqrt()
        }),
        DistanceMetric::ArchetypeWeight => {
            let weights = fit_result.polytope.weights.as_ref();
            Mat::from_fn(n, k, |i, v| 1.0 - weights[(i, v)])
        }
    };

    let keys: Vec<String> = match observations.keys() {
        Some(keys) => keys.to_vec(),
        None => (0..n).map(|i| format!("obs_{}", i)).collect(),
    };

    let (feature_names, feature_values) = match external {
        None => (Vec::new(), Mat::zeros(n, 0)),
        Some(external) => {
            if observations.keys().is_none() {
                return Err(ArchetypeError::KeyMismatch {
                    message: "observations carry no keys to join external features on"
                        .to_string(),
                });
            }

            let lookup: FxHashMap<&str, usize> = external
                .keys
                .iter()
                .enumerate()
                .map(|(i, key)| (key.as_str(), i))
                .collect();
            if lookup.len() != external.keys.len() {
                return Err(ArchetypeError::KeyMismatch {
                    message: "duplicated keys in external features".to_string(),
                });
            }
            if external.keys.len() != n {
                return Err(ArchetypeError::KeyMismatch {
                    message: format!(
                        "{} external feature rows for {} observations",
                        external.keys.len(),
                        n
                    ),
                });
            }

            let mut row_order = Vec::with_capacity(n);
            for key in &keys {
                match lookup.get(key.as_str()) {
                    Some(&row) => row_order.push(row),
                    None => {
                        return Err(ArchetypeError::KeyMismatch {
                            message: format!("observation key `{}` missing from external features", key),
                        })
                    }
                }
            }

            let values = Mat::from_fn(n, external.names.len(), |i, j| {
                external.values[(row_order[i], j)]
            });
            (external.names.clone(), values)
        }
    };

    Ok(AttributionTable {
        keys,
        metric,
        vertex_scores,
        feature_names,
        feature_values,
    })
}

///////////
// Tests //
///////////

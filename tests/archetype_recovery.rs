//! End-to-end tests on synthetic data with known archetypes: vertex
//! recovery, hull membership without relaxation, the model selection elbow
//! and the permutation null.

use faer::mat;
use faer::Mat;
use rand::prelude::*;

use archetypal::core::base::simplex::hull_distance;
use archetypal::utils::general::derive_seed;
use archetypal::{
    align_vertices, bootstrap_fits, fit, generate_archetypal_data, permutation_test, select,
    shape_quality, BootstrapParams, FitParams, ObservationMatrix, PermutationParams,
    SelectionParams, VolumeEstimator,
};

/// 300 observations in three feature dimensions, generated from three known
/// vertices plus mild Gaussian noise
fn three_vertex_data(seed: u64) -> (Mat<f64>, ObservationMatrix) {
    let vertices = mat![
        [0.0, 0.0, 0.0],
        [10.0, 0.0, 2.0],
        [0.0, 10.0, 4.0]
    ];
    let synth = generate_archetypal_data(300, vertices.as_ref(), 0.6, 0.25, seed).unwrap();
    (vertices, synth.observations)
}

fn mean_pairwise_vertex_distance(vertices: &Mat<f64>) -> f64 {
    let k = vertices.nrows();
    let mut total = 0.0;
    let mut pairs = 0;
    for a in 0..k {
        for b in (a + 1)..k {
            let mut dist_sq = 0.0;
            for j in 0..vertices.ncols() {
                let diff = vertices[(a, j)] - vertices[(b, j)];
                dist_sq += diff * diff;
            }
            total += dist_sq.sqrt();
            pairs += 1;
        }
    }
    total / pairs as f64
}

#[test]
fn recovers_planted_vertices() {
    let (true_vertices, obs) = three_vertex_data(101);
    let result = fit(&obs, 3, &FitParams::default(), 7).unwrap();

    assert!(
        result.variance_explained > 0.9,
        "variance explained was {}",
        result.variance_explained
    );

    // Align the fitted vertices to the planted ones before measuring error
    let (aligned, _) = align_vertices(
        true_vertices.as_ref(),
        result.polytope.vertices.as_ref(),
    );
    let mut mean_error = 0.0;
    for v in 0..3 {
        let mut dist_sq = 0.0;
        for j in 0..3 {
            let diff = aligned[(v, j)] - true_vertices[(v, j)];
            dist_sq += diff * diff;
        }
        mean_error += dist_sq.sqrt() / 3.0;
    }

    let spacing = mean_pairwise_vertex_distance(&true_vertices);
    assert!(
        mean_error < 0.1 * spacing,
        "mean vertex error {} against spacing {}",
        mean_error,
        spacing
    );
}

#[test]
fn vertices_stay_inside_hull_without_relaxation() {
    let (_, obs) = three_vertex_data(55);
    let result = fit(&obs, 3, &FitParams::default(), 13).unwrap();

    // With relaxation 0 every archetype is a convex combination of
    // observations, so its distance to the data hull is numerically zero
    for v in 0..3 {
        let vertex: Vec<f64> = (0..3).map(|j| result.polytope.vertices[(v, j)]).collect();
        let dist = hull_distance(&vertex, obs.data());
        assert!(dist < 1e-4, "vertex {} sits {} outside the hull", v, dist);
    }
}

#[test]
fn model_selection_elbow_after_three() {
    let (_, obs) = three_vertex_data(202);
    let params = SelectionParams {
        bootstrap_count: 8,
        ..SelectionParams::default()
    };
    let report = select(&obs, 1..=6, &params, 31, None).unwrap();
    assert_eq!(report.rows.len(), 6);

    let marginal: Vec<f64> = report
        .rows
        .iter()
        .map(|row| row.marginal_variance_explained.unwrap_or(0.0).max(0.0))
        .collect();

    // Gains collapse once the true vertex count is reached
    let best_after_three = marginal[3].max(marginal[4]).max(marginal[5]);
    assert!(
        marginal[2] > 3.0 * best_after_three,
        "marginals were {:?}",
        marginal
    );
    assert!(report.rows[2].variance_explained > 0.9);
}

#[test]
fn bootstrap_vertices_stable_on_planted_data() {
    let (_, obs) = three_vertex_data(77);
    let params = BootstrapParams {
        bootstrap_count: 12,
        ..BootstrapParams::default()
    };
    let result = bootstrap_fits(&obs, 3, &params, 5, None).unwrap();

    assert!(result.aligned_vertices.len() + result.n_excluded == 12);
    let spacing = 10.0;
    for &var in &result.vertex_variance {
        // Positional spread stays well below the vertex spacing
        assert!(var.sqrt() < 0.3 * spacing, "vertex variance {}", var);
    }
}

#[test]
fn permutation_null_is_calm_on_independent_features() {
    // Features drawn independently carry no correlation structure for the
    // polytope to exploit, so the observed t-ratio should not stand out
    // against the permutation null
    let mut p_values = Vec::new();
    for trial in 0..5 {
        let seed = derive_seed(900, trial);
        let mut rng = StdRng::seed_from_u64(seed);
        let rows: Vec<Vec<f64>> = (0..80)
            .map(|_| vec![rng.random::<f64>(), rng.random::<f64>()])
            .collect();
        let obs = ObservationMatrix::from_rows(&rows).unwrap();

        let observed = fit(&obs, 3, &FitParams::default(), seed).unwrap();
        let params = PermutationParams {
            n_permutations: 19,
            ..PermutationParams::default()
        };
        let null = permutation_test(&obs, &observed, &params, seed, None).unwrap();
        assert!(null.p_value > 0.0 && null.p_value <= 1.0);
        p_values.push(null.p_value);
    }

    let mean_p: f64 = p_values.iter().sum::<f64>() / p_values.len() as f64;
    assert!(
        mean_p > 0.15,
        "null p-values unexpectedly extreme: {:?}",
        p_values
    );
}

#[test]
fn quality_matches_fit_on_planted_data() {
    let (_, obs) = three_vertex_data(404);
    let result = fit(&obs, 3, &FitParams::default(), 23).unwrap();
    let quality = shape_quality(&result, &obs, &VolumeEstimator::Exact).unwrap();

    assert_eq!(quality.variance_explained, result.variance_explained);
    // Noise pushes a little mass outside the simplex, so the hull is larger
    // than the fitted polytope but of the same order
    assert!(quality.t_ratio > 0.4 && quality.t_ratio <= 1.0 + 1e-9);
}

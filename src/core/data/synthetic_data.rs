use faer::{Mat, MatRef};
use rand::prelude::*;
use rand_distr::{Distribution, Gamma, Normal};

use crate::core::data::observations::ObservationMatrix;
use crate::errors::{ArchetypeError, ArchetypeResult};

////////////////
// Structures //
////////////////

/// Synthetic archetypal data with known ground truth
///
/// ### Fields
///
/// * `observations` - The generated observation matrix
/// * `true_vertices` - The k x d vertex matrix the data was generated from
/// * `true_weights` - The n x k mixing weights used for generation, before
///   noise was added
#[derive(Clone, Debug)]
pub struct SyntheticArchetypalData {
    pub observations: ObservationMatrix,
    pub true_vertices: Mat<f64>,
    pub true_weights: Mat<f64>,
}

///////////////
// Functions //
///////////////

/// Generate observations as noisy convex combinations of known vertices
///
/// Mixing weights are drawn from a symmetric Dirichlet (normalised Gamma
/// draws with shape `concentration`); small concentrations push the mass
/// towards the vertices, large ones towards the centre of the polytope.
/// Gaussian noise is added per coordinate.
///
/// ### Params
///
/// * `n_obs` - Number of observations to generate
/// * `vertices` - The k x d ground-truth vertex matrix
/// * `concentration` - Dirichlet concentration of the mixing weights
/// * `noise_sd` - Standard deviation of the additive Gaussian noise
/// * `seed` - Seed for reproducibility purposes
///
/// ### Returns
///
/// The `SyntheticArchetypalData` with ground truth attached.
pub fn generate_archetypal_data(
    n_obs: usize,
    vertices: MatRef<f64>,
    concentration: f64,
    noise_sd: f64,
    seed: u64,
) -> ArchetypeResult<SyntheticArchetypalData> {
    let k = vertices.nrows();
    let d = vertices.ncols();

    if n_obs == 0 || k == 0 || d == 0 {
        return Err(ArchetypeError::degenerate(n_obs, d, k, "empty input"));
    }
    if concentration <= 0.0 {
        return Err(ArchetypeError::invalid_param(
            "concentration",
            "must be positive",
        ));
    }
    if noise_sd < 0.0 {
        return Err(ArchetypeError::invalid_param(
            "noise_sd",
            "must be non-negative",
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let gamma = Gamma::new(concentration, 1.0)
        .map_err(|_| ArchetypeError::invalid_param("concentration", "rejected by Gamma"))?;
    let normal = Normal::new(0.0, noise_sd)
        .map_err(|_| ArchetypeError::invalid_param("noise_sd", "rejected by Normal"))?;

    let mut true_weights: Mat<f64> = Mat::zeros(n_obs, k);
    for i in 0..n_obs {
        let draws: Vec<f64> = (0..k).map(|_| gamma.sample(&mut rng).max(1e-12)).collect();
        let total: f64 = draws.iter().sum();
        for (j, draw) in draws.iter().enumerate() {
            true_weights[(i, j)] = draw / total;
        }
    }

    let mut data = &true_weights * vertices;
    if noise_sd > 0.0 {
        for j in 0..d {
            for i in 0..n_obs {
                data[(i, j)] += normal.sample(&mut rng);
            }
        }
    }

    let observations = ObservationMatrix::new(data, None)?;

    Ok(SyntheticArchetypalData {
        observations,
        true_vertices: vertices.to_owned(),
        true_weights,
    })
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn test_generated_shape_and_determinism() {
        let vertices = mat![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];
        let a = generate_archetypal_data(50, vertices.as_ref(), 1.0, 0.1, 11).unwrap();
        let b = generate_archetypal_data(50, vertices.as_ref(), 1.0, 0.1, 11).unwrap();
        assert_eq!(a.observations.nrows(), 50);
        assert_eq!(a.observations.ncols(), 2);
        for i in 0..50 {
            for j in 0..2 {
                assert_eq!(
                    a.observations.data()[(i, j)],
                    b.observations.data()[(i, j)]
                );
            }
        }
    }

    #[test]
    fn test_weights_are_row_stochastic() {
        let vertices = mat![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let synth = generate_archetypal_data(30, vertices.as_ref(), 0.5, 0.0, 3).unwrap();
        for i in 0..30 {
            let sum: f64 = (0..3).map(|j| synth.true_weights[(i, j)]).sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_noiseless_points_inside_hull() {
        let vertices = mat![[0.0, 0.0], [4.0, 0.0], [0.0, 4.0]];
        let synth = generate_archetypal_data(40, vertices.as_ref(), 1.0, 0.0, 5).unwrap();
        // Without noise every observation is a convex combination
        for i in 0..40 {
            let x = synth.observations.data()[(i, 0)];
            let y = synth.observations.data()[(i, 1)];
            assert!(x >= -1e-9 && y >= -1e-9 && x + y <= 4.0 + 1e-9);
        }
    }

    #[test]
    fn test_rejects_bad_params() {
        let vertices = mat![[0.0, 0.0], [1.0, 0.0]];
        assert!(generate_archetypal_data(10, vertices.as_ref(), 0.0, 0.1, 1).is_err());
        assert!(generate_archetypal_data(10, vertices.as_ref(), 1.0, -0.1, 1).is_err());
    }
}

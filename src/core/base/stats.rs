use rayon::prelude::*;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::core::base::utils::rank_vector;

///////////////
// Functions //
///////////////

/// Upper-tail p-value for a Z-score (assuming normality).
///
/// Uses an asymptotic tail expansion beyond |z| > 6 where the CDF saturates.
///
/// ### Params
///
/// * `z` - The Z-score to transform
///
/// ### Returns
///
/// The one-sided (greater) p-value.
pub fn z_score_to_pval_upper(z: f64) -> f64 {
    let normal = Normal::new(0.0, 1.0).unwrap();
    if z > 6.0 {
        let pdf = normal.pdf(z);
        pdf / z * (1.0 - 1.0 / (z * z))
    } else {
        1.0 - normal.cdf(z)
    }
}

/// Calculate the FDR
///
/// Benjamini-Hochberg adjustment with enforced monotonicity.
///
/// ### Params
///
/// * `pvals` - P-values for which to calculate the FDR
///
/// ### Returns
///
/// The calculated FDRs
pub fn calc_fdr(pvals: &[f64]) -> Vec<f64> {
    let n = pvals.len();
    if n == 0 {
        return Vec::new();
    }
    let n_f64 = n as f64;

    let mut indexed_pval: Vec<(usize, f64)> =
        pvals.par_iter().enumerate().map(|(i, &x)| (i, x)).collect();

    indexed_pval
        .sort_unstable_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let adj_pvals_tmp: Vec<f64> = indexed_pval
        .par_iter()
        .enumerate()
        .map(|(i, (_, p))| (n_f64 / (i + 1) as f64) * p)
        .collect();

    let mut current_min = adj_pvals_tmp[n - 1].min(1.0);
    let mut monotonic_adj = vec![current_min; n];

    for i in (0..n - 1).rev() {
        current_min = current_min.min(adj_pvals_tmp[i]).min(1.0);
        monotonic_adj[i] = current_min;
    }

    let mut adj_pvals = vec![0.0; n];

    for (i, &(original_idx, _)) in indexed_pval.iter().enumerate() {
        adj_pvals[original_idx] = monotonic_adj[i];
    }

    adj_pvals
}

/// Calculates the Mann-Whitney Z-score for two groups
///
/// Values of both groups are pooled and ranked with tie correction; a
/// positive Z-score means group 1 carries the larger values.
///
/// ### Params
///
/// * `group1` - Values of group 1
/// * `group2` - Values of group 2
///
/// ### Returns
///
/// The Z-score of the rank-sum test.
pub fn mann_whitney_z(group1: &[f64], group2: &[f64]) -> f64 {
    let n1 = group1.len() as f64;
    let n2 = group2.len() as f64;

    if n1 == 0.0 || n2 == 0.0 {
        return 0.0;
    }

    let pooled: Vec<f64> = group1.iter().chain(group2.iter()).copied().collect();
    let ranks = rank_vector(&pooled);

    let r1: f64 = ranks[..group1.len()].iter().sum();
    let u1 = r1 - n1 * (n1 + 1.0) / 2.0;

    let mean = n1 * n2 / 2.0;
    let variance = n1 * n2 * (n1 + n2 + 1.0) / 12.0;

    (u1 - mean) / variance.sqrt()
}

/// Empirical p-value of an observed statistic against a null sample
///
/// Additive smoothing: `(#{null >= observed} + 1) / (n + 1)`, which keeps the
/// p-value away from an impossible zero.
///
/// ### Params
///
/// * `observed` - The observed statistic
/// * `null_values` - Statistics obtained under the null model
///
/// ### Returns
///
/// The smoothed empirical p-value.
pub fn empirical_pval_upper(observed: f64, null_values: &[f64]) -> f64 {
    let n_greater = null_values.iter().filter(|&&v| v >= observed).count();
    (n_greater + 1) as f64 / (null_values.len() + 1) as f64
}

///////////
// Tests //
///////////

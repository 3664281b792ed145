use rayon::prelude::*;
use serde::Serialize;

use crate::core::attribution::distance::AttributionTable;
use crate::core::base::stats::{calc_fdr, mann_whitney_z, z_score_to_pval_upper};
use crate::errors::{ArchetypeError, ArchetypeResult};
use crate::utils::general::array_mean;

////////////
// Params //
////////////

/// Parameters of the per-archetype enrichment test
///
/// ### Fields
///
/// * `near_fraction` - Fraction of eligible observations forming the
///   near-archetype group
/// * `distance_cutoff` - Optional score cutoff; only observations within
///   this distance of at least one archetype enter the test, excluding
///   ambiguous mid-polytope points
/// * `min_eligible` - Minimum number of eligible observations for the test
///   to be meaningful
#[derive(Clone, Debug)]
pub struct EnrichParams {
    pub near_fraction: f64,
    pub distance_cutoff: Option<f64>,
    pub min_eligible: usize,
}

impl Default for EnrichParams {
    fn default() -> Self {
        EnrichParams {
            near_fraction: 0.1,
            distance_cutoff: None,
            min_eligible: 20,
        }
    }
}

////////////////////
// Result structs //
////////////////////

/// Enrichment of one feature at one archetype
///
/// ### Fields
///
/// * `archetype` - Archetype (vertex) index
/// * `feature` - Feature name
/// * `effect_size` - Mean difference between the near and the far group
/// * `z_score` - Rank-sum Z-score; positive means elevated near the
///   archetype
/// * `p_value` - One-sided p-value for elevation near the archetype
/// * `fdr` - Benjamini-Hochberg adjusted p-value over all pairs tested
#[derive(Clone, Debug, Serialize)]
pub struct EnrichmentRecord {
    pub archetype: usize,
    pub feature: String,
    pub effect_size: f64,
    pub z_score: f64,
    pub p_value: f64,
    pub fdr: f64,
}

/// All (archetype, feature) enrichment results of one run
///
/// ### Fields
///
/// * `records` - One record per (archetype, feature) pair
/// * `n_eligible` - Observations that passed the distance cutoff
#[derive(Clone, Debug, Serialize)]
pub struct EnrichmentSummary {
    pub records: Vec<EnrichmentRecord>,
    pub n_eligible: usize,
}

///////////////
// Functions //
///////////////

/// Test every external feature for elevation near every archetype
///
/// Per archetype, the eligible observations are ranked by their proximity
/// score; the nearest `near_fraction` form the near group and are compared
/// against the remainder with a rank-sum test per feature. Specialist
/// features show up as large positive effect sizes with small FDRs at
/// exactly one archetype.
///
/// ### Params
///
/// * `table` - Attribution table carrying vertex scores and merged features
/// * `params` - Test parameters, see `EnrichParams`
///
/// ### Returns
///
/// The `EnrichmentSummary` with FDRs computed across all pairs.
pub fn enrich(
    table: &AttributionTable,
    params: &EnrichParams,
) -> ArchetypeResult<EnrichmentSummary> {
    if !(0.0..=0.5).contains(&params.near_fraction) || params.near_fraction == 0.0 {
        return Err(ArchetypeError::invalid_param(
            "near_fraction",
            "must lie in (0, 0.5]",
        ));
    }
    if table.feature_names.is_empty() {
        return Err(ArchetypeError::invalid_param(
            "table",
            "attribution table carries no external features to test",
        ));
    }

    let n = table.n_observations();
    let k = table.n_archetypes();

    // Restrict to observations close to at least one archetype
    let eligible: Vec<usize> = (0..n)
        .filter(|&i| match params.distance_cutoff {
            None => true,
            Some(cutoff) => (0..k).any(|v| table.vertex_scores[(i, v)] <= cutoff),
        })
        .collect();

    if eligible.len() < params.min_eligible.max(3) {
        return Err(ArchetypeError::invalid_param(
            "distance_cutoff",
            "too few observations pass the cutoff",
        ));
    }

    let n_near = ((eligible.len() as f64 * params.near_fraction).ceil() as usize).max(1);
    if n_near >= eligible.len() {
        return Err(ArchetypeError::invalid_param(
            "near_fraction",
            "near group swallows all eligible observations",
        ));
    }

    let mut records: Vec<EnrichmentRecord> = (0..k)
        .into_par_iter()
        .flat_map(|archetype| {
            let mut order = eligible.clone();
            order.sort_by(|&a, &b| {
                table.vertex_scores[(a, archetype)]
                    .partial_cmp(&table.vertex_scores[(b, archetype)])
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            });
            let (near_idx, far_idx) = order.split_at(n_near);

            table
                .feature_names
                .iter()
                .enumerate()
                .map(|(f, feature)| {
                    let near: Vec<f64> = near_idx
                        .iter()
                        .map(|&i| table.feature_values[(i, f)])
                        .collect();
                    let far: Vec<f64> = far_idx
                        .iter()
                        .map(|&i| table.feature_values[(i, f)])
                        .collect();

                    let z_score = mann_whitney_z(&near, &far);
                    EnrichmentRecord {
                        archetype,
                        feature: feature.clone(),
                        effect_size: array_mean(&near) - array_mean(&far),
                        z_score,
                        p_value: z_score_to_pval_upper(z_score),
                        fdr: 1.0,
                    }
                })
                .collect::<Vec<EnrichmentRecord>>()
        })
        .collect();

    let pvals: Vec<f64> = records.iter().map(|r| r.p_value).collect();
    let fdrs = calc_fdr(&pvals);
    for (record, fdr) in records.iter_mut().zip(fdrs) {
        record.fdr = fdr;
    }

    Ok(EnrichmentSummary {
        records,
        n_eligible: eligible.len(),
    })
}

/// Filter and rank an enrichment summary
///
/// ### Params
///
/// * `summary` - The summary to filter
/// * `fdr_threshold` - Optional upper bound on the FDR
/// * `min_effect_size` - Optional lower bound on the effect size
/// * `top_n_per_archetype` - Optionally keep only the strongest n features
///   per archetype (by p-value)
///
/// ### Returns
///
/// The filtered summary, sorted by archetype and p-value.
pub fn filter_enrichment(
    summary: &EnrichmentSummary,
    fdr_threshold: Option<f64>,
    min_effect_size: Option<f64>,
    top_n_per_archetype: Option<usize>,
) -> EnrichmentSummary {
    let mut kept: Vec<EnrichmentRecord> = summary
        .records
        .iter()
        .filter(|r| {
            if let Some(threshold) = fdr_threshold {
                if r.fdr > threshold {
                    return false;
                }
            }
            if let Some(min_effect) = min_effect_size {
                if r.effect_size < min_effect {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect();

    kept.sort_by(|a, b| {
        a.archetype.cmp(&b.archetype).then(
            a.p_value
                .partial_cmp(&b.p_value)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });

    if let Some(top_n) = top_n_per_archetype {
        let mut trimmed = Vec::with_capacity(kept.len());
        let mut current_archetype = usize::MAX;
        let mut taken = 0;
        for record in kept {
            if record.archetype != current_archetype {
                current_archetype = record.archetype;
                taken = 0;
            }
            if taken < top_n {
                trimmed.push(record);
                taken += 1;
            }
        }
        kept = trimmed;
    }

    EnrichmentSummary {
        records: kept,
        n_eligible: summary.n_eligible,
    }
}

///////////
// Tests //
///////////

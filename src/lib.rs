//! Archetypal analysis for Pareto task inference
//!
//! Fits a minimal-volume polytope to a cloud of observations (cells in a
//! reduced feature space), scores its compactness against the data's convex
//! hull, assesses vertex stability under resampling, tests shape significance
//! against a column-permutation null and attributes external features (gene
//! or gene-set activities) to the archetypes.
//!
//! The crate is a pure, stateless library: every result is a value object
//! produced from its inputs, resampling batches run embarrassingly parallel
//! through rayon, and all randomness flows through per-iteration seeds
//! derived from a caller-supplied master seed.

pub mod core;
pub mod errors;
pub mod utils;

pub use crate::core::attribution::distance::{attribute, AttributionTable, DistanceMetric};
pub use crate::core::attribution::enrichment::{
    enrich, filter_enrichment, EnrichParams, EnrichmentRecord, EnrichmentSummary,
};
pub use crate::core::base::geometry::VolumeEstimator;
pub use crate::core::data::observations::{ExternalFeatures, ObservationMatrix};
pub use crate::core::data::synthetic_data::{generate_archetypal_data, SyntheticArchetypalData};
pub use crate::core::fit::pcha::{fit, FitDiagnostics, FitParams, FitResult, InitStrategy, Polytope};
pub use crate::core::fit::quality::{shape_quality, ShapeQuality};
pub use crate::core::resample::alignment::{align_vertices, min_cost_assignment};
pub use crate::core::resample::bootstrap::{bootstrap_fits, BootstrapParams, BootstrapResult};
pub use crate::core::resample::permutation::{
    permutation_test, NullDistribution, PermutationParams,
};
pub use crate::core::resample::selection::{
    select, ModelSelectionReport, ModelSelectionRow, SelectionParams,
};
pub use crate::core::resample::CancelToken;
pub use crate::errors::{ArchetypeError, ArchetypeResult};

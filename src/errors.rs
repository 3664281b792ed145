use thiserror::Error;

/// Errors surfaced by the archetypal analysis core.
///
/// Numerical non-convergence is deliberately *not* represented here: a fit
/// that runs out of iterations is still returned, flagged via
/// `FitResult::converged`, and the caller decides whether to retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArchetypeError {
    #[error(
        "Degenerate input: {message} (n = {n_obs}, d = {n_features}, k = {n_archetypes})"
    )]
    DegenerateInput {
        n_obs: usize,
        n_features: usize,
        n_archetypes: usize,
        message: String,
    },

    #[error("Invalid parameter `{name}`: {message}")]
    InvalidParameter { name: String, message: String },

    #[error(
        "Exact convex hull volume refused in {dim} dimensions (exact path capped at {max_dim}); \
         supply a Monte Carlo volume estimator instead"
    )]
    VolumeComputationTooExpensive { dim: usize, max_dim: usize },

    #[error(
        "Significance testing needs a hull volume in {dim} dimensions, beyond the exact cap of \
         {max_dim}; supply a Monte Carlo volume estimator"
    )]
    DimensionalityTooHigh { dim: usize, max_dim: usize },

    #[error("Observation keys do not align: {message}")]
    KeyMismatch { message: String },
}

pub type ArchetypeResult<T> = Result<T, ArchetypeError>;

impl ArchetypeError {
    /// Shorthand for a degenerate-input failure.
    pub fn degenerate(n_obs: usize, n_features: usize, n_archetypes: usize, msg: &str) -> Self {
        ArchetypeError::DegenerateInput {
            n_obs,
            n_features,
            n_archetypes,
            message: msg.to_string(),
        }
    }

    /// Shorthand for an invalid-parameter failure.
    pub fn invalid_param(name: &str, msg: &str) -> Self {
        ArchetypeError::InvalidParameter {
            name: name.to_string(),
            message: msg.to_string(),
        }
    }
}

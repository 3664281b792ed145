//! Module containing the polytope fitter and its shape diagnostics

pub mod pcha;
pub mod quality;

//! Module containing the validated input structures and synthetic data
//! generation for archetypal analysis

pub mod observations;
pub mod synthetic_data;

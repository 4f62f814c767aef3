//! Post-processing of electromagnetic near-field monitor data.
//!
//! Recorded field datasets are symmetry expanded and grid corrected, reduced to
//! tangential fields on their monitor plane, and from there turned into flux, modal
//! overlaps and far-field projections.

pub mod bins;
pub mod coords;
pub mod dataset;
pub mod diffraction;
pub mod error;
pub mod field;
pub mod grid;
pub mod medium;
pub mod modes;
pub mod monitor;
pub mod output;
pub mod powers;
pub mod problem;
pub mod projected;
pub mod projection;
pub mod result;
pub mod settings;
pub mod symmetry;
pub mod tangential;

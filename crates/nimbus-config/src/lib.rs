//! Configuration schema engine for the Nimbus cluster control plane.
//!
//! This crate parses declarative [`crd::ClusterConfig`] documents, fills
//! every subsection the user left out with computed defaults, validates the
//! semantic constraints the document schema cannot express, and can strip a
//! fully populated configuration back down to only the fields that diverge
//! from their defaults.

pub mod address;
pub mod config;
pub mod crd;
pub mod validation;
pub mod yaml;

// External re-exports
pub use schemars;

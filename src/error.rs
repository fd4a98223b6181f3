//! Typed failures for model resolution and packed-track encoding.
//!
//! Writers, readers and the verification checker bubble their IO errors via
//! `anyhow::Result`; these enums convert into `anyhow::Error` at that boundary
//! and remain reachable with `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

use crate::record::Strand;

/// Failures raised while choosing the kinetics model for a job.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Upstream chemistry detection reported the `unknown` sentinel.
    #[error("Chemistry cannot be identified---cannot perform kinetic analysis")]
    ChemistryUnresolved,

    /// No `<label>.h5` exists in any directory of the search path.
    #[error("No kinetics model available for this chemistry ({label:?}) on paramsPath {search_path:?}")]
    ModelNotFound {
        /// Normalized chemistry label that was searched for.
        label: String,
        /// Every directory scanned, in scan order.
        search_path: Vec<PathBuf>,
    },
}

/// Failures raised while folding strand records into packed track values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackError {
    /// A ratio does not fit the 16-bit fixed-point field.
    #[error("ipdRatio {value} at {reference}:{position} ({strand}) is outside the packed range 0..=655.35")]
    EncodingOverflow {
        reference: String,
        position: u32,
        strand: Strand,
        value: f64,
    },

    /// A coordinate did not carry exactly one record per strand.
    #[error("unpaired strand record at {reference}:{position} ({strand}): {reason}")]
    StreamPairing {
        reference: String,
        position: u32,
        strand: Strand,
        reason: &'static str,
    },
}

#![forbid(unsafe_code)]
//! # kinetrack
//!
//! Chemistry-matched **kinetics model resolution** and strand-consistent emission of
//! per-position **IPD ratios** across three output shapes: a row-oriented table, a
//! columnar store, and a packed genome track with no native strand axis.
//!
//! ## Highlights
//! - 🧭 **Deterministic model lookup**: explicit override, then first `<label>.h5` on an
//!   ordered search path (chemistry bundle first).
//! - 🧬 **Paired strands**: every covered position yields one forward and one reverse
//!   record, adjacent, in a fixed strand order; half pairs carry an explicit sentinel.
//! - 📦 **Packed track**: both strands folded into one `u32` per coordinate, 2-decimal
//!   fixed point, overflow reported instead of wrapped.
//! - ✅ **Cross-format checker**: the definition of "correct" multi-format output.
//!
//! ## Examples
//! ```rust
//! use std::path::Path;
//! use kinetrack::{resolve_model, ModelSearchConfig};
//! let cfg = ModelSearchConfig::new(vec!["/opt/kinetics/resources".into()]);
//! // An explicit model always wins, even for an unidentified chemistry.
//! let p = resolve_model(Some(Path::new("/tmp/custom.h5")), "unknown", &cfg).unwrap();
//! assert_eq!(p, Path::new("/tmp/custom.h5"));
//!
//! let packed = kinetrack::track::encode_pair("chr1", 1, 1.0, 2.0).unwrap();
//! assert_eq!(packed, (100 << 16) | 200);
//! ```
//!
//! ## Layout
//! - [`model`]: search configuration and model resolution.
//! - [`record`]: strand records and kinetic fields.
//! - [`stream`]: windows, the kinetic source seam and [`stream::RecordStream`].
//! - [`tabular`], [`columnar`], [`track`]: the three encoders.
//! - [`emit`]: parallel emission of all requested outputs.
//! - [`verify`]: cross-format consistency checks.

pub mod error;
pub mod record;
pub mod model;
pub mod stream;
pub mod track;
pub mod tabular;
pub mod columnar;
pub mod emit;
pub mod verify;

pub use error::{ConfigurationError, TrackError};
pub use model::{resolve_model, ModelSearchConfig};
pub use record::{Base, KineticFields, Measurement, Strand, StrandOrder, StrandRecord};
pub use stream::{KineticSource, MeasurementTable, RecordStream, ReferenceWindow};
pub use track::PackedTrack;

/// Crate version string (from `CARGO_PKG_VERSION`).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

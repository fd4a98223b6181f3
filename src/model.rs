//! Kinetics **model resolution**: pick the `.h5` model file for a chemistry.
//!
//! Precedence, first match wins:
//! 1. An explicit override path (`--ipdModel`), returned without any existence check.
//! 2. `<dir>/<label>.h5` for each directory of the effective search list, in order.
//!    The effective list is the chemistry bundle directory (`<bundle>/kineticsTools`),
//!    when one is configured, followed by the configured `paramsPath` entries.
//!
//! The resolver never reads the environment; [`ModelSearchConfig::from_env`] does that
//! once when the job configuration is built.
//!
//! # Examples
//! ```
//! use kinetrack::model::normalize_chemistry;
//! assert_eq!(normalize_chemistry("S/P5-C3/5.0"), "SP2-C2");
//! assert_eq!(normalize_chemistry("P6-C4/x"), "P6-C4x");
//! ```
use std::path::{Path, PathBuf};

use crate::error::ConfigurationError;

/// Deployment variable naming the chemistry bundle root.
pub const BUNDLE_ENV: &str = "SMRT_CHEMISTRY_BUNDLE_DIR";

/// Sub-directory of the bundle root that holds kinetics models.
pub const BUNDLE_SUBDIR: &str = "kineticsTools";

/// Label reported when chemistry detection failed upstream.
pub const UNKNOWN_CHEMISTRY: &str = "unknown";

/// Shared trained model that every `S/`-prefixed chemistry is routed to.
pub const FALLBACK_CHEMISTRY: &str = "SP2-C2";

/// On-disk extension of model files.
pub const MODEL_EXTENSION: &str = "h5";

/// Immutable per-job search configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelSearchConfig {
    /// Directories scanned in order (`--paramsPath`).
    pub params_path: Vec<PathBuf>,
    /// Explicit model file (`--ipdModel`); wins unconditionally when non-empty.
    pub ipd_model: Option<PathBuf>,
    /// Chemistry bundle root; `<bundle>/kineticsTools` is scanned before `params_path`.
    pub bundle_dir: Option<PathBuf>,
}

impl ModelSearchConfig {
    /// Search `params_path` only: no override, no bundle.
    pub fn new(params_path: Vec<PathBuf>) -> Self {
        ModelSearchConfig { params_path, ..Default::default() }
    }

    /// Set the explicit model override.
    pub fn with_ipd_model(mut self, ipd_model: Option<PathBuf>) -> Self {
        self.ipd_model = ipd_model;
        self
    }

    /// Set the chemistry bundle root.
    pub fn with_bundle_dir(mut self, bundle_dir: Option<PathBuf>) -> Self {
        self.bundle_dir = bundle_dir;
        self
    }

    /// Build the configuration, taking the bundle root from [`BUNDLE_ENV`] if set and non-empty.
    pub fn from_env(params_path: Vec<PathBuf>, ipd_model: Option<PathBuf>) -> Self {
        let bundle_dir = std::env::var_os(BUNDLE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        if bundle_dir.is_some() {
            log::info!("found {}, prepending to default paramsPath", BUNDLE_ENV);
        }
        ModelSearchConfig { params_path, ipd_model, bundle_dir }
    }

    /// Effective scan order: bundle directory first (if any), then `params_path`.
    pub fn search_list(&self) -> Vec<PathBuf> {
        let mut out = Vec::with_capacity(self.params_path.len() + 1);
        if let Some(b) = &self.bundle_dir {
            out.push(b.join(BUNDLE_SUBDIR));
        }
        out.extend(self.params_path.iter().cloned());
        out
    }

    /// Resolve using this configuration's own override.
    pub fn resolve(&self, chemistry: &str) -> Result<PathBuf, ConfigurationError> {
        resolve_model(self.ipd_model.as_deref(), chemistry, self)
    }
}

/// Map a detected chemistry label to the model file stem.
///
/// `S/`-prefixed labels are routed to [`FALLBACK_CHEMISTRY`]; every `/` is then removed.
pub fn normalize_chemistry(label: &str) -> String {
    let label = if label.starts_with("S/") { FALLBACK_CHEMISTRY } else { label };
    label.replace('/', "")
}

/// Return the kinetics model file to load.
///
/// `override_path` wins whenever it is non-empty. `search.ipd_model` is **not**
/// consulted here; use [`ModelSearchConfig::resolve`] for that.
pub fn resolve_model(
    override_path: Option<&Path>,
    chemistry: &str,
    search: &ModelSearchConfig,
) -> Result<PathBuf, ConfigurationError> {
    if let Some(p) = override_path.filter(|p| !p.as_os_str().is_empty()) {
        log::info!("Using passed-in kinetics model: {:?}", p);
        return Ok(p.to_path_buf());
    }

    if chemistry == UNKNOWN_CHEMISTRY {
        let err = ConfigurationError::ChemistryUnresolved;
        log::error!("{}", err);
        return Err(err);
    }

    let label = normalize_chemistry(chemistry);
    let file_name = format!("{}.{}", label, MODEL_EXTENSION);
    let search_path = search.search_list();

    for dir in &search_path {
        let candidate = dir.join(&file_name);
        if candidate.is_file() {
            log::info!("Using chemistry-matched kinetics model: {:?}", candidate);
            return Ok(candidate);
        }
    }

    let err = ConfigurationError::ModelNotFound { label, search_path };
    log::error!("{}", err);
    Err(err)
}

/// Split a colon-separated `--paramsPath` value, dropping empty entries.
pub fn parse_params_path(spec: &str) -> Vec<PathBuf> {
    spec.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect()
}

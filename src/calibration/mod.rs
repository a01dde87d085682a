//! Pre-fitted import/export sub-models driving the model-based input signals
//!
//! The sub-models are calibrated once, offline, and stored as JSON next to
//! the crate. They are loaded explicitly at startup with [Calibration::load]
//! (optionally installed process-wide with [install]) and are read-only
//! afterwards; nothing in the evaluation path loads them lazily.

mod types;

pub use types::{FittedSubModel, SubModel};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::OptonotchError;

/// File holding the fitted import (`on_model`) law
pub const IMPORT_FILE: &str = "fitted_import_func.json";
/// File holding the fitted export (`off_model`) law
pub const EXPORT_FILE: &str = "fitted_export_func.json";
/// Environment variable overriding [Calibration::default_dir]
pub const CALIBRATION_DIR_ENV: &str = "OPTONOTCH_CALIBRATION_DIR";

static GLOBAL: OnceLock<Arc<Calibration>> = OnceLock::new();

/// The pair of fitted sub-models used by the model-based input signals
#[derive(Clone)]
pub struct Calibration {
    on_model: Arc<dyn SubModel>,
    off_model: Arc<dyn SubModel>,
}

impl fmt::Debug for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calibration").finish_non_exhaustive()
    }
}

impl Calibration {
    pub fn new(on_model: impl SubModel + 'static, off_model: impl SubModel + 'static) -> Self {
        Self {
            on_model: Arc::new(on_model),
            off_model: Arc::new(off_model),
        }
    }

    /// Load both sub-models from `dir`.
    ///
    /// Fails with [OptonotchError::MissingCalibrationData] if either file is
    /// missing or does not describe a [FittedSubModel].
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, OptonotchError> {
        let dir = dir.as_ref();
        let on_model = read_sub_model(&dir.join(IMPORT_FILE))?;
        let off_model = read_sub_model(&dir.join(EXPORT_FILE))?;
        tracing::info!(
            "Loaded calibration from {}: on = {:?}, off = {:?}",
            dir.display(),
            on_model,
            off_model
        );
        Ok(Self::new(on_model, off_model))
    }

    /// Load from [Calibration::default_dir]
    pub fn load_default() -> Result<Self, OptonotchError> {
        Self::load(Self::default_dir())
    }

    /// `$OPTONOTCH_CALIBRATION_DIR` if set, otherwise `calibration/` in the crate root
    pub fn default_dir() -> PathBuf {
        match std::env::var_os(CALIBRATION_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(env!("CARGO_MANIFEST_DIR")).join("calibration"),
        }
    }

    /// Nuclear import starting from `initial`, `elapsed` time units later
    #[inline(always)]
    pub fn on_model(&self, initial: f64, elapsed: f64) -> f64 {
        self.on_model.evaluate(initial, elapsed)
    }

    /// Nuclear export starting from `initial`, `elapsed` time units later
    #[inline(always)]
    pub fn off_model(&self, initial: f64, elapsed: f64) -> f64 {
        self.off_model.evaluate(initial, elapsed)
    }
}

fn read_sub_model(path: &Path) -> Result<FittedSubModel, OptonotchError> {
    let missing = |reason: String| OptonotchError::MissingCalibrationData {
        path: path.to_path_buf(),
        reason,
    };
    let contents = fs::read_to_string(path).map_err(|e| missing(e.to_string()))?;
    let law: FittedSubModel = serde_json::from_str(&contents).map_err(|e| missing(e.to_string()))?;
    law.validate().map_err(missing)?;
    Ok(law)
}

/// Install `calibration` as the process-wide calibration.
///
/// The first installation wins; later calls return the already installed value.
pub fn install(calibration: Calibration) -> Arc<Calibration> {
    let mut installed = true;
    let global = GLOBAL.get_or_init(|| {
        installed = false;
        Arc::new(calibration)
    });
    if installed {
        tracing::warn!("Calibration already installed, keeping the existing one");
    }
    global.clone()
}

/// Load from `dir` and [install] the result
pub fn initialize(dir: impl AsRef<Path>) -> Result<Arc<Calibration>, OptonotchError> {
    match GLOBAL.get() {
        Some(global) => Ok(global.clone()),
        None => Ok(install(Calibration::load(dir)?)),
    }
}

/// The process-wide calibration, if one was installed
pub fn global() -> Result<Arc<Calibration>, OptonotchError> {
    GLOBAL
        .get()
        .cloned()
        .ok_or_else(|| OptonotchError::MissingCalibrationData {
            path: Calibration::default_dir(),
            reason: "no calibration has been installed".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_load_bundled_calibration() {
        let calibration =
            Calibration::load(Path::new(env!("CARGO_MANIFEST_DIR")).join("calibration")).unwrap();
        assert_relative_eq!(calibration.on_model(0.3, 0.0), 0.3, epsilon = 1e-12);
        assert!(calibration.on_model(0.0, 5.0) > 0.0);
        assert!(calibration.off_model(1.0, 5.0) < 1.0);
    }

    #[test]
    fn test_missing_directory_is_reported() {
        let err = Calibration::load("/definitely/not/a/calibration/dir").unwrap_err();
        match err {
            OptonotchError::MissingCalibrationData { path, .. } => {
                assert!(path.ends_with(IMPORT_FILE));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_inverted_linear_bounds_are_rejected() {
        let dir = std::env::temp_dir().join(format!("optonotch-calibration-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(IMPORT_FILE),
            r#"{ "kind": "linear", "slope": 0.1, "floor": 1.0, "ceiling": 0.0 }"#,
        )
        .unwrap();
        fs::write(
            dir.join(EXPORT_FILE),
            r#"{ "kind": "relaxation", "rate": 0.3, "plateau": 0.0 }"#,
        )
        .unwrap();

        let err = Calibration::load(&dir).unwrap_err();
        fs::remove_dir_all(&dir).unwrap();
        match err {
            OptonotchError::MissingCalibrationData { path, reason } => {
                assert!(path.ends_with(IMPORT_FILE));
                assert!(reason.contains("ceiling"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_closure_sub_models() {
        let calibration = Calibration::new(|n0: f64, t: f64| n0 + t, |n0: f64, t: f64| n0 - t);
        assert_eq!(calibration.on_model(1.0, 2.0), 3.0);
        assert_eq!(calibration.off_model(1.0, 2.0), -1.0);
    }
}

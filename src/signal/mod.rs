//! Input signals: the normalized nuclear NICD level driving the models
//!
//! Every signal is a pure function of time. Signals that are built out of
//! phases ([PulsatileLinear], [PulsatileModel]) precompute the value at each
//! phase boundary once, and saturate at the value of their final boundary.
//!
//! # Example
//!
//! ```rust,ignore
//! use optonotch::signal::{InputSignal, PulsatileLinear, TimeScale};
//!
//! let signal = PulsatileLinear::new(TimeScale::default())?;
//! assert!((signal.value(5.0) - 0.5).abs() < 1e-12);
//! ```

mod fitted;
mod linear;
pub mod schedule;

pub use fitted::{ContinuousModel, FittedLaw, PulsatileModel, PulsatileSteps};
pub use linear::{ContinuousLinear, LinearLaw, PulsatileLinear, PULSATILE_LINEAR_ENDS, SIGNAL_FLOOR};
pub use schedule::{Direction, Phase, PhaseLaw, PhaseSchedule};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::calibration::Calibration;
use crate::OptonotchError;

/// Duration of a full import, in experiment time
pub const EXP_IMPORT_TIME: f64 = 10.0;
/// Duration of a full export, in experiment time
pub const EXP_EXPORT_TIME: f64 = 10.0;

/// A driving signal `N(t)`, roughly within `[0, 1]`.
///
/// `value` is called once per right-hand-side evaluation and must not keep
/// state between calls.
pub trait InputSignal: Send + Sync {
    /// Value at `t`. Only defined for `t >= 0`.
    fn value(&self, t: f64) -> f64;

    /// Last breakpoint of the signal, if it has one.
    ///
    /// The value is constant for every `t` strictly greater than this time.
    /// At the breakpoint itself the signal may still hold the previous level.
    fn final_breakpoint(&self) -> Option<f64> {
        None
    }

    /// Like [InputSignal::value], rejecting negative or NaN times
    fn try_value(&self, t: f64) -> Result<f64, OptonotchError> {
        if t.is_nan() || t < 0.0 {
            return Err(OptonotchError::invalid(format!(
                "input signals are only defined for t >= 0, got {t}"
            )));
        }
        Ok(self.value(t))
    }
}

impl<F> InputSignal for F
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn value(&self, t: f64) -> f64 {
        self(t)
    }
}

/// Conversion between experiment time and simulation time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeScale {
    pub sim_end_time: f64,
    pub exp_end_time: f64,
}

impl Default for TimeScale {
    fn default() -> Self {
        Self {
            sim_end_time: 32.0,
            exp_end_time: 32.0,
        }
    }
}

impl TimeScale {
    #[inline(always)]
    pub fn to_sim(&self, exp_time: f64) -> f64 {
        exp_time / self.exp_end_time * self.sim_end_time
    }

    pub fn validate(&self) -> Result<(), OptonotchError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if valid(self.sim_end_time) && valid(self.exp_end_time) {
            Ok(())
        } else {
            Err(OptonotchError::invalid(format!(
                "time scale end times must be positive, got {self:?}"
            )))
        }
    }
}

const FERRELL_STEPS: [f64; 7] = [20.0, 50.0, 60.0, 70.0, 80.0, 90.0, f64::INFINITY];
const FERRELL_VALUES: [f64; 7] = [0.0, 0.2, 0.4, 0.6, 0.4, 0.2, 0.0];

/// Staircase input mimicking Ferrell (2016)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ferrell;

impl InputSignal for Ferrell {
    #[inline(always)]
    fn value(&self, t: f64) -> f64 {
        let index = FERRELL_STEPS.partition_point(|&step| step < t);
        FERRELL_VALUES[index.min(FERRELL_VALUES.len() - 1)]
    }

    /// Steps are closed on the right, so `value(90.0)` is still 0.2
    fn final_breakpoint(&self) -> Option<f64> {
        Some(FERRELL_STEPS[FERRELL_STEPS.len() - 2])
    }
}

/// Selects and configures one of the input signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum SignalKind {
    Ferrell,
    ContinuousLinear {
        #[serde(default)]
        time_scale: TimeScale,
    },
    PulsatileLinear {
        #[serde(default)]
        time_scale: TimeScale,
    },
    ContinuousModel {
        #[serde(default)]
        n0: f64,
    },
    PulsatileModel {
        #[serde(default)]
        n0: f64,
        #[serde(default)]
        steps: PulsatileSteps,
    },
}

impl SignalKind {
    /// Whether building this signal requires a loaded [Calibration]
    pub fn needs_calibration(&self) -> bool {
        matches!(
            self,
            SignalKind::ContinuousModel { .. } | SignalKind::PulsatileModel { .. }
        )
    }

    pub fn build(
        &self,
        calibration: Option<&Arc<Calibration>>,
    ) -> Result<Arc<dyn InputSignal>, OptonotchError> {
        let require_calibration = || {
            calibration
                .cloned()
                .ok_or_else(|| OptonotchError::MissingCalibrationData {
                    path: Calibration::default_dir(),
                    reason: format!("{self:?} needs the fitted import/export sub-models"),
                })
        };
        let signal: Arc<dyn InputSignal> = match *self {
            SignalKind::Ferrell => Arc::new(Ferrell),
            SignalKind::ContinuousLinear { time_scale } => {
                Arc::new(ContinuousLinear::new(time_scale)?)
            }
            SignalKind::PulsatileLinear { time_scale } => {
                Arc::new(PulsatileLinear::new(time_scale)?)
            }
            SignalKind::ContinuousModel { n0 } => Arc::new(ContinuousModel::new(require_calibration()?, n0)),
            SignalKind::PulsatileModel { n0, steps } => {
                Arc::new(PulsatileModel::new(require_calibration()?, n0, steps)?)
            }
        };
        Ok(signal)
    }
}

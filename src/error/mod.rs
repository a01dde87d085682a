use std::path::PathBuf;

use thiserror::Error;

use crate::data::DataError;

/// Errors raised while fitting a model to experimental data
#[derive(Error, Debug, Clone)]
pub enum OptonotchError {
    /// A caller handed in arguments that violate the evaluation contract
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The ODE solver could not produce a trajectory
    #[error("Integration failure: {0}")]
    IntegrationFailure(#[from] IntegrationError),

    /// The fitted import/export sub-models could not be loaded
    #[error("Missing calibration data at {}: {reason}", path.display())]
    MissingCalibrationData { path: PathBuf, reason: String },

    /// An error from reading an experiment export
    #[error(transparent)]
    Data(#[from] DataError),

    /// A summary statistic could not be computed
    #[error("Statistics error: {0}")]
    Stats(String),
}

impl OptonotchError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        OptonotchError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Whether this error came out of the numerical solver
    pub fn is_integration_failure(&self) -> bool {
        matches!(self, OptonotchError::IntegrationFailure(_))
    }
}

/// Ways in which the numerical integration of a model can fail
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrationError {
    /// The step size collapsed, usually a parameter close to 0.0 or infinite
    #[error("the step size of the ODE solver went to zero at t = {time}")]
    StepSizeTooSmall { time: f64 },

    /// More internal steps than allowed between two output times
    #[error("excess work done: {steps} steps taken before reaching t = {time}")]
    ExcessWork { time: f64, steps: usize },

    /// Any other failure reported by the solver
    #[error("solver error: {0}")]
    Solver(String),

    /// The model function panicked, e.g. by indexing past the parameter vector
    #[error("the model panicked: {0}")]
    ModelPanicked(String),
}

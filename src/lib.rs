//! Fitting ODE models of optogenetic Notch signaling to time-series data.
//!
//! Models are plain functions of the form [DiffEq] that are driven by an
//! [InputSignal], the normalized nuclear NICD level over time. The [signal]
//! module provides the stimulation protocols used in the experiments, the
//! [simulator] integrates a model on a time grid, and [fitting] scores a
//! parameter vector against measured data with a mean squared error.

pub mod calibration;
pub mod data;
pub mod error;
pub mod fitting;
pub mod signal;
pub mod simulator;
pub mod stats;

pub use calibration::Calibration;
pub use error::{IntegrationError, OptonotchError};
pub use fitting::{evaluate_loss, Dataset, LossProblem, StabilityMode};
pub use signal::{
    ContinuousLinear, ContinuousModel, Ferrell, InputSignal, PulsatileLinear, PulsatileModel,
    SignalKind,
};
pub use simulator::{simulate, DiffEq, SolverSettings, Trajectory};

pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::calibration::{self, Calibration, FittedSubModel, SubModel};
    pub use crate::data::{
        load_experiments, parse_experiments, EndTimes, ExperimentData, Measure, Protocol,
    };
    pub use crate::error::{IntegrationError, OptonotchError};
    pub use crate::fitting::{evaluate_loss, Dataset, LossProblem, StabilityMode};
    pub use crate::signal::{
        ContinuousLinear, ContinuousModel, Ferrell, InputSignal, PulsatileLinear, PulsatileModel,
        PulsatileSteps, SignalKind, TimeScale,
    };
    pub use crate::simulator::{simulate, DiffEq, SolverSettings, Trajectory, T, V};
    pub use crate::stats::{running_ci, running_mean, CiKind};

    /// Bind model parameters to names, in order.
    ///
    /// ```ignore
    /// let model: DiffEq = |x, p, t, dx, input| {
    ///     fetch_params!(p, k_in, k_out);
    ///     dx[0] = k_in * input.value(t) - k_out * x[0];
    /// };
    /// ```
    #[macro_export]
    macro_rules! fetch_params {
        ($p:expr, $($name:ident),*) => {
            let p = $p;
            let mut idx = 0;
            $(
                #[allow(unused_mut)]
                let mut $name = p[idx];
                idx += 1;
            )*
            let _ = idx;
        };
    }
}

#[cfg(test)]
mod tests {
    use crate::fetch_params;

    #[test]
    fn test_fetch_params_macro() {
        let params = vec![0.8, 0.25];

        fetch_params!(params, k_in, k_out);

        assert_eq!(k_in, 0.8);
        assert_eq!(k_out, 0.25);
    }
}

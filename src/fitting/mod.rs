//! Scoring simulated trajectories against measurements
//!
//! A [LossProblem] bundles a model, its initial state and time grid, an input
//! signal and one measured [Dataset]. [LossProblem::mse] integrates the model
//! for a parameter vector, interpolates the observable at the measurement
//! times, rescales it to data units and returns the mean squared error.
//!
//! The [StabilityMode] decides what happens when the solver gives up:
//! [StabilityMode::FailFast] returns the error, while
//! [StabilityMode::ToleratingSentinel] reports an infinite cost so that an
//! optimizer can move away from that region of parameter space.
//!
//! # Example
//!
//! ```rust,ignore
//! use optonotch::prelude::*;
//!
//! let input: Arc<dyn InputSignal> = Arc::new(ContinuousLinear::default());
//! let data = Dataset::new(vec![0.0, 5.0, 10.0], vec![0.0, 0.8, 1.4])?;
//! let problem = LossProblem::new(
//!     |x, p, t, dx, input| dx[0] = p[0] * input.value(t) - p[1] * x[0],
//!     vec![0.0],
//!     (0..=40).map(f64::from).collect(),
//!     input,
//!     data,
//!     2.0,
//! )?;
//! let cost = problem.mse(&[1.0, 0.5], StabilityMode::ToleratingSentinel)?;
//! ```

mod resample;

pub use resample::{interpolate, mean_squared_error};

use std::fmt;
use std::sync::Arc;

use argmin::core::{CostFunction, Error};
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    signal::InputSignal,
    simulator::{simulate, validate_time_grid, DiffEq, SolverSettings, Trajectory},
    OptonotchError,
};

/// What to do when the ODE solver fails during an evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityMode {
    /// Return the [OptonotchError::IntegrationFailure]
    #[default]
    FailFast,
    /// Return a cost of `f64::INFINITY` instead
    ToleratingSentinel,
}

impl From<bool> for StabilityMode {
    /// `true` corresponds to stabilized evaluation
    fn from(stabilize: bool) -> Self {
        if stabilize {
            StabilityMode::ToleratingSentinel
        } else {
            StabilityMode::FailFast
        }
    }
}

/// Measurement times and values of one replicate, in model time and data units
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl Dataset {
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Result<Self, OptonotchError> {
        if times.len() != values.len() {
            return Err(OptonotchError::invalid(format!(
                "{} measurement times but {} measured values",
                times.len(),
                values.len()
            )));
        }
        if times.is_empty() {
            return Err(OptonotchError::invalid("a dataset needs at least one measurement"));
        }
        Ok(Self { times, values })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Everything needed to score parameter vectors of one model against one dataset
#[derive(Clone)]
pub struct LossProblem {
    diffeq: DiffEq,
    initial_state: Vec<f64>,
    time_grid: Vec<f64>,
    input: Arc<dyn InputSignal>,
    data: Dataset,
    scale_factor: f64,
    settings: SolverSettings,
    nparams: Option<usize>,
}

impl fmt::Debug for LossProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LossProblem")
            .field("initial_state", &self.initial_state)
            .field("time_grid", &self.time_grid)
            .field("data", &self.data)
            .field("scale_factor", &self.scale_factor)
            .field("settings", &self.settings)
            .field("nparams", &self.nparams)
            .finish_non_exhaustive()
    }
}

impl LossProblem {
    pub fn new(
        diffeq: DiffEq,
        initial_state: Vec<f64>,
        time_grid: Vec<f64>,
        input: Arc<dyn InputSignal>,
        data: Dataset,
        scale_factor: f64,
    ) -> Result<Self, OptonotchError> {
        Self::build(
            diffeq,
            initial_state,
            time_grid,
            input,
            data,
            scale_factor,
            tracing::Level::WARN,
        )
    }

    /// Shared by [LossProblem::new] and [evaluate_loss]; `clamp_level` is the
    /// level at which out-of-grid measurement times are reported.
    fn build(
        diffeq: DiffEq,
        initial_state: Vec<f64>,
        time_grid: Vec<f64>,
        input: Arc<dyn InputSignal>,
        data: Dataset,
        scale_factor: f64,
        clamp_level: tracing::Level,
    ) -> Result<Self, OptonotchError> {
        validate_time_grid(&time_grid)?;
        if initial_state.is_empty() {
            return Err(OptonotchError::invalid(
                "the initial state needs at least the observable",
            ));
        }
        if !(scale_factor.is_finite() && scale_factor > 0.0) {
            return Err(OptonotchError::invalid(format!(
                "the scale factor must be positive, got {scale_factor}"
            )));
        }

        let (start, end) = (time_grid[0], time_grid[time_grid.len() - 1]);
        let outside = data
            .times()
            .iter()
            .filter(|&&t| t < start || t > end)
            .count();
        if outside > 0 {
            let message = format!(
                "{} of {} measurement times lie outside the time grid [{}, {}] and will be clamped",
                outside,
                data.len(),
                start,
                end
            );
            if clamp_level == tracing::Level::WARN {
                tracing::warn!("{}", message);
            } else {
                tracing::debug!("{}", message);
            }
        }

        Ok(Self {
            diffeq,
            initial_state,
            time_grid,
            input,
            data,
            scale_factor,
            settings: SolverSettings::default(),
            nparams: None,
        })
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Result<Self, OptonotchError> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    /// Reject parameter vectors that do not have exactly `nparams` entries
    pub fn with_nparams(mut self, nparams: usize) -> Self {
        self.nparams = Some(nparams);
        self
    }

    pub fn data(&self) -> &Dataset {
        &self.data
    }

    pub fn time_grid(&self) -> &[f64] {
        &self.time_grid
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    fn check_params(&self, params: &[f64]) -> Result<(), OptonotchError> {
        match self.nparams {
            Some(n) if n != params.len() => Err(OptonotchError::invalid(format!(
                "expected {} parameters, got {}",
                n,
                params.len()
            ))),
            _ => Ok(()),
        }
    }

    /// Integrate the model over the time grid
    pub fn simulate(&self, params: &[f64]) -> Result<Trajectory, OptonotchError> {
        self.check_params(params)?;
        simulate(
            self.diffeq,
            params,
            &self.initial_state,
            &self.time_grid,
            &self.input,
            &self.settings,
        )
    }

    /// The observable at the measurement times, rescaled to data units
    pub fn predictions(&self, params: &[f64]) -> Result<Vec<f64>, OptonotchError> {
        let trajectory = self.simulate(params)?;
        Ok(self.rescaled(&trajectory))
    }

    fn rescaled(&self, trajectory: &Trajectory) -> Vec<f64> {
        let observable = trajectory.observable().to_vec();
        interpolate(self.data.times(), &self.time_grid, &observable)
            .into_iter()
            .map(|value| value * self.scale_factor)
            .collect()
    }

    /// Mean squared error between the rescaled simulation and the data
    pub fn mse(&self, params: &[f64], mode: StabilityMode) -> Result<f64, OptonotchError> {
        let trajectory = match (self.simulate(params), mode) {
            (Ok(trajectory), _) => trajectory,
            (Err(OptonotchError::IntegrationFailure(err)), StabilityMode::ToleratingSentinel) => {
                tracing::debug!("Integration failed for {:?}, returning infinite cost: {}", params, err);
                return Ok(f64::INFINITY);
            }
            (Err(err), _) => return Err(err),
        };
        mean_squared_error(self.data.values(), &self.rescaled(&trajectory))
    }

    /// [LossProblem::mse] for many parameter vectors, evaluated in parallel.
    ///
    /// Results are returned in the order of `points`.
    pub fn mse_batch(
        &self,
        points: &[Vec<f64>],
        mode: StabilityMode,
        progress: bool,
    ) -> Vec<Result<f64, OptonotchError>> {
        let bar = if progress {
            ProgressBar::new(points.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        let results = points
            .par_iter()
            .map(|params| {
                let result = self.mse(params, mode);
                bar.inc(1);
                result
            })
            .collect();
        bar.finish_and_clear();
        results
    }
}

/// Optimizers see stabilized costs, failed integrations cost `f64::INFINITY`
impl CostFunction for LossProblem {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.mse(params, StabilityMode::ToleratingSentinel)?)
    }
}

/// Mean squared error of `diffeq` against one set of measurements.
///
/// Integrates `diffeq` with `params` over `time_grid` from `initial_state`,
/// interpolates state 0 at `data_times`, multiplies by `scale_factor` and
/// compares with `data_values`. See [StabilityMode] for failure handling.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_loss(
    params: &[f64],
    diffeq: DiffEq,
    initial_state: &[f64],
    time_grid: &[f64],
    input: &Arc<dyn InputSignal>,
    data_times: &[f64],
    data_values: &[f64],
    scale_factor: f64,
    mode: StabilityMode,
) -> Result<f64, OptonotchError> {
    let data = Dataset::new(data_times.to_vec(), data_values.to_vec())?;
    // runs once per parameter vector, clamped data times are only logged at debug level
    LossProblem::build(
        diffeq,
        initial_state.to_vec(),
        time_grid.to_vec(),
        input.clone(),
        data,
        scale_factor,
        tracing::Level::DEBUG,
    )?
    .mse(params, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{T, V};

    fn decay(x: &V, p: &V, _t: T, dx: &mut V, _input: &dyn InputSignal) {
        dx[0] = -p[0] * x[0];
    }

    fn problem() -> LossProblem {
        let data = Dataset::new(vec![0.0, 1.0], vec![2.0, 2.0 * (-1.0f64).exp()]).unwrap();
        LossProblem::new(
            decay,
            vec![1.0],
            vec![0.0, 0.5, 1.0],
            Arc::new(|_t: f64| 0.0),
            data,
            2.0,
        )
        .unwrap()
    }

    #[test]
    fn test_stability_mode_from_flag() {
        assert_eq!(StabilityMode::from(true), StabilityMode::ToleratingSentinel);
        assert_eq!(StabilityMode::from(false), StabilityMode::FailFast);
        assert_eq!(StabilityMode::default(), StabilityMode::FailFast);
    }

    #[test]
    fn test_dataset_validation() {
        assert!(Dataset::new(vec![0.0, 1.0], vec![1.0]).is_err());
        assert!(Dataset::new(vec![], vec![]).is_err());
        assert_eq!(Dataset::new(vec![1.0], vec![2.0]).unwrap().len(), 1);
    }

    #[test]
    fn test_scale_factor_must_be_positive() {
        let data = Dataset::new(vec![0.0], vec![1.0]).unwrap();
        for scale in [0.0, -1.0, f64::NAN] {
            let result = LossProblem::new(
                decay,
                vec![1.0],
                vec![0.0, 1.0],
                Arc::new(|_t: f64| 0.0),
                data.clone(),
                scale,
            );
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_parameter_count_is_checked() {
        let problem = problem().with_nparams(1);
        for mode in [StabilityMode::FailFast, StabilityMode::ToleratingSentinel] {
            let err = problem.mse(&[1.0, 2.0], mode).unwrap_err();
            assert!(matches!(err, OptonotchError::InvalidArgument { .. }));
        }
    }

    #[test]
    fn test_cost_function_matches_mse() {
        let problem = problem();
        let cost = problem.cost(&vec![1.0]).unwrap();
        let mse = problem.mse(&[1.0], StabilityMode::FailFast).unwrap();
        assert_eq!(cost, mse);
        assert!(cost < 1e-8);
    }

    #[test]
    fn test_cost_function_reports_infinity_on_failure() {
        let problem = problem()
            .with_settings(SolverSettings {
                max_steps: 1,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(problem.cost(&vec![1.0]).unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_evaluate_loss_clamps_out_of_grid_times() {
        let input: Arc<dyn InputSignal> = Arc::new(|_t: f64| 0.0);
        let times = [-1.0, 0.0, 1.0, 4.0];
        let values = [2.0, 2.0, 2.0 * (-1.0f64).exp(), 2.0 * (-1.0f64).exp()];
        for _ in 0..3 {
            let mse = evaluate_loss(
                &[1.0],
                decay,
                &[1.0],
                &[0.0, 0.5, 1.0],
                &input,
                &times,
                &values,
                2.0,
                StabilityMode::FailFast,
            )
            .unwrap();
            assert!(mse < 1e-6, "mse = {}", mse);
        }

        let data = Dataset::new(times.to_vec(), values.to_vec()).unwrap();
        let problem =
            LossProblem::new(decay, vec![1.0], vec![0.0, 0.5, 1.0], input, data, 2.0).unwrap();
        let direct = problem.mse(&[1.0], StabilityMode::FailFast).unwrap();
        assert!(direct < 1e-6, "mse = {}", direct);
    }
}

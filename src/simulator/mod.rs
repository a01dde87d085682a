mod ode;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{error::IntegrationError, signal::InputSignal, OptonotchError};

pub type T = f64;
pub type V = nalgebra::DVector<T>;
pub type M = nalgebra::DMatrix<T>;

/// This function represents the differential equation of the model:
/// Params:
/// - x: The state vector at time t; `x[0]` is the observable compared against data
/// - p: The parameters of the model
/// - t: The time at which the differential equation is evaluated
/// - dx: A mutable reference to the derivative of the state vector at time t, zeroed before each call
/// - input: The driving signal; evaluate it with `input.value(t)`
/// Example:
/// ```ignore
/// use optonotch::prelude::*;
/// let diff_eq: DiffEq = |x, p, t, dx, input| {
///     let (k_on, k_off) = (p[0], p[1]);
///     dx[0] = k_on * input.value(t) - k_off * x[0];
/// };
/// ```
pub type DiffEq = fn(&V, &V, T, &mut V, &dyn InputSignal);

/// Tolerances and limits of the BDF solver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub rtol: f64,
    pub atol: f64,
    /// Initial step size
    pub h0: f64,
    /// Internal steps allowed between two consecutive grid points
    pub max_steps: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-8,
            h0: 1e-3,
            max_steps: 500,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<(), OptonotchError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !(positive(self.rtol) && positive(self.atol) && positive(self.h0)) {
            return Err(OptonotchError::invalid(format!(
                "solver tolerances and initial step must be positive, got {self:?}"
            )));
        }
        if self.max_steps == 0 {
            return Err(OptonotchError::invalid("max_steps must be at least 1"));
        }
        Ok(())
    }
}

/// States of a simulated model at each point of the time grid
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    times: Array1<f64>,
    states: Array2<f64>,
}

impl Trajectory {
    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    /// One row per grid point, one column per state
    pub fn states(&self) -> ArrayView2<'_, f64> {
        self.states.view()
    }

    /// The first state, which is compared against measurements
    pub fn observable(&self) -> ArrayView1<'_, f64> {
        self.states.column(0)
    }

    pub fn state_at(&self, index: usize) -> Option<ArrayView1<'_, f64>> {
        (index < self.len()).then(|| self.states.row(index))
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn nstates(&self) -> usize {
        self.states.ncols()
    }
}

pub(crate) fn validate_time_grid(time_grid: &[f64]) -> Result<(), OptonotchError> {
    if time_grid.is_empty() {
        return Err(OptonotchError::invalid("the time grid is empty"));
    }
    if time_grid.iter().any(|t| !t.is_finite()) {
        return Err(OptonotchError::invalid("the time grid contains non-finite times"));
    }
    if let Some(pair) = time_grid.windows(2).find(|pair| pair[1] <= pair[0]) {
        return Err(OptonotchError::invalid(format!(
            "the time grid must be strictly increasing, found {} followed by {}",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Integrate `diffeq` forward from `initial_state`, forced by `input`.
///
/// The state is recorded at every point of `time_grid`, the first of which is
/// the initial time. Solver failures, and panics raised by `diffeq` itself,
/// are returned as [OptonotchError::IntegrationFailure].
pub fn simulate(
    diffeq: DiffEq,
    params: &[f64],
    initial_state: &[f64],
    time_grid: &[f64],
    input: &Arc<dyn InputSignal>,
    settings: &SolverSettings,
) -> Result<Trajectory, OptonotchError> {
    validate_time_grid(time_grid)?;
    if initial_state.is_empty() {
        return Err(OptonotchError::invalid(
            "the initial state needs at least the observable",
        ));
    }
    settings.validate()?;

    let states = panic::catch_unwind(AssertUnwindSafe(|| {
        ode::integrate(diffeq, params, initial_state, time_grid, input, settings)
    }))
    .map_err(|payload| IntegrationError::ModelPanicked(panic_message(&*payload)))??;
    Ok(Trajectory {
        times: Array1::from(time_grid.to_vec()),
        states,
    })
}

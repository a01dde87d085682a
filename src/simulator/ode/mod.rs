mod closure;

use std::sync::Arc;

use diffsol::{
    error::{DiffsolError, OdeSolverError},
    NalgebraLU, OdeBuilder, OdeSolverMethod, OdeSolverStopReason,
};
use ndarray::Array2;

use crate::{
    error::IntegrationError,
    signal::InputSignal,
    simulator::{DiffEq, SolverSettings, M},
};
use closure::SignalProblem;

/// Map a diffsol failure at time `time` onto the crate's integration errors
fn integration_error(error: DiffsolError, time: f64) -> IntegrationError {
    match error {
        DiffsolError::OdeSolverError(OdeSolverError::StepSizeTooSmall { .. }) => {
            IntegrationError::StepSizeTooSmall { time }
        }
        other => IntegrationError::Solver(other.to_string()),
    }
}

/// Integrate `diffeq` with the BDF solver and record the state at every grid point.
///
/// Row `i` of the result is the state at `time_grid[i]`. The grid must be
/// strictly increasing and `initial_state` non-empty; callers validate both.
pub(crate) fn integrate(
    diffeq: DiffEq,
    params: &[f64],
    initial_state: &[f64],
    time_grid: &[f64],
    input: &Arc<dyn InputSignal>,
    settings: &SolverSettings,
) -> Result<Array2<f64>, IntegrationError> {
    let nstates = initial_state.len();
    let t0 = time_grid[0];

    let problem = OdeBuilder::<M>::new()
        .atol(vec![settings.atol; nstates])
        .rtol(settings.rtol)
        .t0(t0)
        .h0(settings.h0)
        .p(params.to_vec())
        .build_from_eqn(SignalProblem::new(
            diffeq,
            params,
            initial_state,
            input.clone(),
        ))
        .map_err(|e| integration_error(e, t0))?;

    let mut solver = problem
        .bdf::<NalgebraLU<f64>>()
        .map_err(|e| integration_error(e, t0))?;

    let mut states = Array2::zeros((time_grid.len(), nstates));
    for (j, value) in solver.state().y.iter().enumerate() {
        states[[0, j]] = *value;
    }

    let mut total_steps = 0;
    for (i, &t_stop) in time_grid.iter().enumerate().skip(1) {
        solver
            .set_stop_time(t_stop)
            .map_err(|e| integration_error(e, t_stop))?;

        let mut steps = 0;
        loop {
            match solver.step() {
                Ok(OdeSolverStopReason::TstopReached) => break,
                Ok(_) => {
                    steps += 1;
                    if steps >= settings.max_steps {
                        return Err(IntegrationError::ExcessWork {
                            time: t_stop,
                            steps,
                        });
                    }
                }
                Err(e) => return Err(integration_error(e, solver.state().t)),
            }
        }
        total_steps += steps;

        for (j, value) in solver.state().y.iter().enumerate() {
            states[[i, j]] = *value;
        }
    }

    tracing::trace!(
        "Integrated {} states over {} grid points in {} steps",
        nstates,
        time_grid.len(),
        total_steps
    );
    Ok(states)
}

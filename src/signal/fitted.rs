use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::schedule::{Direction, Phase, PhaseLaw, PhaseSchedule};
use super::InputSignal;
use crate::calibration::Calibration;
use crate::OptonotchError;

/// Imports follow `on_model`, exports follow `off_model`
#[derive(Debug, Clone)]
pub struct FittedLaw {
    calibration: Arc<Calibration>,
}

impl FittedLaw {
    pub fn new(calibration: Arc<Calibration>) -> Self {
        Self { calibration }
    }
}

impl PhaseLaw for FittedLaw {
    #[inline(always)]
    fn advance(&self, direction: Direction, initial: f64, elapsed: f64) -> f64 {
        match direction {
            Direction::Import => self.calibration.on_model(initial, elapsed),
            Direction::Export => self.calibration.off_model(initial, elapsed),
        }
    }
}

/// Empirically fitted import model for continuous activation
#[derive(Debug, Clone)]
pub struct ContinuousModel {
    calibration: Arc<Calibration>,
    n0: f64,
}

impl ContinuousModel {
    pub fn new(calibration: Arc<Calibration>, n0: f64) -> Self {
        Self { calibration, n0 }
    }
}

impl InputSignal for ContinuousModel {
    #[inline(always)]
    fn value(&self, t: f64) -> f64 {
        self.calibration.on_model(self.n0, t)
    }
}

/// Phase boundaries of the fitted pulsatile protocol.
///
/// These differ from the linear protocol's boundaries since both were fitted
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulsatileSteps {
    pub off_step1: f64,
    pub on_step2: f64,
    pub off_step2: f64,
    pub on_step3: f64,
    pub end_step: f64,
}

impl Default for PulsatileSteps {
    fn default() -> Self {
        Self {
            off_step1: 4.5,
            on_step2: 14.5,
            off_step2: 19.0,
            on_step3: 29.0,
            end_step: 32.0,
        }
    }
}

impl PulsatileSteps {
    /// End time of each of the five phases
    pub fn ends(&self) -> [f64; 5] {
        [
            self.off_step1,
            self.on_step2,
            self.off_step2,
            self.on_step3,
            self.end_step,
        ]
    }
}

/// Empirically fitted import-export model for pulsatile activation
#[derive(Debug, Clone)]
pub struct PulsatileModel {
    schedule: PhaseSchedule<FittedLaw>,
    steps: PulsatileSteps,
}

impl PulsatileModel {
    pub fn new(
        calibration: Arc<Calibration>,
        n0: f64,
        steps: PulsatileSteps,
    ) -> Result<Self, OptonotchError> {
        let schedule = PhaseSchedule::alternating(
            FittedLaw::new(calibration),
            &steps.ends(),
            Direction::Import,
            n0,
        )?;
        Ok(Self { schedule, steps })
    }

    pub fn steps(&self) -> &PulsatileSteps {
        &self.steps
    }

    pub fn phases(&self) -> &[Phase] {
        self.schedule.phases()
    }
}

impl InputSignal for PulsatileModel {
    #[inline(always)]
    fn value(&self, t: f64) -> f64 {
        self.schedule.value(t)
    }

    fn final_breakpoint(&self) -> Option<f64> {
        Some(self.steps.end_step)
    }
}

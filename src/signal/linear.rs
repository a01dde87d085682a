use super::schedule::{Direction, Phase, PhaseLaw, PhaseSchedule};
use super::{InputSignal, TimeScale, EXP_EXPORT_TIME, EXP_IMPORT_TIME};
use crate::OptonotchError;

/// Lowest value of the linear pulsatile signal; some models degenerate at exactly zero
pub const SIGNAL_FLOOR: f64 = 0.001;

/// Phase ends of the linear pulsatile protocol, in experiment time
pub const PULSATILE_LINEAR_ENDS: [f64; 5] = [5.0, 14.0, 19.0, 28.0, 32.0];

/// Linear approximation to continuous activation.
///
/// Ramps from 0 to 1 over the import time, then stays at 1.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContinuousLinear {
    time_scale: TimeScale,
}

impl ContinuousLinear {
    pub fn new(time_scale: TimeScale) -> Result<Self, OptonotchError> {
        time_scale.validate()?;
        Ok(Self { time_scale })
    }

    fn import_time(&self) -> f64 {
        self.time_scale.to_sim(EXP_IMPORT_TIME)
    }
}

impl InputSignal for ContinuousLinear {
    fn value(&self, t: f64) -> f64 {
        let import_time = self.import_time();
        if t <= import_time {
            t / import_time
        } else {
            1.0
        }
    }

    fn final_breakpoint(&self) -> Option<f64> {
        Some(self.import_time())
    }
}

/// Constant-rate import and export, bounded to `[floor, 1.0]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearLaw {
    pub import_time: f64,
    pub export_time: f64,
    pub floor: f64,
}

impl PhaseLaw for LinearLaw {
    #[inline(always)]
    fn advance(&self, direction: Direction, initial: f64, elapsed: f64) -> f64 {
        let value = match direction {
            Direction::Import => initial + elapsed / self.import_time,
            Direction::Export => initial - elapsed / self.export_time,
        };
        value.max(self.floor).min(1.0)
    }
}

/// Linear approximation to pulsatile activation.
///
/// Five alternating phases (import, export, import, export, import) ending at
/// [PULSATILE_LINEAR_ENDS], rescaled to simulation time.
#[derive(Debug, Clone)]
pub struct PulsatileLinear {
    schedule: PhaseSchedule<LinearLaw>,
}

impl PulsatileLinear {
    pub fn new(time_scale: TimeScale) -> Result<Self, OptonotchError> {
        time_scale.validate()?;
        let law = LinearLaw {
            import_time: time_scale.to_sim(EXP_IMPORT_TIME),
            export_time: time_scale.to_sim(EXP_EXPORT_TIME),
            floor: SIGNAL_FLOOR,
        };
        let ends = PULSATILE_LINEAR_ENDS.map(|end| time_scale.to_sim(end));
        let schedule = PhaseSchedule::alternating(law, &ends, Direction::Import, 0.0)?;
        Ok(Self { schedule })
    }

    pub fn phases(&self) -> &[Phase] {
        self.schedule.phases()
    }
}

impl InputSignal for PulsatileLinear {
    #[inline(always)]
    fn value(&self, t: f64) -> f64 {
        self.schedule.value(t)
    }

    fn final_breakpoint(&self) -> Option<f64> {
        Some(self.schedule.end_time())
    }
}

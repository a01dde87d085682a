use serde::{Deserialize, Serialize};

use crate::OptonotchError;

/// Whether nuclear NICD is rising or falling during a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Import,
    Export,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Import => Direction::Export,
            Direction::Export => Direction::Import,
        }
    }
}

/// Trajectory of the signal within a single phase.
///
/// `advance` receives the value at the phase start and the time elapsed since
/// then. It must be monotonic in `elapsed` (increasing for imports, decreasing
/// for exports) and return `initial` for `elapsed == 0.0`.
pub trait PhaseLaw: Send + Sync {
    fn advance(&self, direction: Direction, initial: f64, elapsed: f64) -> f64;
}

/// One segment of a [PhaseSchedule]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phase {
    pub start: f64,
    pub end: f64,
    pub direction: Direction,
    /// Value of the signal at `start`, the terminal value of the previous phase
    pub initial: f64,
}

impl Phase {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    #[inline(always)]
    pub fn evaluate<L: PhaseLaw>(&self, law: &L, t: f64) -> f64 {
        law.advance(self.direction, self.initial, t - self.start)
    }
}

/// An ordered list of phases stitched together at their boundaries.
///
/// The initial condition of every phase is computed once, when the schedule
/// is built, by evaluating the previous phase at its end. A query at a shared
/// boundary belongs to the earlier phase; queries past the last boundary return
/// the value at that boundary.
#[derive(Debug, Clone)]
pub struct PhaseSchedule<L> {
    law: L,
    phases: Vec<Phase>,
    terminal: f64,
}

impl<L: PhaseLaw> PhaseSchedule<L> {
    /// Build a schedule of alternating phases starting at `t = 0`.
    ///
    /// `ends` holds the end time of every phase and must be strictly increasing
    /// and positive.
    pub fn alternating(
        law: L,
        ends: &[f64],
        first: Direction,
        initial: f64,
    ) -> Result<Self, OptonotchError> {
        if ends.is_empty() {
            return Err(OptonotchError::invalid("a phase schedule needs at least one phase"));
        }

        let mut phases = Vec::with_capacity(ends.len());
        let mut start = 0.0;
        let mut direction = first;
        let mut value = initial;
        for &end in ends {
            if !end.is_finite() || end <= start {
                return Err(OptonotchError::invalid(format!(
                    "phase boundaries must be finite and strictly increasing, got {end} after {start}"
                )));
            }
            let phase = Phase {
                start,
                end,
                direction,
                initial: value,
            };
            value = phase.evaluate(&law, end);
            phases.push(phase);
            start = end;
            direction = direction.flip();
        }

        Ok(Self {
            law,
            phases,
            terminal: value,
        })
    }

    #[inline(always)]
    pub fn value(&self, t: f64) -> f64 {
        let index = self.phases.partition_point(|phase| phase.end < t);
        match self.phases.get(index) {
            Some(phase) => phase.evaluate(&self.law, t),
            None => self.terminal,
        }
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Value at the last boundary, returned for every later time
    pub fn terminal(&self) -> f64 {
        self.terminal
    }

    pub fn end_time(&self) -> f64 {
        self.phases.last().map_or(0.0, |phase| phase.end)
    }

    pub fn law(&self) -> &L {
        &self.law
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unit;

    impl PhaseLaw for Unit {
        fn advance(&self, direction: Direction, initial: f64, elapsed: f64) -> f64 {
            match direction {
                Direction::Import => initial + elapsed,
                Direction::Export => initial - elapsed,
            }
        }
    }

    #[test]
    fn test_initial_conditions_chain_forward() {
        let schedule = PhaseSchedule::alternating(Unit, &[2.0, 3.0, 7.0], Direction::Import, 1.0)
            .unwrap();
        let initials: Vec<f64> = schedule.phases().iter().map(|p| p.initial).collect();
        assert_eq!(initials, vec![1.0, 3.0, 2.0]);
        assert_eq!(schedule.terminal(), 6.0);
        assert_eq!(schedule.end_time(), 7.0);
    }

    #[test]
    fn test_boundary_belongs_to_earlier_phase() {
        let schedule =
            PhaseSchedule::alternating(Unit, &[2.0, 3.0], Direction::Import, 0.0).unwrap();
        assert_eq!(schedule.value(2.0), 2.0);
        assert_eq!(schedule.value(2.5), 1.5);
        assert_eq!(schedule.value(3.0), 1.0);
        assert_eq!(schedule.value(100.0), 1.0);
    }

    #[test]
    fn test_rejects_unordered_boundaries() {
        assert!(PhaseSchedule::alternating(Unit, &[2.0, 2.0], Direction::Import, 0.0).is_err());
        assert!(PhaseSchedule::alternating(Unit, &[-1.0], Direction::Import, 0.0).is_err());
        assert!(PhaseSchedule::alternating(Unit, &[], Direction::Export, 0.0).is_err());
    }
}

//! Experiment exports and their preparation for fitting
//!
//! Spot-detection results are exported as one tab-delimited row per sample
//! and quantity (see [parse_experiments]). The rows are grouped per
//! stimulation [Protocol] into [ConditionData], which can be truncated to a
//! common end time, mapped onto the model time scale and turned into a
//! [Dataset] for a single replicate.

pub mod parser;

pub use parser::{load_experiments, parse_experiments};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{fitting::Dataset, OptonotchError};

/// Errors raised while reading or preparing experiment exports
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// Error encountered when reading the delimited file
    #[error("CSV error: {0}")]
    CSVError(String),
    /// A field could not be read as a number
    #[error("Parse error on line {line}: {value:?} is not a number")]
    NumberError { line: u64, value: String },
    /// A row is too short to carry condition, sample and tag
    #[error("Line {line} has {found} fields, expected at least 3")]
    ShortRow { line: u64, found: usize },
    /// Replicate series of one condition do not pair up
    #[error("{protocol} has {times} time series, {counts} count series and {ints} intensity series")]
    UnpairedSeries {
        protocol: Protocol,
        times: usize,
        counts: usize,
        ints: usize,
    },
    /// A replicate has more or fewer values than time points
    #[error("Replicate {replicate} of {protocol} has {times} time points but {values} values")]
    LengthMismatch {
        protocol: Protocol,
        replicate: usize,
        times: usize,
        values: usize,
    },
    #[error("No {protocol} data in the experiment export")]
    MissingCondition { protocol: Protocol },
    #[error("No replicate {replicate} for {protocol}, {available} available")]
    MissingReplicate {
        protocol: Protocol,
        replicate: usize,
        available: usize,
    },
    #[error("Unknown stimulation protocol {0:?}")]
    UnknownProtocol(String),
}

/// Optogenetic stimulation protocol of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Continuous,
    Pulsatile,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Continuous => write!(f, "continuous"),
            Protocol::Pulsatile => write!(f, "pulsatile"),
        }
    }
}

impl FromStr for Protocol {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continuous" => Ok(Protocol::Continuous),
            "pulsatile" => Ok(Protocol::Pulsatile),
            other => Err(DataError::UnknownProtocol(other.to_string())),
        }
    }
}

/// Which measured quantity to fit against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    /// Number of detected spots
    Counts,
    /// Summed spot intensity
    TotalIntensity,
}

/// Per-protocol end times, in the units of whatever they are applied to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndTimes {
    pub continuous: f64,
    pub pulsatile: f64,
}

impl Default for EndTimes {
    fn default() -> Self {
        Self {
            continuous: 40.0,
            pulsatile: 32.0,
        }
    }
}

impl EndTimes {
    pub fn get(&self, protocol: Protocol) -> f64 {
        match protocol {
            Protocol::Continuous => self.continuous,
            Protocol::Pulsatile => self.pulsatile,
        }
    }
}

/// All replicates recorded under one protocol.
///
/// Replicate `i` pairs `times[i]` with `counts[i]` and `ints[i]`, all of the
/// same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionData {
    times: Vec<Vec<f64>>,
    counts: Vec<Vec<f64>>,
    ints: Vec<Vec<f64>>,
}

impl ConditionData {
    pub fn new(
        protocol: Protocol,
        times: Vec<Vec<f64>>,
        counts: Vec<Vec<f64>>,
        ints: Vec<Vec<f64>>,
    ) -> Result<Self, DataError> {
        if times.len() != counts.len() || times.len() != ints.len() {
            return Err(DataError::UnpairedSeries {
                protocol,
                times: times.len(),
                counts: counts.len(),
                ints: ints.len(),
            });
        }
        for (replicate, ((t, c), i)) in times.iter().zip(&counts).zip(&ints).enumerate() {
            if let Some(values) = [c.len(), i.len()].into_iter().find(|&n| n != t.len()) {
                return Err(DataError::LengthMismatch {
                    protocol,
                    replicate,
                    times: t.len(),
                    values,
                });
            }
        }
        Ok(Self { times, counts, ints })
    }

    pub fn replicates(&self) -> usize {
        self.times.len()
    }

    pub fn times(&self) -> &[Vec<f64>] {
        &self.times
    }

    pub fn counts(&self) -> &[Vec<f64>] {
        &self.counts
    }

    pub fn ints(&self) -> &[Vec<f64>] {
        &self.ints
    }

    fn values(&self, measure: Measure) -> &[Vec<f64>] {
        match measure {
            Measure::Counts => &self.counts,
            Measure::TotalIntensity => &self.ints,
        }
    }

    fn truncate(&mut self, end: f64) {
        for ((times, counts), ints) in self
            .times
            .iter_mut()
            .zip(self.counts.iter_mut())
            .zip(self.ints.iter_mut())
        {
            let keep: Vec<bool> = times.iter().map(|&t| t <= end).collect();
            for series in [times, counts, ints] {
                let mut flags = keep.iter();
                series.retain(|_| flags.next().copied().unwrap_or(false));
            }
        }
    }

    fn scale_times(&mut self, sim_end: f64, exp_end: f64) {
        self.times
            .iter_mut()
            .flatten()
            .for_each(|t| *t = *t / exp_end * sim_end);
    }

    fn scale_ints(&mut self, max_totalint: f64) {
        self.ints.iter_mut().flatten().for_each(|v| *v /= max_totalint);
    }
}

/// Experiment export grouped by [Protocol]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentData {
    conditions: BTreeMap<Protocol, ConditionData>,
}

impl ExperimentData {
    pub fn new(conditions: BTreeMap<Protocol, ConditionData>) -> Self {
        Self { conditions }
    }

    pub fn condition(&self, protocol: Protocol) -> Option<&ConditionData> {
        self.conditions.get(&protocol)
    }

    pub fn protocols(&self) -> impl Iterator<Item = Protocol> + '_ {
        self.conditions.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Drop every sample recorded after the protocol's end time
    pub fn truncate(mut self, end_times: &EndTimes) -> Self {
        for (protocol, condition) in self.conditions.iter_mut() {
            condition.truncate(end_times.get(*protocol));
        }
        self
    }

    /// Map experiment times onto the simulation time scale.
    ///
    /// Each time becomes `t / exp_end * sim_end` for its protocol.
    pub fn rescale_time(mut self, sim_end_times: &EndTimes, exp_end_times: &EndTimes) -> Self {
        for (protocol, condition) in self.conditions.iter_mut() {
            condition.scale_times(sim_end_times.get(*protocol), exp_end_times.get(*protocol));
        }
        self
    }

    /// Divide all total intensities by `max_totalint`
    pub fn rescale_intensity(mut self, max_totalint: f64) -> Self {
        for condition in self.conditions.values_mut() {
            condition.scale_ints(max_totalint);
        }
        self
    }

    /// One replicate of one protocol, ready for a [crate::fitting::LossProblem]
    pub fn dataset(
        &self,
        protocol: Protocol,
        replicate: usize,
        measure: Measure,
    ) -> Result<Dataset, OptonotchError> {
        let condition = self
            .condition(protocol)
            .ok_or(DataError::MissingCondition { protocol })?;
        let (Some(times), Some(values)) = (
            condition.times.get(replicate),
            condition.values(measure).get(replicate),
        ) else {
            return Err(DataError::MissingReplicate {
                protocol,
                replicate,
                available: condition.replicates(),
            }
            .into());
        };
        Dataset::new(times.clone(), values.clone())
    }
}

/// Intensity scale used when preparing exports for fitting
pub const MAX_TOTALINT: f64 = 300.0;

#[cfg(test)]
mod tests {
    use super::*;

    fn experiment() -> ExperimentData {
        let continuous = ConditionData::new(
            Protocol::Continuous,
            vec![vec![0.0, 20.0, 40.0, 60.0]],
            vec![vec![1.0, 2.0, 3.0, 4.0]],
            vec![vec![300.0, 600.0, 900.0, 1200.0]],
        )
        .unwrap();
        let pulsatile = ConditionData::new(
            Protocol::Pulsatile,
            vec![vec![0.0, 16.0, 32.0, 48.0], vec![8.0, 40.0]],
            vec![vec![5.0, 6.0, 7.0, 8.0], vec![1.0, 1.0]],
            vec![vec![0.0, 3.0, 6.0, 9.0], vec![30.0, 30.0]],
        )
        .unwrap();
        ExperimentData::new(BTreeMap::from([
            (Protocol::Continuous, continuous),
            (Protocol::Pulsatile, pulsatile),
        ]))
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!("continuous".parse::<Protocol>().unwrap(), Protocol::Continuous);
        assert_eq!(Protocol::Pulsatile.to_string(), "pulsatile");
        assert!("sustained".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_condition_rejects_unpaired_series() {
        let err = ConditionData::new(
            Protocol::Continuous,
            vec![vec![0.0, 1.0]],
            vec![vec![1.0]],
            vec![vec![1.0, 2.0]],
        )
        .unwrap_err();
        assert!(matches!(err, DataError::LengthMismatch { values: 1, .. }));

        let err =
            ConditionData::new(Protocol::Pulsatile, vec![vec![0.0]], vec![], vec![vec![1.0]])
                .unwrap_err();
        assert!(matches!(err, DataError::UnpairedSeries { counts: 0, .. }));
    }

    #[test]
    fn test_truncate_uses_protocol_end_times() {
        let data = experiment().truncate(&EndTimes::default());
        let continuous = data.condition(Protocol::Continuous).unwrap();
        assert_eq!(continuous.times()[0], vec![0.0, 20.0, 40.0]);
        assert_eq!(continuous.counts()[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(continuous.ints()[0], vec![300.0, 600.0, 900.0]);

        let pulsatile = data.condition(Protocol::Pulsatile).unwrap();
        assert_eq!(pulsatile.times()[0], vec![0.0, 16.0, 32.0]);
        assert_eq!(pulsatile.times()[1], vec![8.0]);
        assert_eq!(pulsatile.ints()[1], vec![30.0]);
    }

    #[test]
    fn test_rescale_time_and_intensity() {
        let sim = EndTimes {
            continuous: 4.0,
            pulsatile: 32.0,
        };
        let data = experiment()
            .rescale_time(&sim, &EndTimes::default())
            .rescale_intensity(MAX_TOTALINT);
        let continuous = data.condition(Protocol::Continuous).unwrap();
        assert_eq!(continuous.times()[0], vec![0.0, 2.0, 4.0, 6.0]);
        assert_eq!(continuous.ints()[0], vec![1.0, 2.0, 3.0, 4.0]);
        // counts are left alone
        assert_eq!(continuous.counts()[0], vec![1.0, 2.0, 3.0, 4.0]);

        let pulsatile = data.condition(Protocol::Pulsatile).unwrap();
        assert_eq!(pulsatile.times()[0], vec![0.0, 16.0, 32.0, 48.0]);
        assert_eq!(pulsatile.ints()[1], vec![0.1, 0.1]);
    }

    #[test]
    fn test_dataset_for_replicate() {
        let data = experiment();
        let dataset = data
            .dataset(Protocol::Pulsatile, 1, Measure::Counts)
            .unwrap();
        assert_eq!(dataset.times(), &[8.0, 40.0]);
        assert_eq!(dataset.values(), &[1.0, 1.0]);

        let dataset = data
            .dataset(Protocol::Continuous, 0, Measure::TotalIntensity)
            .unwrap();
        assert_eq!(dataset.values()[3], 1200.0);
    }

    #[test]
    fn test_dataset_errors() {
        let data = experiment();
        let err = data.dataset(Protocol::Continuous, 3, Measure::Counts).unwrap_err();
        assert!(matches!(
            err,
            OptonotchError::Data(DataError::MissingReplicate { available: 1, .. })
        ));

        let empty = ExperimentData::default();
        let err = empty.dataset(Protocol::Pulsatile, 0, Measure::Counts).unwrap_err();
        assert!(matches!(err, OptonotchError::Data(DataError::MissingCondition { .. })));

        // truncating everything away leaves nothing to fit against
        let cut = experiment().truncate(&EndTimes {
            continuous: -1.0,
            pulsatile: 32.0,
        });
        let err = cut.dataset(Protocol::Continuous, 0, Measure::Counts).unwrap_err();
        assert!(matches!(err, OptonotchError::InvalidArgument { .. }));
    }

    #[test]
    fn test_end_times_from_json() {
        let end_times: EndTimes = serde_json::from_str(r#"{ "pulsatile": 30.0 }"#).unwrap();
        assert_eq!(end_times.get(Protocol::Continuous), 40.0);
        assert_eq!(end_times.get(Protocol::Pulsatile), 30.0);
    }
}

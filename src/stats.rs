//! Running summaries of scattered time-series measurements
//!
//! Both functions slide a window of half-width `window` over every distinct
//! measurement time and summarize the samples that fall inside it. Time points
//! whose window holds fewer than `min_samples` samples are left out of the
//! result, and pairs where either the time or the value is NaN are ignored.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use statrs::statistics::Statistics;

use crate::OptonotchError;

pub const DEFAULT_WINDOW: f64 = 1.0;
pub const DEFAULT_MIN_SAMPLES: usize = 9;

const CONFIDENCE: f64 = 0.95;

/// Kind of interval reported by [running_ci]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiKind {
    /// 95% interval for a single draw, `mean ± z * std`
    #[default]
    Single,
    /// 95% confidence interval of the mean, Student's t with `n - 1` degrees of freedom
    Mean,
    /// `mean ± std`
    Stdev,
}

/// Samples in the window around each distinct time point
fn windows(
    t: &[f64],
    y: &[f64],
    window: f64,
) -> Result<Vec<(f64, Vec<f64>)>, OptonotchError> {
    if t.len() != y.len() {
        return Err(OptonotchError::invalid(format!(
            "{} time points but {} values",
            t.len(),
            y.len()
        )));
    }
    if !(window.is_finite() && window >= 0.0) {
        return Err(OptonotchError::invalid(format!(
            "the window half-width must be non-negative, got {window}"
        )));
    }

    let pairs: Vec<(f64, f64)> = t
        .iter()
        .zip(y)
        .filter(|(ti, yi)| !ti.is_nan() && !yi.is_nan())
        .map(|(&ti, &yi)| (ti, yi))
        .collect();

    let mut points: Vec<f64> = pairs.iter().map(|&(ti, _)| ti).collect();
    points.sort_by(f64::total_cmp);
    points.dedup();

    Ok(points
        .into_iter()
        .map(|tp| {
            let samples = pairs
                .iter()
                .filter(|&&(ti, _)| tp - window <= ti && ti <= tp + window)
                .map(|&(_, yi)| yi)
                .collect();
            (tp, samples)
        })
        .collect())
}

/// Running mean of `y` over `t`.
///
/// Returns the retained time points and the mean of each window.
pub fn running_mean(
    t: &[f64],
    y: &[f64],
    window: f64,
    min_samples: usize,
) -> Result<(Vec<f64>, Vec<f64>), OptonotchError> {
    Ok(windows(t, y, window)?
        .into_iter()
        .filter(|(_, samples)| samples.len() >= min_samples && !samples.is_empty())
        .map(|(tp, samples)| (tp, samples.mean()))
        .unzip())
}

/// Running 95% interval of `y` over `t`, as `[lower, upper]` per retained time point.
///
/// A window in which all values are equal yields the degenerate interval
/// `[value, value]` regardless of `kind`.
pub fn running_ci(
    t: &[f64],
    y: &[f64],
    kind: CiKind,
    window: f64,
    min_samples: usize,
) -> Result<(Vec<f64>, Vec<[f64; 2]>), OptonotchError> {
    let z = Normal::new(0.0, 1.0)
        .map_err(|e| OptonotchError::Stats(e.to_string()))?
        .inverse_cdf(0.5 + CONFIDENCE / 2.0);

    let mut times = Vec::new();
    let mut intervals = Vec::new();
    for (tp, samples) in windows(t, y, window)? {
        if samples.len() < min_samples || samples.is_empty() {
            continue;
        }
        let first = samples[0];
        let interval = if samples.iter().all(|&v| v == first) {
            [first, first]
        } else {
            let n = samples.len() as f64;
            let mean = samples.iter().mean();
            match kind {
                CiKind::Single => {
                    let half = z * samples.iter().population_std_dev();
                    [mean - half, mean + half]
                }
                CiKind::Mean => {
                    let sem = samples.iter().std_dev() / n.sqrt();
                    let q = StudentsT::new(0.0, 1.0, n - 1.0)
                        .map_err(|e| OptonotchError::Stats(e.to_string()))?
                        .inverse_cdf(0.5 + CONFIDENCE / 2.0);
                    [mean - q * sem, mean + q * sem]
                }
                CiKind::Stdev => {
                    let std = samples.iter().population_std_dev();
                    [mean - std, mean + std]
                }
            }
        };
        times.push(tp);
        intervals.push(interval);
    }
    Ok((times, intervals))
}

use crate::OptonotchError;

/// Piecewise-linear interpolation of `(xp, fp)` at every point of `x`.
///
/// `xp` must be increasing and as long as `fp`. Points left of `xp[0]` or
/// right of the last `xp` take the boundary value; NaN points stay NaN.
pub fn interpolate(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    debug_assert_eq!(xp.len(), fp.len());
    let (Some(&first), Some(&last)) = (xp.first(), xp.last()) else {
        return vec![f64::NAN; x.len()];
    };

    x.iter()
        .map(|&xi| {
            if xi.is_nan() {
                f64::NAN
            } else if xi <= first {
                fp[0]
            } else if xi >= last {
                fp[fp.len() - 1]
            } else {
                // xp[j - 1] <= xi < xp[j]
                let j = xp.partition_point(|&v| v <= xi);
                let (x0, x1) = (xp[j - 1], xp[j]);
                let (y0, y1) = (fp[j - 1], fp[j]);
                y0 + (y1 - y0) * (xi - x0) / (x1 - x0)
            }
        })
        .collect()
}

/// Mean of the squared differences between `observed` and `predicted`.
///
/// NaNs are not filtered; any NaN input makes the result NaN.
pub fn mean_squared_error(observed: &[f64], predicted: &[f64]) -> Result<f64, OptonotchError> {
    if observed.len() != predicted.len() {
        return Err(OptonotchError::invalid(format!(
            "cannot compare {} observations with {} predictions",
            observed.len(),
            predicted.len()
        )));
    }
    if observed.is_empty() {
        return Err(OptonotchError::invalid("no observations to compare against"));
    }
    let sum: f64 = observed
        .iter()
        .zip(predicted)
        .map(|(obs, pred)| (obs - pred).powi(2))
        .sum();
    Ok(sum / observed.len() as f64)
}

//! Fitted import and export laws for nuclear NICD

use serde::{Deserialize, Serialize};

/// A pre-calibrated sub-model of nuclear NICD dynamics.
///
/// Maps the value at the start of a phase and the time elapsed since that
/// start to the value at that time. Implementations must be pure and must
/// return `initial` for `elapsed == 0.0`, so consecutive phases join up.
pub trait SubModel: Send + Sync {
    fn evaluate(&self, initial: f64, elapsed: f64) -> f64;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Fitted laws
// ═══════════════════════════════════════════════════════════════════════════════

/// Closed-form laws the import and export curves are fitted with
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedSubModel {
    /// First-order relaxation towards `plateau`
    ///
    /// `N(t) = plateau + (N0 - plateau) * exp(-rate * t)`
    Relaxation { rate: f64, plateau: f64 },
    /// Logistic growth (or decay for negative `rate`) with carrying capacity
    ///
    /// `N(t) = K N0 e^(rt) / (K + N0 (e^(rt) - 1))`
    Logistic { rate: f64, capacity: f64 },
    /// Constant rate of change, clamped to `[floor, ceiling]`
    Linear { slope: f64, floor: f64, ceiling: f64 },
}

impl SubModel for FittedSubModel {
    fn evaluate(&self, initial: f64, elapsed: f64) -> f64 {
        match *self {
            FittedSubModel::Relaxation { rate, plateau } => {
                plateau + (initial - plateau) * (-rate * elapsed).exp()
            }
            FittedSubModel::Logistic { rate, capacity } => {
                if initial == 0.0 {
                    return 0.0;
                }
                let growth = (rate * elapsed).exp();
                capacity * initial * growth / (capacity + initial * (growth - 1.0))
            }
            FittedSubModel::Linear {
                slope,
                floor,
                ceiling,
            } => (initial + slope * elapsed).max(floor).min(ceiling),
        }
    }
}

impl FittedSubModel {
    /// Reject coefficients the law cannot be evaluated with
    pub fn validate(&self) -> Result<(), String> {
        let finite = |name: &str, value: f64| {
            if value.is_finite() {
                Ok(())
            } else {
                Err(format!("{name} must be finite, got {value}"))
            }
        };
        match *self {
            FittedSubModel::Relaxation { rate, plateau } => {
                finite("rate", rate)?;
                finite("plateau", plateau)
            }
            FittedSubModel::Logistic { rate, capacity } => {
                finite("rate", rate)?;
                finite("capacity", capacity)?;
                if capacity <= 0.0 {
                    return Err(format!("capacity must be positive, got {capacity}"));
                }
                Ok(())
            }
            FittedSubModel::Linear {
                slope,
                floor,
                ceiling,
            } => {
                finite("slope", slope)?;
                finite("floor", floor)?;
                finite("ceiling", ceiling)?;
                if floor > ceiling {
                    return Err(format!("floor {floor} lies above ceiling {ceiling}"));
                }
                Ok(())
            }
        }
    }
}

impl<F> SubModel for F
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    fn evaluate(&self, initial: f64, elapsed: f64) -> f64 {
        self(initial, elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_laws_start_at_initial_value() {
        let laws = [
            FittedSubModel::Relaxation {
                rate: 0.3,
                plateau: 1.0,
            },
            FittedSubModel::Logistic {
                rate: 0.8,
                capacity: 1.0,
            },
            FittedSubModel::Linear {
                slope: -0.1,
                floor: 0.0,
                ceiling: 1.0,
            },
        ];
        for law in laws {
            assert_relative_eq!(law.evaluate(0.42, 0.0), 0.42, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_relaxation_approaches_plateau() {
        let export = FittedSubModel::Relaxation {
            rate: 0.25,
            plateau: 0.0,
        };
        assert!(export.evaluate(0.8, 100.0) < 1e-9);
        assert!(export.evaluate(0.8, 2.0) < export.evaluate(0.8, 1.0));
    }

    #[test]
    fn test_logistic_stays_at_zero() {
        let law = FittedSubModel::Logistic {
            rate: 1.0,
            capacity: 1.0,
        };
        assert_eq!(law.evaluate(0.0, 5.0), 0.0);
        assert_relative_eq!(law.evaluate(0.01, 50.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_deserialize_tagged_law() {
        let law: FittedSubModel =
            serde_json::from_str(r#"{ "kind": "linear", "slope": 0.1, "floor": 0.0, "ceiling": 1.0 }"#)
                .unwrap();
        assert_eq!(
            law,
            FittedSubModel::Linear {
                slope: 0.1,
                floor: 0.0,
                ceiling: 1.0
            }
        );
        assert_relative_eq!(law.evaluate(0.95, 1.0), 1.0);
    }

    #[test]
    fn test_validate_rejects_unusable_coefficients() {
        let inverted = FittedSubModel::Linear {
            slope: 0.1,
            floor: 1.0,
            ceiling: 0.0,
        };
        assert!(inverted.validate().is_err());
        // evaluating anyway must not panic
        assert!(inverted.evaluate(0.5, 1.0).is_finite());

        let nan_rate = FittedSubModel::Relaxation {
            rate: f64::NAN,
            plateau: 1.0,
        };
        assert!(nan_rate.validate().is_err());

        let no_capacity = FittedSubModel::Logistic {
            rate: 1.0,
            capacity: 0.0,
        };
        assert!(no_capacity.validate().is_err());

        let fine = FittedSubModel::Linear {
            slope: -0.2,
            floor: 0.0,
            ceiling: 1.0,
        };
        assert!(fine.validate().is_ok());
    }
}

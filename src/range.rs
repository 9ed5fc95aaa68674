//! Validation ranges for numeric parameters.
//!
//! Out-of-range values are never rejected: they are replaced by the nearest
//! bound and a warning is logged. The returned [`Clamped`] tells the caller
//! whether that happened. NaN has no nearest bound and is rejected.

use log::warn;

use crate::error::{Error, Result};

/// Inclusive `[min, max]` range with a label used in warnings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
    pub label: &'static str,
    pub unit: &'static str,
}

pub const VOLTAGE: Range = Range::new(-10.0, 10.0, "Voltage", "V");
pub const OFFSET: Range = Range::new(-5.0, 5.0, "Offset", "V");
pub const LOAD: Range = Range::new(1.0, 10_000.0, "Resistance", "Ohm");
pub const BEEP_DELAY: Range = Range::new(0.0, 5.0, "Beep delay", "s");
/// Sine frequency range of the 33220A, 1 uHz to 20 MHz.
pub const FREQUENCY: Range = Range::new(1e-6, 20e6, "Frequency", "Hz");

/// A value after range checking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clamped<T> {
    pub value: T,
    /// `true` when the requested value was replaced by a bound.
    pub adjusted: bool,
}

impl<T> Clamped<T> {
    pub fn exact(value: T) -> Self {
        Clamped {
            value,
            adjusted: false,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Clamped<U> {
        Clamped {
            value: f(self.value),
            adjusted: self.adjusted,
        }
    }
}

impl Range {
    pub const fn new(min: f64, max: f64, label: &'static str, unit: &'static str) -> Self {
        Range {
            min,
            max,
            label,
            unit,
        }
    }

    /// Substitutes the nearest bound for an out-of-range value. Infinities
    /// clamp like any other value; NaN fails with [`Error::InvalidArgument`].
    ///
    /// The upper and lower checks run independently of each other.
    pub fn check(&self, value: f64) -> Result<Clamped<f64>> {
        if value.is_nan() {
            return Err(Error::invalid(self.label, value));
        }
        let mut out = Clamped::exact(value);
        if out.value > self.max {
            warn!(
                "Wrong {}: {}. Max should be <= {} {}, using {}",
                self.label, value, self.max, self.unit, self.max
            );
            out = Clamped {
                value: self.max,
                adjusted: true,
            };
        }
        if out.value < self.min {
            warn!(
                "Wrong {}: {}. Should be >= {} {}, using {}",
                self.label, value, self.min, self.unit, self.min
            );
            out = Clamped {
                value: self.min,
                adjusted: true,
            };
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_values_pass_through() {
        for v in [-10.0, -3.25, 0.0, 2.0, 10.0] {
            assert_eq!(VOLTAGE.check(v).unwrap(), Clamped::exact(v));
        }
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let high = VOLTAGE.check(12.5).unwrap();
        assert_eq!(high.value, 10.0);
        assert!(high.adjusted);

        let low = OFFSET.check(-7.0).unwrap();
        assert_eq!(low.value, -5.0);
        assert!(low.adjusted);
    }

    #[test]
    fn clamp_matches_min_max_composition() {
        let mut v = -25.0;
        while v <= 25.0 {
            let expected = (-10.0f64).max(10.0f64.min(v));
            assert_eq!(VOLTAGE.check(v).unwrap().value, expected);
            v += 0.75;
        }
    }

    #[test]
    fn load_range_lower_bound_is_one_ohm() {
        assert_eq!(LOAD.check(0.2).unwrap().value, 1.0);
        assert_eq!(LOAD.check(50_000.0).unwrap().value, 10_000.0);
        assert_eq!(LOAD.check(50.0).unwrap(), Clamped::exact(50.0));
    }

    #[test]
    fn frequency_range_covers_the_sine_band() {
        assert!(!FREQUENCY.check(1e-6).unwrap().adjusted);
        assert!(!FREQUENCY.check(20e6).unwrap().adjusted);
        assert_eq!(FREQUENCY.check(30e6).unwrap().value, 20e6);
        assert_eq!(FREQUENCY.check(0.0).unwrap().value, 1e-6);
    }

    #[test]
    fn map_keeps_the_adjusted_flag() {
        let c = BEEP_DELAY.check(9.0).unwrap().map(|s| s * 1000.0);
        assert_eq!(c.value, 5000.0);
        assert!(c.adjusted);
    }

    #[test]
    fn infinities_clamp_and_nan_is_rejected() {
        let high = VOLTAGE.check(f64::INFINITY).unwrap();
        assert_eq!(high.value, 10.0);
        assert!(high.adjusted);
        assert_eq!(BEEP_DELAY.check(f64::NEG_INFINITY).unwrap().value, 0.0);
        for range in [VOLTAGE, OFFSET, LOAD, BEEP_DELAY, FREQUENCY] {
            assert!(matches!(
                range.check(f64::NAN),
                Err(Error::InvalidArgument { .. })
            ));
        }
    }
}

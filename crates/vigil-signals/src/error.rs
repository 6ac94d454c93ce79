use thiserror::Error;
use vigil_types::{DataType, SignalType, VigilError};

/// Why a signal refused a decoded record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{family} signal cannot accept {found} records")]
    WrongFamily { family: SignalType, found: SignalType },

    #[error("{data_type} record carries an unexpected payload shape")]
    PayloadMismatch { data_type: DataType },

    #[error("{field}={value} outside legal range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{0} is empty")]
    Empty(&'static str),
}

impl ValidationError {
    pub fn into_vigil(self, family: SignalType) -> VigilError {
        VigilError::ValidationFailure {
            signal: family.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Check `value` against `[min, max]`, rejecting non-finite values.
pub fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        })
    }
}

pub fn check_all(field: &str, values: &[f64], min: f64, max: f64) -> Result<(), ValidationError> {
    values.iter().try_for_each(|v| check_range(field, *v, min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_checks() {
        assert!(check_range("rate", 70.0, 20.0, 250.0).is_ok());
        assert!(check_range("rate", f64::NAN, 20.0, 250.0).is_err());
        assert!(check_all("x", &[1.0, 300.0], -10.0, 10.0).is_err());
    }

    #[test]
    fn converts_to_validation_failure() {
        let err = ValidationError::Empty("waveform").into_vigil(SignalType::Cardiac);
        assert!(matches!(
            err,
            VigilError::ValidationFailure { ref signal, .. } if signal == "cardiac"
        ));
    }
}

use crate::domain::errors::ValidationError;
use serde::{Deserialize, Serialize};

/// Realized profit and loss of a position
///
/// Can be negative. Only finite values are accepted through `new`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PnL(f64);

impl PnL {
    /// # Errors
    /// Returns ValidationError::MustBeFinite if the value is NaN or infinite
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        Ok(PnL(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn zero() -> Self {
        PnL(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pnl_accepts_negative_values() {
        assert_eq!(PnL::new(-7.5).unwrap().value(), -7.5);
        assert_eq!(PnL::zero(), PnL::default());
    }

    #[test]
    fn test_pnl_rejects_non_finite() {
        assert!(PnL::new(f64::NAN).is_err());
        assert!(PnL::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_pnl_serializes_as_number() {
        let json = serde_json::to_string(&PnL::new(12.5).unwrap()).unwrap();
        assert_eq!(json, "12.5");
    }
}

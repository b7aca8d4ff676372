use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("negative amount {amount} for {context}")]
    NegativeAmount { context: &'static str, amount: f64 },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ValidationError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ValidationError::InvalidConfig(message.into())
    }
}

pub fn require_non_negative(context: &'static str, amount: f64) -> Result<f64, ValidationError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ValidationError::NegativeAmount { context, amount });
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_and_non_finite_amounts() {
        assert!(require_non_negative("deposit", -1.0).is_err());
        assert!(require_non_negative("deposit", f64::NAN).is_err());
        assert_eq!(require_non_negative("deposit", 0.0), Ok(0.0));
        assert_eq!(require_non_negative("deposit", 10.5), Ok(10.5));
    }
}

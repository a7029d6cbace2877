//! Monetary amounts.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// An amount in the smallest currency unit (cents, poisha) plus an ISO-4217 code.
///
/// The currency code is normalized to upper case on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount_minor: i64,
    currency: String,
}

impl Money {
    pub fn new(amount_minor: i64, currency: impl AsRef<str>) -> DomainResult<Self> {
        if amount_minor < 0 {
            return Err(DomainError::validation("amount must not be negative"));
        }
        let currency = currency.as_ref().trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(format!(
                "currency must be a 3-letter ISO code, got '{currency}'"
            )));
        }
        Ok(Self {
            amount_minor,
            currency: currency.to_ascii_uppercase(),
        })
    }

    /// Zero amount (admin-submitted jobs).
    pub fn zero(currency: impl AsRef<str>) -> DomainResult<Self> {
        Self::new(0, currency)
    }

    pub fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    /// Decimal rendering in major units with two fraction digits, e.g. `"500.00"`.
    pub fn major_units(&self) -> String {
        format!("{}.{:02}", self.amount_minor / 100, self.amount_minor % 100)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.major_units(), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn currency_is_normalized() {
        let m = Money::new(1000, "usd").unwrap();
        assert_eq!(m.currency(), "USD");
        assert_eq!(m.to_string(), "10.00 USD");
    }

    #[test]
    fn rejects_negative_and_bad_currency() {
        assert!(matches!(Money::new(-1, "USD"), Err(DomainError::Validation(_))));
        assert!(matches!(Money::new(1, "US"), Err(DomainError::Validation(_))));
        assert!(matches!(Money::new(1, "U$D"), Err(DomainError::Validation(_))));
    }

    proptest! {
        #[test]
        fn major_units_parses_back_to_minor(amount in 0i64..10_000_000_000) {
            let m = Money::new(amount, "BDT").unwrap();
            let rendered = m.major_units();
            let (whole, frac) = rendered.split_once('.').unwrap();
            prop_assert_eq!(frac.len(), 2);
            let back = whole.parse::<i64>().unwrap() * 100 + frac.parse::<i64>().unwrap();
            prop_assert_eq!(back, amount);
        }
    }
}

//! Product price using decimal arithmetic.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A listing price.
///
/// The backend does not send a currency, so only the amount is kept.
/// Amounts are decimal so that `19.99` survives the trip from JSON intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Zero, used when a listing carries no price.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Parse a price from a JSON scalar (number or numeric string).
    ///
    /// Returns `None` for anything else, including negative amounts.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let amount = match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Decimal::from(i)
                } else {
                    // Number's Display is the shortest round-trip form, so
                    // 19.99 parses back as 19.99 rather than a binary artifact.
                    match n.to_string().parse::<Decimal>() {
                        Ok(d) => d,
                        Err(_) => Decimal::try_from(n.as_f64()?).ok()?,
                    }
                }
            }
            serde_json::Value::String(s) => s.trim().parse::<Decimal>().ok()?,
            _ => return None,
        };

        (!amount.is_sign_negative()).then_some(Self(amount.normalize()))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_number() {
        let price = Price::from_json(&json!(25)).unwrap();
        assert_eq!(price.to_string(), "25.00");
    }

    #[test]
    fn test_from_json_float_and_string() {
        assert_eq!(Price::from_json(&json!(19.99)).unwrap().to_string(), "19.99");
        assert_eq!(Price::from_json(&json!("7.5")).unwrap().to_string(), "7.50");
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(Price::from_json(&json!("free")).is_none());
        assert!(Price::from_json(&json!(null)).is_none());
        assert!(Price::from_json(&json!(-3)).is_none());
    }
}

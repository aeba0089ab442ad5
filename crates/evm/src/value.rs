use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::round_to;

/// An earned-value figure that may have no meaning (zero denominator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum EvmValue {
    Defined(Decimal),
    Undefined,
}

impl EvmValue {
    /// `numerator / denominator`, or `Undefined` when the denominator is zero
    /// or the quotient does not fit.
    pub fn ratio(numerator: Decimal, denominator: Decimal) -> Self {
        if denominator.is_zero() {
            return EvmValue::Undefined;
        }
        numerator
            .checked_div(denominator)
            .map_or(EvmValue::Undefined, EvmValue::Defined)
    }

    pub fn defined(self) -> Option<Decimal> {
        match self {
            EvmValue::Defined(v) => Some(v),
            EvmValue::Undefined => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, EvmValue::Defined(_))
    }

    pub fn map(self, f: impl FnOnce(Decimal) -> Decimal) -> Self {
        match self {
            EvmValue::Defined(v) => EvmValue::Defined(f(v)),
            EvmValue::Undefined => EvmValue::Undefined,
        }
    }

    pub fn and_then(self, f: impl FnOnce(Decimal) -> EvmValue) -> Self {
        match self {
            EvmValue::Defined(v) => f(v),
            EvmValue::Undefined => EvmValue::Undefined,
        }
    }

    pub fn round(self, scale: u32) -> Self {
        self.map(|v| round_to(v, scale))
    }
}

impl From<Decimal> for EvmValue {
    fn from(value: Decimal) -> Self {
        EvmValue::Defined(value)
    }
}

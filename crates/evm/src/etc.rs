use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{DomainError, DomainResult};
use buildledger_costing::ForecastMethod;

/// How the estimate to complete is derived.
///
/// | method | ETC |
/// |---|---|
/// | `BottomUp` | supplied remaining estimate |
/// | `TopDown`, `Parametric` | `(BAC - EV) / CPI` |
/// | `ThreePoint` | `(O + 4M + P) / 6` |
/// | `EarnedValue` | `(BAC - EV) / (CPI * SPI)` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum EtcInput {
    BottomUp {
        remaining_estimate: Decimal,
    },
    TopDown,
    Parametric,
    ThreePoint {
        optimistic: Decimal,
        most_likely: Decimal,
        pessimistic: Decimal,
    },
    EarnedValue,
}

impl EtcInput {
    pub fn method(&self) -> ForecastMethod {
        match self {
            EtcInput::BottomUp { .. } => ForecastMethod::BottomUp,
            EtcInput::TopDown => ForecastMethod::TopDown,
            EtcInput::Parametric => ForecastMethod::Parametric,
            EtcInput::ThreePoint { .. } => ForecastMethod::ThreePoint,
            EtcInput::EarnedValue => ForecastMethod::EarnedValue,
        }
    }

    /// Input for a method that needs no extra estimates; `None` for
    /// `BottomUp` and `ThreePoint`.
    pub fn derived(method: ForecastMethod) -> Option<Self> {
        match method {
            ForecastMethod::TopDown => Some(EtcInput::TopDown),
            ForecastMethod::Parametric => Some(EtcInput::Parametric),
            ForecastMethod::EarnedValue => Some(EtcInput::EarnedValue),
            ForecastMethod::BottomUp | ForecastMethod::ThreePoint => None,
        }
    }

    /// Monetary values carried by the input.
    pub fn amounts(&self) -> Vec<Decimal> {
        match *self {
            EtcInput::BottomUp { remaining_estimate } => vec![remaining_estimate],
            EtcInput::ThreePoint {
                optimistic,
                most_likely,
                pessimistic,
            } => vec![optimistic, most_likely, pessimistic],
            _ => Vec::new(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        match *self {
            EtcInput::BottomUp { remaining_estimate } if remaining_estimate < Decimal::ZERO => Err(
                DomainError::validation("remaining estimate must not be negative"),
            ),
            EtcInput::ThreePoint {
                optimistic,
                most_likely,
                pessimistic,
            } => {
                if optimistic < Decimal::ZERO
                    || optimistic > most_likely
                    || most_likely > pessimistic
                {
                    return Err(DomainError::validation(format!(
                        "three-point estimate requires 0 <= O <= M <= P, got {optimistic}/{most_likely}/{pessimistic}"
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

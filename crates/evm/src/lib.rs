//! Earned value management: EV/PV/AC indices, estimates to and at
//! completion, variance analysis and cost scenarios.
//!
//! A zero denominator never fails a computation; the affected figure is
//! reported as [`EvmValue::Undefined`].

pub mod baseline;
pub mod engine;
pub mod etc;
pub mod scenario;
pub mod value;
pub mod variance;

pub use baseline::{Baseline, PvPoint};
pub use engine::{DEFAULT_RATIO_SCALE, EarnedValueMetrics, EvmEngine, EvmInputs};
pub use etc::EtcInput;
pub use scenario::{CostScenario, expected_estimate_at_completion};
pub use value::EvmValue;
pub use variance::{VarianceAnalysis, VarianceStatus, VarianceType};

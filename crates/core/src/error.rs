//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic roll-up failures (validation, forest
/// invariants, allocation limits, missing formula inputs). A division by zero
/// inside an earned-value ratio is *not* an error; see `EvmValue::Undefined`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced id is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The edit would break the WBS forest invariant.
    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    /// Allocations for one actual cost would exceed its amount.
    #[error(
        "allocation overflow for actual cost {actual_cost_id}: requested {requested}, available {available}"
    )]
    AllocationOverflow {
        actual_cost_id: String,
        requested: Decimal,
        available: Decimal,
    },

    /// A formula is missing a required input.
    #[error("computation failed: {0}")]
    Computation(String),

    /// A value failed validation (e.g. out-of-range percentage).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A state transition conflicted with the current state.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_structure(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    pub fn allocation_overflow(
        actual_cost_id: impl core::fmt::Display,
        requested: Decimal,
        available: Decimal,
    ) -> Self {
        Self::AllocationOverflow {
            actual_cost_id: actual_cost_id.to_string(),
            requested,
            available,
        }
    }

    pub fn computation(msg: impl Into<String>) -> Self {
        Self::Computation(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Short machine-friendly kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::NotFound { .. } => "not_found",
            DomainError::InvalidStructure(_) => "invalid_structure",
            DomainError::AllocationOverflow { .. } => "allocation_overflow",
            DomainError::Computation(_) => "computation",
            DomainError::Validation(_) => "validation",
            DomainError::Conflict(_) => "conflict",
        }
    }
}

//! Costing module: cost centers, posted costs, allocations, budget revisions,
//! forecasts and the cost roll-up over the WBS and the cost-center hierarchy.
//!
//! Pure domain logic; the records are handed in by the systems that own them
//! (timesheets, purchase orders, invoices).

pub mod allocation;
pub mod budget;
pub mod center;
pub mod cost;
pub mod forecast;
pub mod rollup;

pub use allocation::{AllocationLedger, CostAllocation, NewAllocation};
pub use budget::{BudgetRegister, BudgetRevision};
pub use center::{CostCenter, CostCenterHierarchy, CostCode};
pub use cost::{ActualCost, CostStatus, CostType};
pub use forecast::{CostForecast, ForecastBook, ForecastMethod};
pub use rollup::{Attribution, CenterTotals, CostRollup, CostTotals};

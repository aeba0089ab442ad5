use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use buildledger_core::{DomainError, DomainResult, ProjectId, WbsNodeId};

/// One point of a cumulative planned-value curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PvPoint {
    pub date: DateTime<Utc>,
    pub cumulative_pv: Decimal,
}

/// Time-phased planned value per WBS node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub project_id: ProjectId,
    curves: HashMap<WbsNodeId, Vec<PvPoint>>,
}

impl Baseline {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            curves: HashMap::new(),
        }
    }

    /// Set the cumulative PV of `node_id` at `date`, replacing an existing
    /// point on the same date. The curve must not decrease.
    pub fn set_point(
        &mut self,
        node_id: WbsNodeId,
        date: DateTime<Utc>,
        cumulative_pv: Decimal,
    ) -> DomainResult<()> {
        if cumulative_pv < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "planned value {cumulative_pv} for node {node_id} is negative"
            )));
        }
        let curve = self.curves.entry(node_id).or_default();
        let mut next = curve.clone();
        match next.binary_search_by_key(&date, |p| p.date) {
            Ok(i) => next[i].cumulative_pv = cumulative_pv,
            Err(i) => next.insert(i, PvPoint { date, cumulative_pv }),
        }
        if next.windows(2).any(|w| w[1].cumulative_pv < w[0].cumulative_pv) {
            return Err(DomainError::validation(format!(
                "planned value curve of node {node_id} would decrease at {date}"
            )));
        }
        *curve = next;
        Ok(())
    }

    pub fn has_curve(&self, node_id: WbsNodeId) -> bool {
        self.curves.contains_key(&node_id)
    }

    pub fn curve(&self, node_id: WbsNodeId) -> &[PvPoint] {
        self.curves.get(&node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Planned value of `node_id` at `as_of`: the latest point on or before
    /// it, zero before the first point. A node without a curve has no PV.
    pub fn planned_value(&self, node_id: WbsNodeId, as_of: DateTime<Utc>) -> DomainResult<Decimal> {
        let curve = self.curves.get(&node_id).ok_or_else(|| {
            DomainError::computation(format!("no planned value baseline for node {node_id}"))
        })?;
        Ok(curve
            .iter()
            .take_while(|p| p.date <= as_of)
            .last()
            .map(|p| p.cumulative_pv)
            .unwrap_or(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    #[test]
    fn reads_latest_point_on_or_before_as_of() {
        let node = WbsNodeId::new();
        let mut b = Baseline::new(ProjectId::new());
        b.set_point(node, day(10), Decimal::from(100)).unwrap();
        b.set_point(node, day(20), Decimal::from(250)).unwrap();

        assert_eq!(b.planned_value(node, day(5)).unwrap(), Decimal::ZERO);
        assert_eq!(b.planned_value(node, day(10)).unwrap(), Decimal::from(100));
        assert_eq!(b.planned_value(node, day(25)).unwrap(), Decimal::from(250));
    }

    #[test]
    fn missing_curve_is_a_computation_error() {
        let b = Baseline::new(ProjectId::new());
        assert!(matches!(
            b.planned_value(WbsNodeId::new(), day(1)),
            Err(DomainError::Computation(_))
        ));
    }

    #[test]
    fn curve_must_not_decrease() {
        let node = WbsNodeId::new();
        let mut b = Baseline::new(ProjectId::new());
        b.set_point(node, day(10), Decimal::from(100)).unwrap();
        assert!(b.set_point(node, day(20), Decimal::from(50)).is_err());
        assert_eq!(b.curve(node).len(), 1);
        b.set_point(node, day(10), Decimal::from(40)).unwrap();
        assert_eq!(b.curve(node)[0].cumulative_pv, Decimal::from(40));
    }
}

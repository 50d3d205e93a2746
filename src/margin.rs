//! Profit and margin, per month and for the year.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::aggregate::{CostBreakdown, MonthlyCostBucket};
use crate::error::{EacError, Result};
use crate::month::YearMonth;

const HUNDRED: Decimal = dec!(100);

/// Margin as a percentage of revenue.
///
/// `None` when there is neither revenue nor cost, `-100` when cost was incurred
/// with no revenue, otherwise `(revenue - cost) / revenue * 100`. Fails only
/// when the ratio does not fit a `Decimal`.
pub fn margin_pct(revenue: Decimal, total_cost: Decimal) -> Result<Option<Decimal>> {
    if revenue.is_zero() {
        return Ok(if total_cost.is_zero() {
            None
        } else {
            Some(-HUNDRED)
        });
    }
    revenue
        .checked_sub(total_cost)
        .and_then(|profit| profit.checked_div(revenue))
        .and_then(|ratio| ratio.checked_mul(HUNDRED))
        .map(Some)
        .ok_or_else(|| EacError::out_of_range("margin_pct"))
}

/// `(total_cost, profit, margin_pct)` for a cost breakdown and its revenue.
fn pnl(costs: &CostBreakdown, revenue: Decimal) -> Result<(Decimal, Decimal, Option<Decimal>)> {
    let total_cost = costs.total_cost()?;
    let profit = revenue
        .checked_sub(total_cost)
        .ok_or_else(|| EacError::out_of_range("profit"))?;
    Ok((total_cost, profit, margin_pct(revenue, total_cost)?))
}

/// One month of the P&L.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRow {
    pub year_month: YearMonth,
    pub costs: CostBreakdown,
    pub total_cost: Decimal,
    pub revenue: Decimal,
    pub profit: Decimal,
    pub margin_pct: Option<Decimal>,
}

impl ProjectionRow {
    pub fn new(bucket: MonthlyCostBucket, revenue: Decimal) -> Result<Self> {
        let (total_cost, profit, margin_pct) =
            pnl(&bucket.costs, revenue).map_err(|e| e.in_month(bucket.year_month))?;
        Ok(Self {
            year_month: bucket.year_month,
            costs: bucket.costs,
            total_cost,
            revenue,
            profit,
            margin_pct,
        })
    }
}

/// Year totals. Margin comes from the summed figures, never from monthly margins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionTotals {
    pub costs: CostBreakdown,
    pub total_cost: Decimal,
    pub revenue: Decimal,
    pub profit: Decimal,
    pub margin_pct: Option<Decimal>,
}

impl ProjectionTotals {
    pub fn new(costs: CostBreakdown, revenue: Decimal) -> Result<Self> {
        let (total_cost, profit, margin_pct) = pnl(&costs, revenue)?;
        Ok(Self {
            costs,
            total_cost,
            revenue,
            profit,
            margin_pct,
        })
    }

    pub fn from_rows(rows: &[ProjectionRow]) -> Result<Self> {
        let mut costs = CostBreakdown::default();
        let mut revenue = Decimal::ZERO;
        for row in rows {
            costs = costs
                .checked_add(&row.costs)
                .ok_or_else(|| EacError::out_of_range("annual costs"))?;
            revenue = revenue
                .checked_add(row.revenue)
                .ok_or_else(|| EacError::out_of_range("annual revenue"))?;
        }
        Self::new(costs, revenue)
    }
}

/// Twelve months of P&L for one calendar year plus the totals row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualProjection {
    pub year: i32,
    pub months: Vec<ProjectionRow>,
    pub totals: ProjectionTotals,
}

impl AnnualProjection {
    pub fn from_rows(year: i32, months: Vec<ProjectionRow>) -> Result<Self> {
        let totals = ProjectionTotals::from_rows(&months)?;
        Ok(Self {
            year,
            months,
            totals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_margin_policy() {
        assert_eq!(margin_pct(dec!(0), dec!(0)).unwrap(), None);
        assert_eq!(margin_pct(dec!(0), dec!(250)).unwrap(), Some(dec!(-100)));
        assert_eq!(margin_pct(dec!(1000), dec!(750)).unwrap(), Some(dec!(25)));
        assert_eq!(margin_pct(dec!(1000), dec!(1500)).unwrap(), Some(dec!(-50)));
    }

    #[test]
    fn test_zero_month_has_no_margin_and_totals_need_no_special_case() {
        let months: Vec<ProjectionRow> = YearMonth::months_of(2025)
            .unwrap()
            .into_iter()
            .map(|m| {
                let mut bucket = MonthlyCostBucket::empty(m);
                let revenue = if m.month() == 6 {
                    Decimal::ZERO
                } else {
                    bucket.costs.labor = dec!(900);
                    dec!(1000)
                };
                ProjectionRow::new(bucket, revenue).unwrap()
            })
            .collect();
        let projection = AnnualProjection::from_rows(2025, months).unwrap();

        assert_eq!(projection.months[5].margin_pct, None);
        assert_eq!(projection.totals.revenue, dec!(11000));
        assert_eq!(projection.totals.total_cost, dec!(9900));
        assert_eq!(projection.totals.margin_pct, Some(dec!(10)));
    }

    #[test]
    fn test_totals_margin_is_weighted_not_averaged() {
        let jan = YearMonth::new(2025, 1).unwrap();
        let feb = YearMonth::new(2025, 2).unwrap();
        let small = ProjectionRow::new(
            MonthlyCostBucket {
                year_month: jan,
                costs: CostBreakdown {
                    labor: dec!(50),
                    ..Default::default()
                },
            },
            dec!(100),
        )
        .unwrap();
        let large = ProjectionRow::new(
            MonthlyCostBucket {
                year_month: feb,
                costs: CostBreakdown {
                    labor: dec!(9900),
                    ..Default::default()
                },
            },
            dec!(10000),
        )
        .unwrap();
        // Monthly margins are 50% and 1%; their average would be 25.5%.
        let totals = ProjectionTotals::from_rows(&[small, large]).unwrap();
        assert_eq!(totals.profit, dec!(150));
        assert_eq!(totals.margin_pct, Some(dec!(150) / dec!(10100) * dec!(100)));
    }

    #[test]
    fn test_row_total_matches_categories() {
        let costs = CostBreakdown {
            labor: dec!(1.10),
            equip: dec!(2.20),
            materials: dec!(3.30),
            subs: dec!(4.40),
            odc: dec!(0.01),
            fringe: dec!(5.50),
            overhead: dec!(6.60),
            gna: dec!(7.70),
        };
        let row = ProjectionRow::new(
            MonthlyCostBucket {
                year_month: YearMonth::new(2025, 9).unwrap(),
                costs,
            },
            dec!(0),
        )
        .unwrap();
        assert_eq!(row.total_cost, dec!(30.81));
        assert_eq!(row.margin_pct, Some(dec!(-100)));
    }

    #[test]
    fn test_unrepresentable_margin_is_a_validation_error() {
        let tiny_revenue = Decimal::new(1, 2);
        let err = margin_pct(tiny_revenue, Decimal::MAX).unwrap_err();
        assert!(matches!(err, EacError::Validation { ref field, .. } if field == "margin_pct"));

        let err = ProjectionRow::new(
            MonthlyCostBucket {
                year_month: YearMonth::new(2025, 4).unwrap(),
                costs: CostBreakdown {
                    labor: Decimal::MAX,
                    ..Default::default()
                },
            },
            tiny_revenue,
        )
        .unwrap_err();
        assert!(err.to_string().contains("for 2025-04"));
    }

    #[test]
    fn test_annual_sum_overflow_is_a_validation_error() {
        let rows: Vec<ProjectionRow> = YearMonth::months_of(2025)
            .unwrap()
            .into_iter()
            .take(2)
            .map(|m| ProjectionRow::new(MonthlyCostBucket::empty(m), Decimal::MAX).unwrap())
            .collect();
        assert!(matches!(
            AnnualProjection::from_rows(2025, rows),
            Err(EacError::Validation { .. })
        ));
    }
}

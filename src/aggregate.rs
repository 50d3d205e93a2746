//! Monthly roll-up of cost and revenue rows into a fixed twelve-month year.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EacError, Result};
use crate::line_cost::{extended_cost, CostCategory, PlanLine};
use crate::margin::{AnnualProjection, ProjectionRow};
use crate::month::{normalize_month_key, YearMonth};
use crate::rates::RateSnapshot;
use crate::revenue::{recognize_revenue, RevenueMethod};

/// Cost by category. Missing categories are zero; the total is always derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub labor: Decimal,
    pub equip: Decimal,
    pub materials: Decimal,
    pub subs: Decimal,
    pub odc: Decimal,
    pub fringe: Decimal,
    pub overhead: Decimal,
    pub gna: Decimal,
}

impl CostBreakdown {
    fn fields(&self) -> [Decimal; 8] {
        [
            self.labor,
            self.equip,
            self.materials,
            self.subs,
            self.odc,
            self.fringe,
            self.overhead,
            self.gna,
        ]
    }

    pub fn total_cost(&self) -> Result<Decimal> {
        self.fields()
            .into_iter()
            .try_fold(Decimal::ZERO, |sum, amount| sum.checked_add(amount))
            .ok_or_else(|| EacError::out_of_range("total_cost"))
    }

    /// Add a direct cost to the field of its category.
    pub fn book(&mut self, category: CostCategory, amount: Decimal) -> Result<()> {
        let field = match category {
            CostCategory::Labor => &mut self.labor,
            CostCategory::Equipment => &mut self.equip,
            CostCategory::Materials => &mut self.materials,
            CostCategory::Subs => &mut self.subs,
            CostCategory::Odc => &mut self.odc,
        };
        *field = field
            .checked_add(amount)
            .ok_or_else(|| EacError::out_of_range(category.as_str()))?;
        Ok(())
    }

    /// Every field multiplied by `factor`, or `None` if any product overflows.
    pub fn checked_scale(&self, factor: Decimal) -> Option<Self> {
        Some(Self {
            labor: self.labor.checked_mul(factor)?,
            equip: self.equip.checked_mul(factor)?,
            materials: self.materials.checked_mul(factor)?,
            subs: self.subs.checked_mul(factor)?,
            odc: self.odc.checked_mul(factor)?,
            fringe: self.fringe.checked_mul(factor)?,
            overhead: self.overhead.checked_mul(factor)?,
            gna: self.gna.checked_mul(factor)?,
        })
    }

    /// Field-wise sum, or `None` if any field overflows.
    pub fn checked_add(&self, rhs: &CostBreakdown) -> Option<Self> {
        Some(Self {
            labor: self.labor.checked_add(rhs.labor)?,
            equip: self.equip.checked_add(rhs.equip)?,
            materials: self.materials.checked_add(rhs.materials)?,
            subs: self.subs.checked_add(rhs.subs)?,
            odc: self.odc.checked_add(rhs.odc)?,
            fringe: self.fringe.checked_add(rhs.fringe)?,
            overhead: self.overhead.checked_add(rhs.overhead)?,
            gna: self.gna.checked_add(rhs.gna)?,
        })
    }
}

/// Cost for one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCostBucket {
    pub year_month: YearMonth,
    pub costs: CostBreakdown,
}

impl MonthlyCostBucket {
    pub fn empty(year_month: YearMonth) -> Self {
        Self {
            year_month,
            costs: CostBreakdown::default(),
        }
    }

    pub fn total_cost(&self) -> Result<Decimal> {
        self.costs.total_cost()
    }
}

/// Recognized revenue for one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRevenue {
    pub year_month: YearMonth,
    pub revenue: Decimal,
}

/// A pre-aggregated cost row from the data-access layer. `month` is any date
/// shape accepted by [`normalize_month_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRow {
    pub month: String,
    pub costs: CostBreakdown,
}

/// A revenue row from the data-access layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueRow {
    pub month: String,
    pub revenue: Decimal,
}

/// A plan line left out of a roll-up because its reference did not resolve.
#[derive(Debug)]
pub struct SkippedLine {
    pub line: PlanLine,
    pub error: EacError,
}

/// Result of rolling plan lines up into monthly cost rows.
#[derive(Debug)]
pub struct PlanRollup {
    /// Exactly twelve rows, January first.
    pub rows: Vec<CostRow>,
    pub skipped: Vec<SkippedLine>,
}

/// Keeps a month only if it falls inside the target year.
fn month_in_year(raw: &str, year: i32) -> Result<Option<YearMonth>> {
    let key = normalize_month_key(raw)?;
    if key.year() == year {
        Ok(Some(key))
    } else {
        log::debug!("row for {key} is outside {year}, ignored");
        Ok(None)
    }
}

/// Sum cost rows into twelve buckets for `year`; months without rows are all zero.
pub fn monthly_cost_buckets(year: i32, rows: &[CostRow]) -> Result<Vec<MonthlyCostBucket>> {
    let mut buckets: Vec<MonthlyCostBucket> = YearMonth::months_of(year)?
        .into_iter()
        .map(MonthlyCostBucket::empty)
        .collect();

    for row in rows {
        if let Some(key) = month_in_year(&row.month, year)? {
            let bucket = &mut buckets[key.index()];
            bucket.costs = bucket
                .costs
                .checked_add(&row.costs)
                .ok_or_else(|| EacError::out_of_range("costs").in_month(key))?;
        }
    }
    Ok(buckets)
}

/// Sum revenue rows into twelve months for `year`.
pub fn monthly_revenue(year: i32, rows: &[RevenueRow]) -> Result<Vec<MonthlyRevenue>> {
    let mut months: Vec<MonthlyRevenue> = YearMonth::months_of(year)?
        .into_iter()
        .map(|year_month| MonthlyRevenue {
            year_month,
            revenue: Decimal::ZERO,
        })
        .collect();

    for row in rows {
        if let Some(key) = month_in_year(&row.month, year)? {
            let month = &mut months[key.index()];
            month.revenue = month
                .revenue
                .checked_add(row.revenue)
                .ok_or_else(|| EacError::out_of_range("revenue").in_month(key))?;
        }
    }
    Ok(months)
}

/// Cost each plan line of `project_id` in `year` and group by month and category.
///
/// Lines whose reference is missing from the snapshot cost nothing here and are
/// returned in [`PlanRollup::skipped`]. Any other failure aborts the roll-up.
pub fn rollup_plan_lines(
    year: i32,
    project_id: &str,
    lines: &[PlanLine],
    snapshot: &RateSnapshot,
) -> Result<PlanRollup> {
    let mut by_month: BTreeMap<YearMonth, CostBreakdown> = YearMonth::months_of(year)?
        .into_iter()
        .map(|m| (m, CostBreakdown::default()))
        .collect();
    let mut skipped = Vec::new();

    for line in lines
        .iter()
        .filter(|l| l.project_id == project_id && l.year_month.year() == year)
    {
        match extended_cost(line, snapshot) {
            Ok(Some(cost)) => {
                if let Some(bucket) = by_month.get_mut(&line.year_month) {
                    bucket
                        .book(line.category, cost)
                        .map_err(|e| e.in_month(line.year_month))?;
                }
            }
            Ok(None) => {}
            Err(error) if error.is_lookup() => {
                log::warn!(
                    "skipping {} line for {} in {}: {}",
                    line.category,
                    line.reference_key,
                    line.year_month,
                    error
                );
                skipped.push(SkippedLine {
                    line: line.clone(),
                    error,
                });
            }
            Err(error) => return Err(error.in_month(line.year_month)),
        }
    }

    let rows = by_month
        .into_iter()
        .map(|(month, costs)| CostRow {
            month: month.to_string(),
            costs,
        })
        .collect();
    Ok(PlanRollup { rows, skipped })
}

/// Twelve-month P&L from cost rows and recorded revenue rows.
pub fn compute_annual_projection(
    year: i32,
    cost_rows: &[CostRow],
    revenue_rows: &[RevenueRow],
) -> Result<AnnualProjection> {
    let buckets = monthly_cost_buckets(year, cost_rows)?;
    let revenue = monthly_revenue(year, revenue_rows)?;

    let rows = buckets
        .into_iter()
        .zip(revenue)
        .map(|(bucket, rev)| ProjectionRow::new(bucket, rev.revenue))
        .collect::<Result<Vec<_>>>()?;
    AnnualProjection::from_rows(year, rows)
}

/// Twelve-month P&L where each month's revenue is recognized from its cost
/// bucket under `method`.
pub fn compute_policy_projection(
    year: i32,
    cost_rows: &[CostRow],
    method: &RevenueMethod,
) -> Result<AnnualProjection> {
    let rows = monthly_cost_buckets(year, cost_rows)?
        .into_iter()
        .map(|bucket| {
            let revenue = recognize_revenue(method, &bucket.costs)
                .map_err(|e| e.in_month(bucket.year_month))?;
            ProjectionRow::new(bucket, revenue)
        })
        .collect::<Result<Vec<_>>>()?;
    AnnualProjection::from_rows(year, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::CatalogRate;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn cost_row(month: &str, labor: Decimal, fringe: Decimal) -> CostRow {
        CostRow {
            month: month.into(),
            costs: CostBreakdown {
                labor,
                fringe,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_buckets_always_twelve_months() {
        let buckets = monthly_cost_buckets(2025, &[]).unwrap();
        assert_eq!(buckets.len(), 12);
        assert!(buckets.iter().all(|b| b.total_cost().unwrap() == Decimal::ZERO));
        assert_eq!(buckets[0].year_month.to_string(), "2025-01");
        assert_eq!(buckets[11].year_month.to_string(), "2025-12");
    }

    #[test]
    fn test_rows_grouped_by_normalized_month() {
        let rows = vec![
            cost_row("2025-02", dec!(100), dec!(10)),
            cost_row("2025-02-14", dec!(50), dec!(0)),
            cost_row("2025-02-28T23:00:00-05:00", dec!(7), dec!(0)), // March in UTC
            cost_row("2024-02-01", dec!(999), dec!(0)),
        ];
        let buckets = monthly_cost_buckets(2025, &rows).unwrap();
        assert_eq!(buckets[1].costs.labor, dec!(150));
        assert_eq!(buckets[1].total_cost().unwrap(), dec!(160));
        assert_eq!(buckets[2].costs.labor, dec!(7));
        let year_total: Decimal = buckets.iter().map(|b| b.total_cost().unwrap()).sum();
        assert_eq!(year_total, dec!(167));
    }

    #[test]
    fn test_malformed_month_fails() {
        let rows = vec![cost_row("Feb 2025", dec!(1), dec!(0))];
        assert!(matches!(
            monthly_cost_buckets(2025, &rows),
            Err(EacError::Validation { .. })
        ));
    }

    #[test]
    fn test_revenue_rows_summed_per_month() {
        let rows = vec![
            RevenueRow {
                month: "2025-06-01".into(),
                revenue: dec!(4000),
            },
            RevenueRow {
                month: "2025-06-30".into(),
                revenue: dec!(1000),
            },
        ];
        let months = monthly_revenue(2025, &rows).unwrap();
        assert_eq!(months.len(), 12);
        assert_eq!(months[5].revenue, dec!(5000));
        assert_eq!(months[4].revenue, Decimal::ZERO);
    }

    #[test]
    fn test_rollup_skips_unknown_references() {
        let snapshot = RateSnapshot::builder()
            .labor_role(CatalogRate::new("ENG", dec!(100), dec!(0.5)))
            .build()
            .unwrap();
        let march = YearMonth::new(2025, 3).unwrap();
        let line = |category, key: &str, quantity| PlanLine {
            project_id: "P-1".into(),
            year_month: march,
            category,
            reference_key: key.into(),
            quantity,
        };
        let lines = vec![
            line(CostCategory::Labor, "ENG", dec!(10)),
            line(CostCategory::Labor, "GHOST", dec!(10)),
            line(CostCategory::Odc, "permits", dec!(250)),
            line(CostCategory::Labor, "ENG", dec!(0)),
            PlanLine {
                project_id: "P-2".into(),
                ..line(CostCategory::Odc, "other project", dec!(1))
            },
        ];

        let rollup = rollup_plan_lines(2025, "P-1", &lines, &snapshot).unwrap();
        assert_eq!(rollup.rows.len(), 12);
        assert_eq!(rollup.rows[2].costs.labor, dec!(1500));
        assert_eq!(rollup.rows[2].costs.odc, dec!(250));
        assert_eq!(rollup.skipped.len(), 1);
        assert_eq!(rollup.skipped[0].line.reference_key, "GHOST");
    }

    #[test]
    fn test_rollup_overflow_is_a_validation_error() {
        let snapshot = RateSnapshot::builder()
            .labor_role(CatalogRate::new("ENG", dec!(100), dec!(0)))
            .build()
            .unwrap();
        let march = YearMonth::new(2025, 3).unwrap();
        let line = PlanLine {
            project_id: "P-1".into(),
            year_month: march,
            category: CostCategory::Labor,
            reference_key: "ENG".into(),
            quantity: Decimal::MAX,
        };

        let err = rollup_plan_lines(2025, "P-1", &[line], &snapshot).unwrap_err();
        match err {
            EacError::Validation { field, month, .. } => {
                assert_eq!(field, "quantity");
                assert_eq!(month, Some(march));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rollup_overflow_across_lines_names_category() {
        let snapshot = RateSnapshot::default();
        let may = YearMonth::new(2025, 5).unwrap();
        let odc = PlanLine {
            project_id: "P-1".into(),
            year_month: may,
            category: CostCategory::Odc,
            reference_key: "permits".into(),
            quantity: Decimal::MAX,
        };

        let err = rollup_plan_lines(2025, "P-1", &[odc.clone(), odc], &snapshot).unwrap_err();
        assert!(err.to_string().contains("invalid odc for 2025-05"));
    }

    #[test]
    fn test_bucket_sum_overflow_is_a_validation_error() {
        let rows = vec![
            cost_row("2025-07", Decimal::MAX, dec!(0)),
            cost_row("2025-07-20", Decimal::MAX, dec!(0)),
        ];
        let err = monthly_cost_buckets(2025, &rows).unwrap_err();
        assert!(matches!(
            err,
            EacError::Validation { ref field, month: Some(m), .. }
                if field == "costs" && m == YearMonth::new(2025, 7).unwrap()
        ));

        let revenue = vec![
            RevenueRow {
                month: "2025-07".into(),
                revenue: Decimal::MAX,
            };
            2
        ];
        assert!(monthly_revenue(2025, &revenue).is_err());
    }

    #[test]
    fn test_total_cost_overflow_reported() {
        let costs = CostBreakdown {
            labor: Decimal::MAX,
            fringe: Decimal::MAX,
            ..Default::default()
        };
        assert!(costs.total_cost().is_err());
        assert_eq!(costs.checked_scale(dec!(2)), None);
        assert_eq!(
            costs.checked_scale(dec!(0.5)).unwrap().labor,
            Decimal::MAX * dec!(0.5)
        );
    }

    #[test]
    fn test_projection_is_deterministic() {
        let costs = vec![cost_row("2025-01", dec!(800), dec!(200))];
        let revenue = vec![RevenueRow {
            month: "2025-01".into(),
            revenue: dec!(1250),
        }];
        let first = compute_annual_projection(2025, &costs, &revenue).unwrap();
        let second = compute_annual_projection(2025, &costs, &revenue).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.months[0].profit, dec!(250));
        assert_eq!(first.totals.revenue, dec!(1250));
    }

    #[test]
    fn test_policy_projection_recognizes_each_month() {
        let costs = vec![
            cost_row("2025-01", dec!(1000), dec!(0)),
            cost_row("2025-04", dec!(2000), dec!(0)),
        ];
        let method = RevenueMethod::CostPlus { fee_pct: dec!(0.10) };
        let projection = compute_policy_projection(2025, &costs, &method).unwrap();
        assert_eq!(projection.months[0].revenue, dec!(1100));
        assert_eq!(projection.months[3].revenue, dec!(2200));
        assert_eq!(projection.months[1].margin_pct, None);
        assert_eq!(projection.totals.profit, dec!(300));
    }
}

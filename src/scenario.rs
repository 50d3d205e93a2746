//! What-if scenarios over an annual projection.
//!
//! A scenario never mutates its base. Each application rebuilds every row from
//! the adjusted cost and revenue, so applying the same scenario twice to the
//! same base gives the same result.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::aggregate::{CostBreakdown, MonthlyCostBucket};
use crate::error::{EacError, Result};
use crate::margin::{AnnualProjection, ProjectionRow, ProjectionTotals};

const HUNDRED: Decimal = dec!(100);

/// Deltas applied on demand. Percentage deltas are on the 0-100 scale
/// (`10` means +10%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Months by which revenue recognition slips.
    pub delay_months: u32,
    pub revenue_pct_delta: Decimal,
    pub cost_pct_delta: Decimal,
    /// Flat amount added to each month's overhead after scaling.
    pub overhead_addition: Decimal,
}

impl Scenario {
    /// Build from untyped numeric input such as a config file or form.
    pub fn from_inputs(
        delay_months: i64,
        revenue_pct_delta: f64,
        cost_pct_delta: f64,
        overhead_addition: f64,
    ) -> Result<Self> {
        let delay_months = u32::try_from(delay_months)
            .map_err(|_| EacError::validation("delay_months", "must be a whole number of months >= 0"))?;
        let scenario = Self {
            delay_months,
            revenue_pct_delta: finite("revenue_pct_delta", revenue_pct_delta)?,
            cost_pct_delta: finite("cost_pct_delta", cost_pct_delta)?,
            overhead_addition: finite("overhead_addition", overhead_addition)?,
        };
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.revenue_pct_delta < -HUNDRED {
            return Err(EacError::validation(
                "revenue_pct_delta",
                "cannot reduce revenue by more than 100%",
            ));
        }
        if self.cost_pct_delta < -HUNDRED {
            return Err(EacError::validation(
                "cost_pct_delta",
                "cannot reduce cost by more than 100%",
            ));
        }
        if self.overhead_addition < Decimal::ZERO {
            return Err(EacError::validation(
                "overhead_addition",
                "cannot be negative",
            ));
        }
        Ok(())
    }

    pub fn is_neutral(&self) -> bool {
        self.delay_months == 0
            && self.revenue_pct_delta.is_zero()
            && self.cost_pct_delta.is_zero()
            && self.overhead_addition.is_zero()
    }

    fn revenue_factor(&self) -> Decimal {
        Decimal::ONE + self.revenue_pct_delta / HUNDRED
    }

    fn cost_factor(&self) -> Decimal {
        Decimal::ONE + self.cost_pct_delta / HUNDRED
    }
}

fn finite(field: &str, value: f64) -> Result<Decimal> {
    if !value.is_finite() {
        return Err(EacError::validation(field, "must be a finite number"));
    }
    Decimal::from_f64(value)
        .ok_or_else(|| EacError::validation(field, format!("{value} is out of range")))
}

/// A projection with a scenario applied, carrying the scenario it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedProjection {
    pub scenario: Scenario,
    pub projection: AnnualProjection,
}

/// Totals-only counterpart of [`AdjustedProjection`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedTotals {
    pub scenario: Scenario,
    /// False when a delay was requested but the base has no months to shift.
    pub delay_applied: bool,
    pub totals: ProjectionTotals,
}

/// Scale `costs` by the scenario's cost factor, then add its overhead.
fn adjust_costs(costs: &CostBreakdown, scenario: &Scenario) -> Result<CostBreakdown> {
    let mut adjusted = costs
        .checked_scale(scenario.cost_factor())
        .ok_or_else(|| EacError::out_of_range("cost_pct_delta"))?;
    adjusted.overhead = adjusted
        .overhead
        .checked_add(scenario.overhead_addition)
        .ok_or_else(|| EacError::out_of_range("overhead_addition"))?;
    Ok(adjusted)
}

fn adjust_revenue(revenue: Decimal, scenario: &Scenario) -> Result<Decimal> {
    revenue
        .checked_mul(scenario.revenue_factor())
        .ok_or_else(|| EacError::out_of_range("revenue_pct_delta"))
}

/// Apply `scenario` month by month.
///
/// Revenue of month `i` lands in month `i + delay_months`; revenue pushed past
/// December is dropped and the first `delay_months` months get none. Cost is
/// scaled first, then the overhead addition lands on every month. A figure
/// that no longer fits a `Decimal` fails with the month it belongs to.
pub fn apply_scenario(base: &AnnualProjection, scenario: &Scenario) -> Result<AdjustedProjection> {
    scenario.validate()?;

    let delay = scenario.delay_months as usize;

    let months = base
        .months
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let costs = adjust_costs(&row.costs, scenario).map_err(|e| e.in_month(row.year_month))?;

            let revenue = match i.checked_sub(delay).and_then(|source| base.months.get(source)) {
                Some(source) => adjust_revenue(source.revenue, scenario)
                    .map_err(|e| e.in_month(row.year_month))?,
                None => Decimal::ZERO,
            };

            ProjectionRow::new(
                MonthlyCostBucket {
                    year_month: row.year_month,
                    costs,
                },
                revenue,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    log::debug!(
        "applied scenario to {}: revenue x{}, cost x{}, overhead +{}, delay {}",
        base.year,
        scenario.revenue_factor(),
        scenario.cost_factor(),
        scenario.overhead_addition,
        scenario.delay_months
    );

    Ok(AdjustedProjection {
        scenario: *scenario,
        projection: AnnualProjection::from_rows(base.year, months)?,
    })
}

/// Apply `scenario` to a single totals row. The overhead addition lands once;
/// the delay is echoed back but has nothing to shift at this granularity.
pub fn apply_scenario_to_totals(
    base: &ProjectionTotals,
    scenario: &Scenario,
) -> Result<AdjustedTotals> {
    scenario.validate()?;

    let costs = adjust_costs(&base.costs, scenario)?;
    let revenue = adjust_revenue(base.revenue, scenario)?;

    Ok(AdjustedTotals {
        scenario: *scenario,
        delay_applied: false,
        totals: ProjectionTotals::new(costs, revenue)?,
    })
}

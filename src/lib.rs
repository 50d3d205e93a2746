//! Estimate-at-completion roll-up: loaded catalog rates, monthly cost buckets,
//! revenue recognition, margins and what-if scenarios for a project year.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod line_cost;
pub mod loader;
pub mod margin;
pub mod month;
pub mod rates;
pub mod report;
pub mod revenue;
pub mod scenario;
pub mod store;

pub use aggregate::{
    compute_annual_projection, compute_policy_projection, rollup_plan_lines, CostBreakdown,
    CostRow, MonthlyCostBucket, MonthlyRevenue, PlanRollup, RevenueRow,
};
pub use error::{EacError, Result};
pub use line_cost::{extended_cost, CostCategory, PlanLine};
pub use margin::{margin_pct, AnnualProjection, ProjectionRow, ProjectionTotals};
pub use month::{normalize_month_key, YearMonth};
pub use rates::{CatalogRate, RateSnapshot, RateUnit};
pub use revenue::{recognize_revenue, MethodKind, RevenueMethod, RevenueParams, RevenuePolicy};
pub use scenario::{apply_scenario, apply_scenario_to_totals, AdjustedProjection, AdjustedTotals, Scenario};

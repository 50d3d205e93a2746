//! Terminal tables and file exports for projections.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use num_format::{Locale, ToFormattedString};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::aggregate::CostBreakdown;
use crate::error::Result;
use crate::margin::{AnnualProjection, ProjectionTotals};
use crate::revenue::{RevenueMethod, RevenuePolicy};
use crate::scenario::AdjustedProjection;

/// `1234567.891` -> `1,234,567.89`
pub fn format_money(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let whole = rounded.trunc().abs().to_u64().unwrap_or(u64::MAX);
    let fraction = (rounded.fract().abs() * dec!(100)).to_u8().unwrap_or(0);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}{}.{fraction:02}", whole.to_formatted_string(&Locale::en))
}

/// Margin on the 0-100 scale with one decimal, or `n/a` when undefined.
pub fn format_margin(margin: Option<Decimal>) -> String {
    match margin {
        Some(m) => format!(
            "{:.1}%",
            m.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
        ),
        None => "n/a".to_string(),
    }
}

/// A policy fraction shown as a percentage (`0.15` -> `15%`).
fn display_pct(fraction: Decimal) -> String {
    format!("{}%", (fraction * dec!(100)).normalize())
}

/// One-line description of the policy, showing only the fields its method uses.
pub fn describe_policy(policy: &RevenuePolicy) -> Result<String> {
    let text = match policy.recognition()? {
        RevenueMethod::TimeAndMaterials => "Time & Materials (cost pass-through)".to_string(),
        RevenueMethod::CostPlus { fee_pct } => format!("Cost-Plus, fee {}", display_pct(fee_pct)),
        RevenueMethod::FixedFee {
            mat_markup_pct,
            subs_markup_pct,
            equip_markup_pct,
        } => format!(
            "Fixed-Fee, markups: materials {}, subs {}, equipment {}",
            display_pct(mat_markup_pct),
            display_pct(subs_markup_pct),
            display_pct(equip_markup_pct)
        ),
    };
    Ok(text)
}

const RULE_WIDTH: usize = 152;

fn header(out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "| {:<8} | {:>13} | {:>13} | {:>13} | {:>13} | {:>13} | {:>13} | {:>14} | {:>14} | {:>14} | {:>8} |",
        "Month", "Labor", "Equipment", "Materials", "Subs", "ODC", "Indirects", "TotalCost", "Revenue", "Profit", "Margin"
    )?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))
}

#[allow(clippy::too_many_arguments)]
fn line(
    out: &mut impl Write,
    label: &str,
    costs: &CostBreakdown,
    total_cost: Decimal,
    revenue: Decimal,
    profit: Decimal,
    margin: Option<Decimal>,
) -> io::Result<()> {
    writeln!(
        out,
        "| {:<8} | {:>13} | {:>13} | {:>13} | {:>13} | {:>13} | {:>13} | {:>14} | {:>14} | {:>14} | {:>8} |",
        label,
        format_money(costs.labor),
        format_money(costs.equip),
        format_money(costs.materials),
        format_money(costs.subs),
        format_money(costs.odc),
        costs
            .fringe
            .checked_add(costs.overhead)
            .and_then(|sum| sum.checked_add(costs.gna))
            .map_or_else(|| "out of range".to_string(), format_money),
        format_money(total_cost),
        format_money(revenue),
        format_money(profit),
        format_margin(margin)
    )
}

/// Write the twelve-month table followed by the totals row.
pub fn write_projection_table(out: &mut impl Write, projection: &AnnualProjection) -> io::Result<()> {
    header(out)?;
    for row in &projection.months {
        line(
            out,
            &row.year_month.to_string(),
            &row.costs,
            row.total_cost,
            row.revenue,
            row.profit,
            row.margin_pct,
        )?;
    }
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    let t = &projection.totals;
    line(out, "Total", &t.costs, t.total_cost, t.revenue, t.profit, t.margin_pct)
}

fn comparison_line(out: &mut impl Write, label: &str, base: &str, adjusted: &str) -> io::Result<()> {
    writeln!(out, "| {:<18} | {:>16} | {:>16} |", label, base, adjusted)
}

/// Base totals beside adjusted totals.
pub fn write_scenario_comparison(
    out: &mut impl Write,
    base: &ProjectionTotals,
    adjusted: &AdjustedProjection,
) -> io::Result<()> {
    let s = &adjusted.scenario;
    writeln!(
        out,
        "Scenario: revenue {:+}%, cost {:+}%, overhead +{} per month, revenue delayed {} month(s)",
        s.revenue_pct_delta.normalize(),
        s.cost_pct_delta.normalize(),
        format_money(s.overhead_addition),
        s.delay_months
    )?;
    writeln!(out)?;
    comparison_line(out, "", "Base", "Adjusted")?;
    writeln!(out, "{}", "-".repeat(60))?;
    let a = &adjusted.projection.totals;
    comparison_line(out, "Revenue", &format_money(base.revenue), &format_money(a.revenue))?;
    comparison_line(out, "Total cost", &format_money(base.total_cost), &format_money(a.total_cost))?;
    comparison_line(out, "Profit", &format_money(base.profit), &format_money(a.profit))?;
    comparison_line(out, "Margin", &format_margin(base.margin_pct), &format_margin(a.margin_pct))
}

/// Fixed two-decimal text for file output.
fn cents(value: Decimal) -> String {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

/// Export one row per month plus a totals row. Figures are rounded to cents.
pub fn export_csv(path: &Path, projection: &AnnualProjection) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "Month",
        "Labor",
        "Equipment",
        "Materials",
        "Subs",
        "ODC",
        "Fringe",
        "Overhead",
        "GNA",
        "TotalCost",
        "Revenue",
        "Profit",
        "MarginPct",
    ])?;

    let margin = |m: Option<Decimal>| m.map(cents).unwrap_or_default();

    let t = &projection.totals;
    let rows = projection
        .months
        .iter()
        .map(|r| (r.year_month.to_string(), &r.costs, r.total_cost, r.revenue, r.profit, r.margin_pct))
        .chain(std::iter::once((
            "Total".to_string(),
            &t.costs,
            t.total_cost,
            t.revenue,
            t.profit,
            t.margin_pct,
        )));

    for (label, costs, total_cost, revenue, profit, margin_pct) in rows {
        wtr.write_record(&[
            label,
            cents(costs.labor),
            cents(costs.equip),
            cents(costs.materials),
            cents(costs.subs),
            cents(costs.odc),
            cents(costs.fringe),
            cents(costs.overhead),
            cents(costs.gna),
            cents(total_cost),
            cents(revenue),
            cents(profit),
            margin(margin_pct),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Export any serializable projection as pretty JSON at full precision.
pub fn export_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

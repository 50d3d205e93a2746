use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{Datelike, Local};
use clap::Parser;
use rust_decimal::Decimal;

use eac_rollup::config::{load_config, RevenueSource};
use eac_rollup::loader::DataDir;
use eac_rollup::report::{
    describe_policy, export_csv, export_json, write_projection_table, write_scenario_comparison,
};
use eac_rollup::store::PlanRepository;
use eac_rollup::{
    apply_scenario, compute_annual_projection, compute_policy_projection, rollup_plan_lines,
    RevenuePolicy, Scenario, YearMonth,
};

#[derive(Parser)]
#[command(name = "eac")]
#[command(about = "Monthly P&L projection and what-if scenarios for a project")]
struct Cli {
    /// Project to report on
    #[arg(short, long)]
    project: Option<String>,

    /// Calendar year (defaults to the current year)
    #[arg(short, long)]
    year: Option<i32>,

    /// Directory holding the catalog, plan, cost, revenue and policy CSV files
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Configuration file (defaults to ./eac.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Where monthly revenue comes from
    #[arg(long, value_enum)]
    revenue_source: Option<RevenueSource>,

    /// Months by which revenue recognition slips
    #[arg(long, value_name = "MONTHS")]
    delay_months: Option<i64>,

    /// Revenue change in percent, e.g. 10 or -5
    #[arg(long, value_name = "PCT", allow_hyphen_values = true)]
    revenue_pct: Option<f64>,

    /// Cost change in percent
    #[arg(long, value_name = "PCT", allow_hyphen_values = true)]
    cost_pct: Option<f64>,

    /// Flat overhead added to every month
    #[arg(long, value_name = "AMOUNT")]
    overhead: Option<f64>,

    /// Export the projection table as CSV
    #[arg(long, value_name = "FILE")]
    csv_out: Option<PathBuf>,

    /// Export the projection (and scenario, if any) as JSON
    #[arg(long, value_name = "FILE")]
    json_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn has_scenario_flags(&self) -> bool {
        self.delay_months.is_some()
            || self.revenue_pct.is_some()
            || self.cost_pct.is_some()
            || self.overhead.is_some()
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = load_config(args.config.as_deref())?;

    let Some(project) = args.project.clone().or(config.project.clone()) else {
        bail!("no project given; pass --project or set `project` in eac.toml");
    };
    let year = args.year.or(config.year).unwrap_or_else(|| Local::now().year());
    let data_dir = args
        .data_dir
        .clone()
        .or(config.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from("data"));
    let revenue_source = args
        .revenue_source
        .or(config.revenue_source)
        .unwrap_or_default();

    // Command-line deltas override the config file field by field.
    let scenario = if args.has_scenario_flags() || config.scenario.is_some() {
        let base = config.scenario.clone().unwrap_or_default();
        Some(Scenario::from_inputs(
            args.delay_months.unwrap_or(base.delay_months),
            args.revenue_pct.unwrap_or(base.revenue_pct_delta),
            args.cost_pct.unwrap_or(base.cost_pct_delta),
            args.overhead.unwrap_or(base.overhead_addition),
        )?)
    } else {
        None
    };

    let data = DataDir::new(&data_dir)
        .load_all()
        .with_context(|| format!("loading data from {}", data_dir.display()))?;
    println!(
        "Processing dataset... ({} rows read, {} loaded)",
        data.report.rows_read, data.report.rows_loaded
    );
    if data.report.errors > 0 {
        println!("{} parse/validation errors encountered.", data.report.errors);
    }

    let from = YearMonth::new(year, 1)?;
    let to = YearMonth::new(year, 12)?;

    let lines = data.plan.lines_for(&project, from, to);
    let rollup = rollup_plan_lines(year, &project, &lines, &data.snapshot)?;
    if !rollup.skipped.is_empty() {
        println!(
            "{} plan line(s) skipped: reference not in catalog.",
            rollup.skipped.len()
        );
    }
    let mut cost_rows = rollup.rows;
    cost_rows.extend(data.cost_rows_for(&project, from, to));

    println!("Generating reports...");
    println!();

    let projection = match revenue_source {
        RevenueSource::Policy => {
            let policy = match data.policy(&project) {
                Some(policy) => policy.clone(),
                None => {
                    log::info!("no revenue policy for {project}, using T&M");
                    RevenuePolicy::default_for(&project)
                }
            };
            println!("Revenue policy: {}", describe_policy(&policy)?);
            compute_policy_projection(year, &cost_rows, &policy.recognition()?)?
        }
        RevenueSource::Rows => {
            println!("Revenue: recorded revenue rows");
            let revenue_rows = data.revenue_rows_for(&project, from, to);
            compute_annual_projection(year, &cost_rows, &revenue_rows)?
        }
    };

    println!();
    println!("Annual Projection: {project} ({year})");
    println!();
    let mut stdout = io::stdout().lock();
    write_projection_table(&mut stdout, &projection)?;

    let adjusted = match scenario {
        Some(scenario) => {
            let adjusted = apply_scenario(&projection, &scenario)?;
            println!();
            write_scenario_comparison(&mut stdout, &projection.totals, &adjusted)?;
            Some(adjusted)
        }
        None => None,
    };

    if let Some(path) = args.csv_out.as_ref().or(config.output.csv.as_ref()) {
        export_csv(path, &projection)
            .with_context(|| format!("writing {}", path.display()))?;
        println!();
        println!("Full table exported to {}", path.display());
    }

    if let Some(path) = args.json_out.as_ref().or(config.output.json.as_ref()) {
        let written = match &adjusted {
            Some(adjusted) => export_json(
                path,
                &serde_json::json!({ "base": projection, "adjusted": adjusted }),
            ),
            None => export_json(path, &projection),
        };
        written.with_context(|| format!("writing {}", path.display()))?;
        println!("Projection exported to {}", path.display());
    }

    if projection.totals.revenue == Decimal::ZERO && projection.totals.total_cost == Decimal::ZERO {
        println!("No cost or revenue recorded for {project} in {year}.");
    }

    Ok(())
}

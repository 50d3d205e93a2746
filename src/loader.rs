//! CSV-backed data access.
//!
//! A data directory holds one CSV file per table. Every file is optional; a
//! missing file loads as an empty table. Bad rows are counted and logged and
//! the rest of the file still loads. Month values are normalized here, once,
//! so the engine only ever sees `YYYY-MM` keys.

use std::collections::HashSet;
use std::fs::File;
use std::path::PathBuf;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::aggregate::{CostBreakdown, CostRow, RevenueRow};
use crate::error::{EacError, Result};
use crate::line_cost::{CostCategory, PlanLine};
use crate::month::{normalize_month_key, YearMonth};
use crate::rates::{
    loaded_labor_rate, loaded_material_rate, CatalogRate, Employee, EquipmentRate, RateSnapshot,
    Vendor,
};
use crate::revenue::{MethodKind, RevenueParams, RevenuePolicy};
use crate::store::{PlanRepository, PlanStore, PolicyRepository, PolicyStore, UpsertOutcome};

pub const LABOR_ROLES_FILE: &str = "labor_roles.csv";
pub const MATERIALS_FILE: &str = "materials.csv";
pub const EQUIPMENT_FILE: &str = "equipment.csv";
pub const EMPLOYEES_FILE: &str = "employees.csv";
pub const VENDORS_FILE: &str = "vendors.csv";
pub const PLAN_LINES_FILE: &str = "plan_lines.csv";
pub const COST_ROWS_FILE: &str = "cost_rows.csv";
pub const REVENUE_ROWS_FILE: &str = "revenue_rows.csv";
pub const POLICY_FILE: &str = "revenue_policy.csv";

/// Row counts for one or more loaded files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub errors: usize,
    /// Policy rows that repeat a project already loaded.
    pub duplicates: usize,
}

impl LoadReport {
    pub fn merge(&mut self, other: LoadReport) {
        self.rows_read += other.rows_read;
        self.rows_loaded += other.rows_loaded;
        self.errors += other.errors;
        self.duplicates += other.duplicates;
    }

    fn reject(&mut self, file: &str, row: usize, error: impl std::fmt::Display) {
        log::warn!("{file} row {row}: {error}");
        self.errors += 1;
    }
}

#[derive(Debug, Deserialize)]
struct RateRecord {
    key: String,
    base_rate: Decimal,
    #[serde(default, alias = "burden_pct", alias = "waste_pct")]
    burden_or_waste_pct: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct EquipmentRecord {
    key: String,
    rate: Decimal,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmployeeRecord {
    employee_id: String,
    name: String,
    role_key: String,
    #[serde(default)]
    active: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VendorRecord {
    vendor_id: String,
    name: String,
    #[serde(default)]
    active: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanLineRecord {
    project_id: String,
    month: String,
    category: String,
    reference_key: String,
    quantity: Decimal,
}

#[derive(Debug, Deserialize)]
struct CostRecord {
    #[serde(default)]
    project_id: Option<String>,
    month: String,
    #[serde(default)]
    labor: Option<Decimal>,
    #[serde(default)]
    equip: Option<Decimal>,
    #[serde(default)]
    materials: Option<Decimal>,
    #[serde(default)]
    subs: Option<Decimal>,
    #[serde(default)]
    odc: Option<Decimal>,
    #[serde(default)]
    fringe: Option<Decimal>,
    #[serde(default)]
    overhead: Option<Decimal>,
    #[serde(default)]
    gna: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct RevenueRecord {
    #[serde(default)]
    project_id: Option<String>,
    month: String,
    revenue: Decimal,
}

#[derive(Debug, Deserialize)]
struct PolicyRecord {
    project_id: String,
    method: String,
    #[serde(default)]
    fee_pct: Option<Decimal>,
    #[serde(default)]
    mat_markup_pct: Option<Decimal>,
    #[serde(default)]
    subs_markup_pct: Option<Decimal>,
    #[serde(default)]
    equip_markup_pct: Option<Decimal>,
}

/// A cost or revenue row tagged with the project it belongs to, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Scoped<T> {
    pub project_id: Option<String>,
    pub row: T,
}

impl<T> Scoped<T> {
    fn belongs_to(&self, project_id: &str) -> bool {
        self.project_id.as_deref().is_none_or(|p| p == project_id)
    }
}

/// Everything loaded from one data directory.
#[derive(Debug, Default)]
pub struct ProjectData {
    pub snapshot: RateSnapshot,
    pub plan: PlanStore,
    pub policies: PolicyStore,
    pub cost_rows: Vec<Scoped<CostRow>>,
    pub revenue_rows: Vec<Scoped<RevenueRow>>,
    pub report: LoadReport,
}

impl ProjectData {
    /// Cost rows of `project_id` whose month falls in `[from, to]`.
    pub fn cost_rows_for(&self, project_id: &str, from: YearMonth, to: YearMonth) -> Vec<CostRow> {
        scoped_rows(&self.cost_rows, project_id, from, to, |r| &r.month)
    }

    /// Revenue rows of `project_id` whose month falls in `[from, to]`.
    pub fn revenue_rows_for(
        &self,
        project_id: &str,
        from: YearMonth,
        to: YearMonth,
    ) -> Vec<RevenueRow> {
        scoped_rows(&self.revenue_rows, project_id, from, to, |r| &r.month)
    }

    /// Saved policy for the project, distinguishing "not found" from a load failure.
    pub fn policy(&self, project_id: &str) -> Option<&RevenuePolicy> {
        self.policies.policy(project_id)
    }
}

fn scoped_rows<T: Clone>(
    rows: &[Scoped<T>],
    project_id: &str,
    from: YearMonth,
    to: YearMonth,
    month: impl Fn(&T) -> &String,
) -> Vec<T> {
    rows.iter()
        .filter(|s| s.belongs_to(project_id))
        .filter(|s| {
            // Months were normalized on load.
            normalize_month_key(month(&s.row)).is_ok_and(|m| m >= from && m <= to)
        })
        .map(|s| s.row.clone())
        .collect()
}

fn is_active(flag: Option<&str>) -> bool {
    match flag.map(|f| f.trim().to_ascii_lowercase()) {
        None => true,
        Some(f) => matches!(f.as_str(), "" | "1" | "y" | "yes" | "true" | "active"),
    }
}

/// Reads the tables of a data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Deserialize every row of `file`; rows that fail to parse are counted, not fatal.
    fn read_records<T: DeserializeOwned>(&self, file: &str) -> Result<(Vec<(usize, T)>, LoadReport)> {
        let path = self.root.join(file);
        let mut report = LoadReport::default();
        if !path.exists() {
            log::debug!("{} not found, treating as empty", path.display());
            return Ok((Vec::new(), report));
        }

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(File::open(&path)?);
        let mut records = Vec::new();
        for (i, result) in rdr.deserialize::<T>().enumerate() {
            let row = i + 1;
            report.rows_read += 1;
            match result {
                Ok(record) => records.push((row, record)),
                Err(e) => report.reject(file, row, e),
            }
        }
        Ok((records, report))
    }

    /// Build the rate snapshot from the five catalog tables.
    pub fn load_catalog(&self) -> Result<(RateSnapshot, LoadReport)> {
        let mut report = LoadReport::default();
        let mut builder = RateSnapshot::builder();

        let (labor, r) = self.read_records::<RateRecord>(LABOR_ROLES_FILE)?;
        report.merge(r);
        for (row, rec) in labor {
            let rate = CatalogRate::new(rec.key, rec.base_rate, rec.burden_or_waste_pct.unwrap_or_default());
            match loaded_labor_rate(&rate) {
                Ok(_) => {
                    builder = builder.labor_role(rate);
                    report.rows_loaded += 1;
                }
                Err(e) => report.reject(LABOR_ROLES_FILE, row, e),
            }
        }

        let (materials, r) = self.read_records::<RateRecord>(MATERIALS_FILE)?;
        report.merge(r);
        for (row, rec) in materials {
            let rate = CatalogRate::new(rec.key, rec.base_rate, rec.burden_or_waste_pct.unwrap_or_default());
            match loaded_material_rate(&rate) {
                Ok(_) => {
                    builder = builder.material(rate);
                    report.rows_loaded += 1;
                }
                Err(e) => report.reject(MATERIALS_FILE, row, e),
            }
        }

        let (equipment, r) = self.read_records::<EquipmentRecord>(EQUIPMENT_FILE)?;
        report.merge(r);
        for (row, rec) in equipment {
            if rec.rate < Decimal::ZERO {
                report.reject(EQUIPMENT_FILE, row, format!("negative rate for '{}'", rec.key));
                continue;
            }
            match rec.unit.as_deref().unwrap_or_default().parse() {
                Ok(unit) => {
                    builder = builder.equipment(EquipmentRate {
                        key: rec.key,
                        rate: rec.rate,
                        unit,
                    });
                    report.rows_loaded += 1;
                }
                Err(e) => report.reject(EQUIPMENT_FILE, row, e),
            }
        }

        let (employees, r) = self.read_records::<EmployeeRecord>(EMPLOYEES_FILE)?;
        report.merge(r);
        for (_, rec) in employees {
            if !is_active(rec.active.as_deref()) {
                continue;
            }
            builder = builder.employee(Employee {
                employee_id: rec.employee_id,
                name: rec.name,
                role_key: rec.role_key,
            });
            report.rows_loaded += 1;
        }

        let (vendors, r) = self.read_records::<VendorRecord>(VENDORS_FILE)?;
        report.merge(r);
        for (_, rec) in vendors {
            if !is_active(rec.active.as_deref()) {
                continue;
            }
            builder = builder.vendor(Vendor {
                vendor_id: rec.vendor_id,
                name: rec.name,
            });
            report.rows_loaded += 1;
        }

        Ok((builder.build()?, report))
    }

    /// Save every plan line through the store; lines the snapshot cannot cost are rejected.
    pub fn load_plan(&self, snapshot: &RateSnapshot) -> Result<(PlanStore, LoadReport)> {
        let (records, mut report) = self.read_records::<PlanLineRecord>(PLAN_LINES_FILE)?;
        let mut store = PlanStore::new();

        for (row, rec) in records {
            let line = match plan_line_from_record(rec) {
                Ok(line) => line,
                Err(e) => {
                    report.reject(PLAN_LINES_FILE, row, e);
                    continue;
                }
            };
            match store.upsert_line(line, snapshot) {
                Ok(UpsertOutcome::Dropped) => {}
                Ok(_) => report.rows_loaded += 1,
                Err(e) => report.reject(PLAN_LINES_FILE, row, e),
            }
        }
        Ok((store, report))
    }

    pub fn load_cost_rows(&self) -> Result<(Vec<Scoped<CostRow>>, LoadReport)> {
        let (records, mut report) = self.read_records::<CostRecord>(COST_ROWS_FILE)?;
        let mut rows = Vec::new();
        for (row, rec) in records {
            match normalize_month_key(&rec.month) {
                Ok(month) => {
                    rows.push(Scoped {
                        project_id: rec.project_id,
                        row: CostRow {
                            month: month.to_string(),
                            costs: CostBreakdown {
                                labor: rec.labor.unwrap_or_default(),
                                equip: rec.equip.unwrap_or_default(),
                                materials: rec.materials.unwrap_or_default(),
                                subs: rec.subs.unwrap_or_default(),
                                odc: rec.odc.unwrap_or_default(),
                                fringe: rec.fringe.unwrap_or_default(),
                                overhead: rec.overhead.unwrap_or_default(),
                                gna: rec.gna.unwrap_or_default(),
                            },
                        },
                    });
                    report.rows_loaded += 1;
                }
                Err(e) => report.reject(COST_ROWS_FILE, row, e),
            }
        }
        Ok((rows, report))
    }

    pub fn load_revenue_rows(&self) -> Result<(Vec<Scoped<RevenueRow>>, LoadReport)> {
        let (records, mut report) = self.read_records::<RevenueRecord>(REVENUE_ROWS_FILE)?;
        let mut rows = Vec::new();
        for (row, rec) in records {
            match normalize_month_key(&rec.month) {
                Ok(month) => {
                    rows.push(Scoped {
                        project_id: rec.project_id,
                        row: RevenueRow {
                            month: month.to_string(),
                            revenue: rec.revenue,
                        },
                    });
                    report.rows_loaded += 1;
                }
                Err(e) => report.reject(REVENUE_ROWS_FILE, row, e),
            }
        }
        Ok((rows, report))
    }

    /// Load policies; a project saved twice keeps its last row.
    pub fn load_policies(&self) -> Result<(PolicyStore, LoadReport)> {
        let (records, mut report) = self.read_records::<PolicyRecord>(POLICY_FILE)?;
        let mut store = PolicyStore::new();
        let mut seen = HashSet::new();
        for (row, rec) in records {
            let policy = match policy_from_record(rec) {
                Ok(p) => p,
                Err(e) => {
                    report.reject(POLICY_FILE, row, e);
                    continue;
                }
            };
            let project_id = policy.project_id.clone();
            match store.upsert_policy(policy) {
                Ok(_) => {
                    if !seen.insert(project_id.clone()) {
                        log::warn!(
                            "{POLICY_FILE} row {row}: repeats the policy for {project_id}, last row wins"
                        );
                        report.duplicates += 1;
                    }
                    report.rows_loaded += 1;
                }
                Err(e) => report.reject(POLICY_FILE, row, e),
            }
        }
        Ok((store, report))
    }

    /// Load every table of the directory.
    pub fn load_all(&self) -> Result<ProjectData> {
        if !self.root.is_dir() {
            return Err(EacError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("data directory {} does not exist", self.root.display()),
            )));
        }

        let mut report = LoadReport::default();
        let (snapshot, r) = self.load_catalog()?;
        report.merge(r);
        let (plan, r) = self.load_plan(&snapshot)?;
        report.merge(r);
        let (policies, r) = self.load_policies()?;
        report.merge(r);
        let (cost_rows, r) = self.load_cost_rows()?;
        report.merge(r);
        let (revenue_rows, r) = self.load_revenue_rows()?;
        report.merge(r);

        log::debug!(
            "loaded {}: {} rows read, {} loaded, {} errors",
            self.root.display(),
            report.rows_read,
            report.rows_loaded,
            report.errors
        );
        Ok(ProjectData {
            snapshot,
            plan,
            policies,
            cost_rows,
            revenue_rows,
            report,
        })
    }
}

fn plan_line_from_record(rec: PlanLineRecord) -> Result<PlanLine> {
    Ok(PlanLine {
        project_id: rec.project_id,
        year_month: normalize_month_key(&rec.month)?,
        category: rec.category.parse::<CostCategory>()?,
        reference_key: rec.reference_key,
        quantity: rec.quantity,
    })
}

fn policy_from_record(rec: PolicyRecord) -> Result<RevenuePolicy> {
    let method: MethodKind = rec.method.parse()?;
    Ok(RevenuePolicy {
        project_id: rec.project_id,
        method,
        params: RevenueParams {
            fee_pct: rec.fee_pct.unwrap_or_default(),
            mat_markup_pct: rec.mat_markup_pct.unwrap_or_default(),
            subs_markup_pct: rec.subs_markup_pct.unwrap_or_default(),
            equip_markup_pct: rec.equip_markup_pct.unwrap_or_default(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_flags() {
        assert!(is_active(None));
        assert!(is_active(Some("")));
        assert!(is_active(Some("Yes")));
        assert!(!is_active(Some("false")));
        assert!(!is_active(Some("0")));
    }

    #[test]
    fn test_scoped_rows_without_project_apply_to_all() {
        let rows = vec![
            Scoped {
                project_id: None,
                row: RevenueRow {
                    month: "2025-01".into(),
                    revenue: Decimal::ONE,
                },
            },
            Scoped {
                project_id: Some("P-2".into()),
                row: RevenueRow {
                    month: "2025-01".into(),
                    revenue: Decimal::TEN,
                },
            },
        ];
        let jan = YearMonth::new(2025, 1).unwrap();
        let picked = scoped_rows(&rows, "P-1", jan, jan, |r| &r.month);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].revenue, Decimal::ONE);
    }

    #[test]
    fn test_repeated_policy_rows_are_counted_even_when_identical() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(POLICY_FILE),
            "project_id,method,fee_pct,mat_markup_pct,subs_markup_pct,equip_markup_pct\n\
             P-1,COST_PLUS,0.10,,,\n\
             P-1,COST_PLUS,0.10,,,\n\
             P-1,TM,,,,\n\
             P-2,TM,,,,\n",
        )
        .unwrap();

        let (store, report) = DataDir::new(dir.path()).load_policies().unwrap();
        assert_eq!(report.rows_loaded, 4);
        assert_eq!(report.duplicates, 2);
        assert_eq!(report.errors, 0);
        assert_eq!(store.policy("P-1").unwrap().method, MethodKind::TimeAndMaterials);
    }

    #[test]
    fn test_month_outside_supported_years_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(REVENUE_ROWS_FILE),
            "project_id,month,revenue\n\
             P-1,9999-12-31T23:00:00-05:00,100\n\
             P-1,2025-02,200\n",
        )
        .unwrap();

        let (rows, report) = DataDir::new(dir.path()).load_revenue_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(report.errors, 1);
        assert_eq!(rows[0].row.month, "2025-02");
    }
}

//! Catalog rates and the loaded-rate snapshot.
//!
//! Raw catalog rows carry a base rate plus a burden (labor) or waste (materials)
//! fraction. [`RateSnapshot`] turns them into loaded unit rates once, and is then
//! passed by reference into every costing call. A new catalog fetch builds a new
//! snapshot; there is no partial refresh.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{EacError, Result};

/// One catalog row: a labor role, material SKU or equipment type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRate {
    pub key: String,
    pub base_rate: Decimal,
    /// Burden for labor, waste for materials, ignored for equipment. A fraction.
    #[serde(default)]
    pub burden_or_waste_pct: Decimal,
}

impl CatalogRate {
    pub fn new(key: impl Into<String>, base_rate: Decimal, burden_or_waste_pct: Decimal) -> Self {
        Self {
            key: key.into(),
            base_rate,
            burden_or_waste_pct,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(EacError::validation("key", "catalog key is empty"));
        }
        if self.base_rate < Decimal::ZERO {
            return Err(EacError::validation(
                format!("base_rate of '{}'", self.key),
                "cannot be negative",
            ));
        }
        if self.burden_or_waste_pct < Decimal::ZERO {
            return Err(EacError::validation(
                format!("burden_or_waste_pct of '{}'", self.key),
                "cannot be negative",
            ));
        }
        Ok(())
    }
}

/// Billing unit of an equipment rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateUnit {
    Hour,
    Day,
    Week,
    Month,
    Each,
}

impl fmt::Display for RateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RateUnit::Hour => "hour",
            RateUnit::Day => "day",
            RateUnit::Week => "week",
            RateUnit::Month => "month",
            RateUnit::Each => "each",
        };
        f.write_str(name)
    }
}

impl FromStr for RateUnit {
    type Err = EacError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" | "hr" | "hourly" => Ok(RateUnit::Hour),
            "day" | "daily" => Ok(RateUnit::Day),
            "week" | "wk" | "weekly" => Ok(RateUnit::Week),
            "month" | "mo" | "monthly" => Ok(RateUnit::Month),
            "each" | "ea" | "" => Ok(RateUnit::Each),
            other => Err(EacError::validation(
                "rate_unit",
                format!("'{other}' is not a known unit"),
            )),
        }
    }
}

/// An equipment catalog row: the rate passes through unchanged, tagged with its unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentRate {
    pub key: String,
    pub rate: Decimal,
    pub unit: RateUnit,
}

/// An active employee and the labor role whose rate they bill at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub employee_id: String,
    pub name: String,
    pub role_key: String,
}

/// A subcontractor vendor. Subs lines are dollar amounts against a vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub vendor_id: String,
    pub name: String,
}

/// Labor: `round(base * (1 + burden), 2)`, midpoint away from zero.
pub fn loaded_labor_rate(rate: &CatalogRate) -> Result<Decimal> {
    rate.validate()?;
    Ok((rate.base_rate * (Decimal::ONE + rate.burden_or_waste_pct))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Materials: `base * (1 + waste)`, kept at full precision.
pub fn loaded_material_rate(rate: &CatalogRate) -> Result<Decimal> {
    rate.validate()?;
    Ok(rate.base_rate * (Decimal::ONE + rate.burden_or_waste_pct))
}

/// Immutable loaded-rate lookup tables for one catalog fetch.
#[derive(Debug, Clone, Default)]
pub struct RateSnapshot {
    labor: HashMap<String, Decimal>,
    materials: HashMap<String, Decimal>,
    equipment: HashMap<String, (Decimal, RateUnit)>,
    employees: HashMap<String, String>,
    vendors: HashMap<String, String>,
}

impl RateSnapshot {
    pub fn builder() -> RateSnapshotBuilder {
        RateSnapshotBuilder::default()
    }

    pub fn labor_rate(&self, key: &str) -> Result<Decimal> {
        if let Some(rate) = self.labor.get(key) {
            return Ok(*rate);
        }
        // Labor lines may name an employee instead of a role.
        self.employees
            .get(key)
            .and_then(|role| self.labor.get(role))
            .copied()
            .ok_or_else(|| EacError::lookup("labor", key))
    }

    pub fn material_rate(&self, key: &str) -> Result<Decimal> {
        self.materials
            .get(key)
            .copied()
            .ok_or_else(|| EacError::lookup("materials", key))
    }

    pub fn equipment_rate(&self, key: &str) -> Result<(Decimal, RateUnit)> {
        self.equipment
            .get(key)
            .copied()
            .ok_or_else(|| EacError::lookup("equipment", key))
    }

    pub fn vendor_name(&self, vendor_id: &str) -> Result<&str> {
        self.vendors
            .get(vendor_id)
            .map(String::as_str)
            .ok_or_else(|| EacError::lookup("subs", vendor_id))
    }

    pub fn is_empty(&self) -> bool {
        self.labor.is_empty()
            && self.materials.is_empty()
            && self.equipment.is_empty()
            && self.vendors.is_empty()
    }
}

/// Collects catalog rows and computes loaded rates when built.
#[derive(Debug, Default)]
pub struct RateSnapshotBuilder {
    labor: Vec<CatalogRate>,
    materials: Vec<CatalogRate>,
    equipment: Vec<EquipmentRate>,
    employees: Vec<Employee>,
    vendors: Vec<Vendor>,
}

impl RateSnapshotBuilder {
    pub fn labor_role(mut self, rate: CatalogRate) -> Self {
        self.labor.push(rate);
        self
    }

    pub fn material(mut self, rate: CatalogRate) -> Self {
        self.materials.push(rate);
        self
    }

    pub fn equipment(mut self, rate: EquipmentRate) -> Self {
        self.equipment.push(rate);
        self
    }

    pub fn employee(mut self, employee: Employee) -> Self {
        self.employees.push(employee);
        self
    }

    pub fn vendor(mut self, vendor: Vendor) -> Self {
        self.vendors.push(vendor);
        self
    }

    pub fn build(self) -> Result<RateSnapshot> {
        let mut snapshot = RateSnapshot::default();

        for rate in &self.labor {
            snapshot
                .labor
                .insert(rate.key.clone(), loaded_labor_rate(rate)?);
        }
        for rate in &self.materials {
            snapshot
                .materials
                .insert(rate.key.clone(), loaded_material_rate(rate)?);
        }
        for rate in self.equipment {
            if rate.rate < Decimal::ZERO {
                return Err(EacError::validation(
                    format!("rate of equipment '{}'", rate.key),
                    "cannot be negative",
                ));
            }
            snapshot.equipment.insert(rate.key, (rate.rate, rate.unit));
        }
        for employee in self.employees {
            if !snapshot.labor.contains_key(&employee.role_key) {
                log::warn!(
                    "employee {} references unknown labor role '{}'",
                    employee.employee_id,
                    employee.role_key
                );
            }
            snapshot
                .employees
                .insert(employee.employee_id, employee.role_key);
        }
        for vendor in self.vendors {
            snapshot.vendors.insert(vendor.vendor_id, vendor.name);
        }

        log::debug!(
            "rate snapshot built: {} labor, {} materials, {} equipment, {} employees, {} vendors",
            snapshot.labor.len(),
            snapshot.materials.len(),
            snapshot.equipment.len(),
            snapshot.employees.len(),
            snapshot.vendors.len()
        );
        Ok(snapshot)
    }
}

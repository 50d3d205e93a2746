//! Extended cost of a single plan or actual line.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EacError, Result};
use crate::month::YearMonth;
use crate::rates::{RateSnapshot, RateUnit};

/// Direct cost category a plan line is booked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostCategory {
    Labor,
    Equipment,
    Materials,
    Subs,
    Odc,
}

impl CostCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostCategory::Labor => "labor",
            CostCategory::Equipment => "equipment",
            CostCategory::Materials => "materials",
            CostCategory::Subs => "subs",
            CostCategory::Odc => "odc",
        }
    }
}

impl fmt::Display for CostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CostCategory {
    type Err = EacError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "labor" => Ok(CostCategory::Labor),
            "equipment" | "equip" => Ok(CostCategory::Equipment),
            "materials" | "material" => Ok(CostCategory::Materials),
            "subs" | "subcontractor" | "subcontractors" => Ok(CostCategory::Subs),
            "odc" => Ok(CostCategory::Odc),
            other => Err(EacError::validation(
                "category",
                format!("'{other}' is not a cost category"),
            )),
        }
    }
}

/// One planned (or actual) quantity against a catalog reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanLine {
    pub project_id: String,
    pub year_month: YearMonth,
    pub category: CostCategory,
    pub reference_key: String,
    pub quantity: Decimal,
}

impl PlanLine {
    /// Lines with no positive quantity are not lines at all.
    pub fn is_empty(&self) -> bool {
        self.quantity <= Decimal::ZERO
    }
}

/// Unit rate for a line's reference. Subs and ODC lines are dollar amounts,
/// so their unit rate is 1; subs still require a known vendor.
pub fn unit_rate(
    category: CostCategory,
    reference_key: &str,
    snapshot: &RateSnapshot,
) -> Result<(Decimal, Option<RateUnit>)> {
    match category {
        CostCategory::Labor => Ok((snapshot.labor_rate(reference_key)?, None)),
        CostCategory::Materials => Ok((snapshot.material_rate(reference_key)?, None)),
        CostCategory::Equipment => {
            let (rate, unit) = snapshot.equipment_rate(reference_key)?;
            Ok((rate, Some(unit)))
        }
        CostCategory::Subs => {
            snapshot.vendor_name(reference_key)?;
            Ok((Decimal::ONE, None))
        }
        CostCategory::Odc => Ok((Decimal::ONE, None)),
    }
}

/// `quantity * loaded_rate`, or `None` when the line has no positive quantity.
///
/// An unknown reference is a [`EacError::Lookup`]; aggregate views skip the
/// line, save paths reject it.
pub fn extended_cost(line: &PlanLine, snapshot: &RateSnapshot) -> Result<Option<Decimal>> {
    if line.is_empty() {
        return Ok(None);
    }
    let (rate, _) = unit_rate(line.category, &line.reference_key, snapshot)?;
    let cost = line.quantity.checked_mul(rate).ok_or_else(|| {
        EacError::validation(
            "quantity",
            format!("{} at {} per unit is out of range", line.quantity, rate),
        )
        .in_month(line.year_month)
    })?;
    Ok(Some(cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::{CatalogRate, EquipmentRate, Vendor};
    use rust_decimal_macros::dec;

    fn snapshot() -> RateSnapshot {
        RateSnapshot::builder()
            .labor_role(CatalogRate::new("ENG", dec!(80), dec!(0.35)))
            .material(CatalogRate::new("CONC", dec!(120), dec!(0.10)))
            .equipment(EquipmentRate {
                key: "LIFT".into(),
                rate: dec!(45),
                unit: RateUnit::Hour,
            })
            .vendor(Vendor {
                vendor_id: "V-9".into(),
                name: "Ridge Paving".into(),
            })
            .build()
            .unwrap()
    }

    fn line(category: CostCategory, key: &str, quantity: Decimal) -> PlanLine {
        PlanLine {
            project_id: "P-1".into(),
            year_month: YearMonth::new(2025, 5).unwrap(),
            category,
            reference_key: key.into(),
            quantity,
        }
    }

    #[test]
    fn test_extended_cost_per_category() {
        let rates = snapshot();
        let cases = [
            (line(CostCategory::Labor, "ENG", dec!(160)), dec!(17280)),
            (line(CostCategory::Materials, "CONC", dec!(3)), dec!(396)),
            (line(CostCategory::Equipment, "LIFT", dec!(10)), dec!(450)),
            (line(CostCategory::Subs, "V-9", dec!(25000)), dec!(25000)),
            (line(CostCategory::Odc, "travel", dec!(812.40)), dec!(812.40)),
        ];
        for (l, expected) in cases {
            assert_eq!(extended_cost(&l, &rates).unwrap(), Some(expected), "{}", l.category);
        }
    }

    #[test]
    fn test_non_positive_quantity_is_no_line() {
        let rates = snapshot();
        assert_eq!(
            extended_cost(&line(CostCategory::Labor, "ENG", dec!(0)), &rates).unwrap(),
            None
        );
        // Even an unknown key is not looked up for an empty line.
        assert_eq!(
            extended_cost(&line(CostCategory::Labor, "NOPE", dec!(-4)), &rates).unwrap(),
            None
        );
    }

    #[test]
    fn test_unknown_reference_is_lookup_error() {
        let rates = snapshot();
        let err = extended_cost(&line(CostCategory::Subs, "V-0", dec!(1)), &rates).unwrap_err();
        assert!(err.is_lookup());
    }

    #[test]
    fn test_extended_cost_overflow_names_quantity_and_month() {
        let rates = snapshot();
        let err = extended_cost(&line(CostCategory::Labor, "ENG", Decimal::MAX), &rates).unwrap_err();
        assert!(matches!(
            err,
            EacError::Validation { ref field, month: Some(m), .. }
                if field == "quantity" && m == YearMonth::new(2025, 5).unwrap()
        ));
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("Equip".parse::<CostCategory>().unwrap(), CostCategory::Equipment);
        assert_eq!(" ODC ".parse::<CostCategory>().unwrap(), CostCategory::Odc);
        assert!("fringe".parse::<CostCategory>().is_err());
    }
}

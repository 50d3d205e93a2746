//! Revenue recognition.
//!
//! A stored [`RevenuePolicy`] keeps all four percentages whichever method is
//! active, so switching the method back and forth never loses a value. The
//! engine itself only ever sees a [`RevenueMethod`], which carries exactly the
//! parameters its method reads.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::CostBreakdown;
use crate::error::{EacError, Result};

/// Name of a billing method as stored on a policy row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodKind {
    #[serde(rename = "TM")]
    TimeAndMaterials,
    #[serde(rename = "COST_PLUS")]
    CostPlus,
    #[serde(rename = "FIXED_FEE")]
    FixedFee,
}

impl MethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::TimeAndMaterials => "TM",
            MethodKind::CostPlus => "COST_PLUS",
            MethodKind::FixedFee => "FIXED_FEE",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodKind {
    type Err = EacError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TM" | "T&M" => Ok(MethodKind::TimeAndMaterials),
            "COST_PLUS" => Ok(MethodKind::CostPlus),
            "FIXED_FEE" => Ok(MethodKind::FixedFee),
            _ => Err(EacError::policy(s)),
        }
    }
}

/// Fee and markup fractions (0.10 = 10%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueParams {
    #[serde(default)]
    pub fee_pct: Decimal,
    #[serde(default)]
    pub mat_markup_pct: Decimal,
    #[serde(default)]
    pub subs_markup_pct: Decimal,
    #[serde(default)]
    pub equip_markup_pct: Decimal,
}

impl RevenueParams {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("fee_pct", self.fee_pct),
            ("mat_markup_pct", self.mat_markup_pct),
            ("subs_markup_pct", self.subs_markup_pct),
            ("equip_markup_pct", self.equip_markup_pct),
        ];
        for (field, value) in fields {
            if value < Decimal::ZERO {
                return Err(EacError::validation(field, "cannot be negative"));
            }
        }
        Ok(())
    }
}

/// A billing method with the parameters it uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevenueMethod {
    /// Cost reimbursed as incurred.
    #[serde(rename = "TM")]
    TimeAndMaterials,
    /// Cost plus a fee on the whole bucket.
    CostPlus { fee_pct: Decimal },
    /// Labor and indirects at cost; materials, subs and equipment marked up.
    FixedFee {
        mat_markup_pct: Decimal,
        subs_markup_pct: Decimal,
        equip_markup_pct: Decimal,
    },
}

impl RevenueMethod {
    /// Build from a stored method name and flat parameters.
    pub fn from_parts(method: &str, params: &RevenueParams) -> Result<Self> {
        let kind: MethodKind = method.parse()?;
        Self::from_kind(kind, params)
    }

    pub fn from_kind(kind: MethodKind, params: &RevenueParams) -> Result<Self> {
        params.validate()?;
        Ok(match kind {
            MethodKind::TimeAndMaterials => RevenueMethod::TimeAndMaterials,
            MethodKind::CostPlus => RevenueMethod::CostPlus {
                fee_pct: params.fee_pct,
            },
            MethodKind::FixedFee => RevenueMethod::FixedFee {
                mat_markup_pct: params.mat_markup_pct,
                subs_markup_pct: params.subs_markup_pct,
                equip_markup_pct: params.equip_markup_pct,
            },
        })
    }
}

/// `amount * (1 + pct)`, failing with `field` when the product does not fit.
fn marked_up(amount: Decimal, pct: Decimal, field: &str) -> Result<Decimal> {
    Decimal::ONE
        .checked_add(pct)
        .and_then(|factor| amount.checked_mul(factor))
        .ok_or_else(|| EacError::out_of_range(field))
}

/// Revenue recognized for one cost bucket.
pub fn recognize_revenue(method: &RevenueMethod, costs: &CostBreakdown) -> Result<Decimal> {
    match *method {
        RevenueMethod::TimeAndMaterials => costs.total_cost(),
        RevenueMethod::CostPlus { fee_pct } => marked_up(costs.total_cost()?, fee_pct, "fee_pct"),
        RevenueMethod::FixedFee {
            mat_markup_pct,
            subs_markup_pct,
            equip_markup_pct,
        } => {
            let parts = [
                costs.labor,
                marked_up(costs.materials, mat_markup_pct, "mat_markup_pct")?,
                marked_up(costs.subs, subs_markup_pct, "subs_markup_pct")?,
                marked_up(costs.equip, equip_markup_pct, "equip_markup_pct")?,
                costs.odc,
                costs.fringe,
                costs.overhead,
                costs.gna,
            ];
            parts
                .into_iter()
                .try_fold(Decimal::ZERO, |sum, amount| sum.checked_add(amount))
                .ok_or_else(|| EacError::out_of_range("revenue"))
        }
    }
}

/// The revenue policy stored for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenuePolicy {
    pub project_id: String,
    pub method: MethodKind,
    #[serde(flatten)]
    pub params: RevenueParams,
}

impl RevenuePolicy {
    /// Time-and-materials with zero percentages, used when a project has no policy row.
    pub fn default_for(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            method: MethodKind::TimeAndMaterials,
            params: RevenueParams::default(),
        }
    }

    /// The method the engine applies; parameters the method ignores stay stored.
    pub fn recognition(&self) -> Result<RevenueMethod> {
        RevenueMethod::from_kind(self.method, &self.params)
    }

    /// Switch the active method, keeping every stored percentage.
    pub fn with_method(mut self, method: MethodKind) -> Self {
        self.method = method;
        self
    }
}

//! Plan-line and revenue-policy repositories.
//!
//! The engine never touches storage; these traits describe the boundary it
//! expects from a data-access layer, and the in-memory stores back the CLI
//! and the tests.

use std::collections::{BTreeMap, HashMap};

use crate::error::{EacError, Result};
use crate::line_cost::{unit_rate, CostCategory, PlanLine};
use crate::month::YearMonth;
use crate::rates::RateSnapshot;
use crate::revenue::RevenuePolicy;

/// Upsert key of a plan line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlanKey {
    pub project_id: String,
    pub year_month: YearMonth,
    pub category: CostCategory,
    pub reference_key: String,
}

impl From<&PlanLine> for PlanKey {
    fn from(line: &PlanLine) -> Self {
        Self {
            project_id: line.project_id.clone(),
            year_month: line.year_month,
            category: line.category,
            reference_key: line.reference_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    Unchanged,
    /// Quantity was not positive; nothing was written.
    Dropped,
}

pub trait PlanRepository {
    /// Save a line, replacing any line with the same key. The reference must
    /// resolve in `snapshot`.
    fn upsert_line(&mut self, line: PlanLine, snapshot: &RateSnapshot) -> Result<UpsertOutcome>;

    /// Lines of one project whose month falls in `[from, to]`.
    fn lines_for(&self, project_id: &str, from: YearMonth, to: YearMonth) -> Vec<PlanLine>;
}

pub trait PolicyRepository {
    /// The project's policy, or `None` when it has never been saved.
    fn policy(&self, project_id: &str) -> Option<&RevenuePolicy>;

    fn upsert_policy(&mut self, policy: RevenuePolicy) -> Result<UpsertOutcome>;

    /// The saved policy, or zero-percentage T&M when there is none.
    fn policy_or_default(&self, project_id: &str) -> RevenuePolicy {
        self.policy(project_id)
            .cloned()
            .unwrap_or_else(|| RevenuePolicy::default_for(project_id))
    }
}

#[derive(Debug, Default)]
pub struct PlanStore {
    lines: BTreeMap<PlanKey, PlanLine>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl PlanRepository for PlanStore {
    fn upsert_line(&mut self, line: PlanLine, snapshot: &RateSnapshot) -> Result<UpsertOutcome> {
        if line.is_empty() {
            log::debug!(
                "dropping {} line for {} in {}: quantity {}",
                line.category,
                line.reference_key,
                line.year_month,
                line.quantity
            );
            return Ok(UpsertOutcome::Dropped);
        }
        if line.project_id.trim().is_empty() {
            return Err(EacError::validation("project_id", "is empty").in_month(line.year_month));
        }
        unit_rate(line.category, &line.reference_key, snapshot)?;

        let key = PlanKey::from(&line);
        let outcome = match self.lines.get(&key) {
            None => UpsertOutcome::Inserted,
            Some(existing) if *existing == line => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Replaced,
        };
        self.lines.insert(key, line);
        Ok(outcome)
    }

    fn lines_for(&self, project_id: &str, from: YearMonth, to: YearMonth) -> Vec<PlanLine> {
        self.lines
            .values()
            .filter(|l| l.project_id == project_id && l.year_month >= from && l.year_month <= to)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct PolicyStore {
    policies: HashMap<String, RevenuePolicy>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl PolicyRepository for PolicyStore {
    fn policy(&self, project_id: &str) -> Option<&RevenuePolicy> {
        self.policies.get(project_id)
    }

    fn upsert_policy(&mut self, policy: RevenuePolicy) -> Result<UpsertOutcome> {
        policy.params.validate()?;
        let outcome = match self.policies.get(&policy.project_id) {
            None => UpsertOutcome::Inserted,
            Some(existing) if *existing == policy => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Replaced,
        };
        self.policies.insert(policy.project_id.clone(), policy);
        Ok(outcome)
    }
}

//! Closed workload catalog.
//!
//! Every workload id the pod may activate is declared up front. Eligibility
//! tables are resolved against the catalog at construction, so a misspelt
//! id is a startup error rather than a silent no-op mid-session.

use crate::config::WorkloadSpec;
use crate::error::{PodError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a catalogued workload. Orders lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadId(String);

impl WorkloadId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated set of workload specs keyed by id.
#[derive(Debug, Clone, Default)]
pub struct WorkloadCatalog {
    specs: BTreeMap<WorkloadId, WorkloadSpec>,
}

impl WorkloadCatalog {
    /// Build a catalog from config entries.
    ///
    /// # Errors
    /// Returns `PodError::Config` for empty or duplicate ids and for risk caps
    /// outside their valid range.
    pub fn new(specs: &[WorkloadSpec]) -> Result<Self> {
        let mut catalog = BTreeMap::new();
        for spec in specs {
            let id = spec.id.trim();
            if id.is_empty() {
                return Err(PodError::Config("workload id must not be empty".to_owned()));
            }
            if !(spec.max_position_pct > 0.0 && spec.max_position_pct <= 1.0) {
                return Err(PodError::Config(format!(
                    "workload '{id}' max_position_pct must be in (0, 1], got {}",
                    spec.max_position_pct
                )));
            }
            let mut normalised = spec.clone();
            normalised.id = id.to_owned();
            if catalog
                .insert(WorkloadId(id.to_owned()), normalised)
                .is_some()
            {
                return Err(PodError::Config(format!("workload '{id}' declared twice")));
            }
        }
        Ok(Self { specs: catalog })
    }

    /// Resolve a configured id against the catalog.
    ///
    /// # Errors
    /// Returns `PodError::Config` for ids that were never declared.
    pub fn resolve(&self, id: &str) -> Result<WorkloadId> {
        let key = WorkloadId(id.trim().to_owned());
        if self.specs.contains_key(&key) {
            Ok(key)
        } else {
            Err(PodError::Config(format!(
                "workload '{}' is not declared in [[workloads]]",
                key
            )))
        }
    }

    pub fn spec(&self, id: &WorkloadId) -> Option<&WorkloadSpec> {
        self.specs.get(id)
    }

    pub fn is_enabled(&self, id: &WorkloadId) -> bool {
        self.specs.get(id).is_some_and(|s| s.enabled)
    }

    /// Catalogued ids in lexicographic order.
    pub fn ids(&self) -> impl Iterator<Item = &WorkloadId> {
        self.specs.keys()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

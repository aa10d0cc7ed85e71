//! Transcript coverage as the geometric mean of its nodes' Stat coverage.

use std::collections::{BTreeSet, HashMap};

use crate::errors::{TasmError, TasmResult};
use crate::models::{ContigOrdering, DataGap, StatRecord};

/// What to do when a transcript path references nodes without a Stat row.
///
/// A path with no matching Stat row at all is always fatal, whatever the
/// policy: its coverage is undefined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GapPolicy {
    /// Any missing node aborts the run.
    Strict,
    /// Missing nodes are reported and coverage uses the matched nodes.
    #[default]
    Tolerant,
}

impl std::str::FromStr for GapPolicy {
    type Err = TasmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(GapPolicy::Strict),
            "tolerant" => Ok(GapPolicy::Tolerant),
            other => Err(TasmError::Configuration(format!(
                "unknown gap policy {other:?} (expected \"strict\" or \"tolerant\")"
            ))),
        }
    }
}

/// `exp(mean(ln(x)))` over strictly positive, finite values.
pub fn geometric_mean(values: &[f64]) -> TasmResult<f64> {
    if values.is_empty() {
        return Err(TasmError::InvalidCoverage(
            "geometric mean of an empty set is undefined".to_string(),
        ));
    }
    let mut log_sum = 0.0;
    for &v in values {
        if !v.is_finite() || v <= 0.0 {
            return Err(TasmError::InvalidCoverage(format!(
                "geometric mean requires positive finite values, got {v}"
            )));
        }
        log_sum += v.ln();
    }
    Ok((log_sum / values.len() as f64).exp())
}

/// Stat coverage keyed by node id for one assembly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatTable {
    coverage: HashMap<i64, f64>,
}

/// Coverage values found for a path, plus the node ids that had none.
#[derive(Clone, Debug, PartialEq)]
pub struct CoverageLookup {
    pub values: Vec<f64>,
    pub missing: Vec<i64>,
}

impl StatTable {
    pub fn from_records(records: &[StatRecord]) -> Self {
        Self {
            coverage: records.iter().map(|r| (r.node_id, r.coverage)).collect(),
        }
    }

    pub fn from_map(coverage: HashMap<i64, f64>) -> Self {
        Self { coverage }
    }

    pub fn len(&self) -> usize {
        self.coverage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coverage.is_empty()
    }

    pub fn get(&self, node_id: i64) -> Option<f64> {
        self.coverage.get(&node_id).copied()
    }

    /// Look up each distinct node of a path once, in ascending id order.
    pub fn lookup(&self, node_ids: &[i64]) -> CoverageLookup {
        let distinct: BTreeSet<i64> = node_ids.iter().copied().collect();
        let mut values = Vec::with_capacity(distinct.len());
        let mut missing = Vec::new();
        for node_id in distinct {
            match self.get(node_id) {
                Some(v) => values.push(v),
                None => missing.push(node_id),
            }
        }
        CoverageLookup { values, missing }
    }
}

/// Coverage of one transcript path.
///
/// Returns the coverage and, under [`GapPolicy::Tolerant`], the gap that was
/// tolerated to compute it.
pub fn transcript_coverage(
    table: &StatTable,
    ordering: &ContigOrdering,
    policy: GapPolicy,
) -> TasmResult<(f64, Option<DataGap>)> {
    let lookup = table.lookup(&ordering.node_ids);

    if lookup.values.is_empty() {
        let reason = if ordering.node_ids.is_empty() {
            "node path is empty".to_string()
        } else {
            format!("none of the path nodes {:?} has a stat row", lookup.missing)
        };
        return Err(TasmError::DataGap {
            locus_id: ordering.locus_id,
            transcript_id: ordering.transcript_id,
            reason,
        });
    }

    let gap = if lookup.missing.is_empty() {
        None
    } else {
        let gap = DataGap {
            locus_id: ordering.locus_id,
            transcript_id: ordering.transcript_id,
            missing_node_ids: lookup.missing,
            matched_nodes: lookup.values.len(),
        };
        if policy == GapPolicy::Strict {
            return Err(TasmError::DataGap {
                locus_id: gap.locus_id,
                transcript_id: gap.transcript_id,
                reason: gap.describe(),
            });
        }
        Some(gap)
    };

    let coverage = geometric_mean(&lookup.values).map_err(|e| match e {
        TasmError::InvalidCoverage(msg) => TasmError::InvalidCoverage(format!(
            "Locus_{}_Transcript_{}: {msg}",
            ordering.locus_id, ordering.transcript_id
        )),
        other => other,
    })?;
    Ok((coverage, gap))
}

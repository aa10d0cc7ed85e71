//! Shared typed records used across the ingestion and storage layers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{TasmError, TasmResult};

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Species stored when the operator does not name one.
pub const DEFAULT_SPECIES: &str = "unknown";

/// Parameters of a new assembly, as supplied by the operator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssemblySpec {
    pub identifier: String,
    pub species: String,
    pub k_min: i64,
    pub k_max: i64,
}

impl AssemblySpec {
    pub fn new(identifier: impl Into<String>, species: impl Into<String>, k_min: i64, k_max: i64) -> Self {
        let species = species.into();
        Self {
            identifier: identifier.into(),
            species: if species.trim().is_empty() {
                DEFAULT_SPECIES.to_string()
            } else {
                species
            },
            k_min,
            k_max,
        }
    }

    /// Check the operator-supplied values before any I/O happens.
    pub fn validate(&self) -> TasmResult<()> {
        if self.identifier.trim().is_empty() {
            return Err(TasmError::Configuration(
                "assembly identifier must not be empty".to_string(),
            ));
        }
        if self.k_min < 0 || self.k_max < 0 {
            return Err(TasmError::Configuration(
                "k_min and k_max must be non-negative integers".to_string(),
            ));
        }
        if self.k_max <= self.k_min {
            return Err(TasmError::Configuration(format!(
                "k_max ({}) must be greater than k_min ({})",
                self.k_max, self.k_min
            )));
        }
        Ok(())
    }
}

/// A persisted assembly row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssemblyRecord {
    pub pk: i64,
    pub identifier: String,
    pub species: String,
    pub k_min: i64,
    pub k_max: i64,
}

// ---------------------------------------------------------------------------
// Per-node records
// ---------------------------------------------------------------------------

/// One assembly-graph node from `contigs.fa`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContigRecord {
    pub node_id: i64,
    pub length: i64,
    pub coverage: f64,
    pub sequence: String,
}

/// One row of `stats.txt`. Coverage is always finite.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StatRecord {
    pub node_id: i64,
    pub length: i64,
    pub coverage: f64,
}

// ---------------------------------------------------------------------------
// Transcripts
// ---------------------------------------------------------------------------

/// Node path of one reported transcript, from `contig-ordering.txt`.
///
/// Node ids are unsigned magnitudes in path order; the traversal direction
/// carried by the sign in the file is dropped.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContigOrdering {
    pub locus_id: i64,
    pub transcript_id: i64,
    pub node_ids: Vec<i64>,
}

impl ContigOrdering {
    pub fn key(&self) -> (i64, i64) {
        (self.locus_id, self.transcript_id)
    }
}

/// A transcript parsed from `transcripts.fa`, before coverage is known.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TranscriptEntry {
    pub locus_id: i64,
    pub transcript_id: i64,
    pub confidence: f64,
    pub length: i64,
    pub sequence: String,
}

impl TranscriptEntry {
    pub fn key(&self) -> (i64, i64) {
        (self.locus_id, self.transcript_id)
    }
}

/// A transcript ready to be written, with its computed coverage.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TranscriptRecord {
    pub locus_id: i64,
    pub transcript_id: i64,
    pub confidence: f64,
    pub length: i64,
    pub sequence: String,
    pub coverage: f64,
}

/// A persisted transcript row joined with its natural locus id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredTranscript {
    pub pk: i64,
    pub locus_pk: i64,
    pub locus_id: i64,
    pub transcript_id: i64,
    pub confidence: f64,
    pub length: i64,
    pub coverage: f64,
}

// ---------------------------------------------------------------------------
// Run reporting
// ---------------------------------------------------------------------------

/// A transcript whose node path references nodes without a Stat row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataGap {
    pub locus_id: i64,
    pub transcript_id: i64,
    pub missing_node_ids: Vec<i64>,
    pub matched_nodes: usize,
}

impl DataGap {
    pub fn describe(&self) -> String {
        format!(
            "{} of {} path nodes have no stat row: {:?}",
            self.missing_node_ids.len(),
            self.missing_node_ids.len() + self.matched_nodes,
            self.missing_node_ids
        )
    }
}

/// Summary of a completed ingestion run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IngestReport {
    pub run_id: String,
    pub assembly: String,
    pub contigs: usize,
    pub stats: usize,
    pub stats_excluded_infinite: usize,
    pub loci_created: usize,
    pub transcripts: usize,
    pub data_gaps: Vec<DataGap>,
    pub elapsed_ms: i64,
}

/// One reportable condition observed during a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IngestDiagnostic {
    pub stage: String,
    pub category: String,
    pub severity: String,
    pub locus_id: Option<i64>,
    pub transcript_id: Option<i64>,
    pub message: String,
}

impl IngestDiagnostic {
    pub fn from_gap(gap: &DataGap) -> Self {
        Self {
            stage: "coverage".to_string(),
            category: "data_gap".to_string(),
            severity: "warning".to_string(),
            locus_id: Some(gap.locus_id),
            transcript_id: Some(gap.transcript_id),
            message: gap.describe(),
        }
    }

    pub fn infinite_coverage(node_ids: &[i64]) -> Self {
        Self {
            stage: "stats".to_string(),
            category: "infinite_coverage".to_string(),
            severity: "info".to_string(),
            locus_id: None,
            transcript_id: None,
            message: format!(
                "{} nodes with infinite coverage excluded: {:?}",
                node_ids.len(),
                node_ids
            ),
        }
    }
}

/// Provenance row written for every ingestion attempt.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IngestRun {
    pub run_id: String,
    pub assembly: String,
    pub status: String,
    pub input_hashes: IndexMap<String, String>,
    pub report_json: Option<String>,
    pub error_message: Option<String>,
}

/// Row counts for one assembly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AssemblySummary {
    pub identifier: String,
    pub species: String,
    pub k_min: i64,
    pub k_max: i64,
    pub contigs: i64,
    pub stats: i64,
    pub loci: i64,
    pub transcripts: i64,
}

//! `_tasm_core` Python extension module.
//!
//! Lets the web application run ingestion and the read-side helpers without
//! shelling out to the `tasm` binary.

use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::ingest::coverage::{self, GapPolicy};
use crate::ingest::header;
use crate::ingest::pipeline::{self, IngestOptions};
use crate::models::{AssemblySpec, IngestReport, StoredTranscript};
use crate::store::database::{Database, DEFAULT_BEST_PERCENT_CUTOFF};

fn report_to_pydict<'py>(py: Python<'py>, report: &IngestReport) -> PyResult<Bound<'py, PyDict>> {
    let gaps = PyList::empty(py);
    for gap in &report.data_gaps {
        let entry = PyDict::new(py);
        entry.set_item("locus_id", gap.locus_id)?;
        entry.set_item("transcript_id", gap.transcript_id)?;
        entry.set_item("missing_node_ids", gap.missing_node_ids.clone())?;
        entry.set_item("matched_nodes", gap.matched_nodes)?;
        gaps.append(entry)?;
    }

    let result = PyDict::new(py);
    result.set_item("run_id", &report.run_id)?;
    result.set_item("assembly", &report.assembly)?;
    result.set_item("contigs", report.contigs)?;
    result.set_item("stats", report.stats)?;
    result.set_item("stats_excluded_infinite", report.stats_excluded_infinite)?;
    result.set_item("loci_created", report.loci_created)?;
    result.set_item("transcripts", report.transcripts)?;
    result.set_item("data_gaps", gaps)?;
    result.set_item("elapsed_ms", report.elapsed_ms)?;
    Ok(result)
}

fn transcript_to_pydict<'py>(py: Python<'py>, t: &StoredTranscript) -> PyResult<Bound<'py, PyDict>> {
    let result = PyDict::new(py);
    result.set_item("pk", t.pk)?;
    result.set_item("locus_pk", t.locus_pk)?;
    result.set_item("locus_id", t.locus_id)?;
    result.set_item("transcript_id", t.transcript_id)?;
    result.set_item("confidence", t.confidence)?;
    result.set_item("length", t.length)?;
    result.set_item("coverage", t.coverage)?;
    Ok(result)
}

/// Ingest an oases output directory as a new assembly and return the run
/// report as a dict.
#[pyfunction]
#[pyo3(signature = (db_path, identifier, directory, k_min, k_max, species="unknown", gap_policy="tolerant", require_file_order=true))]
#[allow(clippy::too_many_arguments)]
pub fn ingest_assembly(
    py: Python<'_>,
    db_path: PathBuf,
    identifier: &str,
    directory: PathBuf,
    k_min: i64,
    k_max: i64,
    species: &str,
    gap_policy: &str,
    require_file_order: bool,
) -> PyResult<PyObject> {
    let options = IngestOptions {
        gap_policy: gap_policy.parse::<GapPolicy>()?,
        require_file_order,
    };
    let spec = AssemblySpec::new(identifier, species, k_min, k_max);
    let db = Database::new(db_path)?;
    let report = py.allow_threads(|| pipeline::ingest_assembly(&db, &spec, &directory, &options))?;
    Ok(report_to_pydict(py, &report)?.into_any().unbind())
}

/// Parse a NODE or Locus/Transcript header into a field dict.
#[pyfunction]
pub fn parse_header(py: Python<'_>, header: &str) -> PyResult<PyObject> {
    let fields = header::parse_header(header)?;
    let result = PyDict::new(py);
    for (key, value) in &fields {
        result.set_item(key, value)?;
    }
    Ok(result.into_any().unbind())
}

#[pyfunction]
pub fn geometric_mean(values: Vec<f64>) -> PyResult<f64> {
    Ok(coverage::geometric_mean(&values)?)
}

/// Best transcript of a locus, or `None` when the locus has no transcripts.
#[pyfunction]
#[pyo3(signature = (db_path, identifier, locus_id, percent_cutoff=DEFAULT_BEST_PERCENT_CUTOFF))]
pub fn best_transcript_for_locus(
    py: Python<'_>,
    db_path: PathBuf,
    identifier: &str,
    locus_id: i64,
    percent_cutoff: i64,
) -> PyResult<PyObject> {
    let db = Database::new(db_path)?;
    match db.best_transcript_for_locus(identifier, locus_id, percent_cutoff)? {
        Some(t) => Ok(transcript_to_pydict(py, &t)?.into_any().unbind()),
        None => Ok(py.None()),
    }
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("CONTIG_FILE", pipeline::CONTIG_FILE)?;
    m.add("STATS_FILE", pipeline::STATS_FILE)?;
    m.add("CONTIG_ORDERING_FILE", pipeline::CONTIG_ORDERING_FILE)?;
    m.add("TRANSCRIPTS_FILE", pipeline::TRANSCRIPTS_FILE)?;
    m.add_function(wrap_pyfunction!(ingest_assembly, m)?)?;
    m.add_function(wrap_pyfunction!(parse_header, m)?)?;
    m.add_function(wrap_pyfunction!(geometric_mean, m)?)?;
    m.add_function(wrap_pyfunction!(best_transcript_for_locus, m)?)?;
    Ok(())
}

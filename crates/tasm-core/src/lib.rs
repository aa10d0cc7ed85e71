//! tasm core library: ingestion of oases/Velvet transcript assemblies.
//!
//! Parses the pipeline's output files (`contigs.fa`, `stats.txt`,
//! `contig-ordering.txt`, `transcripts.fa`), computes each transcript's
//! coverage as the geometric mean of its nodes' coverage, and writes
//! assemblies, contigs, stats, loci and transcripts into SQLite for the web
//! application to browse.
//!
//! With the `python` feature the crate also builds the `_tasm_core` Python
//! extension module.

pub mod errors;
pub mod ingest;
pub mod models;
pub mod store;

#[cfg(feature = "python")]
mod python;

pub use errors::{TasmError, TasmResult};
pub use ingest::coverage::GapPolicy;
pub use ingest::pipeline::{ingest_assembly, IngestInputs, IngestOptions};
pub use models::{AssemblySpec, IngestReport};
pub use store::database::Database;

#[cfg(feature = "python")]
use pyo3::prelude::*;

// ---------------------------------------------------------------------------
// Top-level Python module: _tasm_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pymodule]
fn _tasm_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register(m)
}

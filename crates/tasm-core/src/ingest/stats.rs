//! `stats.txt`: the per-node statistics table.
//!
//! The file is tab-separated with a header row. Only `ID`, `lgth` and
//! `long_cov` are read; any other columns are ignored.

use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use tracing::{debug, info, warn};

use rusqlite::Connection;

use crate::errors::{TasmError, TasmResult};
use crate::models::StatRecord;
use crate::store::database::Database;

/// `long_cov` value the assembler writes for nodes with unbounded coverage.
pub const INFINITE_COVERAGE_TOKEN: &str = "Inf";

const REQUIRED_COLUMNS: &[&str] = &["ID", "lgth", "long_cov"];

#[derive(Debug, Deserialize)]
struct RawStatRow {
    #[serde(rename = "ID")]
    id: String,
    lgth: String,
    long_cov: String,
}

/// A parsed `stats.txt` row whose coverage has not been filtered yet.
#[derive(Clone, Debug, PartialEq)]
pub struct StatRow {
    pub node_id: i64,
    pub length: i64,
    pub long_cov: String,
}

/// Outcome of the infinite-coverage filter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatImport {
    pub records: Vec<StatRecord>,
    /// Node ids dropped because their `long_cov` was `Inf`.
    pub excluded_infinite: Vec<i64>,
}

fn row_int(line: usize, column: &str, raw: &str) -> TasmResult<i64> {
    raw.parse::<i64>().map_err(|_| {
        TasmError::malformed_record(
            &format!("stats line {line}"),
            format!("{column} must be an integer, got {raw:?}"),
        )
    })
}

/// Parse the rows of a stats file without interpreting `long_cov`.
pub fn read_stats(path: &Path) -> TasmResult<Vec<StatRow>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == *column) {
            return Err(TasmError::malformed_record(
                &path.display().to_string(),
                format!("missing required column {column:?}"),
            ));
        }
    }

    let mut rows = Vec::new();
    for (idx, raw) in reader.deserialize::<RawStatRow>().enumerate() {
        let raw = raw?;
        // Header is line 1.
        let line = idx + 2;
        let node_id = row_int(line, "ID", &raw.id)?;
        if node_id <= 0 {
            return Err(TasmError::malformed_record(
                &format!("stats line {line}"),
                format!("ID must be positive, got {node_id}"),
            ));
        }
        rows.push(StatRow {
            node_id,
            length: row_int(line, "lgth", &raw.lgth)?,
            long_cov: raw.long_cov,
        });
    }
    Ok(rows)
}

/// Drop nodes whose coverage is the literal `Inf` token.
///
/// Unbounded coverage marks a sequencing artifact, so those nodes take no
/// part in coverage computation. Any other value must parse to a finite
/// number.
pub fn exclude_infinite_coverage(rows: Vec<StatRow>) -> TasmResult<StatImport> {
    let mut import = StatImport::default();
    for row in rows {
        if row.long_cov == INFINITE_COVERAGE_TOKEN {
            debug!(node_id = row.node_id, "excluding node with infinite coverage");
            import.excluded_infinite.push(row.node_id);
            continue;
        }
        let coverage = match row.long_cov.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                return Err(TasmError::malformed_record(
                    &format!("stats node {}", row.node_id),
                    format!("long_cov must be a finite number or {INFINITE_COVERAGE_TOKEN:?}, got {:?}", row.long_cov),
                ))
            }
        };
        import.records.push(StatRecord {
            node_id: row.node_id,
            length: row.length,
            coverage,
        });
    }
    Ok(import)
}

/// Read `path`, filter infinite-coverage nodes and bulk-insert the rest
/// under `assembly_pk`.
pub fn import_stats(conn: &Connection, assembly_pk: i64, path: &Path) -> TasmResult<StatImport> {
    let rows = read_stats(path)?;
    let import = exclude_infinite_coverage(rows)?;
    if !import.excluded_infinite.is_empty() {
        warn!(
            excluded = import.excluded_infinite.len(),
            "nodes with infinite coverage excluded from stats"
        );
    }
    let inserted = Database::insert_stats(conn, assembly_pk, &import.records)?;
    info!(stats = inserted, "imported node stats");
    Ok(import)
}

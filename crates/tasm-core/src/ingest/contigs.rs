//! `contigs.fa`: one Contig record per assembly-graph node.

use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::TasmResult;
use crate::ingest::fasta::read_fasta;
use crate::ingest::header::NodeHeader;
use crate::models::ContigRecord;
use crate::store::database::Database;

/// Parse every record of a NODE-headed FASTA file.
pub fn read_contigs(path: &Path) -> TasmResult<Vec<ContigRecord>> {
    read_fasta(path)?
        .into_iter()
        .map(|entry| {
            let header = NodeHeader::parse(&entry.id)?;
            Ok(ContigRecord {
                node_id: header.node_id,
                length: header.length,
                coverage: header.coverage,
                sequence: entry.body,
            })
        })
        .collect()
}

/// Read `path` and bulk-insert the contigs under `assembly_pk`.
pub fn import_contigs(conn: &Connection, assembly_pk: i64, path: &Path) -> TasmResult<usize> {
    let contigs = read_contigs(path)?;
    debug!(file = %path.display(), records = contigs.len(), "parsed contigs");
    let inserted = Database::insert_contigs(conn, assembly_pk, &contigs)?;
    info!(contigs = inserted, "imported contigs");
    Ok(inserted)
}

//! `transcripts.fa`: transcripts, their loci, and their computed coverage.
//!
//! Each transcript is joined to its node path by `(locus_id, transcript_id)`
//! as parsed from both files' headers. The pipeline writes both files in the
//! same order, so a count mismatch, a missing key, or (when file order is
//! required) a key at a different position means the inputs do not belong
//! together.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::errors::{TasmError, TasmResult};
use crate::ingest::coverage::{transcript_coverage, StatTable};
use crate::ingest::fasta::read_fasta;
use crate::ingest::header::TranscriptHeader;
use crate::ingest::pipeline::IngestOptions;
use crate::models::{ContigOrdering, DataGap, TranscriptEntry, TranscriptRecord};
use crate::store::database::Database;

fn label((locus_id, transcript_id): (i64, i64)) -> String {
    format!("Locus_{locus_id}_Transcript_{transcript_id}")
}

/// Parse every transcript record, in file order.
pub fn read_transcripts(path: &Path) -> TasmResult<Vec<TranscriptEntry>> {
    read_fasta(path)?
        .into_iter()
        .map(|entry| {
            let header = TranscriptHeader::parse(&entry.id)?;
            Ok(TranscriptEntry {
                locus_id: header.locus_id,
                transcript_id: header.transcript_id,
                confidence: header.confidence,
                length: header.length,
                sequence: entry.body,
            })
        })
        .collect()
}

/// Pair each transcript with its node path.
pub fn join_orderings<'a>(
    transcripts: Vec<TranscriptEntry>,
    orderings: &'a [ContigOrdering],
    require_file_order: bool,
) -> TasmResult<Vec<(TranscriptEntry, &'a ContigOrdering)>> {
    if transcripts.len() != orderings.len() {
        return Err(TasmError::AlignmentMismatch(format!(
            "transcripts file has {} records but contig ordering has {} reported transcripts",
            transcripts.len(),
            orderings.len()
        )));
    }

    let mut by_key: HashMap<(i64, i64), usize> = HashMap::with_capacity(orderings.len());
    for (idx, ordering) in orderings.iter().enumerate() {
        if by_key.insert(ordering.key(), idx).is_some() {
            return Err(TasmError::AlignmentMismatch(format!(
                "{} appears more than once in contig ordering",
                label(ordering.key())
            )));
        }
    }

    let mut seen: HashSet<(i64, i64)> = HashSet::with_capacity(transcripts.len());
    let mut joined = Vec::with_capacity(transcripts.len());
    for (position, transcript) in transcripts.into_iter().enumerate() {
        let key = transcript.key();
        if !seen.insert(key) {
            return Err(TasmError::AlignmentMismatch(format!(
                "{} appears more than once in transcripts file",
                label(key)
            )));
        }
        let idx = *by_key.get(&key).ok_or_else(|| {
            TasmError::AlignmentMismatch(format!("{} has no contig ordering entry", label(key)))
        })?;
        if require_file_order && idx != position {
            return Err(TasmError::AlignmentMismatch(format!(
                "record {} of transcripts file is {} but contig ordering lists {} there",
                position + 1,
                label(key),
                label(orderings[position].key())
            )));
        }
        joined.push((transcript, &orderings[idx]));
    }
    Ok(joined)
}

/// Transcripts with coverage attached, plus any tolerated gaps.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CoverageAssignment {
    pub records: Vec<TranscriptRecord>,
    pub gaps: Vec<DataGap>,
}

/// Compute the coverage of every joined transcript.
pub fn assign_coverage(
    joined: Vec<(TranscriptEntry, &ContigOrdering)>,
    table: &StatTable,
    options: &IngestOptions,
) -> TasmResult<CoverageAssignment> {
    let mut assignment = CoverageAssignment {
        records: Vec::with_capacity(joined.len()),
        gaps: Vec::new(),
    };
    for (entry, ordering) in joined {
        let (coverage, gap) = transcript_coverage(table, ordering, options.gap_policy)?;
        if let Some(gap) = gap {
            warn!(
                locus_id = gap.locus_id,
                transcript_id = gap.transcript_id,
                missing = ?gap.missing_node_ids,
                "coverage computed over a partial node path"
            );
            assignment.gaps.push(gap);
        }
        assignment.records.push(TranscriptRecord {
            locus_id: entry.locus_id,
            transcript_id: entry.transcript_id,
            confidence: entry.confidence,
            length: entry.length,
            sequence: entry.sequence,
            coverage,
        });
    }
    Ok(assignment)
}

/// What [`assemble_transcripts`] wrote.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssemblyOutcome {
    pub transcripts_written: usize,
    pub loci_created: usize,
    pub data_gaps: Vec<DataGap>,
}

/// Build transcripts and loci for an assembly and write them.
///
/// Loci are created only for locus ids the assembly does not hold yet, and
/// transcripts are upserted, so assembling the same input twice leaves one
/// row per locus and per transcript.
pub fn assemble_transcripts(
    conn: &Connection,
    assembly_pk: i64,
    transcripts_path: &Path,
    orderings: &[ContigOrdering],
    table: &StatTable,
    options: &IngestOptions,
) -> TasmResult<AssemblyOutcome> {
    let entries = read_transcripts(transcripts_path)?;
    debug!(records = entries.len(), "parsed transcripts");

    let joined = join_orderings(entries, orderings, options.require_file_order)?;
    let assignment = assign_coverage(joined, table, options)?;
    info!(transcripts = assignment.records.len(), "computed transcript coverage");

    let locus_ids: BTreeSet<i64> = assignment.records.iter().map(|t| t.locus_id).collect();
    let (locus_keys, loci_created) = Database::get_or_create_loci(conn, assembly_pk, &locus_ids)?;
    info!(loci = locus_ids.len(), created = loci_created, "resolved loci");

    let mut rows = Vec::with_capacity(assignment.records.len());
    for record in &assignment.records {
        let locus_pk = *locus_keys.get(&record.locus_id).ok_or_else(|| {
            TasmError::Database(format!("locus {} was not created", record.locus_id))
        })?;
        rows.push((locus_pk, record));
    }
    let transcripts_written = Database::upsert_transcripts(conn, &rows)?;
    info!(transcripts = transcripts_written, "wrote transcripts");

    Ok(AssemblyOutcome {
        transcripts_written,
        loci_created,
        data_gaps: assignment.gaps,
    })
}

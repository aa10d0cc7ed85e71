//! `contig-ordering.txt`: the node path behind each reported transcript.
//!
//! The file is FASTA-shaped. Headers follow the transcript format and the
//! body lists the traversed nodes:
//!
//! ```text
//! >Locus_1_Transcript_1/2_Confidence_1.000_Length_303
//! -1:123-(0)->6219:124-(0)->6220:130-(0)
//! ```
//!
//! A negative node id means the node is traversed in reverse; only its
//! magnitude identifies the node.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::errors::{TasmError, TasmResult};
use crate::ingest::fasta::read_fasta;
use crate::ingest::header::{header_tokens, parse_header, positive_int};
use crate::models::ContigOrdering;

/// Token that marks a header as a reported transcript.
const TRANSCRIPT_TOKEN: &str = "Transcript";

const SEGMENT_SEPARATOR: &str = "->";

static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-?\d+):(\d+)(?:-\((-?\d+)\))?$").unwrap());

/// Parse a path body such as `-1:123-(0)->6219:124-(0)` into node ids,
/// signs stripped, in path order.
pub fn parse_node_path(body: &str) -> TasmResult<Vec<i64>> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }

    body.split(SEGMENT_SEPARATOR)
        .map(|segment| {
            let caps = SEGMENT_RE.captures(segment.trim()).ok_or_else(|| {
                TasmError::malformed_record(segment, "expected <node>:<weight>-(<n>)")
            })?;
            let signed: i64 = caps[1]
                .parse()
                .map_err(|_| TasmError::malformed_record(segment, "node id out of range"))?;
            if signed == 0 {
                return Err(TasmError::malformed_record(segment, "node id 0 is not a graph node"));
            }
            Ok(signed.abs())
        })
        .collect()
}

/// Whether a header names a reported transcript rather than an intermediate
/// assembly path.
pub fn is_reported_transcript(header: &str) -> bool {
    header_tokens(header).contains(&TRANSCRIPT_TOKEN)
}

/// Read every reported transcript path from a contig-ordering file, in file
/// order. Records without a `Transcript` token are skipped.
pub fn read_contig_ordering(path: &Path) -> TasmResult<Vec<ContigOrdering>> {
    let mut orderings = Vec::new();
    let mut skipped = 0usize;

    for entry in read_fasta(path)? {
        if !is_reported_transcript(&entry.id) {
            skipped += 1;
            continue;
        }
        let fields = parse_header(&entry.id)?;
        let node_ids = parse_node_path(&entry.body).map_err(|e| match e {
            TasmError::MalformedRecord { record, reason } => TasmError::MalformedRecord {
                record: format!("{} segment {record}", entry.id),
                reason,
            },
            other => other,
        })?;
        orderings.push(ContigOrdering {
            locus_id: positive_int(&fields, &entry.id, "locus")?,
            transcript_id: positive_int(&fields, &entry.id, "transcript_id")?,
            node_ids,
        });
    }

    debug!(skipped, "skipped unreported assembly paths");
    info!(orderings = orderings.len(), "resolved contig orderings");
    Ok(orderings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_traversal_signs() {
        assert_eq!(parse_node_path("-1:123-(0)->6219:124-(0)").unwrap(), vec![1, 6219]);
    }

    #[test]
    fn keeps_path_order_and_repeats() {
        let ids = parse_node_path("5:10-(0)->-3:11-(2)->5:12-(0)").unwrap();
        assert_eq!(ids, vec![5, 3, 5]);
    }

    #[test]
    fn empty_body_has_no_nodes() {
        assert!(parse_node_path("  ").unwrap().is_empty());
    }

    #[test]
    fn garbage_segment_is_rejected() {
        assert!(matches!(
            parse_node_path("1:10-(0)->oops"),
            Err(TasmError::MalformedRecord { .. })
        ));
        assert!(parse_node_path("0:10-(0)").is_err());
    }

    #[test]
    fn skips_records_without_transcript_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contig-ordering.txt");
        std::fs::write(
            &path,
            ">Locus_1_Transcript_1/2_Confidence_0.500_Length_300\n\
             -1:123-(0)->6219:124-(0)\n\
             >Locus_1_Path_7_Confidence_0.100_Length_20\n\
             3:10-(0)\n\
             >Locus_2_Transcript_4/4_Confidence_1.000_Length_90\n\
             8:10-(0)->\n-9:11-(0)\n",
        )
        .unwrap();

        let orderings = read_contig_ordering(&path).unwrap();
        assert_eq!(
            orderings,
            vec![
                ContigOrdering {
                    locus_id: 1,
                    transcript_id: 1,
                    node_ids: vec![1, 6219],
                },
                ContigOrdering {
                    locus_id: 2,
                    transcript_id: 4,
                    node_ids: vec![8, 9],
                },
            ]
        );
    }

    #[test]
    fn transcript_token_is_case_sensitive() {
        assert!(is_reported_transcript("Locus_1_Transcript_1/2"));
        assert!(!is_reported_transcript("Locus_1_transcript_1/2"));
    }
}

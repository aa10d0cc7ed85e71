//! Thin wrapper over the `bio` FASTA reader.

use std::fs::File;
use std::path::Path;

use bio::io::fasta;

use crate::errors::{TasmError, TasmResult};

/// One FASTA record with its id (text up to the first whitespace) and its
/// body joined across lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FastaEntry {
    pub id: String,
    pub body: String,
}

/// Read every record of a FASTA file into memory, in file order.
pub fn read_fasta(path: &Path) -> TasmResult<Vec<FastaEntry>> {
    let file = File::open(path).map_err(|e| {
        TasmError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open {}: {e}", path.display()),
        ))
    })?;

    let mut entries = Vec::new();
    for record in fasta::Reader::new(file).records() {
        let record = record.map_err(|e| {
            TasmError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {e}", path.display()),
            ))
        })?;
        entries.push(FastaEntry {
            id: record.id().to_string(),
            body: String::from_utf8_lossy(record.seq()).into_owned(),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_wrapped_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.fa");
        std::fs::write(&path, ">NODE_1_length_4_cov_2.0 extra\nAC\nGT\n>NODE_2_length_1_cov_1.0\nA\n").unwrap();

        let entries = read_fasta(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "NODE_1_length_4_cov_2.0");
        assert_eq!(entries[0].body, "ACGT");
        assert_eq!(entries[1].body, "A");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_fasta(&dir.path().join("absent.fa")).unwrap_err();
        assert!(matches!(err, TasmError::Io(_)));
    }
}

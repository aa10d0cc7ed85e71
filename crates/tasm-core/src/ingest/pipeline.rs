//! Ingestion run orchestration.
//!
//! A run creates one assembly and fills the contig, stat, locus and
//! transcript tables from an oases output directory. Everything it writes
//! happens inside a single transaction, so a failed run leaves no partial
//! assembly behind; only its `ingest_runs` row survives, marked `failed`.

use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::errors::{TasmError, TasmResult};
use crate::ingest::contigs::import_contigs;
use crate::ingest::coverage::GapPolicy;
use crate::ingest::ordering::read_contig_ordering;
use crate::ingest::stats::import_stats;
use crate::ingest::transcripts::assemble_transcripts;
use crate::models::{AssemblySpec, IngestDiagnostic, IngestReport, IngestRun};
use crate::store::database::Database;

pub const CONTIG_FILE: &str = "contigs.fa";
pub const CONTIG_ORDERING_FILE: &str = "contig-ordering.txt";
pub const STATS_FILE: &str = "stats.txt";
pub const TRANSCRIPTS_FILE: &str = "transcripts.fa";

/// Knobs for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestOptions {
    pub gap_policy: GapPolicy,
    /// Require `transcripts.fa` and `contig-ordering.txt` to list
    /// transcripts in the same order, not just the same set.
    pub require_file_order: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            gap_policy: GapPolicy::default(),
            require_file_order: true,
        }
    }
}

/// The four pipeline output files of one assembly directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestInputs {
    pub contigs: PathBuf,
    pub stats: PathBuf,
    pub contig_ordering: PathBuf,
    pub transcripts: PathBuf,
}

impl IngestInputs {
    /// Resolve the fixed file names under `dir`; every file must exist.
    pub fn from_dir(dir: &Path) -> TasmResult<Self> {
        if !dir.is_dir() {
            return Err(TasmError::Configuration(format!(
                "directory {} does not exist",
                dir.display()
            )));
        }
        let require = |name: &str| -> TasmResult<PathBuf> {
            let path = dir.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(TasmError::Configuration(format!(
                    "required file {} not found",
                    path.display()
                )))
            }
        };
        Ok(Self {
            contigs: require(CONTIG_FILE)?,
            stats: require(STATS_FILE)?,
            contig_ordering: require(CONTIG_ORDERING_FILE)?,
            transcripts: require(TRANSCRIPTS_FILE)?,
        })
    }

    /// SHA-256 of each input, keyed by file name.
    pub fn content_hashes(&self) -> TasmResult<IndexMap<String, String>> {
        let mut hashes = IndexMap::new();
        for (name, path) in [
            (CONTIG_FILE, &self.contigs),
            (STATS_FILE, &self.stats),
            (CONTIG_ORDERING_FILE, &self.contig_ordering),
            (TRANSCRIPTS_FILE, &self.transcripts),
        ] {
            hashes.insert(name.to_string(), compute_content_hash(path)?);
        }
        Ok(hashes)
    }
}

/// SHA-256 hex digest of a file's contents.
pub fn compute_content_hash(path: &Path) -> TasmResult<String> {
    let mut hasher = Sha256::new();
    let data = std::fs::read(path)?;
    hasher.update(&data);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Short run identifier (first 16 hex chars of SHA-256) over the assembly,
/// its inputs and the start time.
fn make_run_id(identifier: &str, hashes: &IndexMap<String, String>) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    for digest in hashes.values() {
        hasher.update(digest.as_bytes());
    }
    hasher.update(nanos.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Ingest one oases output directory as a new assembly.
///
/// Configuration is checked before any storage access, and an identifier
/// already in use is rejected before any input file is read. Stages run in order:
/// contigs, stats, contig ordering, then transcripts and loci with their
/// coverage computed from the stored stats.
pub fn ingest_assembly(
    db: &Database,
    spec: &AssemblySpec,
    dir: &Path,
    options: &IngestOptions,
) -> TasmResult<IngestReport> {
    spec.validate()?;
    let inputs = IngestInputs::from_dir(dir)?;
    let started = Instant::now();

    db.init_schema()?;
    let mut conn = db.connect()?;
    if Database::find_assembly(&conn, &spec.identifier)?.is_some() {
        return Err(TasmError::Configuration(format!(
            "assembly identifier {:?} must be unique",
            spec.identifier
        )));
    }
    let input_hashes = inputs.content_hashes()?;
    let run_id = make_run_id(&spec.identifier, &input_hashes);
    info!(run_id = %run_id, assembly = %spec.identifier, dir = %dir.display(), "starting ingestion");

    match run_in_transaction(&mut conn, spec, &inputs, options, &run_id, &input_hashes, started) {
        Ok(report) => {
            info!(
                run_id = %run_id,
                contigs = report.contigs,
                stats = report.stats,
                loci = report.loci_created,
                transcripts = report.transcripts,
                gaps = report.data_gaps.len(),
                elapsed_ms = report.elapsed_ms,
                "ingestion complete"
            );
            Ok(report)
        }
        Err(e) => {
            error!(run_id = %run_id, error = %e, "ingestion failed, rolled back");
            let failed = IngestRun {
                run_id: run_id.clone(),
                assembly: spec.identifier.clone(),
                status: "failed".to_string(),
                input_hashes,
                report_json: None,
                error_message: Some(e.to_string()),
            };
            if let Err(record_err) = Database::record_ingest_run(&conn, &failed) {
                warn!(run_id = %run_id, error = %record_err, "could not record failed ingest run");
            }
            Err(e)
        }
    }
}

fn run_in_transaction(
    conn: &mut Connection,
    spec: &AssemblySpec,
    inputs: &IngestInputs,
    options: &IngestOptions,
    run_id: &str,
    input_hashes: &IndexMap<String, String>,
    started: Instant,
) -> TasmResult<IngestReport> {
    let tx = conn.transaction()?;

    let assembly = Database::insert_assembly(&tx, spec)?;
    let contigs = import_contigs(&tx, assembly.pk, &inputs.contigs)?;
    let stat_import = import_stats(&tx, assembly.pk, &inputs.stats)?;
    let orderings = read_contig_ordering(&inputs.contig_ordering)?;
    let table = Database::load_stat_table(&tx, assembly.pk)?;
    let outcome = assemble_transcripts(&tx, assembly.pk, &inputs.transcripts, &orderings, &table, options)?;

    let mut diagnostics: Vec<IngestDiagnostic> =
        outcome.data_gaps.iter().map(IngestDiagnostic::from_gap).collect();
    if !stat_import.excluded_infinite.is_empty() {
        diagnostics.push(IngestDiagnostic::infinite_coverage(&stat_import.excluded_infinite));
    }
    Database::record_diagnostics(&tx, run_id, &diagnostics)?;

    let report = IngestReport {
        run_id: run_id.to_string(),
        assembly: assembly.identifier,
        contigs,
        stats: stat_import.records.len(),
        stats_excluded_infinite: stat_import.excluded_infinite.len(),
        loci_created: outcome.loci_created,
        transcripts: outcome.transcripts_written,
        data_gaps: outcome.data_gaps,
        elapsed_ms: started.elapsed().as_millis() as i64,
    };
    Database::record_ingest_run(
        &tx,
        &IngestRun {
            run_id: run_id.to_string(),
            assembly: report.assembly.clone(),
            status: "success".to_string(),
            input_hashes: input_hashes.clone(),
            report_json: Some(serde_json::to_string(&report)?),
            error_message: None,
        },
    )?;

    tx.commit()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTIGS: &str = "\
>NODE_1_length_4_cov_2.000000
ACGT
>NODE_2_length_4_cov_8.000000
TTGA
>NODE_3_length_3_cov_3.000000
GGC
>NODE_4_length_3_cov_3.000000
CAT
>NODE_5_length_2_cov_1.000000
AA
";

    const STATS: &str = "\
ID\tlgth\tout\tin\tlong_cov\tshort1_cov
1\t4\t1\t0\t2.000000\t0
2\t4\t0\t1\t8.000000\t0
3\t3\t1\t0\t3.000000\t0
4\t3\t0\t1\t3.000000\t0
5\t2\t0\t0\tInf\t0
";

    const ORDERING: &str = "\
>Locus_1_Transcript_1/1_Confidence_1.000_Length_8
1:4-(0)->-2:4-(0)
>Locus_2_Path_1_Confidence_0.000_Length_3
5:2-(0)
>Locus_2_Transcript_1/1_Confidence_1.000_Length_6
-3:3-(0)->4:3-(0)
";

    const TRANSCRIPTS: &str = "\
>Locus_1_Transcript_1/1_Confidence_1.000_Length_8
ACGTTTGA
>Locus_2_Transcript_1/1_Confidence_1.000_Length_6
GGCCAT
";

    fn write_inputs(dir: &Path, ordering: &str, transcripts: &str) {
        std::fs::write(dir.join(CONTIG_FILE), CONTIGS).unwrap();
        std::fs::write(dir.join(STATS_FILE), STATS).unwrap();
        std::fs::write(dir.join(CONTIG_ORDERING_FILE), ordering).unwrap();
        std::fs::write(dir.join(TRANSCRIPTS_FILE), transcripts).unwrap();
    }

    fn setup(ordering: &str, transcripts: &str) -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(dir.path(), ordering, transcripts);
        let db = Database::new(dir.path().join("tasm.db")).unwrap();
        (dir, db)
    }

    fn count(db: &Database, sql: &str) -> i64 {
        db.connect().unwrap().query_row(sql, [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn end_to_end_computes_geometric_mean_coverage() {
        let (dir, db) = setup(ORDERING, TRANSCRIPTS);
        let spec = AssemblySpec::new("asm1", "mouse", 21, 31);

        let report = ingest_assembly(&db, &spec, dir.path(), &IngestOptions::default()).unwrap();
        assert_eq!(report.contigs, 5);
        assert_eq!(report.stats, 4);
        assert_eq!(report.stats_excluded_infinite, 1);
        assert_eq!(report.loci_created, 2);
        assert_eq!(report.transcripts, 2);
        assert!(report.data_gaps.is_empty());

        let conn = db.connect().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT l.locus_id, t.coverage FROM transcripts t JOIN loci l ON l.id = t.locus_id \
                 ORDER BY l.locus_id;",
            )
            .unwrap();
        let rows: Vec<(i64, f64)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows.len(), 2);
        assert!((rows[0].1 - 4.0).abs() < 1e-9);
        assert!((rows[1].1 - 3.0).abs() < 1e-9);

        assert_eq!(count(&db, "SELECT COUNT(*) FROM ingest_runs WHERE status = 'success';"), 1);
        assert_eq!(
            count(&db, "SELECT COUNT(*) FROM ingest_diagnostics WHERE category = 'infinite_coverage';"),
            1
        );
    }

    #[test]
    fn truncated_ordering_rolls_back_everything() {
        let truncated = "\
>Locus_1_Transcript_1/1_Confidence_1.000_Length_8
1:4-(0)->-2:4-(0)
";
        let (dir, db) = setup(truncated, TRANSCRIPTS);
        let spec = AssemblySpec::new("asm1", "mouse", 21, 31);

        let err = ingest_assembly(&db, &spec, dir.path(), &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, TasmError::AlignmentMismatch(_)));

        assert_eq!(count(&db, "SELECT COUNT(*) FROM assemblies;"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM contigs;"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM stats;"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM loci;"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM ingest_runs WHERE status = 'failed';"), 1);
    }

    #[test]
    fn reordered_ordering_is_detected() {
        let reordered = "\
>Locus_2_Transcript_1/1_Confidence_1.000_Length_6
-3:3-(0)->4:3-(0)
>Locus_1_Transcript_1/1_Confidence_1.000_Length_8
1:4-(0)->-2:4-(0)
";
        let (dir, db) = setup(reordered, TRANSCRIPTS);
        let spec = AssemblySpec::new("asm1", "mouse", 21, 31);
        let err = ingest_assembly(&db, &spec, dir.path(), &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, TasmError::AlignmentMismatch(_)));

        let relaxed = IngestOptions {
            require_file_order: false,
            ..IngestOptions::default()
        };
        let report = ingest_assembly(&db, &spec, dir.path(), &relaxed).unwrap();
        assert_eq!(report.transcripts, 2);
    }

    #[test]
    fn path_through_infinite_node_is_reported_gap() {
        let ordering = "\
>Locus_1_Transcript_1/1_Confidence_1.000_Length_8
1:4-(0)->-2:4-(0)->5:2-(0)
>Locus_2_Transcript_1/1_Confidence_1.000_Length_6
-3:3-(0)->4:3-(0)
";
        let (dir, db) = setup(ordering, TRANSCRIPTS);
        let spec = AssemblySpec::new("asm1", "mouse", 21, 31);

        let report = ingest_assembly(&db, &spec, dir.path(), &IngestOptions::default()).unwrap();
        assert_eq!(report.data_gaps.len(), 1);
        assert_eq!(report.data_gaps[0].missing_node_ids, vec![5]);
        assert_eq!(
            count(&db, "SELECT COUNT(*) FROM ingest_diagnostics WHERE category = 'data_gap';"),
            1
        );

        let strict = IngestOptions {
            gap_policy: GapPolicy::Strict,
            ..IngestOptions::default()
        };
        let spec2 = AssemblySpec::new("asm2", "mouse", 21, 31);
        let err = ingest_assembly(&db, &spec2, dir.path(), &strict).unwrap_err();
        assert!(matches!(err, TasmError::DataGap { .. }));
    }

    #[test]
    fn configuration_errors_precede_io() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("tasm.db")).unwrap();

        let bad_k = AssemblySpec::new("asm1", "mouse", 31, 21);
        assert!(matches!(
            ingest_assembly(&db, &bad_k, dir.path(), &IngestOptions::default()),
            Err(TasmError::Configuration(_))
        ));
        assert!(!db.db_path().exists());

        let spec = AssemblySpec::new("asm1", "mouse", 21, 31);
        assert!(matches!(
            ingest_assembly(&db, &spec, &dir.path().join("missing"), &IngestOptions::default()),
            Err(TasmError::Configuration(_))
        ));
        // Directory exists but holds none of the inputs.
        assert!(matches!(
            ingest_assembly(&db, &spec, dir.path(), &IngestOptions::default()),
            Err(TasmError::Configuration(_))
        ));
    }

    #[test]
    fn duplicate_assembly_identifier_fails() {
        let (dir, db) = setup(ORDERING, TRANSCRIPTS);
        let spec = AssemblySpec::new("asm1", "mouse", 21, 31);
        ingest_assembly(&db, &spec, dir.path(), &IngestOptions::default()).unwrap();
        assert!(matches!(
            ingest_assembly(&db, &spec, dir.path(), &IngestOptions::default()),
            Err(TasmError::Configuration(_))
        ));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM assemblies;"), 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM ingest_runs;"), 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM ingest_runs WHERE status = 'success';"), 1);
    }

    #[test]
    fn zero_coverage_stat_aborts_and_rolls_back() {
        let (dir, db) = setup(ORDERING, TRANSCRIPTS);
        let zero_cov = STATS.replace("1\t4\t1\t0\t2.000000\t0", "1\t4\t1\t0\t0.000000\t0");
        assert_ne!(zero_cov, STATS);
        std::fs::write(dir.path().join(STATS_FILE), zero_cov).unwrap();
        let spec = AssemblySpec::new("asm1", "mouse", 21, 31);

        let err = ingest_assembly(&db, &spec, dir.path(), &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, TasmError::InvalidCoverage(_)));

        assert_eq!(count(&db, "SELECT COUNT(*) FROM assemblies;"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM stats;"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM transcripts;"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM ingest_runs WHERE status = 'failed';"), 1);
    }

    #[test]
    fn run_error_survives_failed_provenance_write() {
        let truncated = "\
>Locus_1_Transcript_1/1_Confidence_1.000_Length_8
1:4-(0)->-2:4-(0)
";
        let (dir, db) = setup(truncated, TRANSCRIPTS);
        db.init_schema().unwrap();
        db.connect()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_failed_runs BEFORE INSERT ON ingest_runs \
                 WHEN NEW.status = 'failed' BEGIN SELECT RAISE(ABORT, 'read-only'); END;",
            )
            .unwrap();
        let spec = AssemblySpec::new("asm1", "mouse", 21, 31);

        let err = ingest_assembly(&db, &spec, dir.path(), &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, TasmError::AlignmentMismatch(_)));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM ingest_runs;"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM assemblies;"), 0);
    }
}

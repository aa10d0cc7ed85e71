//! SQLite storage layer for ingested assemblies.
//!
//! `Database` owns only the resolved path; every high-level method opens its
//! own connection. The bulk-write helpers take a `&Connection` instead so the
//! ingestion pipeline can run them all inside one transaction.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{TasmError, TasmResult};
use crate::ingest::coverage::StatTable;
use crate::models::{
    AssemblyRecord, AssemblySpec, AssemblySummary, ContigRecord, IngestDiagnostic, IngestRun,
    StatRecord, StoredTranscript, TranscriptRecord,
};
use crate::store::schema;

/// Default share of the locus length range cut from the bottom when picking
/// the best transcript of a large locus.
pub const DEFAULT_BEST_PERCENT_CUTOFF: i64 = 15;

/// Loci with more transcripts than this get the length cutoff applied.
const BEST_TRANSCRIPT_CUTOFF_MIN_COUNT: i64 = 6;

// ---------------------------------------------------------------------------
// Helper: tilde expansion
// ---------------------------------------------------------------------------

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if path.len() > 2 {
                expanded.push(&path[2..]);
            }
            return expanded;
        }
    }
    PathBuf::from(path)
}

fn assembly_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssemblyRecord> {
    Ok(AssemblyRecord {
        pk: row.get(0)?,
        identifier: row.get(1)?,
        species: row.get(2)?,
        k_min: row.get(3)?,
        k_max: row.get(4)?,
    })
}

fn transcript_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredTranscript> {
    Ok(StoredTranscript {
        pk: row.get(0)?,
        locus_pk: row.get(1)?,
        locus_id: row.get(2)?,
        transcript_id: row.get(3)?,
        confidence: row.get(4)?,
        length: row.get(5)?,
        coverage: row.get(6)?,
    })
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// SQLite store holding assemblies and everything ingested for them.
#[derive(Clone, Debug)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Create a new `Database`.  The path is expanded and parent directories
    /// are created if they do not already exist.
    pub fn new(db_path: impl AsRef<Path>) -> TasmResult<Self> {
        let db_str = db_path.as_ref().to_string_lossy();
        let expanded = expand_tilde(&db_str);
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(&expanded)
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { db_path: resolved })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open a new SQLite connection with `foreign_keys` enabled.
    pub fn connect(&self) -> TasmResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Set WAL mode, create all tables and indexes, then run pending
    /// migrations.
    pub fn init_schema(&self) -> TasmResult<()> {
        let conn = self.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::apply_schema(&conn)
    }

    /// Create the schema on an already-open connection.
    pub fn apply_schema(conn: &Connection) -> TasmResult<()> {
        for stmt in schema::SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)?;
        }
        schema::migrate_schema(conn)
    }

    /// In-memory database with the full schema applied.
    pub fn open_in_memory() -> TasmResult<Connection> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::apply_schema(&conn)?;
        Ok(conn)
    }

    // -----------------------------------------------------------------------
    // Assemblies
    // -----------------------------------------------------------------------

    /// Insert a new assembly. Identifiers are unique.
    pub fn insert_assembly(conn: &Connection, spec: &AssemblySpec) -> TasmResult<AssemblyRecord> {
        spec.validate()?;
        if Self::find_assembly(conn, &spec.identifier)?.is_some() {
            return Err(TasmError::Configuration(format!(
                "assembly identifier {:?} must be unique",
                spec.identifier
            )));
        }
        conn.execute(
            "INSERT INTO assemblies(identifier, species, k_min, k_max) VALUES (?1, ?2, ?3, ?4);",
            params![spec.identifier, spec.species, spec.k_min, spec.k_max],
        )?;
        Ok(AssemblyRecord {
            pk: conn.last_insert_rowid(),
            identifier: spec.identifier.clone(),
            species: spec.species.clone(),
            k_min: spec.k_min,
            k_max: spec.k_max,
        })
    }

    pub fn find_assembly(conn: &Connection, identifier: &str) -> TasmResult<Option<AssemblyRecord>> {
        let found = conn
            .query_row(
                "SELECT id, identifier, species, k_min, k_max FROM assemblies \
                 WHERE identifier = ?1 LIMIT 1;",
                params![identifier],
                assembly_from_row,
            )
            .optional()?;
        Ok(found)
    }

    /// Like [`Database::find_assembly`], but an unknown identifier is a
    /// configuration error.
    pub fn require_assembly(conn: &Connection, identifier: &str) -> TasmResult<AssemblyRecord> {
        Self::find_assembly(conn, identifier)?
            .ok_or_else(|| TasmError::Configuration(format!("unknown assembly: {identifier}")))
    }

    // -----------------------------------------------------------------------
    // Bulk writes
    // -----------------------------------------------------------------------

    pub fn insert_contigs(conn: &Connection, assembly_pk: i64, contigs: &[ContigRecord]) -> TasmResult<usize> {
        if contigs.is_empty() {
            return Ok(0);
        }
        let mut stmt = conn.prepare(
            "INSERT INTO contigs (assembly_id, node_id, length, coverage, sequence) \
             VALUES (?1, ?2, ?3, ?4, ?5);",
        )?;
        let mut inserted = 0;
        for c in contigs {
            inserted += stmt.execute(params![assembly_pk, c.node_id, c.length, c.coverage, c.sequence])?;
        }
        Ok(inserted)
    }

    pub fn insert_stats(conn: &Connection, assembly_pk: i64, stats: &[StatRecord]) -> TasmResult<usize> {
        if stats.is_empty() {
            return Ok(0);
        }
        let mut stmt = conn.prepare(
            "INSERT INTO stats (assembly_id, node_id, length, coverage) VALUES (?1, ?2, ?3, ?4);",
        )?;
        let mut inserted = 0;
        for s in stats {
            inserted += stmt.execute(params![assembly_pk, s.node_id, s.length, s.coverage])?;
        }
        Ok(inserted)
    }

    /// All Stat coverage values of an assembly, keyed by node id.
    pub fn load_stat_table(conn: &Connection, assembly_pk: i64) -> TasmResult<StatTable> {
        let mut stmt = conn.prepare("SELECT node_id, coverage FROM stats WHERE assembly_id = ?1;")?;
        let rows = stmt.query_map(params![assembly_pk], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut coverage = HashMap::new();
        for row in rows {
            let (node_id, value) = row?;
            coverage.insert(node_id, value);
        }
        Ok(StatTable::from_map(coverage))
    }

    /// Map natural locus ids to storage keys, inserting only the loci the
    /// assembly does not hold yet. Returns the map and how many were created.
    pub fn get_or_create_loci(
        conn: &Connection,
        assembly_pk: i64,
        locus_ids: &BTreeSet<i64>,
    ) -> TasmResult<(HashMap<i64, i64>, usize)> {
        let mut keys: HashMap<i64, i64> = HashMap::new();
        {
            let mut stmt = conn.prepare("SELECT locus_id, id FROM loci WHERE assembly_id = ?1;")?;
            let rows = stmt.query_map(params![assembly_pk], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (locus_id, pk) = row?;
                keys.insert(locus_id, pk);
            }
        }

        let mut insert = conn.prepare("INSERT INTO loci (locus_id, assembly_id) VALUES (?1, ?2);")?;
        let mut created = 0;
        for &locus_id in locus_ids {
            if keys.contains_key(&locus_id) {
                continue;
            }
            insert.execute(params![locus_id, assembly_pk])?;
            keys.insert(locus_id, conn.last_insert_rowid());
            created += 1;
        }
        Ok((keys, created))
    }

    /// Upsert transcripts on `(locus, transcript_id)`. Each item pairs the
    /// locus storage key with the record.
    pub fn upsert_transcripts(conn: &Connection, rows: &[(i64, &TranscriptRecord)]) -> TasmResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut stmt = conn.prepare(
            "INSERT INTO transcripts (locus_id, transcript_id, confidence, length, sequence, coverage) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(locus_id, transcript_id) DO UPDATE SET \
                 confidence = excluded.confidence, \
                 length = excluded.length, \
                 sequence = excluded.sequence, \
                 coverage = excluded.coverage;",
        )?;
        let mut written = 0;
        for (locus_pk, t) in rows {
            written += stmt.execute(params![
                locus_pk,
                t.transcript_id,
                t.confidence,
                t.length,
                t.sequence,
                t.coverage
            ])?;
        }
        Ok(written)
    }

    // -----------------------------------------------------------------------
    // Run provenance
    // -----------------------------------------------------------------------

    pub fn record_ingest_run(conn: &Connection, run: &IngestRun) -> TasmResult<()> {
        let hashes = serde_json::to_string(&run.input_hashes)?;
        conn.execute(
            "INSERT INTO ingest_runs (run_id, assembly_identifier, status, input_hashes_json, \
                 report_json, error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                run.run_id,
                run.assembly,
                run.status,
                hashes,
                run.report_json,
                run.error_message
            ],
        )?;
        Ok(())
    }

    pub fn record_diagnostics(
        conn: &Connection,
        run_id: &str,
        diagnostics: &[IngestDiagnostic],
    ) -> TasmResult<usize> {
        if diagnostics.is_empty() {
            return Ok(0);
        }
        let mut stmt = conn.prepare(
            "INSERT INTO ingest_diagnostics \
                 (run_id, stage, category, severity, locus_id, transcript_id, message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        )?;
        let mut inserted = 0;
        for d in diagnostics {
            inserted += stmt.execute(params![
                run_id,
                d.stage,
                d.category,
                d.severity,
                d.locus_id,
                d.transcript_id,
                d.message
            ])?;
        }
        Ok(inserted)
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// Row counts for one assembly.
    pub fn assembly_summary(&self, identifier: &str) -> TasmResult<AssemblySummary> {
        let conn = self.connect()?;
        let asm = Self::require_assembly(&conn, identifier)?;
        let count = |sql: &str| -> TasmResult<i64> {
            Ok(conn.query_row(sql, params![asm.pk], |row| row.get(0))?)
        };
        Ok(AssemblySummary {
            contigs: count("SELECT COUNT(*) FROM contigs WHERE assembly_id = ?1;")?,
            stats: count("SELECT COUNT(*) FROM stats WHERE assembly_id = ?1;")?,
            loci: count("SELECT COUNT(*) FROM loci WHERE assembly_id = ?1;")?,
            transcripts: count(
                "SELECT COUNT(*) FROM transcripts t JOIN loci l ON l.id = t.locus_id \
                 WHERE l.assembly_id = ?1;",
            )?,
            identifier: asm.identifier,
            species: asm.species,
            k_min: asm.k_min,
            k_max: asm.k_max,
        })
    }

    /// Highest-coverage transcript of a locus.
    ///
    /// Loci with more than six transcripts first drop those whose length is
    /// not above `min + ((max - min) / 100) * percent_cutoff`. If that leaves
    /// nothing (all lengths equal) the unfiltered best is returned.
    pub fn best_transcript_for_locus(
        &self,
        identifier: &str,
        locus_id: i64,
        percent_cutoff: i64,
    ) -> TasmResult<Option<StoredTranscript>> {
        let conn = self.connect()?;
        let asm = Self::require_assembly(&conn, identifier)?;
        let locus_pk: i64 = conn
            .query_row(
                "SELECT id FROM loci WHERE assembly_id = ?1 AND locus_id = ?2;",
                params![asm.pk, locus_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| {
                TasmError::Configuration(format!("unknown locus {locus_id} in assembly {identifier}"))
            })?;

        let (count, min_len, max_len): (i64, Option<i64>, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), MIN(length), MAX(length) FROM transcripts WHERE locus_id = ?1;",
            params![locus_pk],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        if count == 0 {
            return Ok(None);
        }

        if count > BEST_TRANSCRIPT_CUTOFF_MIN_COUNT {
            let min_len = min_len.unwrap_or(0);
            let max_len = max_len.unwrap_or(0);
            let cutoff = min_len + (max_len - min_len) / 100 * percent_cutoff;
            if let Some(best) = Self::select_best(&conn, locus_pk, Some(cutoff))? {
                return Ok(Some(best));
            }
        }
        Self::select_best(&conn, locus_pk, None)
    }

    fn select_best(
        conn: &Connection,
        locus_pk: i64,
        longer_than: Option<i64>,
    ) -> TasmResult<Option<StoredTranscript>> {
        let best = conn
            .query_row(
                "SELECT t.id, t.locus_id, l.locus_id, t.transcript_id, t.confidence, t.length, t.coverage \
                 FROM transcripts t JOIN loci l ON l.id = t.locus_id \
                 WHERE t.locus_id = ?1 AND (?2 IS NULL OR t.length > ?2) \
                 ORDER BY t.coverage DESC, t.transcript_id ASC LIMIT 1;",
                params![locus_pk, longer_than],
                transcript_from_row,
            )
            .optional()?;
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(transcript_id: i64, length: i64, coverage: f64) -> TranscriptRecord {
        TranscriptRecord {
            locus_id: 1,
            transcript_id,
            confidence: 0.1,
            length,
            sequence: "A".repeat(length as usize),
            coverage,
        }
    }

    fn file_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("nested").join("tasm.db")).unwrap();
        db.init_schema().unwrap();
        (dir, db)
    }

    #[test]
    fn new_creates_parent_directories() {
        let (dir, db) = file_db();
        assert!(dir.path().join("nested").is_dir());
        assert!(db.db_path().is_absolute());
    }

    #[test]
    fn duplicate_assembly_identifier_is_rejected() {
        let conn = Database::open_in_memory().unwrap();
        let spec = AssemblySpec::new("asm", "rat", 21, 31);
        Database::insert_assembly(&conn, &spec).unwrap();
        assert!(matches!(
            Database::insert_assembly(&conn, &spec),
            Err(TasmError::Configuration(_))
        ));
    }

    #[test]
    fn unknown_assembly_is_configuration_error() {
        let conn = Database::open_in_memory().unwrap();
        assert!(matches!(
            Database::require_assembly(&conn, "nope"),
            Err(TasmError::Configuration(_))
        ));
    }

    #[test]
    fn loci_are_scoped_per_assembly() {
        let conn = Database::open_in_memory().unwrap();
        let a = Database::insert_assembly(&conn, &AssemblySpec::new("a", "x", 21, 31)).unwrap();
        let b = Database::insert_assembly(&conn, &AssemblySpec::new("b", "x", 21, 31)).unwrap();
        let ids: BTreeSet<i64> = [1, 2].into_iter().collect();

        let (keys_a, created_a) = Database::get_or_create_loci(&conn, a.pk, &ids).unwrap();
        let (keys_b, created_b) = Database::get_or_create_loci(&conn, b.pk, &ids).unwrap();
        assert_eq!((created_a, created_b), (2, 2));
        assert_ne!(keys_a[&1], keys_b[&1]);

        let (again, created) = Database::get_or_create_loci(&conn, a.pk, &ids).unwrap();
        assert_eq!(created, 0);
        assert_eq!(again, keys_a);
    }

    #[test]
    fn stat_table_round_trips_through_storage() {
        let conn = Database::open_in_memory().unwrap();
        let asm = Database::insert_assembly(&conn, &AssemblySpec::new("a", "x", 21, 31)).unwrap();
        let stats = vec![
            StatRecord { node_id: 1, length: 5, coverage: 2.0 },
            StatRecord { node_id: 2, length: 6, coverage: 8.0 },
        ];
        assert_eq!(Database::insert_stats(&conn, asm.pk, &stats).unwrap(), 2);

        let table = Database::load_stat_table(&conn, asm.pk).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(2), Some(8.0));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn best_transcript_small_locus_is_highest_coverage() {
        let (_dir, db) = file_db();
        let conn = db.connect().unwrap();
        let asm = Database::insert_assembly(&conn, &AssemblySpec::new("a", "x", 21, 31)).unwrap();
        let (keys, _) = Database::get_or_create_loci(&conn, asm.pk, &[1].into_iter().collect()).unwrap();
        let records = [transcript(1, 100, 2.0), transcript(2, 50, 9.0), transcript(3, 300, 4.0)];
        let rows: Vec<(i64, &TranscriptRecord)> = records.iter().map(|t| (keys[&1], t)).collect();
        Database::upsert_transcripts(&conn, &rows).unwrap();

        let best = db.best_transcript_for_locus("a", 1, DEFAULT_BEST_PERCENT_CUTOFF).unwrap().unwrap();
        assert_eq!(best.transcript_id, 2);
        assert_eq!(best.locus_id, 1);
    }

    #[test]
    fn best_transcript_large_locus_drops_short_ones() {
        let (_dir, db) = file_db();
        let conn = db.connect().unwrap();
        let asm = Database::insert_assembly(&conn, &AssemblySpec::new("a", "x", 21, 31)).unwrap();
        let (keys, _) = Database::get_or_create_loci(&conn, asm.pk, &[1].into_iter().collect()).unwrap();
        // min 100, max 1100: cutoff = 100 + (1000 / 100) * 15 = 250
        let records = [
            transcript(1, 100, 50.0),
            transcript(2, 250, 40.0),
            transcript(3, 251, 5.0),
            transcript(4, 600, 7.0),
            transcript(5, 900, 3.0),
            transcript(6, 1000, 2.0),
            transcript(7, 1100, 1.0),
        ];
        let rows: Vec<(i64, &TranscriptRecord)> = records.iter().map(|t| (keys[&1], t)).collect();
        Database::upsert_transcripts(&conn, &rows).unwrap();

        let best = db.best_transcript_for_locus("a", 1, DEFAULT_BEST_PERCENT_CUTOFF).unwrap().unwrap();
        assert_eq!(best.transcript_id, 4);
    }

    #[test]
    fn summary_counts_rows() {
        let (_dir, db) = file_db();
        let conn = db.connect().unwrap();
        let asm = Database::insert_assembly(&conn, &AssemblySpec::new("a", "x", 21, 31)).unwrap();
        Database::insert_contigs(
            &conn,
            asm.pk,
            &[ContigRecord { node_id: 1, length: 4, coverage: 1.5, sequence: "ACGT".into() }],
        )
        .unwrap();

        let summary = db.assembly_summary("a").unwrap();
        assert_eq!(summary.contigs, 1);
        assert_eq!(summary.stats, 0);
        assert_eq!(summary.transcripts, 0);
        assert!(matches!(db.assembly_summary("b"), Err(TasmError::Configuration(_))));
    }
}

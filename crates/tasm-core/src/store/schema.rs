//! SQLite schema DDL and migration framework.

use rusqlite::{params, Connection};

use crate::errors::{TasmError, TasmResult};

/// Current schema version, stored under `schema_version` in `meta`.
pub const SCHEMA_VERSION: i32 = 1;

/// Core DDL statements: 9 CREATE TABLE + 7 CREATE INDEX.
///
/// Executed with `CREATE … IF NOT EXISTS` so they are safe to replay on an
/// already-initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // ── tables (9) ──────────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS assemblies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        identifier TEXT NOT NULL UNIQUE,
        species TEXT NOT NULL DEFAULT 'unknown',
        k_min INTEGER NOT NULL,
        k_max INTEGER NOT NULL,
        CHECK (k_min < k_max)
    );",
    "CREATE TABLE IF NOT EXISTS contigs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        assembly_id INTEGER NOT NULL REFERENCES assemblies(id),
        node_id INTEGER NOT NULL,
        length INTEGER NOT NULL,
        coverage REAL NOT NULL,
        sequence TEXT NOT NULL,
        UNIQUE(assembly_id, node_id)
    );",
    "CREATE TABLE IF NOT EXISTS stats (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        assembly_id INTEGER NOT NULL REFERENCES assemblies(id),
        node_id INTEGER NOT NULL,
        length INTEGER NOT NULL,
        coverage REAL NOT NULL,
        UNIQUE(assembly_id, node_id)
    );",
    "CREATE TABLE IF NOT EXISTS loci (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        locus_id INTEGER NOT NULL,
        assembly_id INTEGER NOT NULL REFERENCES assemblies(id),
        UNIQUE(locus_id, assembly_id)
    );",
    "CREATE TABLE IF NOT EXISTS transcripts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        locus_id INTEGER REFERENCES loci(id),
        transcript_id INTEGER NOT NULL,
        confidence REAL NOT NULL,
        length INTEGER NOT NULL,
        sequence TEXT NOT NULL,
        coverage REAL NOT NULL,
        UNIQUE(locus_id, transcript_id)
    );",
    "CREATE TABLE IF NOT EXISTS ingest_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        assembly_identifier TEXT NOT NULL,
        status TEXT NOT NULL,
        input_hashes_json TEXT,
        report_json TEXT,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS ingest_diagnostics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        stage TEXT NOT NULL,
        category TEXT NOT NULL,
        severity TEXT NOT NULL DEFAULT 'warning',
        locus_id INTEGER,
        transcript_id INTEGER,
        message TEXT NOT NULL,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_version INTEGER NOT NULL,
        to_version INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    // ── indexes (7) ─────────────────────────────────────────────────────
    "CREATE INDEX IF NOT EXISTS idx_contigs_node ON contigs(node_id);",
    "CREATE INDEX IF NOT EXISTS idx_stats_node ON stats(node_id);",
    "CREATE INDEX IF NOT EXISTS idx_loci_locus ON loci(locus_id);",
    "CREATE INDEX IF NOT EXISTS idx_transcripts_transcript ON transcripts(transcript_id);",
    "CREATE INDEX IF NOT EXISTS idx_transcripts_locus_coverage ON transcripts(locus_id, coverage DESC);",
    "CREATE INDEX IF NOT EXISTS idx_ingest_runs_assembly ON ingest_runs(assembly_identifier, created_at);",
    "CREATE INDEX IF NOT EXISTS idx_ingest_diag_run ON ingest_diagnostics(run_id, stage, category);",
];

// ─── Migration framework ────────────────────────────────────────────────────

/// A schema step taking the database from `version - 1` to `version`.
pub(crate) struct Migration {
    pub version: i32,
    pub statements: &'static [&'static str],
}

/// Ordered schema steps. Version 1 is the layout in [`SCHEMA_STATEMENTS`];
/// reaching it only stamps `meta`.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    statements: &[],
}];

/// Bring the database up to [`SCHEMA_VERSION`].
pub fn migrate_schema(conn: &Connection) -> TasmResult<()> {
    apply_migrations(conn, MIGRATIONS)
}

/// Apply every step newer than the stored version, in order. Each step runs
/// in its own SAVEPOINT and leaves a `migration_history` row either way.
pub(crate) fn apply_migrations(conn: &Connection, steps: &[Migration]) -> TasmResult<()> {
    let mut current = get_schema_version(conn);
    for step in steps.iter() {
        if step.version <= current {
            continue;
        }
        conn.execute_batch("SAVEPOINT tasm_migrate_step;")?;
        let applied = step
            .statements
            .iter()
            .try_for_each(|sql| conn.execute_batch(sql))
            .map_err(TasmError::from)
            .and_then(|()| set_schema_version(conn, step.version));

        if let Err(e) = applied {
            conn.execute_batch("ROLLBACK TO SAVEPOINT tasm_migrate_step; RELEASE SAVEPOINT tasm_migrate_step;")?;
            record_migration_step(conn, current, step.version, "failed", Some(&e.to_string()))?;
            return Err(e);
        }
        record_migration_step(conn, current, step.version, "success", None)?;
        conn.execute_batch("RELEASE SAVEPOINT tasm_migrate_step;")?;
        current = step.version;
    }
    Ok(())
}

/// Stored schema version; 0 for a database that was never stamped.
pub(crate) fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row(
        "SELECT value FROM meta WHERE key = 'schema_version';",
        [],
        |row| row.get::<_, String>(0),
    )
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(0)
}

fn set_schema_version(conn: &Connection, version: i32) -> TasmResult<()> {
    conn.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        params![version.to_string()],
    )?;
    Ok(())
}

fn record_migration_step(
    conn: &Connection,
    from_version: i32,
    to_version: i32,
    status: &str,
    error_message: Option<&str>,
) -> TasmResult<()> {
    conn.execute(
        "INSERT INTO migration_history(from_version, to_version, status, error_message) \
         VALUES (?1, ?2, ?3, ?4);",
        params![from_version, to_version, status, error_message],
    )?;
    Ok(())
}

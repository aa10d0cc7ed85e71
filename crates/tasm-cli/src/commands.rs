use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use _tasm_core::models::{AssemblySummary, IngestReport, StoredTranscript};
use _tasm_core::{ingest_assembly, AssemblySpec, Database, IngestOptions};

use crate::IngestArgs;

pub(crate) fn ingest(db_path: &Path, args: IngestArgs) -> Result<()> {
    let spec = AssemblySpec::new(args.identifier, args.species, args.k_min, args.k_max);
    let options = IngestOptions {
        gap_policy: args.gap_policy.into(),
        require_file_order: !args.allow_reordered,
    };
    let db = Database::new(db_path)
        .with_context(|| format!("cannot open database {}", db_path.display()))?;
    info!(db = %db.db_path().display(), "using database");

    let report = ingest_assembly(&db, &spec, &args.dir, &options)
        .with_context(|| format!("ingestion of {} failed", spec.identifier))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

pub(crate) fn summary(db_path: &Path, identifier: &str, json: bool) -> Result<()> {
    let db = Database::new(db_path)?;
    let summary = db
        .assembly_summary(identifier)
        .with_context(|| format!("cannot summarise {identifier}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_summary(&summary));
    }
    Ok(())
}

pub(crate) fn best(db_path: &Path, identifier: &str, locus_id: i64, percent_cutoff: i64, json: bool) -> Result<()> {
    let db = Database::new(db_path)?;
    let best = db
        .best_transcript_for_locus(identifier, locus_id, percent_cutoff)
        .with_context(|| format!("cannot pick best transcript of locus {locus_id}"))?;
    match (best, json) {
        (Some(t), true) => println!("{}", serde_json::to_string_pretty(&t)?),
        (Some(t), false) => println!("{}", render_transcript(&t)),
        (None, true) => println!("null"),
        (None, false) => println!("Locus {locus_id} has no transcripts."),
    }
    Ok(())
}

fn render_report(report: &IngestReport) -> String {
    let mut out = format!(
        "Assembly {} (run {})\n\
         ...\tImported {} contigs\n\
         ...\tImported {} nodes ({} excluded for infinite coverage)\n\
         ...\tCreated {} loci\n\
         ...\tProcessed {} transcripts\n",
        report.assembly,
        report.run_id,
        report.contigs,
        report.stats,
        report.stats_excluded_infinite,
        report.loci_created,
        report.transcripts,
    );
    for gap in &report.data_gaps {
        out.push_str(&format!(
            "WARNING\tLocus_{}_Transcript_{}: {}\n",
            gap.locus_id,
            gap.transcript_id,
            gap.describe()
        ));
    }
    out.push_str(&format!("DONE in {} ms.\n", report.elapsed_ms));
    out
}

fn render_summary(s: &AssemblySummary) -> String {
    format!(
        "{} [{}] k={}..{}\n  contigs:     {}\n  stats:       {}\n  loci:        {}\n  transcripts: {}\n",
        s.identifier, s.species, s.k_min, s.k_max, s.contigs, s.stats, s.loci, s.transcripts
    )
}

fn render_transcript(t: &StoredTranscript) -> String {
    format!(
        "Locus_{}_Transcript_{}\tlength={}\tconfidence={}\tcoverage={:.3}",
        t.locus_id, t.transcript_id, t.length, t.confidence, t.coverage
    )
}

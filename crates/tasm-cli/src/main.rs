#![forbid(unsafe_code)]

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use _tasm_core::store::database::DEFAULT_BEST_PERCENT_CUTOFF;
use _tasm_core::GapPolicy;

#[derive(Parser)]
#[command(name = "tasm")]
#[command(about = "Ingest and inspect oases transcript assemblies")]
struct Cli {
    /// SQLite database holding ingested assemblies.
    #[arg(long, global = true, env = "TASM_DB", default_value = "tasm.db")]
    db: PathBuf,
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an oases output directory as a new assembly.
    Ingest(IngestArgs),
    /// Row counts for an assembly.
    Summary {
        identifier: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Highest-coverage transcript of a locus.
    Best {
        identifier: String,
        locus_id: i64,
        #[arg(long, default_value_t = DEFAULT_BEST_PERCENT_CUTOFF)]
        percent_cutoff: i64,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Args)]
struct IngestArgs {
    /// Unique assembly identifier.
    identifier: String,
    #[arg(long, default_value = "unknown")]
    species: String,
    #[arg(long)]
    k_min: i64,
    #[arg(long)]
    k_max: i64,
    /// Directory holding contigs.fa, stats.txt, contig-ordering.txt and
    /// transcripts.fa.
    #[arg(long)]
    dir: PathBuf,
    #[arg(long, value_enum, default_value_t = GapPolicyCli::Tolerant)]
    gap_policy: GapPolicyCli,
    /// Join transcripts to node paths by key even if the files list them in
    /// different orders.
    #[arg(long, default_value_t = false)]
    allow_reordered: bool,
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum GapPolicyCli {
    Strict,
    Tolerant,
}

impl From<GapPolicyCli> for GapPolicy {
    fn from(value: GapPolicyCli) -> Self {
        match value {
            GapPolicyCli::Strict => GapPolicy::Strict,
            GapPolicyCli::Tolerant => GapPolicy::Tolerant,
        }
    }
}

fn init_logging(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Ingest(args) => commands::ingest(&cli.db, args),
        Commands::Summary { identifier, json } => commands::summary(&cli.db, &identifier, json),
        Commands::Best {
            identifier,
            locus_id,
            percent_cutoff,
            json,
        } => commands::best(&cli.db, &identifier, locus_id, percent_cutoff, json),
    }
}

pub mod contigs;
pub mod coverage;
pub mod fasta;
pub mod header;
pub mod ordering;
pub mod pipeline;
pub mod stats;
pub mod transcripts;

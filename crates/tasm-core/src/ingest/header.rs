//! FASTA header micro-formats written by the oases/Velvet pipeline.
//!
//! Two shapes occur in practice:
//!
//! ```text
//! NODE_45_length_92_cov_13.978261
//! Locus_1_Transcript_5/59_Confidence_0.009_Length_195
//! ```
//!
//! Both are underscore-delimited key/value pairs. [`parse_header`] turns any
//! such header into an ordered field map; [`NodeHeader`] and
//! [`TranscriptHeader`] add the exact shape and numeric checks for each file.

use indexmap::IndexMap;

use crate::errors::{TasmError, TasmResult};

const NODE_HEADER_TOKENS: usize = 6;
const TRANSCRIPT_HEADER_TOKENS: usize = 8;

/// Field map produced by [`parse_header`], in header order.
pub type HeaderFields = IndexMap<String, String>;

fn normalize_key(token: &str) -> String {
    match token {
        "node" => "node_id".to_string(),
        "transcript" => "transcript_id".to_string(),
        "cov" => "coverage".to_string(),
        other => other.to_string(),
    }
}

/// Split a raw header into its underscore-delimited tokens, dropping any
/// leading `>`.
pub fn header_tokens(header: &str) -> Vec<&str> {
    header.trim().trim_start_matches('>').split('_').collect()
}

/// Parse an underscore-delimited key/value header.
///
/// Keys are matched case-insensitively and normalised (`node` → `node_id`,
/// `transcript` → `transcript_id`, `cov` → `coverage`). A value carrying a
/// `/` keeps only the part before it, so `5/59` becomes `5`.
pub fn parse_header(header: &str) -> TasmResult<HeaderFields> {
    let lowered = header.trim().trim_start_matches('>').to_lowercase();
    if lowered.is_empty() {
        return Err(TasmError::malformed_header(header, "empty header"));
    }
    let tokens: Vec<&str> = lowered.split('_').collect();
    if tokens.len() % 2 != 0 {
        return Err(TasmError::malformed_header(
            header,
            format!(
                "key {:?} has no value ({} tokens)",
                tokens[tokens.len() - 1],
                tokens.len()
            ),
        ));
    }

    let mut fields = HeaderFields::with_capacity(tokens.len() / 2);
    for pair in tokens.chunks_exact(2) {
        let key = normalize_key(pair[0]);
        let value = pair[1].split('/').next().unwrap_or_default().to_string();
        if fields.insert(key.clone(), value).is_some() {
            return Err(TasmError::malformed_header(
                header,
                format!("duplicate key {key:?}"),
            ));
        }
    }
    Ok(fields)
}

fn field<'a>(fields: &'a HeaderFields, header: &str, key: &str) -> TasmResult<&'a str> {
    fields
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| TasmError::malformed_header(header, format!("missing field {key:?}")))
}

/// Read a strictly positive integer field.
pub(crate) fn positive_int(fields: &HeaderFields, header: &str, key: &str) -> TasmResult<i64> {
    let raw = field(fields, header, key)?;
    match raw.parse::<i64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(TasmError::malformed_header(
            header,
            format!("{key} must be a positive integer, got {raw:?}"),
        )),
    }
}

fn non_negative_int(fields: &HeaderFields, header: &str, key: &str) -> TasmResult<i64> {
    let raw = field(fields, header, key)?;
    match raw.parse::<i64>() {
        Ok(v) if v >= 0 => Ok(v),
        _ => Err(TasmError::malformed_header(
            header,
            format!("{key} must be a non-negative integer, got {raw:?}"),
        )),
    }
}

fn finite_float(fields: &HeaderFields, header: &str, key: &str) -> TasmResult<f64> {
    let raw = field(fields, header, key)?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(TasmError::malformed_header(
            header,
            format!("{key} must be a finite number, got {raw:?}"),
        )),
    }
}

fn expect_token_count(header: &str, expected: usize) -> TasmResult<()> {
    let found = header_tokens(header).len();
    if found != expected {
        return Err(TasmError::malformed_header(
            header,
            format!("expected {expected} tokens, found {found}"),
        ));
    }
    Ok(())
}

/// `NODE_<id>_length_<len>_cov_<cov>` from `contigs.fa`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeHeader {
    pub node_id: i64,
    pub length: i64,
    pub coverage: f64,
}

impl NodeHeader {
    pub fn parse(header: &str) -> TasmResult<Self> {
        expect_token_count(header, NODE_HEADER_TOKENS)?;
        let fields = parse_header(header)?;
        let coverage = finite_float(&fields, header, "coverage")?;
        if coverage < 0.0 {
            return Err(TasmError::malformed_header(header, "coverage is negative"));
        }
        Ok(Self {
            node_id: positive_int(&fields, header, "node_id")?,
            length: non_negative_int(&fields, header, "length")?,
            coverage,
        })
    }
}

/// `Locus_<id>_Transcript_<id>/<n>_Confidence_<c>_Length_<len>` from
/// `transcripts.fa`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TranscriptHeader {
    pub locus_id: i64,
    pub transcript_id: i64,
    pub confidence: f64,
    pub length: i64,
}

impl TranscriptHeader {
    pub fn parse(header: &str) -> TasmResult<Self> {
        expect_token_count(header, TRANSCRIPT_HEADER_TOKENS)?;
        let fields = parse_header(header)?;
        Ok(Self {
            locus_id: positive_int(&fields, header, "locus")?,
            transcript_id: positive_int(&fields, header, "transcript_id")?,
            confidence: finite_float(&fields, header, "confidence")?,
            length: positive_int(&fields, header, "length")?,
        })
    }
}

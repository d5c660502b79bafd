//! On-disk call store: one TSV row per (variant, sample).
//!
//! Columns: contig, start, end, ref, alt, sample_id, alleles
//! (allele codes comma-joined, e.g. "REF,ALT"). The store is the
//! converted form of a VCF that the loader reads; its layout is an
//! implementation detail of this crate.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};

use crate::vcf::{stream_vcf_calls_with_config, VcfStreamConfig};
use crate::{AlleleCall, CallRecord};

const STORE_HEADER: [&str; 7] = [
    "contig", "start", "end", "ref", "alt", "sample_id", "alleles",
];

fn join_alleles(alleles: &[AlleleCall]) -> String {
    alleles
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Convert a VCF into the call store at `store_path`, overwriting any
/// existing file there.
pub fn convert_vcf_to_store(vcf_path: &str, store_path: &str, verbose: bool) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(store_path)
        .with_context(|| format!("creating call store {}", store_path))?;
    wtr.write_record(STORE_HEADER)?;

    let mut write_error: Option<anyhow::Error> = None;
    let mut written = 0usize;
    let start = Instant::now();
    let mut last_report = Instant::now();

    stream_vcf_calls_with_config(
        vcf_path,
        |_names| {},
        |rec: CallRecord| {
            if write_error.is_some() {
                return;
            }
            let start_col = rec.start.to_string();
            let end_col = rec.end.to_string();
            let alleles_col = join_alleles(&rec.alleles);
            let row = [
                rec.contig.as_str(),
                start_col.as_str(),
                end_col.as_str(),
                rec.ref_allele.as_str(),
                rec.alt_allele.as_str(),
                rec.sample_id.as_str(),
                alleles_col.as_str(),
            ];
            if let Err(e) = wtr.write_record(row) {
                write_error = Some(anyhow!(e));
                return;
            }
            written += 1;
            if verbose && last_report.elapsed().as_secs_f64() >= 2.0 {
                let rate = written as f64 / start.elapsed().as_secs_f64().max(1e-3);
                eprintln!("Converted {} call rows ({:.0} rows/s)", written, rate);
                last_report = Instant::now();
            }
        },
        VcfStreamConfig::default(),
    )
    .with_context(|| format!("reading VCF {}", vcf_path))?;

    if let Some(e) = write_error {
        return Err(e);
    }
    wtr.flush()?;
    if verbose {
        eprintln!("Wrote {} call rows to {}", written, store_path);
    }
    Ok(())
}

/// Make sure the call store for `vcf_path` exists at `store_path`.
///
/// Absent store: convert. Existing store with `overwrite`: delete and
/// reconvert. Existing store otherwise: reuse as-is, so repeated calls
/// with `overwrite = false` never trigger a second conversion.
///
/// The existence check and the conversion are not atomic against
/// concurrent callers targeting the same destination; callers must keep
/// a single writer per destination path.
///
/// Returns true if a conversion ran.
pub fn ensure_converted(
    vcf_path: &str,
    store_path: &str,
    overwrite: bool,
    verbose: bool,
) -> Result<bool> {
    if Path::new(store_path).exists() {
        if !overwrite {
            return Ok(false);
        }
        fs::remove_file(store_path)
            .with_context(|| format!("removing stale call store {}", store_path))?;
    }
    convert_vcf_to_store(vcf_path, store_path, verbose)?;
    Ok(true)
}

/// Read every call record from a store written by `convert_vcf_to_store`.
pub fn read_call_store(store_path: &str) -> Result<Vec<CallRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(store_path)
        .with_context(|| format!("opening call store {}", store_path))?;

    let mut records = Vec::new();
    for (line_no, result) in rdr.records().enumerate() {
        let rec = result?;
        if rec.len() < STORE_HEADER.len() {
            return Err(anyhow!(
                "Call store row {} has {} fields, expected {}",
                line_no + 2,
                rec.len(),
                STORE_HEADER.len()
            ));
        }
        let field = |i: usize| rec.get(i).unwrap_or("");
        let parse_u64 = |i: usize| -> Result<u64> {
            field(i)
                .parse()
                .map_err(|_| anyhow!("Bad integer '{}' in call store row {}", field(i), line_no + 2))
        };
        let alleles = field(6)
            .split(',')
            .map(AlleleCall::from_code)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("call store row {}", line_no + 2))?;

        records.push(CallRecord {
            contig: field(0).to_string(),
            start: parse_u64(1)?,
            end: parse_u64(2)?,
            ref_allele: field(3).to_string(),
            alt_allele: field(4).to_string(),
            sample_id: field(5).to_string(),
            alleles,
        });
    }
    Ok(records)
}

//! Streaming text VCF parser producing per-sample call records.
//!
//! Supports stdin ("-") and gzip/bgzip inputs. Only the GT field is
//! consumed; allele indices are decoded to REF / ALT / OTHER_ALT and "."
//! to NO_CALL. Invalid rows warn and are skipped unless strict mode is on.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use anyhow::{anyhow, Result};
use flate2::read::MultiGzDecoder;

use crate::{AlleleCall, CallRecord};

/// Streaming configuration.
#[derive(Clone, Debug, Default)]
pub struct VcfStreamConfig {
    /// If true, invalid rows/fields raise an error instead of being
    /// skipped with a warning.
    pub strict: bool,
}

fn vcf_reader(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        return Ok(Box::new(BufReader::with_capacity(64 * 1024, io::stdin())));
    }

    let file = File::open(path)?;
    if path.to_ascii_lowercase().ends_with(".gz") || path.to_ascii_lowercase().ends_with(".bgz") {
        let decoder = MultiGzDecoder::new(file);
        Ok(Box::new(BufReader::with_capacity(64 * 1024, decoder)))
    } else {
        Ok(Box::new(BufReader::with_capacity(64 * 1024, file)))
    }
}

fn warn_or_err(strict: bool, msg: &str) -> Result<()> {
    if strict {
        Err(anyhow!(msg.to_string()))
    } else {
        eprintln!("Warning: {}", msg);
        Ok(())
    }
}

/// Decode a GT string like "0/1", "1|0", "./." into allele calls.
/// Returns None for malformed tokens.
fn parse_gt(gt: &str) -> Option<Vec<AlleleCall>> {
    if gt.is_empty() {
        return None;
    }
    let mut calls = Vec::with_capacity(2);
    for token in gt.split(|c| c == '/' || c == '|') {
        let call = match token {
            "." => AlleleCall::NoCall,
            "0" => AlleleCall::Ref,
            "1" => AlleleCall::Alt,
            other => {
                // Indices >= 2 are additional alternates.
                other.parse::<usize>().ok()?;
                AlleleCall::OtherAlt
            }
        };
        calls.push(call);
    }
    Some(calls)
}

fn gt_index(format_str: &str) -> Option<usize> {
    format_str.split(':').position(|key| key == "GT")
}

fn parse_record_line<F>(
    line: &str,
    sample_names: &[String],
    config: &VcfStreamConfig,
    on_record: &mut F,
) -> Result<()>
where
    F: FnMut(CallRecord),
{
    let mut fields = line.split('\t');

    let chrom = fields.next().ok_or_else(|| anyhow!("Missing CHROM field"))?;
    let pos_str = fields.next().ok_or_else(|| anyhow!("Missing POS field"))?;
    let _id = fields.next().ok_or_else(|| anyhow!("Missing ID field"))?;
    let ref_allele = fields.next().ok_or_else(|| anyhow!("Missing REF field"))?;
    let alt_allele = fields.next().ok_or_else(|| anyhow!("Missing ALT field"))?;
    let _qual = fields.next().ok_or_else(|| anyhow!("Missing QUAL field"))?;
    let _filter = fields.next().ok_or_else(|| anyhow!("Missing FILTER field"))?;
    let _info = fields.next().ok_or_else(|| anyhow!("Missing INFO field"))?;
    let format_str = fields.next().ok_or_else(|| anyhow!("Missing FORMAT field"))?;

    let Some(gt_idx) = gt_index(format_str) else {
        warn_or_err(config.strict, "No GT in FORMAT; skipping locus")?;
        return Ok(());
    };

    let pos: u64 = match pos_str.parse() {
        Ok(p) => p,
        Err(_) => {
            warn_or_err(config.strict, &format!("Malformed POS '{}'", pos_str))?;
            return Ok(());
        }
    };
    // Half-open 0-based interval: start = pos - 1, end = start + len(REF).
    let start = pos.saturating_sub(1);
    let end = start + ref_allele.len() as u64;

    let mut seen = 0usize;
    for (i, sample_str) in fields.enumerate() {
        seen += 1;
        let Some(sample_id) = sample_names.get(i) else {
            warn_or_err(
                config.strict,
                &format!("More sample fields than header names at {}:{}", chrom, pos),
            )?;
            break;
        };
        let gt = sample_str.split(':').nth(gt_idx);
        let alleles = match gt.and_then(parse_gt) {
            Some(a) => a,
            None => {
                warn_or_err(
                    config.strict,
                    &format!("Malformed GT for sample {} at {}:{}", sample_id, chrom, pos),
                )?;
                continue;
            }
        };
        on_record(CallRecord {
            contig: chrom.to_string(),
            start,
            end,
            ref_allele: ref_allele.to_string(),
            alt_allele: alt_allele.to_string(),
            sample_id: sample_id.clone(),
            alleles,
        });
    }

    if seen < sample_names.len() {
        warn_or_err(
            config.strict,
            &format!(
                "Sample count mismatch at {}:{} (expected {}, got {})",
                chrom,
                pos,
                sample_names.len(),
                seen
            ),
        )?;
    }

    Ok(())
}

/// Stream per-sample call records from a VCF (plain or gzipped, or stdin).
/// `on_header` receives the sample names once; `on_record` is called once
/// per (variant, sample).
pub fn stream_vcf_calls_with_config<F, H>(
    path: &str,
    mut on_header: H,
    mut on_record: F,
    config: VcfStreamConfig,
) -> Result<()>
where
    F: FnMut(CallRecord),
    H: FnMut(&[String]),
{
    let mut reader = vcf_reader(path)?;
    let mut line = String::with_capacity(8192);
    let mut sample_names: Vec<String> = Vec::new();
    let mut header_seen = false;

    loop {
        line.clear();
        let bytes = reader.read_line(&mut line)?;
        if bytes == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(&['\n', '\r'][..]);
        if trimmed.is_empty() || trimmed.starts_with("##") {
            continue;
        }
        if trimmed.starts_with("#CHROM") {
            let mut header_fields = trimmed.split('\t');

            let mut valid_header = true;
            for _ in 0..9 {
                if header_fields.next().is_none() {
                    warn_or_err(config.strict, "Header has fewer than 9 columns")?;
                    valid_header = false;
                    break;
                }
            }
            if !valid_header {
                continue;
            }

            sample_names = header_fields.map(|s| s.to_string()).collect();
            header_seen = true;
            on_header(&sample_names);
            continue;
        }

        if !header_seen {
            return Err(anyhow!("VCF data line before #CHROM header"));
        }
        parse_record_line(trimmed, &sample_names, &config, &mut on_record)?;
    }

    Ok(())
}

/// Default configuration: non-strict.
pub fn stream_vcf_calls<F, H>(path: &str, on_header: H, on_record: F) -> Result<()>
where
    F: FnMut(CallRecord),
    H: FnMut(&[String]),
{
    stream_vcf_calls_with_config(path, on_header, on_record, VcfStreamConfig::default())
}

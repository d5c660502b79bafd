//! gwasprep-geno: genotype summarization and QC filtering.
//!
//! This crate turns raw per-sample allele calls into `GenotypeState`
//! records and applies the standard pre-association filters:
//! - per-sample missingness (`mind`)
//! - per-variant missingness (`geno`) and minor-allele frequency (`maf`)
//!
//! `load_genotypes` orchestrates the whole genotype side: convert the
//! VCF into the call store if needed, summarize, filter, and hand back
//! the cleaned collection.

use std::collections::HashMap;

use anyhow::Result;
use rayon::prelude::*;

use gwasprep_core::{GenotypeState, PrepParams, SampleId, VariantKey};

pub mod store;
pub mod vcf;

/// One allele slot of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlleleCall {
    Ref,
    Alt,
    OtherAlt,
    NoCall,
}

impl AlleleCall {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlleleCall::Ref => "REF",
            AlleleCall::Alt => "ALT",
            AlleleCall::OtherAlt => "OTHER_ALT",
            AlleleCall::NoCall => "NO_CALL",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "REF" | "Ref" => Ok(AlleleCall::Ref),
            "ALT" | "Alt" => Ok(AlleleCall::Alt),
            "OTHER_ALT" => Ok(AlleleCall::OtherAlt),
            "NO_CALL" => Ok(AlleleCall::NoCall),
            other => Err(anyhow::anyhow!("Unknown allele code '{}'", other)),
        }
    }
}

/// One raw call row: a sample's `ploidy` allele slots at one variant.
#[derive(Clone, Debug, PartialEq)]
pub struct CallRecord {
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub ref_allele: String,
    pub alt_allele: String,
    pub sample_id: SampleId,
    pub alleles: Vec<AlleleCall>,
}

/// Summarize raw call rows into per-(sample, variant) genotype states.
///
/// `genotype_state` counts REF alleles (a REF-dosage; see
/// `gwasprep_core::GenotypeState`), `missing_genotypes` counts NO_CALL
/// slots. With `sparse`, rows whose slots are all REF are dropped up
/// front; the retained rows summarize to exactly the same values.
///
/// Counts saturate at `u8::MAX`; allele lists longer than 255 slots are
/// outside any supported ploidy.
pub fn summarize_calls(records: Vec<CallRecord>, sparse: bool) -> Vec<GenotypeState> {
    records
        .into_par_iter()
        .filter(|rec| !sparse || rec.alleles.iter().any(|a| *a != AlleleCall::Ref))
        .map(|rec| {
            let ref_count = rec.alleles.iter().filter(|a| **a == AlleleCall::Ref).count();
            let no_calls = rec
                .alleles
                .iter()
                .filter(|a| **a == AlleleCall::NoCall)
                .count();
            GenotypeState {
                contig: rec.contig,
                start: rec.start,
                end: rec.end,
                ref_allele: rec.ref_allele,
                alt_allele: rec.alt_allele,
                sample_id: rec.sample_id,
                genotype_state: u8::try_from(ref_count).unwrap_or(u8::MAX),
                missing_genotypes: u8::try_from(no_calls).unwrap_or(u8::MAX),
            }
        })
        .collect()
}

/// Drop every record of any sample whose missingness rate exceeds `mind`.
///
/// Per sample: `rate = sum(missing_genotypes) / (n_records * ploidy)`.
/// A rate exactly equal to `mind` is kept. Samples with no records never
/// form a group, so no division by zero can occur.
pub fn filter_samples_by_missingness(
    states: Vec<GenotypeState>,
    mind: f64,
    ploidy: u8,
) -> Vec<GenotypeState> {
    let mut groups: HashMap<SampleId, Vec<GenotypeState>> = HashMap::new();
    for state in states {
        groups.entry(state.sample_id.clone()).or_default().push(state);
    }

    groups
        .into_par_iter()
        .filter(|(_, recs)| {
            let missing: u64 = recs.iter().map(|r| u64::from(r.missing_genotypes)).sum();
            let total = recs.len() as u64 * u64::from(ploidy);
            missing as f64 / total as f64 <= mind
        })
        .flat_map(|(_, recs)| recs)
        .collect()
}

/// Per-variant QC statistics, computed over one variant's records.
#[derive(Clone, Copy, Debug)]
pub struct VariantStats {
    /// Fraction of allele slots that are no-calls.
    pub miss_rate: f64,
    /// Frequency of the REF allele among called slots.
    pub ref_freq: f64,
    /// Frequency of the ALT allele among called slots.
    pub alt_freq: f64,
    /// Number of called (non-missing) allele slots.
    pub called: u64,
}

fn variant_stats(recs: &[GenotypeState], ploidy: u8) -> VariantStats {
    let total = recs.len() as u64 * u64::from(ploidy);
    let missing: u64 = recs.iter().map(|r| u64::from(r.missing_genotypes)).sum();
    let ref_count: u64 = recs.iter().map(|r| u64::from(r.genotype_state)).sum();
    let called = total - missing;
    let ref_freq = if called == 0 {
        f64::NAN
    } else {
        ref_count as f64 / called as f64
    };
    VariantStats {
        miss_rate: missing as f64 / total as f64,
        ref_freq,
        alt_freq: 1.0 - ref_freq,
        called,
    }
}

/// Drop every record of any variant failing missingness or allele-frequency
/// bounds.
///
/// Variants are grouped by full identity (contig, start, end, ref, alt);
/// statistics are never merged across distinct variants on one contig.
/// A variant is kept iff `miss_rate <= geno` and both `ref_freq` and
/// `alt_freq` are `>= maf` (inclusive, so whichever allele is minor must
/// reach the threshold). Variants with no called slots are dropped.
pub fn filter_variants(
    states: Vec<GenotypeState>,
    geno: f64,
    maf: f64,
    ploidy: u8,
) -> Vec<GenotypeState> {
    let mut groups: HashMap<VariantKey, Vec<GenotypeState>> = HashMap::new();
    for state in states {
        groups.entry(state.variant_key()).or_default().push(state);
    }

    groups
        .into_par_iter()
        .filter(|(_, recs)| {
            let stats = variant_stats(recs, ploidy);
            stats.called > 0
                && stats.miss_rate <= geno
                && stats.ref_freq >= maf
                && stats.alt_freq >= maf
        })
        .flat_map(|(_, recs)| recs)
        .collect()
}

/// Load the cleaned genotype collection for a VCF source.
///
/// Converts the VCF into the call store at `store_path` if absent (or
/// unconditionally when `params.overwrite` is set), then summarizes and
/// filters. Records whose allele count does not match `params.ploidy`
/// are skipped with a warning; records left fully missing after QC are
/// dropped. Repeated calls with `overwrite = false` reuse the store and
/// return identical output.
pub fn load_genotypes(
    params: &PrepParams,
    vcf_path: &str,
    store_path: &str,
    verbose: bool,
) -> Result<Vec<GenotypeState>> {
    params.validate()?;
    store::ensure_converted(vcf_path, store_path, params.overwrite, verbose)?;

    let records = store::read_call_store(store_path)?;
    let total = records.len();
    let ploidy = params.ploidy;
    let records: Vec<CallRecord> = records
        .into_iter()
        .filter(|r| r.alleles.len() == usize::from(ploidy))
        .collect();
    if records.len() != total {
        eprintln!(
            "Warning: skipped {} call rows not matching ploidy {}",
            total - records.len(),
            ploidy
        );
    }

    let states = summarize_calls(records, params.sparse);
    let n_summarized = states.len();
    let states = filter_samples_by_missingness(states, params.mind, ploidy);
    let n_after_mind = states.len();
    let states = filter_variants(states, params.geno, params.maf, ploidy);
    let n_after_qc = states.len();

    let mut states: Vec<GenotypeState> = states
        .into_iter()
        .filter(|s| s.missing_genotypes < ploidy)
        .collect();
    // The parallel filters flatten HashMap groups, so ordering is
    // hash-seed-dependent; sort so repeated calls return identical output.
    states.sort_by(|a, b| (a.variant_key(), &a.sample_id).cmp(&(b.variant_key(), &b.sample_id)));

    if verbose {
        eprintln!(
            "QC: {} call rows -> {} after mind filter -> {} after variant filter -> {} after dropping fully-missing calls",
            n_summarized,
            n_after_mind,
            n_after_qc,
            states.len()
        );
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    fn call(sample: &str, contig: &str, pos: u64, alleles: Vec<AlleleCall>) -> CallRecord {
        CallRecord {
            contig: contig.to_string(),
            start: pos,
            end: pos + 1,
            ref_allele: "A".into(),
            alt_allele: "G".into(),
            sample_id: sample.to_string(),
            alleles,
        }
    }

    fn state(
        sample: &str,
        contig: &str,
        pos: u64,
        genotype_state: u8,
        missing: u8,
    ) -> GenotypeState {
        GenotypeState {
            contig: contig.to_string(),
            start: pos,
            end: pos + 1,
            ref_allele: "A".into(),
            alt_allele: "G".into(),
            sample_id: sample.to_string(),
            genotype_state,
            missing_genotypes: missing,
        }
    }

    #[test]
    fn summarizes_ref_dosage_and_missing_counts() {
        use AlleleCall::*;
        let states = summarize_calls(
            vec![
                call("S1", "chr1", 100, vec![Ref, Alt]),
                call("S2", "chr1", 100, vec![NoCall, NoCall]),
                call("S3", "chr1", 100, vec![Ref, Ref]),
                call("S4", "chr1", 100, vec![OtherAlt, Alt]),
            ],
            false,
        );
        let by_sample: HashMap<_, _> = states
            .iter()
            .map(|s| (s.sample_id.clone(), (s.genotype_state, s.missing_genotypes)))
            .collect();
        assert_eq!(by_sample["S1"], (1, 0));
        assert_eq!(by_sample["S2"], (0, 2));
        assert_eq!(by_sample["S3"], (2, 0));
        assert_eq!(by_sample["S4"], (0, 0));
    }

    #[test]
    fn sparse_mode_drops_all_ref_rows_without_changing_values() {
        use AlleleCall::*;
        let rows = vec![
            call("S1", "chr1", 100, vec![Ref, Ref]),
            call("S2", "chr1", 100, vec![Ref, Alt]),
        ];
        let dense = summarize_calls(rows.clone(), false);
        let sparse = summarize_calls(rows, true);

        assert_eq!(dense.len(), 2);
        assert_eq!(sparse.len(), 1);
        let dense_s2 = dense.iter().find(|s| s.sample_id == "S2").unwrap();
        assert_eq!(&sparse[0], dense_s2);
    }

    #[test]
    fn oversized_allele_lists_saturate_instead_of_wrapping() {
        use AlleleCall::*;
        let states = summarize_calls(
            vec![
                call("S1", "chr1", 100, vec![Ref; 300]),
                call("S2", "chr1", 100, vec![NoCall; 300]),
            ],
            false,
        );
        let by_sample: HashMap<_, _> = states
            .iter()
            .map(|s| (s.sample_id.clone(), (s.genotype_state, s.missing_genotypes)))
            .collect();
        assert_eq!(by_sample["S1"], (u8::MAX, 0));
        assert_eq!(by_sample["S2"], (0, u8::MAX));
    }

    #[test]
    fn sample_filter_threshold_is_inclusive() {
        // S1: 1 missing slot over 2 records * ploidy 2 = 0.25, exactly at
        // the bound and kept. S2: 2 missing slots = 0.5, dropped.
        let states = vec![
            state("S1", "chr1", 100, 1, 1),
            state("S1", "chr1", 200, 2, 0),
            state("S2", "chr1", 100, 1, 1),
            state("S2", "chr1", 200, 1, 1),
        ];
        let kept = filter_samples_by_missingness(states, 0.25, 2);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|s| s.sample_id == "S1"));
    }

    #[test]
    fn variant_filter_maf_bound_is_inclusive_both_directions() {
        // Two samples, ploidy 2, no missing: 4 called slots per variant.
        // pos 100: ref_count 1 -> ref_freq 0.25 (REF is minor), kept at
        //   maf = 0.25.
        // pos 200: ref_count 3 -> alt_freq 0.25 (ALT is minor), kept.
        // pos 300: ref_count 4 -> alt_freq 0.0, dropped.
        let states = vec![
            state("S1", "chr1", 100, 1, 0),
            state("S2", "chr1", 100, 0, 0),
            state("S1", "chr1", 200, 2, 0),
            state("S2", "chr1", 200, 1, 0),
            state("S1", "chr1", 300, 2, 0),
            state("S2", "chr1", 300, 2, 0),
        ];
        let kept = filter_variants(states, 1.0, 0.25, 2);
        let mut positions: Vec<u64> = kept.iter().map(|s| s.start).collect();
        positions.sort_unstable();
        positions.dedup();
        assert_eq!(positions, vec![100, 200]);
    }

    #[test]
    fn variant_filter_missingness_bound_is_inclusive() {
        // 1 missing slot over 4 -> miss_rate 0.25, kept at geno = 0.25;
        // 2 missing slots -> 0.5, dropped.
        let states = vec![
            state("S1", "chr1", 100, 1, 1),
            state("S2", "chr1", 100, 1, 0),
            state("S1", "chr1", 200, 1, 1),
            state("S2", "chr1", 200, 1, 1),
        ];
        let kept = filter_variants(states, 0.25, 0.0, 2);
        assert!(kept.iter().all(|s| s.start == 100));
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn variant_filter_drops_groups_with_no_called_slots() {
        let states = vec![state("S1", "chr1", 100, 0, 2), state("S2", "chr1", 100, 0, 2)];
        assert!(filter_variants(states, 1.0, 0.0, 2).is_empty());
    }

    #[test]
    fn variants_sharing_a_contig_are_filtered_independently() {
        // Same contig, different positions: pos 100 is monomorphic REF
        // (dropped at maf 0.25), pos 200 is balanced (kept). Contig-level
        // grouping would merge them into one passing group.
        let states = vec![
            state("S1", "chr1", 100, 2, 0),
            state("S2", "chr1", 100, 2, 0),
            state("S1", "chr1", 200, 1, 0),
            state("S2", "chr1", 200, 1, 0),
        ];
        let kept = filter_variants(states, 1.0, 0.25, 2);
        assert!(kept.iter().all(|s| s.start == 200));
        assert_eq!(kept.len(), 2);
    }

    const VCF: &str = "\
##fileformat=VCFv4.2
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2
chr1\t101\t.\tA\tG\t.\tPASS\t.\tGT\t0/1\t1/1
chr1\t201\t.\tT\tC\t.\tPASS\t.\tGT\t0/0\t./1
";

    #[test]
    fn load_genotypes_is_idempotent_and_drops_fully_missing() {
        let dir = tempdir().unwrap();
        let vcf_path = dir.path().join("calls.vcf");
        let mut f = fs::File::create(&vcf_path).unwrap();
        write!(f, "{}", VCF).unwrap();
        drop(f);
        let vcf = vcf_path.to_str().unwrap();
        let store = dir.path().join("calls.tsv");
        let store = store.to_str().unwrap();

        let params = PrepParams {
            mind: 1.0,
            geno: 1.0,
            maf: 0.0,
            ..PrepParams::default()
        };
        let first = load_genotypes(&params, vcf, store, false).unwrap();
        let second = load_genotypes(&params, vcf, store, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
        assert!(first.iter().all(|s| s.missing_genotypes < 2));
    }
}

//! gwasprep-core: shared data structures for the gwasprep toolkit.
//!
//! This crate defines the value types flowing through the QC pipeline:
//! - `GenotypeState`: one sample's summarized call at one variant
//! - `VariantKey`: full variant identity used as a grouping key
//! - `Phenotype`: one sample's numeric feature vector
//! - `Observation`: one (dosage, features) regression data point
//!
//! All of these are plain immutable values; pipeline stages produce new
//! collections rather than mutating records in place.

use anyhow::{bail, Result};

pub type SampleId = String;

/// One sample's summarized call at one variant locus.
///
/// `genotype_state` counts REF alleles across the ploidy allele slots.
/// This is a REF-dosage, not the conventional ALT-dosage; downstream
/// consumers of these dosages must account for the direction.
/// `missing_genotypes` counts no-call slots over the same allele list,
/// so the two counts are independent of each other.
#[derive(Clone, Debug, PartialEq)]
pub struct GenotypeState {
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub ref_allele: String,
    pub alt_allele: String,
    pub sample_id: SampleId,
    pub genotype_state: u8,
    pub missing_genotypes: u8,
}

impl GenotypeState {
    /// Project this call onto its variant identity (one-way; the key
    /// holds no reference back to the call).
    pub fn variant_key(&self) -> VariantKey {
        VariantKey {
            contig: self.contig.clone(),
            start: self.start,
            end: self.end,
            ref_allele: self.ref_allele.clone(),
            alt_allele: self.alt_allele.clone(),
        }
    }

    /// Synthetic variant name: `{contig}_{end}_{alt}`.
    pub fn variant_name(&self) -> String {
        format!("{}_{}_{}", self.contig, self.end, self.alt_allele)
    }
}

/// Full variant identity. Variants sharing a contig but differing in
/// position or alleles are distinct keys; QC statistics are never merged
/// across them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey {
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub ref_allele: String,
    pub alt_allele: String,
}

/// One sample's aligned numeric record. `values[0]` is always the primary
/// trait; any covariates follow in their declared order. `label` is the
/// comma-joined list of the column names behind `values`.
#[derive(Clone, Debug, PartialEq)]
pub struct Phenotype {
    pub label: String,
    pub sample_id: SampleId,
    pub values: Vec<f64>,
}

/// One regression data point: a genotype dosage paired with the sample's
/// feature vector.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub dosage: f64,
    pub features: Vec<f64>,
}

/// QC and pipeline parameters. Passed explicitly into each stage; there is
/// no global configuration.
#[derive(Clone, Debug)]
pub struct PrepParams {
    /// Allele copies per sample per locus (2 for diploids).
    pub ploidy: u8,
    /// Max per-sample missingness rate (inclusive).
    pub mind: f64,
    /// Max per-variant missingness rate (inclusive).
    pub geno: f64,
    /// Min minor-allele frequency (inclusive, checked in both directions).
    pub maf: f64,
    /// Pre-filter call rows to those with at least one non-REF allele.
    pub sparse: bool,
    /// Remap a {1,2} primary trait encoding to {0,1}.
    pub one_two: bool,
    /// Delete and reconvert the call store even if it exists.
    pub overwrite: bool,
}

impl Default for PrepParams {
    fn default() -> Self {
        Self {
            ploidy: 2,
            mind: 0.1,
            geno: 0.1,
            maf: 0.01,
            sparse: false,
            one_two: false,
            overwrite: false,
        }
    }
}

impl PrepParams {
    /// Validate parameter ranges before any data is touched.
    pub fn validate(&self) -> Result<()> {
        if self.ploidy == 0 {
            bail!("Ploidy must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.mind) {
            bail!("mind must be in [0, 1], got {}", self.mind);
        }
        if !(0.0..=1.0).contains(&self.geno) {
            bail!("geno must be in [0, 1], got {}", self.geno);
        }
        if !(0.0..=0.5).contains(&self.maf) {
            bail!("maf must be in [0, 0.5], got {}", self.maf);
        }
        Ok(())
    }
}

/// The single missing-data sentinel for phenotype/covariate values.
///
/// A value is missing if it does not parse as a number, or if it parses
/// to exactly -9.0. Per-value parse failures are missing data by policy,
/// never errors.
pub fn is_missing(raw: &str) -> bool {
    match raw.trim().parse::<f64>() {
        Ok(v) => v == -9.0,
        Err(_) => true,
    }
}

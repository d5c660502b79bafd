//! gwasprep-assoc: observation assembly for association testing.
//!
//! This crate is the integration layer between the genotype and
//! phenotype sides: it joins cleaned `GenotypeState`s with aligned
//! `Phenotype`s by sample id and groups the pairs by (variant, trait
//! label). The resulting observation sets are the sole input contract
//! of downstream regression models.

use std::collections::HashMap;

use gwasprep_core::{GenotypeState, Observation, Phenotype, VariantKey};

/// Observation sets keyed by (variant identity, trait label). The pair
/// list per key is unordered.
pub type ObservationSets = HashMap<(VariantKey, String), Vec<Observation>>;

/// Join genotypes with phenotypes on sample id (inner join), project each
/// call onto its variant, and group the (dosage, features) pairs by
/// (variant, label).
///
/// Samples without a phenotype record, and phenotypes without any
/// genotype call, contribute nothing. The dosage is `genotype_state` as
/// a double, i.e. a REF-allele count.
pub fn assemble_observations(
    genotypes: &[GenotypeState],
    phenotypes: &[Phenotype],
) -> ObservationSets {
    let by_sample: HashMap<&str, &Phenotype> = phenotypes
        .iter()
        .map(|p| (p.sample_id.as_str(), p))
        .collect();

    let mut sets: ObservationSets = HashMap::new();
    for state in genotypes {
        let Some(pheno) = by_sample.get(state.sample_id.as_str()) else {
            continue;
        };
        sets.entry((state.variant_key(), pheno.label.clone()))
            .or_default()
            .push(Observation {
                dosage: f64::from(state.genotype_state),
                features: pheno.values.clone(),
            });
    }
    sets
}

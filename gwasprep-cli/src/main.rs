use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use gwasprep_assoc::assemble_observations;
use gwasprep_core::PrepParams;
use gwasprep_geno::{load_genotypes, store};
use gwasprep_pheno::{align_phenotypes, parse_phenotype_table, PhenotypeTable};

/// gwasprep: genotype/phenotype QC and observation assembly for GWAS
#[derive(Parser)]
#[command(
    name = "gwasprep",
    version,
    about = "gwasprep: QC-filter genotypes, align phenotypes, and assemble per-variant observations"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a VCF (plain or gzipped) into the call store
    Convert {
        /// Input VCF ("-" for stdin)
        #[arg(long)]
        vcf: String,

        /// Output call-store path
        #[arg(long)]
        out: String,

        /// Delete and reconvert if the store already exists
        #[arg(long, default_value_t = false)]
        overwrite: bool,

        /// Emit progress to stderr
        #[arg(long, default_value_t = false)]
        verbose: bool,
    },

    /// Run QC and assemble per-variant observations
    Prep {
        /// Input VCF (plain or gzipped)
        #[arg(long)]
        vcf: String,

        /// Call-store path (created from the VCF if absent)
        #[arg(long)]
        store: String,

        /// Phenotype file (header line, sample id in the first column)
        #[arg(long)]
        pheno: String,

        /// Phenotype column name to analyze
        #[arg(long)]
        pheno_name: String,

        /// Optional covariate file
        #[arg(long)]
        covar: Option<String>,

        /// Comma-separated covariate column names
        #[arg(long)]
        covar_names: Option<String>,

        /// Ploidy (e.g., 2 for diploids)
        #[arg(long, default_value_t = 2)]
        ploidy: u8,

        /// Max per-sample missingness rate
        #[arg(long, default_value_t = 0.1)]
        mind: f64,

        /// Max per-variant missingness rate
        #[arg(long, default_value_t = 0.1)]
        geno: f64,

        /// Min minor-allele frequency
        #[arg(long, default_value_t = 0.01)]
        maf: f64,

        /// Pre-filter call rows to those with at least one non-REF allele
        #[arg(long, default_value_t = false)]
        sparse: bool,

        /// Remap a {1,2} phenotype encoding to {0,1}
        #[arg(long, default_value_t = false)]
        one_two: bool,

        /// Delete and reconvert the call store even if it exists
        #[arg(long, default_value_t = false)]
        overwrite: bool,

        /// Output observations TSV
        #[arg(long)]
        out: String,

        /// Emit progress to stderr
        #[arg(long, default_value_t = false)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Convert {
            vcf,
            out,
            overwrite,
            verbose,
        } => {
            store::ensure_converted(&vcf, &out, overwrite, verbose)?;
            Ok(())
        }
        Commands::Prep {
            vcf,
            store,
            pheno,
            pheno_name,
            covar,
            covar_names,
            ploidy,
            mind,
            geno,
            maf,
            sparse,
            one_two,
            overwrite,
            out,
            verbose,
        } => {
            let params = PrepParams {
                ploidy,
                mind,
                geno,
                maf,
                sparse,
                one_two,
                overwrite,
            };
            run_prep(
                &params,
                &vcf,
                &store,
                &pheno,
                &pheno_name,
                covar.as_deref(),
                covar_names.as_deref(),
                &out,
                verbose,
            )
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_prep(
    params: &PrepParams,
    vcf: &str,
    store: &str,
    pheno_path: &str,
    pheno_name: &str,
    covar_path: Option<&str>,
    covar_names: Option<&str>,
    out: &str,
    verbose: bool,
) -> Result<()> {
    params.validate()?;

    // Header/column validation runs before the genotype side is touched,
    // so configuration errors abort before any heavy work.
    let pheno_table = parse_phenotype_table(pheno_path, &[pheno_name])?;
    let covar_table: Option<PhenotypeTable> = match (covar_path, covar_names) {
        (Some(path), Some(names)) => {
            let names: Vec<&str> = names.split(',').map(|n| n.trim()).collect();
            Some(parse_phenotype_table(path, &names)?)
        }
        (None, None) => None,
        (Some(_), None) => bail!("--covar requires --covar-names"),
        (None, Some(_)) => bail!("--covar-names requires --covar"),
    };

    let phenotypes = align_phenotypes(&pheno_table, covar_table.as_ref(), params.one_two)?;
    if verbose {
        eprintln!("Aligned {} phenotype records", phenotypes.len());
    }

    let genotypes = load_genotypes(params, vcf, store, verbose)?;
    let sets = assemble_observations(&genotypes, &phenotypes);

    write_observations(out, &sets)?;
    if verbose {
        let n_obs: usize = sets.values().map(|v| v.len()).sum();
        eprintln!(
            "Wrote {} observations across {} (variant, trait) groups to {}",
            n_obs,
            sets.len(),
            out
        );
    }
    Ok(())
}

/// Write observation sets as TSV, one row per observation, grouped rows
/// in a deterministic key order.
fn write_observations(path: &str, sets: &gwasprep_assoc::ObservationSets) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    wtr.write_record([
        "contig", "start", "end", "ref", "alt", "trait", "n_obs", "dosage", "features",
    ])?;

    let mut keys: Vec<_> = sets.keys().collect();
    keys.sort();

    for key in keys {
        let (variant, label) = key;
        let group = &sets[key];
        let n_obs_col = group.len().to_string();
        for obs in group {
            let start_col = variant.start.to_string();
            let end_col = variant.end.to_string();
            let dosage_col = obs.dosage.to_string();
            let features_col = obs
                .features
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",");
            wtr.write_record([
                variant.contig.as_str(),
                start_col.as_str(),
                end_col.as_str(),
                variant.ref_allele.as_str(),
                variant.alt_allele.as_str(),
                label.as_str(),
                n_obs_col.as_str(),
                dosage_col.as_str(),
                features_col.as_str(),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

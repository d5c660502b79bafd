//! CLI-level pipeline test: run `gwasprep prep` on small fixtures and
//! check the observation output.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

const VCF: &str = "\
##fileformat=VCFv4.2
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2
chr1\t101\t.\tA\tG\t.\tPASS\t.\tGT\t0/1\t1/1
chr1\t201\t.\tT\tC\t.\tPASS\t.\tGT\t0/0\t0/0
";

const PHENO: &str = "sampleId\tstatus\nS1\t2\nS2\t1\n";

fn write_fixture(path: &Path, contents: &str) {
    let mut f = fs::File::create(path).unwrap();
    write!(f, "{}", contents).unwrap();
}

#[test]
fn prep_writes_observations_for_passing_variants() {
    let dir = tempdir().unwrap();
    let vcf = dir.path().join("calls.vcf");
    let pheno = dir.path().join("pheno.tsv");
    let store = dir.path().join("calls.tsv");
    let out = dir.path().join("observations.tsv");
    write_fixture(&vcf, VCF);
    write_fixture(&pheno, PHENO);

    let status = Command::new(env!("CARGO_BIN_EXE_gwasprep"))
        .args([
            "prep",
            "--vcf",
            vcf.to_str().unwrap(),
            "--store",
            store.to_str().unwrap(),
            "--pheno",
            pheno.to_str().unwrap(),
            "--pheno-name",
            "status",
            "--mind",
            "1.0",
            "--geno",
            "1.0",
            "--maf",
            "0.25",
            "--one-two",
            "--out",
            out.to_str().unwrap(),
        ])
        .status()
        .unwrap();
    assert!(status.success());

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(&out)
        .unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert_eq!(headers.get(0), Some("contig"));
    assert_eq!(headers.get(5), Some("trait"));
    assert_eq!(headers.get(6), Some("n_obs"));

    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();

    // The monomorphic variant at pos 201 fails the MAF bound; only the
    // variant at pos 101 survives, with one observation per sample.
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.get(0), Some("chr1"));
        assert_eq!(row.get(1), Some("100"));
        assert_eq!(row.get(2), Some("101"));
        assert_eq!(row.get(5), Some("status"));
        // Both rows belong to one (variant, trait) group of two samples.
        assert_eq!(row.get(6), Some("2"));
    }
    // S1 is 0/1 (REF-dosage 1, remapped trait 1), S2 is 1/1 (dosage 0,
    // trait 0).
    let mut pairs: Vec<(String, String)> = rows
        .iter()
        .map(|r| (r.get(7).unwrap().to_string(), r.get(8).unwrap().to_string()))
        .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            ("0".to_string(), "0".to_string()),
            ("1".to_string(), "1".to_string())
        ]
    );
}

#[test]
fn prep_fails_fast_on_unknown_phenotype_column() {
    let dir = tempdir().unwrap();
    let vcf = dir.path().join("calls.vcf");
    let pheno = dir.path().join("pheno.tsv");
    write_fixture(&vcf, VCF);
    write_fixture(&pheno, PHENO);

    let output = Command::new(env!("CARGO_BIN_EXE_gwasprep"))
        .args([
            "prep",
            "--vcf",
            vcf.to_str().unwrap(),
            "--store",
            dir.path().join("calls.tsv").to_str().unwrap(),
            "--pheno",
            pheno.to_str().unwrap(),
            "--pheno-name",
            "height",
            "--out",
            dir.path().join("observations.tsv").to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("height"));
    // Validation failed before the genotype side ran.
    assert!(!dir.path().join("calls.tsv").exists());
}

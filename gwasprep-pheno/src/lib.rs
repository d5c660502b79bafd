//! gwasprep-pheno: phenotype/covariate table parsing and alignment.
//!
//! `parse_phenotype_table` reads a delimited text table (header first)
//! and resolves requested column names; `align_phenotypes` joins the
//! phenotype and covariate sides by sample id and emits one numeric
//! feature vector per surviving sample.
//!
//! Header and column-name problems are configuration errors and fail
//! hard before any bulk work. Individual values that do not parse are
//! missing data, not errors; rows carrying a missing required value are
//! silently dropped.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

use gwasprep_core::{is_missing, Phenotype};

/// A parsed table: data lines (header retained at index 0), header
/// labels, the resolved indices of the requested columns in request
/// order, and the detected delimiter.
#[derive(Clone, Debug)]
pub struct PhenotypeTable {
    pub lines: Vec<String>,
    pub header: Vec<String>,
    pub indices: Vec<usize>,
    pub delimiter: char,
}

/// Parse a delimited phenotype or covariate file.
///
/// The first line is the header. Delimiter detection: if splitting the
/// header on tab yields at least two fields the delimiter is tab,
/// otherwise a single space. The header must carry a sample-id column
/// plus at least one value column, and every requested name must match
/// a header label exactly.
pub fn parse_phenotype_table<P: AsRef<Path>>(
    path: P,
    columns: &[&str],
) -> Result<PhenotypeTable> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading phenotype file {}", path.display()))?;
    let lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();

    let header_line = lines
        .first()
        .ok_or_else(|| anyhow!("Phenotype file {} is empty", path.display()))?;

    let delimiter = if header_line.split('\t').count() >= 2 {
        '\t'
    } else {
        ' '
    };
    let header: Vec<String> = header_line.split(delimiter).map(|s| s.to_string()).collect();

    if header.len() < 2 {
        bail!(
            "Phenotype file {} needs at least 2 columns: a sample-id column and at least one value column",
            path.display()
        );
    }

    let mut indices = Vec::with_capacity(columns.len());
    for name in columns {
        let idx = header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("Column '{}' not found in header of {}", name, path.display()))?;
        indices.push(idx);
    }

    Ok(PhenotypeTable {
        lines,
        header,
        indices,
        delimiter,
    })
}

/// Split a table's data lines into (sample_id, fields) rows. The header
/// line is stripped; rows with an empty sample id are dropped.
fn data_rows(table: &PhenotypeTable) -> Vec<(String, Vec<String>)> {
    table
        .lines
        .iter()
        .skip(1)
        .map(|line| {
            let fields: Vec<String> = line.split(table.delimiter).map(|s| s.to_string()).collect();
            let key = fields.first().cloned().unwrap_or_default();
            (key, fields)
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Align phenotype rows (and optional covariate rows) into one numeric
/// record per sample.
///
/// With covariates, rows are inner-joined by sample id: a sample missing
/// from either side contributes nothing. `values[0]` is the primary
/// trait; covariates follow in their declared order. Rows with a missing
/// required value (see `gwasprep_core::is_missing`) are dropped. With
/// `one_two`, the primary value v is rewritten to v - 1 (a {1,2} case/
/// control encoding becomes {0,1}); covariates are never rewritten.
pub fn align_phenotypes(
    pheno: &PhenotypeTable,
    covar: Option<&PhenotypeTable>,
    one_two: bool,
) -> Result<Vec<Phenotype>> {
    let primary_idx = *pheno
        .indices
        .first()
        .ok_or_else(|| anyhow!("No phenotype column was requested"))?;
    let primary_name = &pheno.header[primary_idx];

    // Required indices into the (possibly joined) row, and their labels.
    let mut required = vec![primary_idx];
    let mut labels = vec![primary_name.clone()];
    if let Some(covar) = covar {
        for &idx in &covar.indices {
            let name = &covar.header[idx];
            if name == primary_name {
                bail!(
                    "Covariate '{}' collides with the primary phenotype name",
                    name
                );
            }
            required.push(idx + pheno.header.len());
            labels.push(name.clone());
        }
    }
    let label = labels.join(",");

    // Inner join on sample id when covariates are present.
    let joined: Vec<(String, Vec<String>)> = match covar {
        None => data_rows(pheno),
        Some(covar) => {
            let covar_rows: HashMap<String, Vec<String>> = data_rows(covar).into_iter().collect();
            data_rows(pheno)
                .into_iter()
                .filter_map(|(key, mut fields)| {
                    covar_rows.get(&key).map(|covar_fields| {
                        fields.extend(covar_fields.iter().cloned());
                        (key, fields)
                    })
                })
                .collect()
        }
    };

    let mut phenotypes = Vec::with_capacity(joined.len());
    for (sample_id, fields) in joined {
        if covar.is_some() && fields.len() < 3 {
            continue;
        }
        if required
            .iter()
            .any(|&i| i >= fields.len() || is_missing(&fields[i]))
        {
            continue;
        }

        let mut values = Vec::with_capacity(required.len());
        for &i in &required {
            match fields[i].trim().parse::<f64>() {
                Ok(v) => values.push(v),
                Err(_) => break,
            }
        }
        if values.len() != required.len() {
            continue;
        }
        if one_two {
            values[0] -= 1.0;
        }

        phenotypes.push(Phenotype {
            label: label.clone(),
            sample_id,
            values,
        });
    }

    Ok(phenotypes)
}

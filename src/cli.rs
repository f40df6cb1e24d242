
use clap::Parser;
use lazy_static::lazy_static;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

use crate::data_types::packed_labels::MAX_HAPLOTYPES;
use crate::haplotyper::HaplotyperConfig;

lazy_static! {
    /// Stores the full version string we plan to use.
    /// # Examples
    /// * `0.3.0-6bb9635-dirty` - while on a dirty branch
    /// * `0.3.0-6bb9635` - with a fresh commit
    pub static ref FULL_VERSION: String = format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("VERGEN_GIT_DESCRIBE"));
}

#[derive(Clone, Parser)]
#[clap(author,
    version = &**FULL_VERSION,
    about)]
pub struct Settings {
    /// Input support records, one "readIndex siteIndex allele [weight]" per line (optionally gzipped)
    #[clap(required = true)]
    #[clap(short = 'i')]
    #[clap(long = "supports")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub supports_filename: PathBuf,

    /// Output per-read haplotype labels (optional, csv/tsv)
    #[clap(short = 'o')]
    #[clap(long = "output-labels")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub labels_filename: Option<PathBuf>,

    /// Output algorithmic statistics file (optional, csv/tsv)
    #[clap(long = "stats-file")]
    #[clap(value_name = "FILE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub stats_filename: Option<PathBuf>,

    /// Number of haplotypes to solve for, may be given multiple times
    #[clap(required = true)]
    #[clap(short = 'k')]
    #[clap(long = "haplotypes")]
    #[clap(value_name = "K")]
    #[clap(help_heading = Some("Haplotyping"))]
    pub haplotypes: Vec<usize>,

    /// Maximum number of canonical partitions allowed at a single site
    #[clap(long = "max-partitions")]
    #[clap(value_name = "COUNT")]
    #[clap(default_value = "4194304")]
    #[clap(help_heading = Some("Haplotyping"))]
    pub max_partitions: usize,

    /// Number of threads to use, each haplotype count is solved independently
    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Enable verbose output
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8
}

impl Settings {
    /// Returns the library configuration for these settings
    pub fn haplotyper_config(&self) -> HaplotyperConfig {
        HaplotyperConfig {
            max_partitions: self.max_partitions
        }
    }
}

/// Checks if a file exists and will otherwise exit
/// # Arguments
/// * `filename` - the file path to check for
/// * `label` - the label to use for error messages
fn check_required_filename(filename: &Path, label: &str) {
    if !filename.exists() {
        error!("{} does not exist: \"{}\"", label, filename.display());
        std::process::exit(exitcode::NOINPUT);
    } else {
        info!("{}: \"{}\"", label, filename.display());
    }
}

/// Checks that every requested haplotype count can be solved
/// # Arguments
/// * `haplotypes` - the requested haplotype counts
/// # Errors
/// * if any count is 0 or larger than `MAX_HAPLOTYPES`
fn check_haplotype_counts(haplotypes: &[usize]) -> Result<(), String> {
    match haplotypes.iter().find(|&&k| k == 0 || k > MAX_HAPLOTYPES) {
        Some(k) => Err(format!("--haplotypes must be in 1..={}, got {}", MAX_HAPLOTYPES, k)),
        None => Ok(())
    }
}

pub fn get_raw_settings() -> Settings {
    Settings::parse()
}

/// Do some additional checks here, we may increase these as we go.
/// Also can modify settings if needed since we're passing it around.
/// # Arguments
/// * `settings` - the raw settings, nothing has been checked other than what clap does for us.
pub fn check_settings(mut settings: Settings) -> Settings {
    check_required_filename(&settings.supports_filename, "Support file");
    if let Some(filename) = settings.labels_filename.as_ref() {
        info!("Label file: \"{}\"", filename.display());
    }
    if let Some(filename) = settings.stats_filename.as_ref() {
        info!("Stats file: \"{}\"", filename.display());
    }

    // each haplotype count is only solved once, smallest first
    settings.haplotypes.sort_unstable();
    settings.haplotypes.dedup();
    if let Err(e) = check_haplotype_counts(&settings.haplotypes) {
        error!("{}", e);
        std::process::exit(exitcode::USAGE);
    }
    info!("Haplotype counts: {:?}", settings.haplotypes);

    if settings.max_partitions == 0 {
        error!("--max-partitions must be >= 1");
        std::process::exit(exitcode::USAGE);
    }
    info!("Maximum partitions per site: {}", settings.max_partitions);

    if settings.threads == 0 {
        warn!("--threads was 0, using 1 instead");
        settings.threads = 1;
    }
    info!("Processing threads: {}", settings.threads);

    //send the settings back
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_haplotype_counts() {
        assert!(check_haplotype_counts(&[1, 2, 4]).is_ok());
        assert!(check_haplotype_counts(&[MAX_HAPLOTYPES]).is_ok());
        assert!(check_haplotype_counts(&[0, 2]).is_err());
        assert_eq!(
            check_haplotype_counts(&[2, 300]).unwrap_err(),
            format!("--haplotypes must be in 1..={}, got 300", MAX_HAPLOTYPES)
        );
    }
}

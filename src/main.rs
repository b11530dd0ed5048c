//! CDS coverage worker main executable

pub mod common;
pub mod coverage;
pub mod err;
pub mod export;
pub mod gene_model;
pub mod mappability;
pub mod per_base;
pub mod table;

use std::path::PathBuf;

use clap::Parser;
use console::{Emoji, Term};

use crate::table::checkpoint::FsCheckpointStore;

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "CDS coverage summaries by gene and platform",
    long_about = "This tool computes per-base CDS coverage from grouped exome and genome \
                  coverage tables and exports per-gene summaries"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// Compute the per-base CDS coverage checkpoint.
    #[arg(long, alias = "compute_per_base_cds_coverage")]
    compute_per_base_cds_coverage: bool,
    /// Export the per-gene coverage summary from the checkpoint.
    #[arg(long, alias = "export_gene_coverage")]
    export_gene_coverage: bool,

    /// Directory for the intermediate checkpoints.
    #[arg(long, default_value = "checkpoints")]
    path_checkpoints: PathBuf,
    /// Number of worker threads, defaults to the number of CPUs.
    #[arg(long)]
    num_threads: Option<usize>,

    #[command(flatten)]
    per_base: per_base::Args,
    #[command(flatten)]
    export: export::Args,
}

/// Run the steps selected in `cli` on a thread pool of `cli.num_threads` threads.
fn run(cli: &Cli) -> Result<(), anyhow::Error> {
    if !cli.compute_per_base_cds_coverage && !cli.export_gene_coverage {
        tracing::info!(
            "Nothing to do, pass --compute-per-base-cds-coverage and/or --export-gene-coverage"
        );
        return Ok(());
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(num_threads) = cli.num_threads {
        builder = builder.num_threads(num_threads);
    }
    let pool = builder.build()?;
    tracing::debug!("using {} threads", pool.current_num_threads());

    pool.install(|| {
        let store = FsCheckpointStore::new(&cli.path_checkpoints)?;
        if cli.compute_per_base_cds_coverage {
            per_base::run(&store, &cli.per_base)?;
        }
        if cli.export_gene_coverage {
            export::run(&store, &cli.export)?;
        }

        Ok(())
    })
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and run the selected steps.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || run(&cli))?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}

#[cfg(test)]
mod test {
    use clap::{CommandFactory, Parser};
    use pretty_assertions::assert_eq;

    use super::Cli;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[rstest::rstest]
    #[case("--compute-per-base-cds-coverage")]
    #[case("--compute_per_base_cds_coverage")]
    fn compute_flag_aliases(#[case] flag: &str) -> Result<(), anyhow::Error> {
        let cli = Cli::try_parse_from(["cds-coverage-worker", flag])?;

        assert!(cli.compute_per_base_cds_coverage);
        assert!(!cli.export_gene_coverage);
        assert_eq!("checkpoints", cli.path_checkpoints.to_string_lossy());

        Ok(())
    }

    #[test]
    fn nothing_requested() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path_checkpoints = tmp_dir.join("checkpoints");
        let cli = Cli::try_parse_from([
            "cds-coverage-worker",
            "--path-checkpoints",
            path_checkpoints.to_str().unwrap(),
        ])?;

        super::run(&cli)?;
        assert!(!path_checkpoints.exists());

        Ok(())
    }

    #[test]
    fn run_both_steps_with_num_threads() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path_checkpoints = tmp_dir.join("checkpoints");
        let path_output_tsv = tmp_dir.join("summary.tsv.gz");
        let cli = Cli::try_parse_from([
            "cds-coverage-worker",
            "--compute-per-base-cds-coverage",
            "--export-gene-coverage",
            "--num-threads",
            "2",
            "--path-checkpoints",
            path_checkpoints.to_str().unwrap(),
            "--path-gtf",
            "tests/data/gencode.small.gtf",
            "--path-exomes-coverage",
            "tests/data/exomes.coverage.tsv",
            "--path-genomes-coverage",
            "tests/data/genomes.coverage.tsv",
            "--path-mappability",
            "tests/data/mappability.tsv",
            "--path-output-tsv",
            path_output_tsv.to_str().unwrap(),
        ])?;
        assert_eq!(Some(2), cli.num_threads);

        super::run(&cli)?;
        assert!(path_checkpoints.join("gene_by_base.jsonl.gz").is_file());
        assert!(path_checkpoints.join("gene_by_base.cov.jsonl.gz").is_file());
        assert!(path_output_tsv.is_file());

        Ok(())
    }

    #[test]
    fn invalid_num_threads() {
        assert!(Cli::try_parse_from(["cds-coverage-worker", "--num-threads", "many"]).is_err());
    }

    #[test]
    fn export_flag_alias() -> Result<(), anyhow::Error> {
        let cli = Cli::try_parse_from([
            "cds-coverage-worker",
            "--export_gene_coverage",
            "--path-output-tsv",
            "out.tsv",
        ])?;

        assert!(cli.export_gene_coverage);
        assert_eq!("out.tsv", cli.export.path_output_tsv.to_string_lossy());

        Ok(())
    }
}

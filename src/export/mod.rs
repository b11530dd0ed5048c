//! Export of per-gene coverage summaries, one row per gene and coverage column.

use std::{io::Write, path::Path, path::PathBuf, time::Instant};

use itertools::{Itertools, MinMaxResult};
use thousands::Separable;

use crate::{
    common::{io::open_write_maybe_gz, mean, median, Contig, GenomeRelease},
    coverage::threshold_column,
    err::DataError,
    per_base::{self, CoverageColumn, JoinedBase, JoinedTable},
    table::{checkpoint::CheckpointStore, Table},
};

/// Fraction of samples over `MIN_GOOD_COVERAGE_DP` for a base to be well covered.
pub const MIN_GOOD_COVERAGE_PROP: f64 = 0.8;
/// Reported depth threshold used for the well-covered rule.
pub const MIN_GOOD_COVERAGE_DP: f64 = 10.0;

/// Command line arguments for exporting the gene coverage.
#[derive(Debug, Clone, clap::Args)]
#[group(id = "export_args")]
pub struct Args {
    /// Path to the output TSV file, gzip-compressed if ending in `.gz`.
    #[arg(
        long,
        default_value = "gencode_grch37_gene_by_platform_coverage_summary.tsv.gz"
    )]
    pub path_output_tsv: PathBuf,
}

/// Table-level metadata of the summary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SummaryGlobals {
    pub min_good_coverage_prop: f64,
    pub min_good_coverage_dp: String,
}

impl Default for SummaryGlobals {
    fn default() -> Self {
        Self {
            min_good_coverage_prop: MIN_GOOD_COVERAGE_PROP,
            min_good_coverage_dp: threshold_column(MIN_GOOD_COVERAGE_DP),
        }
    }
}

/// Write `NA` for missing values, as downstream R/hail readers expect.
fn serialize_na<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(value) => serializer.serialize_f64(*value),
        None => serializer.serialize_str("NA"),
    }
}

/// One row of the exported summary.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SummaryRow {
    pub gene_id: String,
    pub gene_name: String,
    /// Rendered as `contig:start-end`.
    pub gene_interval: String,
    #[serde(serialize_with = "serialize_na")]
    pub mean_mappability: Option<f64>,
    #[serde(serialize_with = "serialize_na")]
    pub median_mappability: Option<f64>,
    pub data_type: String,
    pub platform: String,
    pub frac_well_covered_bases: f64,
    /// Mean of the `over_10.0` fraction, not a sample count.
    #[serde(serialize_with = "serialize_na")]
    pub mean_well_covered_samples: Option<f64>,
}

/// Interval spanned by a gene's CDS bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneInterval {
    pub contig: Contig,
    pub start: u32,
    pub end: u32,
}

/// Summary of one coverage column over a gene's bases.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub column: CoverageColumn,
    pub frac_well_covered_bases: f64,
    pub mean_well_covered_samples: Option<f64>,
}

/// Summary of one gene.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneSummary {
    pub gene_id: String,
    pub gene_name: String,
    pub gene_interval: GeneInterval,
    pub mean_mappability: Option<f64>,
    pub median_mappability: Option<f64>,
    pub cov_stats: Vec<ColumnSummary>,
}

impl GeneSummary {
    /// One row per coverage column.
    pub fn into_rows(self, genome_release: GenomeRelease) -> Vec<SummaryRow> {
        let gene_interval = format!(
            "{}:{}-{}",
            genome_release.contig_name(self.gene_interval.contig),
            self.gene_interval.start,
            self.gene_interval.end
        );
        self.cov_stats
            .into_iter()
            .map(|stats| SummaryRow {
                gene_id: self.gene_id.clone(),
                gene_name: self.gene_name.clone(),
                gene_interval: gene_interval.clone(),
                mean_mappability: self.mean_mappability,
                median_mappability: self.median_mappability,
                data_type: stats.column.cohort.to_string(),
                platform: stats.column.platform,
                frac_well_covered_bases: stats.frac_well_covered_bases,
                mean_well_covered_samples: stats.mean_well_covered_samples,
            })
            .collect()
    }
}

/// Summarize the bases of one gene.
///
/// All bases must agree on gene name and contig.
pub fn summarize_gene(
    gene_id: &str,
    bases: &[JoinedBase],
    columns: &[CoverageColumn],
) -> Result<GeneSummary, anyhow::Error> {
    let (start, end) = match bases.iter().map(|base| base.locus.position).minmax() {
        MinMaxResult::NoElements => anyhow::bail!("gene {} without bases", gene_id),
        MinMaxResult::OneElement(position) => (position, position),
        MinMaxResult::MinMax(start, end) => (start, end),
    };
    let first = &bases[0];
    for base in &bases[1..] {
        if base.gene_name != first.gene_name {
            return Err(DataError::GeneNameConflict {
                gene_id: gene_id.to_string(),
                first: first.gene_name.clone(),
                second: base.gene_name.clone(),
            }
            .into());
        }
        if base.locus.contig != first.locus.contig {
            return Err(DataError::GeneContigConflict {
                gene_id: gene_id.to_string(),
                first: first.locus.contig.to_string(),
                second: base.locus.contig.to_string(),
            }
            .into());
        }
    }

    let mappability = bases
        .iter()
        .filter_map(|base| base.mappability)
        .collect::<Vec<_>>();

    let cov_stats = columns
        .iter()
        .map(|column| {
            let values = bases
                .iter()
                .map(|base| base.over_at(column, MIN_GOOD_COVERAGE_DP))
                .collect::<Vec<_>>();
            let well_covered = values
                .iter()
                .filter(|value| matches!(value, Some(v) if *v >= MIN_GOOD_COVERAGE_PROP))
                .count();
            let present = values.into_iter().flatten().collect::<Vec<_>>();
            ColumnSummary {
                column: column.clone(),
                frac_well_covered_bases: well_covered as f64 / bases.len() as f64,
                mean_well_covered_samples: mean(&present),
            }
        })
        .collect();

    Ok(GeneSummary {
        gene_id: gene_id.to_string(),
        gene_name: first.gene_name.clone(),
        gene_interval: GeneInterval {
            contig: first.locus.contig,
            start,
            end,
        },
        mean_mappability: mean(&mappability),
        median_mappability: median(&mappability),
        cov_stats,
    })
}

/// Summarize the joined per-base table by gene, leaving out chrY.
pub fn summarize(
    joined: JoinedTable,
) -> Result<Table<SummaryGlobals, SummaryRow>, anyhow::Error> {
    let genome_release = joined.globals.genome_release;
    let columns = joined.globals.columns.clone();

    let genes = joined
        .filter(|base| base.locus.contig != Contig::Y)
        .group_by(
            |base| base.gene_id.clone(),
            |gene_id, bases| summarize_gene(gene_id, &bases, &columns),
        )?;
    tracing::debug!("  summarized {} genes", genes.len().separate_with_commas());

    Ok(genes
        .explode(|summary| summary.into_rows(genome_release))
        .with_globals(SummaryGlobals::default()))
}

/// Write `table` as TSV, with the globals as leading `#key=value` lines.
pub fn write_tsv<P>(
    table: &Table<SummaryGlobals, SummaryRow>,
    path: P,
) -> Result<(), anyhow::Error>
where
    P: AsRef<Path>,
{
    let mut output = open_write_maybe_gz(path.as_ref())?;
    writeln!(
        output,
        "#min_good_coverage_prop={}",
        table.globals.min_good_coverage_prop
    )?;
    writeln!(
        output,
        "#min_good_coverage_dp={}",
        table.globals.min_good_coverage_dp
    )?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_writer(output);
    for row in &table.rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("problem writing {:?}: {}", path.as_ref(), e))?
        .flush()?;

    Ok(())
}

/// Main entry point for exporting the gene coverage summary.
pub fn run<S>(store: &S, args: &Args) -> Result<(), anyhow::Error>
where
    S: CheckpointStore,
{
    let before_anything = Instant::now();
    tracing::info!("Exporting gene coverage");
    tracing::info!("  args = {:#?}", &args);

    if !store.exists(per_base::CHECKPOINT_NAME) {
        anyhow::bail!(
            "no per-base coverage checkpoint {:?}, compute the per-base CDS coverage first",
            per_base::CHECKPOINT_NAME
        );
    }
    let joined: JoinedTable = store.read(per_base::CHECKPOINT_NAME)?;
    let summary = summarize(joined)?;
    write_tsv(&summary, &args.path_output_tsv)?;

    tracing::info!(
        "Wrote {} rows to {:?} in {:?}",
        summary.len().separate_with_commas(),
        &args.path_output_tsv,
        before_anything.elapsed()
    );

    Ok(())
}

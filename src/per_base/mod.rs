//! Per-base CDS coverage: the gene model joined with cohort coverage and mappability.

use std::{collections::HashMap, path::PathBuf, time::Instant};

use enum_map::EnumMap;
use itertools::Itertools;
use strum::IntoEnumIterator;
use thousands::Separable;

use crate::{
    common::{trace_rss_now, GenomeRelease, Locus},
    coverage::{
        self, Cohort, CohortCoverage, CohortCoverageTable, ALL_PLATFORMS, DEPTH_THRESHOLDS,
    },
    gene_model::{self, GeneModel},
    mappability::{self, MappabilityTrack},
    table::{checkpoint::CheckpointStore, Table},
};

/// Name of the joined per-base checkpoint.
pub const CHECKPOINT_NAME: &str = "gene_by_base.cov";

/// Command line arguments for computing the per-base coverage.
#[derive(Debug, Clone, clap::Args)]
#[group(id = "per_base_args")]
pub struct Args {
    /// The assumed genome build.
    #[arg(long, value_enum, default_value_t = GenomeRelease::Grch37)]
    pub genome_release: GenomeRelease,
    /// Path to the GENCODE GTF file.
    #[arg(long, default_value = "gencode.v19.annotation.gtf.bgz")]
    pub path_gtf: PathBuf,
    /// Path to the grouped exomes coverage TSV.
    #[arg(long, default_value = "exomes.coverage.grouped.tsv.bgz")]
    pub path_exomes_coverage: PathBuf,
    /// Path to the grouped genomes coverage TSV.
    #[arg(long, default_value = "genomes.coverage.grouped.tsv.bgz")]
    pub path_genomes_coverage: PathBuf,
    /// Path to the mappability track TSV.
    #[arg(long, default_value = "ucsc_mappability.tsv.bgz")]
    pub path_mappability: PathBuf,
    /// Name of the mappability score column.
    #[arg(long, default_value = "duke_35_map")]
    pub mappability_field: String,
}

impl Args {
    /// Path of the coverage table of `cohort`.
    pub fn path_coverage(&self, cohort: Cohort) -> &PathBuf {
        match cohort {
            Cohort::Exomes => &self.path_exomes_coverage,
            Cohort::Genomes => &self.path_genomes_coverage,
        }
    }
}

/// A coverage column of the joined table, named `<cohort>_<platform>`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CoverageColumn {
    pub cohort: Cohort,
    /// Platform name or `ALL_PLATFORMS`.
    pub platform: String,
}

impl std::fmt::Display for CoverageColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.cohort, self.platform)
    }
}

impl std::str::FromStr for CoverageColumn {
    type Err = anyhow::Error;

    /// Split on `_`: the first part is the cohort, the rest the platform.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('_');
        let cohort = parts
            .next()
            .unwrap_or_default()
            .parse::<Cohort>()
            .map_err(|e| anyhow::anyhow!("invalid cohort in coverage column {:?}: {}", s, e))?;
        let platform = parts.join("_");
        if platform.is_empty() {
            anyhow::bail!("missing platform in coverage column {:?}", s);
        }
        Ok(Self { cohort, platform })
    }
}

impl From<CoverageColumn> for String {
    fn from(column: CoverageColumn) -> Self {
        column.to_string()
    }
}

impl TryFrom<String> for CoverageColumn {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Globals of the joined per-base table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JoinedGlobals {
    pub genome_release: GenomeRelease,
    /// Raw depth thresholds; the `over` values refer to half of them.
    pub depth_thresholds: Vec<f64>,
    /// Platforms seen per cohort.
    pub platforms: EnumMap<Cohort, Vec<String>>,
    /// All coverage columns, per cohort its platforms and then `all`.
    pub columns: Vec<CoverageColumn>,
}

impl JoinedGlobals {
    pub fn new(genome_release: GenomeRelease, platforms: EnumMap<Cohort, Vec<String>>) -> Self {
        let columns = Cohort::iter()
            .flat_map(|cohort| {
                platforms[cohort]
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once(ALL_PLATFORMS))
                    .map(move |platform| CoverageColumn {
                        cohort,
                        platform: platform.to_string(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        Self {
            genome_release,
            depth_thresholds: DEPTH_THRESHOLDS.to_vec(),
            platforms,
            columns,
        }
    }
}

/// One CDS base of a gene with coverage and mappability.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JoinedBase {
    pub locus: Locus,
    pub gene_id: String,
    pub gene_name: String,
    /// Coverage per cohort, `None` if the cohort has no data at the locus.
    pub coverage: EnumMap<Cohort, Option<CohortCoverage>>,
    /// Mappability score, `None` if not covered by the track.
    pub mappability: Option<f64>,
}

impl JoinedBase {
    /// Coverage column value at the reported depth `threshold`.
    pub fn over_at(&self, column: &CoverageColumn, threshold: f64) -> Option<f64> {
        self.coverage[column.cohort]
            .as_ref()
            .and_then(|coverage| coverage.get(&column.platform))
            .and_then(|stats| stats.over_at(threshold))
    }
}

/// The joined per-base table.
pub type JoinedTable = Table<JoinedGlobals, JoinedBase>;

/// Left-join `gene_model` with the cohort coverage tables and `mappability`.
///
/// Every row of the gene model is kept.
pub fn join(
    gene_model: GeneModel,
    cohorts: Vec<CohortCoverageTable>,
    mappability: &MappabilityTrack,
) -> JoinedTable {
    let mut platforms: EnumMap<Cohort, Vec<String>> = EnumMap::default();
    for table in &cohorts {
        platforms[table.globals.cohort] = table.globals.platforms.clone();
    }
    let globals = JoinedGlobals::new(gene_model.globals.genome_release, platforms);

    let mut joined = gene_model.with_globals(globals).explode(|base| {
        Some(JoinedBase {
            mappability: mappability.score(&base.locus),
            locus: base.locus,
            gene_id: base.gene_id,
            gene_name: base.gene_name,
            coverage: EnumMap::default(),
        })
    });
    for table in cohorts {
        let cohort = table.globals.cohort;
        let lookup = table
            .rows
            .into_iter()
            .map(|row| (row.locus, row.coverage))
            .collect::<HashMap<_, _>>();
        joined = joined.left_join(
            &lookup,
            |base| base.locus,
            |mut base, coverage| {
                base.coverage[cohort] = coverage.cloned();
                base
            },
        );
    }

    joined
}

/// Main entry point for computing the per-base CDS coverage.
pub fn run<S>(store: &S, args: &Args) -> Result<(), anyhow::Error>
where
    S: CheckpointStore,
{
    let before_anything = Instant::now();
    tracing::info!("Computing per-base CDS coverage");
    tracing::info!("  args = {:#?}", &args);

    let gene_model = gene_model::load_or_build(store, &args.path_gtf, args.genome_release)?;
    let cohorts = Cohort::iter()
        .map(|cohort| coverage::load(cohort, args.path_coverage(cohort), args.genome_release))
        .collect::<Result<Vec<_>, _>>()?;
    let mappability = mappability::load(&args.path_mappability, &args.mappability_field)?;

    tracing::info!("Joining ...");
    let before_joining = Instant::now();
    let joined = join(gene_model, cohorts, &mappability);
    for cohort in Cohort::iter() {
        tracing::info!(
            "  {} of {} bases with {} coverage",
            joined
                .rows
                .iter()
                .filter(|base| base.coverage[cohort].is_some())
                .count()
                .separate_with_commas(),
            joined.len().separate_with_commas(),
            cohort
        );
    }
    tracing::info!("... done joining in {:?}", before_joining.elapsed());
    trace_rss_now();

    store.write(CHECKPOINT_NAME, &joined)?;
    tracing::info!(
        "All of per-base CDS coverage completed in {:?}",
        before_anything.elapsed()
    );

    Ok(())
}

#[cfg(test)]
pub(crate) mod test {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::{Args, CoverageColumn, JoinedTable};
    use crate::{
        common::GenomeRelease,
        coverage::Cohort,
        table::checkpoint::{CheckpointStore, FsCheckpointStore},
    };

    pub fn fixture_args() -> Args {
        Args {
            genome_release: GenomeRelease::Grch37,
            path_gtf: PathBuf::from("tests/data/gencode.small.gtf"),
            path_exomes_coverage: PathBuf::from("tests/data/exomes.coverage.tsv"),
            path_genomes_coverage: PathBuf::from("tests/data/genomes.coverage.tsv"),
            path_mappability: PathBuf::from("tests/data/mappability.tsv"),
            mappability_field: String::from("duke_35_map"),
        }
    }

    #[rstest::rstest]
    #[case("exomes_illumina", Cohort::Exomes, "illumina")]
    #[case("genomes_pcr_free", Cohort::Genomes, "pcr_free")]
    #[case("genomes_all", Cohort::Genomes, "all")]
    fn coverage_column_from_str(
        #[case] name: &str,
        #[case] cohort: Cohort,
        #[case] platform: &str,
    ) -> Result<(), anyhow::Error> {
        let column: CoverageColumn = name.parse()?;

        assert_eq!(cohort, column.cohort);
        assert_eq!(platform, column.platform);
        assert_eq!(name, column.to_string());

        Ok(())
    }

    #[rstest::rstest]
    #[case("exomes")]
    #[case("proteomes_x")]
    fn coverage_column_invalid(#[case] name: &str) {
        assert!(name.parse::<CoverageColumn>().is_err());
    }

    #[test]
    fn run_joins_all_gene_model_rows() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = FsCheckpointStore::new(tmp_dir.to_path_buf())?;

        super::run(&store, &fixture_args())?;
        let joined: JoinedTable = store.read(super::CHECKPOINT_NAME)?;

        assert_eq!(27, joined.len());
        assert_eq!(
            vec![
                "exomes_agilent",
                "exomes_illumina",
                "exomes_all",
                "genomes_pcr_free",
                "genomes_pcr_plus",
                "genomes_all"
            ],
            joined
                .globals
                .columns
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
        );

        let at = |gene_id: &str, position: u32| {
            joined
                .rows
                .iter()
                .find(|b| b.gene_id == gene_id && b.locus.position == position)
                .unwrap()
        };
        // covered by both cohorts
        let base = at("G1", 101);
        assert!(base.coverage[Cohort::Exomes].is_some());
        assert!(base.coverage[Cohort::Genomes].is_some());
        assert_eq!(Some(1.0), base.mappability);
        // base in two genes, retained for both
        assert_eq!(at("G1", 109).coverage, at("G2", 109).coverage);
        // no coverage at all
        let base = at("G1", 112);
        assert!(base.coverage[Cohort::Exomes].is_none());
        assert!(base.coverage[Cohort::Genomes].is_none());
        assert_eq!(Some(0.25), base.mappability);
        // no mappability
        assert_eq!(None, at("G6", 2649600).mappability);

        Ok(())
    }
}

//! Haploid-aware aggregation of grouped coverage tables.
//!
//! Males are haploid on chrX/chrY outside of the pseudo-autosomal regions (and
//! on chrMT), so their depth is taken as is while diploid depth is halved.  On
//! autosomes and in the PARs, all depths are halved.  This brings all loci onto
//! the same, haploid-equivalent scale.

pub mod input;

use std::{collections::BTreeMap, collections::BTreeSet, path::Path, time::Instant};

use thousands::Separable;

use crate::{
    common::{median, trace_rss_now, GenomeRelease, Locus},
    err::DataError,
    table::Table,
};

use self::input::CoverageEntry;

/// Number of depth thresholds.
pub const NUM_THRESHOLDS: usize = 9;

/// Raw depth thresholds of the `over_<t>` input columns; reported at half.
pub const DEPTH_THRESHOLDS: [f64; NUM_THRESHOLDS] =
    [1.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 50.0, 100.0];

/// Key of the aggregate over all platforms.
pub const ALL_PLATFORMS: &str = "all";

/// Name of the column for `threshold`, e.g., `over_10.0`.
pub fn threshold_column(threshold: f64) -> String {
    format!("over_{:?}", threshold)
}

/// The cohorts with coverage data.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    enum_map::Enum,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Cohort {
    Exomes,
    Genomes,
}

/// Inferred sex of a column group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl Sex {
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("male") {
            Sex::Male
        } else if label.eq_ignore_ascii_case("female") {
            Sex::Female
        } else {
            Sex::Unknown
        }
    }
}

/// Haploid-adjusted coverage statistics of a set of column groups at a locus.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CoverageStats {
    /// Adjusted mean depth.
    pub mean: Option<f64>,
    /// Adjusted median depth.
    pub median: Option<f64>,
    /// Fraction of samples over `DEPTH_THRESHOLDS[k] / 2`; `None` if it cannot
    /// be computed from the input.
    pub over: [Option<f64>; NUM_THRESHOLDS],
}

/// `num / den`, `None` for an empty denominator.
fn ratio(num: f64, den: f64) -> Option<f64> {
    if den > 0.0 {
        Some(num / den)
    } else {
        None
    }
}

impl CoverageStats {
    /// Aggregate `entries` at a locus.
    ///
    /// `diploid` is set on autosomes and in the PARs; `half_available` tells
    /// for which thresholds the input has the half-threshold column that male
    /// column groups need outside of them.
    pub fn aggregate(
        entries: &[&CoverageEntry],
        diploid: bool,
        half_available: &[bool; NUM_THRESHOLDS],
    ) -> Self {
        let haploid = |entry: &CoverageEntry| !diploid && entry.sex == Sex::Male;
        let scale = |entry: &CoverageEntry| if haploid(entry) { 1.0 } else { 0.5 };
        let total_n = entries.iter().map(|e| e.n as f64).sum::<f64>();

        let mean = ratio(
            entries
                .iter()
                .copied()
                .filter_map(|e| e.mean.map(|mean| scale(e) * mean * e.n as f64))
                .sum::<f64>(),
            total_n,
        );
        let median = median(
            &entries
                .iter()
                .copied()
                .filter_map(|e| e.median.map(|median| scale(e) * median))
                .collect::<Vec<_>>(),
        );

        let mut over = [None; NUM_THRESHOLDS];
        for (k, over_k) in over.iter_mut().enumerate() {
            if !diploid && !half_available[k] {
                continue;
            }
            let count = entries
                .iter()
                .copied()
                .filter_map(|e| if haploid(e) { e.over_half[k] } else { e.over[k] })
                .sum::<f64>();
            *over_k = ratio(count, total_n);
        }

        Self { mean, median, over }
    }

    /// Fraction of samples over the reported `threshold` (half of the raw one).
    pub fn over_at(&self, threshold: f64) -> Option<f64> {
        DEPTH_THRESHOLDS
            .iter()
            .position(|raw| raw / 2.0 == threshold)
            .and_then(|k| self.over[k])
    }
}

/// Coverage of one cohort at a locus: per platform and over all platforms.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CohortCoverage {
    /// Aggregate over all column groups.
    pub all: CoverageStats,
    /// Aggregate per platform.
    pub platforms: BTreeMap<String, CoverageStats>,
}

impl CohortCoverage {
    /// Statistics for `platform`, `ALL_PLATFORMS` selects the overall aggregate.
    pub fn get(&self, platform: &str) -> Option<&CoverageStats> {
        if platform == ALL_PLATFORMS {
            Some(&self.all)
        } else {
            self.platforms.get(platform)
        }
    }
}

/// Aggregate all `entries` of one locus, per platform and overall.
pub fn aggregate_locus(
    locus: &Locus,
    entries: &[CoverageEntry],
    platforms: &[String],
    genome_release: GenomeRelease,
    half_available: &[bool; NUM_THRESHOLDS],
) -> CohortCoverage {
    let diploid = genome_release.in_autosome_or_par(locus);
    let all = entries.iter().collect::<Vec<_>>();
    CohortCoverage {
        platforms: platforms
            .iter()
            .map(|platform| {
                let selected = all
                    .iter()
                    .copied()
                    .filter(|e| &e.platform == platform)
                    .collect::<Vec<_>>();
                (
                    platform.clone(),
                    CoverageStats::aggregate(&selected, diploid, half_available),
                )
            })
            .collect(),
        all: CoverageStats::aggregate(&all, diploid, half_available),
    }
}

/// Globals of a cohort coverage table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CohortGlobals {
    pub cohort: Cohort,
    /// The platforms seen in the input, sorted.
    pub platforms: Vec<String>,
}

/// Aggregated coverage of a cohort at one locus.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LocusCoverage {
    pub locus: Locus,
    pub coverage: CohortCoverage,
}

/// Per-locus coverage table of one cohort.
pub type CohortCoverageTable = Table<CohortGlobals, LocusCoverage>;

/// Aggregate parsed coverage input of `cohort`.
pub fn aggregate_input(
    cohort: Cohort,
    input: input::CoverageInput,
    genome_release: GenomeRelease,
) -> Result<CohortCoverageTable, anyhow::Error> {
    let platforms = input
        .entries
        .iter()
        .map(|e| e.platform.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    if platforms.iter().any(|p| p == ALL_PLATFORMS) {
        return Err(DataError::ReservedPlatform(ALL_PLATFORMS.to_string()).into());
    }
    tracing::debug!("  platforms of {}: {:?}", cohort, &platforms);

    let half_available = input.schema.half_available();
    let globals = CohortGlobals { cohort, platforms };
    let platforms = globals.platforms.clone();
    Table::new(globals, input.entries).group_by(
        |entry| entry.locus,
        |locus, entries| {
            Ok(LocusCoverage {
                locus: *locus,
                coverage: aggregate_locus(
                    locus,
                    &entries,
                    &platforms,
                    genome_release,
                    &half_available,
                ),
            })
        },
    )
}

/// Load and aggregate the coverage table of `cohort` at `path`.
pub fn load<P>(
    cohort: Cohort,
    path: P,
    genome_release: GenomeRelease,
) -> Result<CohortCoverageTable, anyhow::Error>
where
    P: AsRef<Path>,
{
    tracing::info!("Loading {} coverage from {:?} ...", cohort, path.as_ref());
    let before_loading = Instant::now();
    let input = input::read_entries(path.as_ref(), genome_release)?;
    tracing::debug!(
        "  read {} rows, dropped {} on unsupported contigs",
        input.entries.len().separate_with_commas(),
        input.dropped.separate_with_commas()
    );
    let table = aggregate_input(cohort, input, genome_release)?;
    tracing::info!(
        "... done aggregating {} coverage at {} loci in {:?}",
        cohort,
        table.len().separate_with_commas(),
        before_loading.elapsed()
    );
    trace_rss_now();

    Ok(table)
}

//! Common functionality.

use biocommons_bioutils::assemblies::{Assembly, ASSEMBLY_INFOS};
use bytesize::ByteSize;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

pub mod io;
pub mod locus;

pub use locus::{Contig, Locus};

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Helper to print the current memory resident set size via `tracing`.
pub fn trace_rss_now() {
    let rss = procfs::process::Process::myself()
        .and_then(|me| me.stat())
        .map(|stat| stat.rss * procfs::page_size());
    match rss {
        Ok(rss) => tracing::debug!("RSS now: {}", ByteSize::b(rss)),
        Err(e) => tracing::debug!("could not determine RSS: {}", e),
    }
}

/// Definition of canonical chromosome names, in reference order.
pub const CHROMS: &[&str] = &[
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y", "MT",
];

/// Pseudo-autosomal regions on chrX/chrY for GRCh37 (1-based, inclusive).
const PAR_X_37: &[(u32, u32)] = &[(60001, 2699520), (154931044, 155260560)];
const PAR_Y_37: &[(u32, u32)] = &[(10001, 2649520), (59034050, 59363566)];
/// Pseudo-autosomal regions on chrX/chrY for GRCh38 (1-based, inclusive).
const PAR_X_38: &[(u32, u32)] = &[(10001, 2781479), (155701383, 156030895)];
const PAR_Y_38: &[(u32, u32)] = &[(10001, 2781479), (56887903, 57217415)];

/// Select the genome release to use.
#[derive(
    clap::ValueEnum,
    Clone,
    Copy,
    Debug,
    Default,
    strum::Display,
    PartialEq,
    Eq,
    enum_map::Enum,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GenomeRelease {
    /// GRCh37 / hg19
    #[default]
    #[strum(serialize = "grch37")]
    Grch37,
    /// GRCh38 / hg38
    #[strum(serialize = "grch38")]
    Grch38,
}

impl GenomeRelease {
    pub fn name(&self) -> String {
        match self {
            GenomeRelease::Grch37 => String::from("GRCh37"),
            GenomeRelease::Grch38 => String::from("GRCh38"),
        }
    }

    /// Length of `contig` in this release, `None` if the assembly lacks it.
    pub fn contig_length(&self, contig: Contig) -> Option<u32> {
        CONTIG_LENGTHS[*self][contig.index()]
    }

    /// Name of `contig` as used by this release.
    pub fn contig_name(&self, contig: Contig) -> String {
        match (self, contig) {
            (GenomeRelease::Grch37, _) => contig.to_string(),
            (GenomeRelease::Grch38, Contig::MT) => String::from("chrM"),
            (GenomeRelease::Grch38, _) => format!("chr{}", contig),
        }
    }

    /// Build a locus from a contig name and 1-based position.
    ///
    /// Returns `None` if the contig is not part of the release or the
    /// position lies outside of the contig.
    pub fn locus(&self, contig_name: &str, position: u32) -> Option<Locus> {
        let contig = Contig::from_name(contig_name)?;
        if position == 0 || position > self.contig_length(contig)? {
            None
        } else {
            Some(Locus { contig, position })
        }
    }

    /// Pseudo-autosomal regions on `contig` (empty for all but X and Y).
    pub fn par_regions(&self, contig: Contig) -> &'static [(u32, u32)] {
        match (self, contig) {
            (GenomeRelease::Grch37, Contig::X) => PAR_X_37,
            (GenomeRelease::Grch37, Contig::Y) => PAR_Y_37,
            (GenomeRelease::Grch38, Contig::X) => PAR_X_38,
            (GenomeRelease::Grch38, Contig::Y) => PAR_Y_38,
            _ => &[],
        }
    }

    /// Whether `locus` is on an autosome or in a pseudo-autosomal region.
    ///
    /// The mitochondrion is neither.
    pub fn in_autosome_or_par(&self, locus: &Locus) -> bool {
        locus.contig.is_autosome()
            || self
                .par_regions(locus.contig)
                .iter()
                .any(|(start, end)| (*start..=*end).contains(&locus.position))
    }
}

impl From<GenomeRelease> for Assembly {
    fn from(val: GenomeRelease) -> Self {
        match val {
            GenomeRelease::Grch37 => Assembly::Grch37p10,
            GenomeRelease::Grch38 => Assembly::Grch38,
        }
    }
}

/// Lengths of the canonical contigs of `assembly`, in the order of `CHROMS`.
fn canonical_contig_lengths(assembly: Assembly) -> Vec<Option<u32>> {
    let mut result = vec![None; CHROMS.len()];
    for sequence in &ASSEMBLY_INFOS[assembly].sequences {
        if let Some(contig) = Contig::from_name(&sequence.name) {
            result[contig.index()].get_or_insert(sequence.length as u32);
        }
    }
    result
}

lazy_static::lazy_static! {
    /// Canonical contig lengths per release.
    static ref CONTIG_LENGTHS: enum_map::EnumMap<GenomeRelease, Vec<Option<u32>>> =
        enum_map::EnumMap::from_fn(|release: GenomeRelease| {
            canonical_contig_lengths(release.into())
        });
}

impl std::str::FromStr for GenomeRelease {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        if s.starts_with("grch37") {
            Ok(GenomeRelease::Grch37)
        } else if s.starts_with("grch38") {
            Ok(GenomeRelease::Grch38)
        } else {
            Err(anyhow::anyhow!("Unknown genome release: {}", s))
        }
    }
}

/// Median of `values`, the mean of the two middle values for even counts.
///
/// Non-finite values are ignored; returns `None` for empty input.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut values = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect::<Vec<_>>();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Arithmetic mean of `values`, `None` for empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

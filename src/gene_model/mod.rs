//! Construction of the per-base gene model from a GTF file.
//!
//! The result has one row per (locus, gene) for every base covered by a CDS
//! feature of a basic, protein-coding transcript.

pub mod gtf;

use std::{path::Path, time::Instant, time::SystemTime};

use thousands::Separable;

use crate::{
    common::{trace_rss_now, GenomeRelease, Locus},
    err::DataError,
    table::{checkpoint::CheckpointStore, Table},
};

/// Name of the gene model checkpoint.
pub const CHECKPOINT_NAME: &str = "gene_by_base";

/// One base of a gene's CDS.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GeneBase {
    /// The base.
    pub locus: Locus,
    /// Gene identifier, e.g., ENSEMBL gene ID.
    pub gene_id: String,
    /// Gene symbol.
    pub gene_name: String,
}

/// Globals of the gene model table; identify the inputs it was built from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GeneModelGlobals {
    /// Path to the GTF file.
    pub path_gtf: String,
    /// Size of the GTF file in bytes.
    pub gtf_size: u64,
    /// Modification time of the GTF file, if the platform reports it.
    pub gtf_modified: Option<SystemTime>,
    /// Genome release of the loci.
    pub genome_release: GenomeRelease,
}

impl GeneModelGlobals {
    /// Identify the GTF file at `path_gtf` by path, size, and modification time.
    pub fn from_gtf<P>(path_gtf: P, genome_release: GenomeRelease) -> Result<Self, anyhow::Error>
    where
        P: AsRef<Path>,
    {
        let metadata = std::fs::metadata(path_gtf.as_ref()).map_err(|e| {
            anyhow::anyhow!("could not access GTF file {:?}: {}", path_gtf.as_ref(), e)
        })?;
        Ok(Self {
            path_gtf: path_gtf.as_ref().display().to_string(),
            gtf_size: metadata.len(),
            gtf_modified: metadata.modified().ok(),
            genome_release,
        })
    }
}

/// The per-base gene model table.
pub type GeneModel = Table<GeneModelGlobals, GeneBase>;

/// A CDS interval of a gene, validated from a GTF record.
#[derive(Debug, Clone)]
struct CdsInterval {
    seqname: String,
    start: u32,
    end: u32,
    gene_id: String,
    gene_name: String,
}

impl TryFrom<gtf::Record> for CdsInterval {
    type Error = DataError;

    fn try_from(record: gtf::Record) -> Result<Self, Self::Error> {
        let attribute = |key: &str| {
            record
                .attribute(key)
                .map(str::to_string)
                .ok_or_else(|| DataError::MissingAttribute {
                    attribute: key.to_string(),
                    line: record.line,
                })
        };
        Ok(Self {
            gene_id: attribute("gene_id")?,
            gene_name: attribute("gene_name")?,
            seqname: record.seqname,
            start: record.start,
            end: record.end,
        })
    }
}

/// Whether `record` is a CDS of a basic, protein-coding transcript.
pub fn is_basic_protein_coding_cds(record: &gtf::Record) -> bool {
    record.feature == "CDS"
        && record.attribute("transcript_type") == Some("protein_coding")
        && record.has_attribute_value("tag", "basic")
}

/// Build the gene model from the records of a GTF file.
///
/// Bases on contigs not in `genome_release` (or beyond their end) are dropped.
pub fn build_from_records(
    records: Vec<gtf::Record>,
    globals: GeneModelGlobals,
) -> Result<GeneModel, anyhow::Error> {
    let genome_release = globals.genome_release;
    let intervals = records
        .into_iter()
        .filter(is_basic_protein_coding_cds)
        .map(CdsInterval::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(
        "  {} CDS records of basic protein-coding transcripts",
        intervals.len().separate_with_commas()
    );

    let mut dropped = 0usize;
    let table = Table::new(globals, intervals)
        .explode(|interval| {
            let bases = (interval.start..=interval.end)
                .filter_map(|position| genome_release.locus(&interval.seqname, position))
                .map(|locus| GeneBase {
                    locus,
                    gene_id: interval.gene_id.clone(),
                    gene_name: interval.gene_name.clone(),
                })
                .collect::<Vec<_>>();
            dropped += (interval.start..=interval.end).count() - bases.len();
            bases
        })
        .distinct_by_key(|base| (base.locus, base.gene_id.clone()));
    if dropped > 0 {
        tracing::debug!(
            "  dropped {} bases on contigs not in {}",
            dropped.separate_with_commas(),
            genome_release.name()
        );
    }

    Ok(table)
}

/// Build the gene model from the GTF file at `path_gtf`.
pub fn build<P>(path_gtf: P, genome_release: GenomeRelease) -> Result<GeneModel, anyhow::Error>
where
    P: AsRef<Path>,
{
    let globals = GeneModelGlobals::from_gtf(path_gtf.as_ref(), genome_release)?;
    let records = gtf::read_records(path_gtf.as_ref())?;
    tracing::debug!(
        "  read {} GTF records",
        records.len().separate_with_commas()
    );
    build_from_records(records, globals)
}

/// Load the gene model checkpoint if built from the same GTF file, else (re)build it.
pub fn load_or_build<S, P>(
    store: &S,
    path_gtf: P,
    genome_release: GenomeRelease,
) -> Result<GeneModel, anyhow::Error>
where
    S: CheckpointStore,
    P: AsRef<Path>,
{
    let expected = GeneModelGlobals::from_gtf(path_gtf.as_ref(), genome_release)?;
    if store.exists(CHECKPOINT_NAME) {
        match store.read_globals::<GeneModelGlobals>(CHECKPOINT_NAME) {
            Ok(globals) if globals == expected => {
                tracing::info!("Loading gene model from checkpoint ...");
                let gene_model = store.read(CHECKPOINT_NAME)?;
                tracing::info!("... done loading gene model");
                return Ok(gene_model);
            }
            Ok(globals) => tracing::info!(
                "gene model checkpoint was built from {:?}, rebuilding",
                &globals
            ),
            Err(e) => tracing::warn!("unreadable gene model checkpoint, rebuilding: {}", e),
        }
    }

    tracing::info!("Building gene model from {:?} ...", path_gtf.as_ref());
    let before_building = Instant::now();
    let gene_model = build(path_gtf, genome_release)?;
    store.write(CHECKPOINT_NAME, &gene_model)?;
    tracing::info!(
        "... done building gene model with {} bases in {:?}",
        gene_model.len().separate_with_commas(),
        before_building.elapsed()
    );
    trace_rss_now();

    Ok(gene_model)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{gtf, GeneModelGlobals};
    use crate::{
        common::GenomeRelease,
        table::checkpoint::{CheckpointStore, FsCheckpointStore},
    };

    const PATH_GTF: &str = "tests/data/gencode.small.gtf";

    fn cds(seqname: &str, start: u32, end: u32, gene_id: &str) -> gtf::Record {
        gtf::Record {
            line: 1,
            seqname: seqname.to_string(),
            feature: String::from("CDS"),
            start,
            end,
            attributes: gtf::parse_attributes(&format!(
                r#"gene_id "{gene_id}"; gene_name "N{gene_id}"; {}"#,
                r#"transcript_type "protein_coding"; tag "basic";"#
            )),
        }
    }

    fn globals() -> GeneModelGlobals {
        GeneModelGlobals {
            path_gtf: String::from("test.gtf"),
            gtf_size: 0,
            gtf_modified: None,
            genome_release: GenomeRelease::Grch37,
        }
    }

    #[rstest::rstest]
    #[case(1, 1)]
    #[case(100, 199)]
    #[case(1000, 1000)]
    fn explode_yields_interval_length(
        #[case] start: u32,
        #[case] end: u32,
    ) -> Result<(), anyhow::Error> {
        let model = super::build_from_records(vec![cds("1", start, end, "G1")], globals())?;

        assert_eq!((end - start + 1) as usize, model.len());
        assert!(model
            .rows
            .iter()
            .all(|b| b.gene_id == "G1" && b.gene_name == "NG1"));
        assert_eq!(start, model.rows[0].locus.position);
        assert_eq!(end, model.rows[model.len() - 1].locus.position);

        Ok(())
    }

    #[test]
    fn overlapping_cds_of_same_gene_collapse() -> Result<(), anyhow::Error> {
        let model = super::build_from_records(
            vec![cds("1", 10, 20, "G1"), cds("chr1", 15, 25, "G1")],
            globals(),
        )?;

        assert_eq!(16, model.len());

        Ok(())
    }

    #[test]
    fn overlapping_cds_of_different_genes_kept() -> Result<(), anyhow::Error> {
        let model = super::build_from_records(
            vec![cds("1", 10, 10, "G1"), cds("1", 10, 10, "G2")],
            globals(),
        )?;

        assert_eq!(
            vec!["G1", "G2"],
            model
                .rows
                .iter()
                .map(|b| b.gene_id.as_str())
                .collect::<Vec<_>>()
        );
        assert_eq!(model.rows[0].locus, model.rows[1].locus);

        Ok(())
    }

    #[test]
    fn invalid_contigs_and_positions_dropped() -> Result<(), anyhow::Error> {
        let model = super::build_from_records(
            vec![
                cds("GL000192.1", 1, 10, "G1"),
                // chrMT of GRCh37 has 16569 bases
                cds("MT", 16560, 16579, "G2"),
            ],
            globals(),
        )?;

        assert_eq!(10, model.len());
        assert!(model.rows.iter().all(|b| b.gene_id == "G2"));

        Ok(())
    }

    #[test]
    fn missing_gene_name_is_error() {
        let mut record = cds("1", 1, 2, "G1");
        record.attributes = gtf::parse_attributes(
            r#"gene_id "G1"; transcript_type "protein_coding"; tag "basic";"#,
        );

        assert!(super::build_from_records(vec![record], globals()).is_err());
    }

    #[test]
    fn build_from_gtf() -> Result<(), anyhow::Error> {
        let model = super::build(PATH_GTF, GenomeRelease::Grch37)?;

        let count = |gene_id: &str| model.rows.iter().filter(|b| b.gene_id == gene_id).count();
        assert_eq!(12, count("G1"));
        assert_eq!(2, count("G2"));
        assert_eq!(0, count("G3"));
        assert_eq!(0, count("G4"));
        assert_eq!(10, count("G5"));
        assert_eq!(3, count("G6"));
        assert_eq!(27, model.len());

        Ok(())
    }

    #[test]
    fn load_or_build_memoizes() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = FsCheckpointStore::new(tmp_dir.to_path_buf())?;

        let first = super::load_or_build(&store, PATH_GTF, GenomeRelease::Grch37)?;
        let bytes_first = std::fs::read(store.path(super::CHECKPOINT_NAME))?;
        let second = super::load_or_build(&store, PATH_GTF, GenomeRelease::Grch37)?;
        let bytes_second = std::fs::read(store.path(super::CHECKPOINT_NAME))?;

        assert_eq!(first, second);
        assert_eq!(bytes_first, bytes_second);

        // Different release, different checkpoint.
        super::load_or_build(&store, PATH_GTF, GenomeRelease::Grch38)?;
        let globals: GeneModelGlobals = store.read_globals(super::CHECKPOINT_NAME)?;
        assert_eq!(GenomeRelease::Grch38, globals.genome_release);

        Ok(())
    }

    #[test]
    fn load_or_build_rebuilds_for_changed_gtf() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = FsCheckpointStore::new(tmp_dir.join("checkpoints"))?;
        let path_gtf = tmp_dir.join("genes.gtf");
        std::fs::copy(PATH_GTF, &path_gtf)?;

        let first = super::load_or_build(&store, &path_gtf, GenomeRelease::Grch37)?;
        assert_eq!(27, first.len());

        // Same path, G1 records removed.
        let content = std::fs::read_to_string(PATH_GTF)?
            .lines()
            .filter(|line| !line.contains(r#"gene_id "G1""#))
            .map(|line| format!("{}\n", line))
            .collect::<String>();
        std::fs::write(&path_gtf, content)?;

        let second = super::load_or_build(&store, &path_gtf, GenomeRelease::Grch37)?;
        assert_eq!(15, second.len());
        assert!(second.rows.iter().all(|b| b.gene_id != "G1"));
        let globals: GeneModelGlobals = store.read_globals(super::CHECKPOINT_NAME)?;
        assert_eq!(std::fs::metadata(&path_gtf)?.len(), globals.gtf_size);

        Ok(())
    }

    #[test]
    fn load_or_build_rebuilds_unreadable_checkpoint() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = FsCheckpointStore::new(tmp_dir.to_path_buf())?;
        std::fs::write(store.path(super::CHECKPOINT_NAME), b"not a checkpoint")?;
        assert!(store.exists(super::CHECKPOINT_NAME));

        let model = super::load_or_build(&store, PATH_GTF, GenomeRelease::Grch37)?;
        assert_eq!(27, model.len());

        let stored: super::GeneModel = store.read(super::CHECKPOINT_NAME)?;
        assert_eq!(model, stored);

        Ok(())
    }
}

//! Genome mappability track, e.g., the UCSC Duke 35bp uniqueness track.

use std::{path::Path, time::Instant};

use bio::data_structures::interval_tree::ArrayBackedIntervalTree;
use thousands::Separable;

use crate::{
    common::{io::open_read_maybe_gz, trace_rss_now, Contig, Locus, CHROMS},
    err::DataError,
};

/// Alias for the interval tree that we use.
type IntervalTree = ArrayBackedIntervalTree<u32, u32>;

/// One scored interval.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MappabilityRecord {
    /// 0-based begin position.
    pub begin: u32,
    /// End position.
    pub end: u32,
    /// Mappability score.
    pub score: f64,
}

/// Mappability scores, stored by chromosome.
#[derive(Debug, Default)]
pub struct MappabilityTrack {
    /// Records, stored by chromosome.
    pub records: Vec<Vec<MappabilityRecord>>,
    /// Interval trees, stored by chromosome.
    pub trees: Vec<IntervalTree>,
}

impl MappabilityTrack {
    /// Create an empty track.
    pub fn new() -> Self {
        Self {
            records: CHROMS.iter().map(|_| Vec::new()).collect(),
            trees: CHROMS.iter().map(|_| IntervalTree::new()).collect(),
        }
    }

    /// Add a record on `contig`; `index()` must be called before lookups.
    pub fn insert(&mut self, contig: Contig, record: MappabilityRecord) {
        let idx = contig.index();
        if record.begin < record.end {
            self.trees[idx].insert(record.begin..record.end, self.records[idx].len() as u32);
            self.records[idx].push(record);
        }
    }

    /// Build the interval tree indices.
    pub fn index(&mut self) {
        self.trees.iter_mut().for_each(|tree| tree.index());
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Score of the interval covering `locus`; the leftmost one if several do.
    pub fn score(&self, locus: &Locus) -> Option<f64> {
        let idx = locus.contig.index();
        let begin = locus.position.saturating_sub(1);
        self.trees[idx]
            .find(begin..(begin + 1))
            .iter()
            .map(|e| &self.records[idx][*e.data() as usize])
            .min_by_key(|record| (record.begin, record.end))
            .map(|record| record.score)
    }
}

/// Module with code supporting the parsing.
mod input {
    use serde::Deserialize;

    /// Interval columns of the track; the score column is located by name.
    #[derive(Debug, Deserialize)]
    pub struct Record {
        /// Chromosome name
        pub contig: String,
        /// 0-based begin position
        pub start: u32,
        /// end position
        pub end: u32,
    }
}

/// Load the mappability track at `path`, taking scores from column `field`.
#[tracing::instrument]
pub fn load(path: &Path, field: &str) -> Result<MappabilityTrack, anyhow::Error> {
    tracing::info!("Loading mappability from {:?} ...", path);
    let before_loading = Instant::now();

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .from_reader(open_read_maybe_gz(path)?);
    let headers = reader.headers()?.clone();
    let score_idx = headers
        .iter()
        .position(|column| column == field)
        .ok_or_else(|| DataError::MissingColumn {
            path: path.to_path_buf(),
            column: field.to_string(),
        })?;

    let mut result = MappabilityTrack::new();
    let mut dropped = 0usize;
    for record in reader.records() {
        let record = record?;
        let interval: input::Record = record.deserialize(Some(&headers))?;
        let raw_score = record.get(score_idx).unwrap_or_default().trim();
        if raw_score.is_empty() || raw_score == "NA" {
            continue;
        }
        let score = raw_score
            .parse::<f64>()
            .map_err(|_| DataError::InvalidValue {
                path: path.to_path_buf(),
                line: record.position().map(|p| p.line()).unwrap_or_default(),
                column: field.to_string(),
                value: raw_score.to_string(),
            })?;
        match Contig::from_name(&interval.contig) {
            Some(contig) => result.insert(
                contig,
                MappabilityRecord {
                    begin: interval.start,
                    end: interval.end,
                    score,
                },
            ),
            None => dropped += 1,
        }
    }
    result.index();

    tracing::info!(
        "... done loading {} mappability intervals ({} on unsupported contigs) in {:?}",
        result.len().separate_with_commas(),
        dropped.separate_with_commas(),
        before_loading.elapsed()
    );
    trace_rss_now();

    Ok(result)
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::{MappabilityRecord, MappabilityTrack};
    use crate::common::{Contig, Locus};

    fn locus(contig: &str, position: u32) -> Locus {
        Locus {
            contig: Contig::from_name(contig).unwrap(),
            position,
        }
    }

    #[test]
    fn single_base_intervals() {
        let mut track = MappabilityTrack::new();
        track.insert(
            Contig::X,
            MappabilityRecord {
                begin: 9,
                end: 10,
                score: 0.5,
            },
        );
        track.index();

        assert_eq!(Some(0.5), track.score(&locus("X", 10)));
        assert_eq!(None, track.score(&locus("X", 9)));
        assert_eq!(None, track.score(&locus("X", 11)));
        assert_eq!(None, track.score(&locus("1", 10)));
    }

    #[rstest::rstest]
    #[case("chr1", 100, None)]
    #[case("chr1", 101, Some(1.0))]
    #[case("chr1", 105, Some(1.0))]
    #[case("chr1", 106, Some(0.5))]
    #[case("chr1", 109, Some(0.5))]
    #[case("chr1", 111, Some(0.25))]
    #[case("X", 2699520, Some(0.75))]
    #[case("Y", 2699520, None)]
    fn load_fixture(
        #[case] contig: &str,
        #[case] position: u32,
        #[case] expected: Option<f64>,
    ) -> Result<(), anyhow::Error> {
        let track = super::load(Path::new("tests/data/mappability.tsv"), "duke_35_map")?;

        assert_eq!(4, track.len());
        assert_eq!(expected, track.score(&locus(contig, position)));

        Ok(())
    }

    #[test]
    fn load_missing_field() {
        assert!(super::load(Path::new("tests/data/mappability.tsv"), "other").is_err());
    }
}

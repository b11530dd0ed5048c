//! Reading of grouped coverage tables.
//!
//! The input is a tab-separated file with a header line and one row per locus
//! and column group (platform and inferred sex).  Columns are located by name;
//! `over_<t>` columns hold the number of samples with depth over `t`.

use std::path::{Path, PathBuf};

use crate::{
    common::{GenomeRelease, Locus},
    err::DataError,
};

use super::{threshold_column, Sex, DEPTH_THRESHOLDS, NUM_THRESHOLDS};

/// One row of a grouped coverage table.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageEntry {
    pub locus: Locus,
    /// Sequencing platform (or other subgroup) of the column group.
    pub platform: String,
    /// Inferred sex of the column group.
    pub sex: Sex,
    /// Number of samples.
    pub n: u64,
    /// Mean depth.
    pub mean: Option<f64>,
    /// Median depth.
    pub median: Option<f64>,
    /// Samples over each of `DEPTH_THRESHOLDS`.
    pub over: [Option<f64>; NUM_THRESHOLDS],
    /// Samples over half of each of `DEPTH_THRESHOLDS`; always `None` where
    /// `Schema::half_available` is `false`.
    pub over_half: [Option<f64>; NUM_THRESHOLDS],
}

/// Column positions of a coverage table.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    contig: usize,
    position: usize,
    platform: usize,
    sex: usize,
    n: usize,
    mean: usize,
    median: usize,
    over: [usize; NUM_THRESHOLDS],
    over_half: [Option<usize>; NUM_THRESHOLDS],
}

impl Schema {
    /// Locate the columns in `header`.
    pub fn from_header(header: &csv::StringRecord, path: &Path) -> Result<Self, DataError> {
        let find = |name: &str| header.iter().position(|column| column == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| DataError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
        };
        let find_over = |threshold: f64| {
            header.iter().position(|column| {
                column
                    .strip_prefix("over_")
                    .and_then(|t| t.parse::<f64>().ok())
                    == Some(threshold)
            })
        };

        let mut over = [0; NUM_THRESHOLDS];
        let mut over_half = [None; NUM_THRESHOLDS];
        for (k, threshold) in DEPTH_THRESHOLDS.iter().enumerate() {
            over[k] = find_over(*threshold).ok_or_else(|| DataError::MissingColumn {
                path: path.to_path_buf(),
                column: threshold_column(*threshold),
            })?;
            over_half[k] = find_over(threshold / 2.0);
        }

        Ok(Self {
            contig: require("contig")?,
            position: require("position")?,
            platform: require("platform")?,
            sex: require("sex")?,
            n: require("n")?,
            mean: require("mean")?,
            median: require("median")?,
            over,
            over_half,
        })
    }

    /// Whether the half-threshold column exists, for each of `DEPTH_THRESHOLDS`.
    pub fn half_available(&self) -> [bool; NUM_THRESHOLDS] {
        self.over_half.map(|column| column.is_some())
    }
}

/// Parser of the rows of one file.
struct RowParser<'a> {
    path: &'a Path,
    schema: &'a Schema,
    line: u64,
}

impl<'a> RowParser<'a> {
    fn invalid(&self, column: &str, value: &str) -> DataError {
        DataError::InvalidValue {
            path: self.path.to_path_buf(),
            line: self.line,
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    /// Parse an optional float; empty cells, `NA`, and non-finite values are missing.
    fn float(
        &self,
        record: &csv::StringRecord,
        idx: usize,
        column: &str,
    ) -> Result<Option<f64>, DataError> {
        let value = record.get(idx).unwrap_or_default().trim();
        if value.is_empty() || value == "NA" {
            return Ok(None);
        }
        value
            .parse::<f64>()
            .map(|v| Some(v).filter(|v| v.is_finite()))
            .map_err(|_| self.invalid(column, value))
    }

    fn parse(
        &self,
        record: &csv::StringRecord,
        genome_release: GenomeRelease,
    ) -> Result<Option<CoverageEntry>, DataError> {
        let get = |idx: usize| record.get(idx).unwrap_or_default().trim();

        let position = get(self.schema.position)
            .parse::<u32>()
            .map_err(|_| self.invalid("position", get(self.schema.position)))?;
        let locus = match genome_release.locus(get(self.schema.contig), position) {
            Some(locus) => locus,
            None => return Ok(None),
        };
        let n = get(self.schema.n)
            .parse::<u64>()
            .map_err(|_| self.invalid("n", get(self.schema.n)))?;

        let mut over = [None; NUM_THRESHOLDS];
        let mut over_half = [None; NUM_THRESHOLDS];
        for (k, threshold) in DEPTH_THRESHOLDS.iter().enumerate() {
            over[k] = self.float(record, self.schema.over[k], &threshold_column(*threshold))?;
            if let Some(idx) = self.schema.over_half[k] {
                over_half[k] = self.float(record, idx, &threshold_column(threshold / 2.0))?;
            }
        }

        Ok(Some(CoverageEntry {
            locus,
            platform: get(self.schema.platform).to_string(),
            sex: Sex::from_label(get(self.schema.sex)),
            n,
            mean: self.float(record, self.schema.mean, "mean")?,
            median: self.float(record, self.schema.median, "median")?,
            over,
            over_half,
        }))
    }
}

/// The parsed content of a coverage table.
#[derive(Debug, Clone)]
pub struct CoverageInput {
    pub schema: Schema,
    pub entries: Vec<CoverageEntry>,
    /// Number of rows dropped because of unsupported contigs/positions.
    pub dropped: usize,
}

/// Read the coverage table at `path`.
pub fn read_entries<P>(
    path: P,
    genome_release: GenomeRelease,
) -> Result<CoverageInput, anyhow::Error>
where
    P: AsRef<Path>,
{
    let path: PathBuf = path.as_ref().to_path_buf();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .from_reader(crate::common::io::open_read_maybe_gz(&path)?);
    let schema = Schema::from_header(reader.headers()?, &path)?;

    let mut entries = Vec::new();
    let mut dropped = 0;
    for record in reader.records() {
        let record = record?;
        let parser = RowParser {
            path: &path,
            schema: &schema,
            line: record.position().map(|p| p.line()).unwrap_or_default(),
        };
        match parser.parse(&record, genome_release)? {
            Some(entry) => entries.push(entry),
            None => dropped += 1,
        }
    }

    Ok(CoverageInput {
        schema,
        entries,
        dropped,
    })
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::Schema;
    use crate::{common::GenomeRelease, coverage::Sex, err::DataError};

    fn header(columns: &str) -> csv::StringRecord {
        csv::StringRecord::from(columns.split('\t').collect::<Vec<_>>())
    }

    const FULL: &str = "contig\tposition\tplatform\tsex\tn\tmean\tmedian\t\
        over_1.0\tover_5.0\tover_10.0\tover_15.0\tover_20.0\t\
        over_25.0\tover_30.0\tover_50.0\tover_100.0";

    #[test]
    fn schema_half_available() -> Result<(), anyhow::Error> {
        let schema = Schema::from_header(&header(FULL), Path::new("x.tsv"))?;

        // halves of 10, 20, 30, 50, 100 exist as raw thresholds
        assert_eq!(
            [false, false, true, false, true, false, true, true, true],
            schema.half_available()
        );

        Ok(())
    }

    #[test]
    fn schema_with_extra_half_column() -> Result<(), anyhow::Error> {
        let schema =
            Schema::from_header(&header(&format!("{}\tover_0.5", FULL)), Path::new("x.tsv"))?;

        assert!(schema.half_available()[0]);

        Ok(())
    }

    #[test]
    fn schema_missing_column() {
        let res = Schema::from_header(
            &header(&FULL.replace("\tover_100.0", "")),
            Path::new("x.tsv"),
        );

        assert_eq!(
            Err(DataError::MissingColumn {
                path: Path::new("x.tsv").to_path_buf(),
                column: String::from("over_100.0"),
            }),
            res
        );
    }

    #[test]
    fn read_entries() -> Result<(), anyhow::Error> {
        let input =
            super::read_entries("tests/data/exomes.coverage.tsv", GenomeRelease::Grch37)?;

        assert_eq!(1, input.dropped);
        let first = &input.entries[0];
        assert_eq!("1:101", first.locus.to_string());
        assert_eq!("illumina", first.platform);
        assert_eq!(Sex::Male, first.sex);
        assert_eq!(10, first.n);
        assert_eq!(Some(30.0), first.mean);
        assert_eq!(Some(10.0), first.over[0]);
        assert_eq!(None, first.over_half[0]);
        assert_eq!(Some(9.0), first.over_half[2]);

        Ok(())
    }

    #[test]
    fn read_entries_invalid_value() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("bad.tsv");
        std::fs::write(
            &path,
            format!(
                "{}\n1\t100\tillumina\tmale\tmany\t1\t1\t1\t1\t1\t1\t1\t1\t1\t1\t1\n",
                FULL
            ),
        )?;

        let err = super::read_entries(&path, GenomeRelease::Grch37).unwrap_err();
        assert!(err.to_string().contains("\"many\""), "{}", err);

        Ok(())
    }
}

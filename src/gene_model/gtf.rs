//! Minimal reading of GTF files.

use std::path::Path;

use multimap::MultiMap;

use crate::common::io::open_read_maybe_gz;

/// Module with code supporting the parsing.
mod input {
    use serde::Deserialize;

    /// The nine tab-separated GTF columns.
    #[derive(Debug, Deserialize)]
    pub struct Record {
        pub seqname: String,
        pub _source: String,
        pub feature: String,
        /// 1-based start position
        pub start: u32,
        /// 1-based, inclusive end position
        pub end: u32,
        pub _score: String,
        pub _strand: String,
        pub _frame: String,
        pub attribute: String,
    }
}

/// A GTF record with parsed attributes.
#[derive(Debug, Clone)]
pub struct Record {
    /// Line number in the file, for error messages.
    pub line: u64,
    /// Contig name as written in the file.
    pub seqname: String,
    /// Feature type, e.g., "CDS".
    pub feature: String,
    /// 1-based start position
    pub start: u32,
    /// 1-based, inclusive end position
    pub end: u32,
    /// Attributes; keys such as "tag" may occur more than once.
    pub attributes: MultiMap<String, String>,
}

impl Record {
    /// First value of the attribute `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }

    /// Whether the attribute `key` has `value` among its values.
    pub fn has_attribute_value(&self, key: &str, value: &str) -> bool {
        self.attributes
            .get_vec(key)
            .map(|values| values.iter().any(|v| v == value))
            .unwrap_or(false)
    }
}

/// Parse the GTF attribute column, e.g., `gene_id "G1"; tag "basic";`.
pub fn parse_attributes(raw: &str) -> MultiMap<String, String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| {
            entry.split_once(char::is_whitespace).map(|(key, value)| {
                (
                    key.to_string(),
                    value.trim().trim_matches('"').to_string(),
                )
            })
        })
        .collect()
}

/// Read all records from the GTF file at `path`.
pub fn read_records<P>(path: P) -> Result<Vec<Record>, anyhow::Error>
where
    P: AsRef<Path>,
{
    // Attribute values are double-quoted, so CSV quoting must be off.
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .quoting(false)
        .from_reader(open_read_maybe_gz(path.as_ref())?);

    let mut result = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let raw: input::Record = record.deserialize(None).map_err(|e| {
            anyhow::anyhow!("invalid GTF record in {:?}: {}", path.as_ref(), e)
        })?;
        result.push(Record {
            line,
            seqname: raw.seqname,
            feature: raw.feature,
            start: raw.start,
            end: raw.end,
            attributes: parse_attributes(&raw.attribute),
        });
    }

    Ok(result)
}

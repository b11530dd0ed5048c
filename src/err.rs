//! Domain errors for malformed inputs and data-quality violations.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("missing column {column:?} in header of {path:?}")]
    MissingColumn { path: PathBuf, column: String },
    #[error("invalid value {value:?} in column {column:?} of {path:?} (line {line})")]
    InvalidValue {
        path: PathBuf,
        line: u64,
        column: String,
        value: String,
    },
    #[error("missing attribute {attribute:?} in GTF record at line {line}")]
    MissingAttribute { attribute: String, line: u64 },
    #[error("platform name {0:?} is reserved for the aggregate over all platforms")]
    ReservedPlatform(String),
    #[error("gene {gene_id} has conflicting names {first:?} and {second:?}")]
    GeneNameConflict {
        gene_id: String,
        first: String,
        second: String,
    },
    #[error("gene {gene_id} spans multiple contigs {first} and {second}")]
    GeneContigConflict {
        gene_id: String,
        first: String,
        second: String,
    },
}

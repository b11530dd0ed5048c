//! Genomic loci on canonical contigs.

use super::CHROMS;

/// A canonical contig, stored as its index into `CHROMS`.
///
/// Ordering follows the reference convention (1..22, X, Y, MT).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct Contig(u8);

impl Contig {
    pub const X: Contig = Contig(22);
    pub const Y: Contig = Contig(23);
    pub const MT: Contig = Contig(24);

    /// Parse a contig name, with or without `chr` prefix.
    pub fn from_name(name: &str) -> Option<Self> {
        let stripped = name
            .strip_prefix("chr")
            .or_else(|| name.strip_prefix("Chr"))
            .unwrap_or(name);
        match stripped {
            "X" | "x" => Some(Contig::X),
            "Y" | "y" => Some(Contig::Y),
            "M" | "MT" | "m" | "mt" => Some(Contig::MT),
            _ => match stripped.parse::<u8>() {
                Ok(no) if (1..=22).contains(&no) && !stripped.starts_with('0') => {
                    Some(Contig(no - 1))
                }
                _ => None,
            },
        }
    }

    /// Index into `CHROMS`.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn is_autosome(&self) -> bool {
        self.0 < Contig::X.0
    }
}

impl std::fmt::Display for Contig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", CHROMS[self.index()])
    }
}

impl From<Contig> for String {
    fn from(contig: Contig) -> Self {
        contig.to_string()
    }
}

impl TryFrom<String> for Contig {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Contig::from_name(&value).ok_or_else(|| anyhow::anyhow!("invalid contig: {:?}", &value))
    }
}

/// A 1-based position on a canonical contig.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Locus {
    /// The contig.
    pub contig: Contig,
    /// 1-based position.
    pub position: u32,
}

impl std::fmt::Display for Locus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.contig, self.position)
    }
}

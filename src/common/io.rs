//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use flate2::{bufread::MultiGzDecoder, write::GzEncoder, Compression};

/// Whether `path` looks like a gzip (or bgzip) compressed file.
fn is_gz<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    matches!(
        path.as_ref().extension().and_then(|s| s.to_str()),
        Some("gz") | Some("bgz")
    )
}

/// Transparently open a file with gzip decoder.
///
/// Multi-member archives are read completely, so BGZF files work as well.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())
        .map_err(|e| anyhow::anyhow!("could not open {:?} for reading: {}", path.as_ref(), e))?;
    if is_gz(&path) {
        tracing::trace!("Opening {:?} as gzip for reading", path.as_ref());
        let decoder = MultiGzDecoder::new(BufReader::new(file));
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("Opening {:?} as plain text for reading", path.as_ref());
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Wrap `file` with a gzip encoder if `path` asks for it.
pub fn wrap_write_maybe_gz<P>(file: File, path: P) -> Box<dyn Write>
where
    P: AsRef<Path>,
{
    let bufwriter = BufWriter::new(file);
    if is_gz(&path) {
        tracing::trace!("Opening {:?} as gzip for writing", path.as_ref());
        Box::new(GzEncoder::new(bufwriter, Compression::default()))
    } else {
        tracing::trace!("Opening {:?} as plain text for writing", path.as_ref());
        Box::new(bufwriter)
    }
}

/// Transparently open a file with gzip encoder.
pub fn open_write_maybe_gz<P>(path: P) -> Result<Box<dyn Write>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())
        .map_err(|e| anyhow::anyhow!("could not open {:?} for writing: {}", path.as_ref(), e))?;
    Ok(wrap_write_maybe_gz(file, path))
}

//! Durable checkpoints of `Table` values.

use std::{
    io::{BufRead, BufWriter, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use flate2::{write::GzEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};
use thousands::Separable;

use super::Table;
use crate::common::io::open_read_maybe_gz;

/// Persistent storage of named tables.
///
/// A write replaces any previous table of the same name atomically.
pub trait CheckpointStore {
    /// Whether a table with the given name exists.
    fn exists(&self, name: &str) -> bool;

    /// Write `table` under `name`, overwriting an existing one.
    fn write<G, R>(&self, name: &str, table: &Table<G, R>) -> Result<(), anyhow::Error>
    where
        G: Serialize,
        R: Serialize;

    /// Read the table stored under `name`.
    fn read<G, R>(&self, name: &str) -> Result<Table<G, R>, anyhow::Error>
    where
        G: DeserializeOwned,
        R: DeserializeOwned;

    /// Read only the globals of the table stored under `name`.
    fn read_globals<G>(&self, name: &str) -> Result<G, anyhow::Error>
    where
        G: DeserializeOwned;
}

/// Stores tables as gzip-compressed JSON lines in a directory.
///
/// The first line holds the globals, each following line one row.
#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    root: PathBuf,
}

impl FsCheckpointStore {
    /// Open the store at `root`, creating the directory if necessary.
    pub fn new<P>(root: P) -> Result<Self, anyhow::Error>
    where
        P: AsRef<Path>,
    {
        std::fs::create_dir_all(root.as_ref()).map_err(|e| {
            anyhow::anyhow!(
                "could not create checkpoint directory {:?}: {}",
                root.as_ref(),
                e
            )
        })?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    /// Path of the file backing the table `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.jsonl.gz", name))
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn write<G, R>(&self, name: &str, table: &Table<G, R>) -> Result<(), anyhow::Error>
    where
        G: Serialize,
        R: Serialize,
    {
        let path = self.path(name);
        tracing::debug!("writing checkpoint {:?}", &path);
        let before_writing = Instant::now();

        // Write next to the target and rename, so readers never see a partial file.
        let tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".tmp")
            .tempfile_in(&self.root)?;
        {
            let mut encoder = GzEncoder::new(BufWriter::new(tmp.as_file()), Compression::default());
            serde_json::to_writer(&mut encoder, &table.globals)?;
            encoder.write_all(b"\n")?;
            for row in &table.rows {
                serde_json::to_writer(&mut encoder, row)?;
                encoder.write_all(b"\n")?;
            }
            encoder.finish()?.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&path)
            .map_err(|e| anyhow::anyhow!("could not persist checkpoint {:?}: {}", &path, e))?;

        tracing::debug!(
            "wrote {} rows to {:?} in {:?}",
            table.rows.len().separate_with_commas(),
            &path,
            before_writing.elapsed()
        );
        Ok(())
    }

    fn read<G, R>(&self, name: &str) -> Result<Table<G, R>, anyhow::Error>
    where
        G: DeserializeOwned,
        R: DeserializeOwned,
    {
        let path = self.path(name);
        tracing::debug!("reading checkpoint {:?}", &path);
        let before_reading = Instant::now();

        let mut lines = open_read_maybe_gz(&path)?.lines();
        let globals = match lines.next() {
            Some(line) => serde_json::from_str(&line?)
                .map_err(|e| anyhow::anyhow!("invalid globals in {:?}: {}", &path, e))?,
            None => anyhow::bail!("checkpoint {:?} is empty", &path),
        };
        let mut rows = Vec::new();
        for (i, line) in lines.enumerate() {
            let line = line?;
            rows.push(serde_json::from_str(&line).map_err(|e| {
                anyhow::anyhow!("invalid row in {:?} (line {}): {}", &path, i + 2, e)
            })?);
        }

        tracing::debug!(
            "read {} rows from {:?} in {:?}",
            rows.len().separate_with_commas(),
            &path,
            before_reading.elapsed()
        );
        Ok(Table { globals, rows })
    }

    fn read_globals<G>(&self, name: &str) -> Result<G, anyhow::Error>
    where
        G: DeserializeOwned,
    {
        let path = self.path(name);
        let mut first = String::new();
        open_read_maybe_gz(&path)?.read_line(&mut first)?;
        serde_json::from_str(first.trim_end())
            .map_err(|e| anyhow::anyhow!("invalid globals in {:?}: {}", &path, e))
    }
}

//! Large text object (CLOB) transfer
//!
//! Text is streamed into and out of a text column one chunk at a time, so
//! neither side needs the whole value in memory.

mod handle;

pub use handle::{ClobReader, ClobWriter};

use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::db::{Database, COFFEE_DESCRIPTIONS};
use crate::error::Result;

/// Default window size for reads, in characters
pub const DEFAULT_CHUNK_CHARS: usize = 4096;

/// Table and columns holding the large values
#[derive(Debug, Clone)]
pub struct ClobTable {
    pub name: String,
    pub key_column: String,
    pub value_column: String,
}

impl Default for ClobTable {
    fn default() -> Self {
        Self {
            name: COFFEE_DESCRIPTIONS.to_string(),
            key_column: "COF_NAME".to_string(),
            value_column: "COF_DESC".to_string(),
        }
    }
}

/// Reads and writes large text values keyed by a text column
#[derive(Clone)]
pub struct ClobStore {
    db: Database,
    table: ClobTable,
    chunk_chars: usize,
}

impl ClobStore {
    pub fn new(db: &Database, table: ClobTable) -> Self {
        Self {
            db: db.clone(),
            table,
            chunk_chars: DEFAULT_CHUNK_CHARS,
        }
    }

    /// Change the read window size; values below one character are raised to one
    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    /// Stored length of the value under `key`, in characters
    pub async fn length(&self, key: &str) -> Result<usize> {
        let reader = ClobReader::open(self, key).await?;
        Ok(reader.length())
    }

    /// First `max_chars` characters of the value under `key`
    ///
    /// Fails with [`Error::NotFound`](crate::Error::NotFound) when no row matches.
    pub async fn read_excerpt(&self, key: &str, max_chars: usize) -> Result<String> {
        let mut reader = ClobReader::open(self, key).await?;
        tracing::info!(key, length = reader.length(), "Length of retrieved Clob");
        reader.read_chars(max_chars).await
    }

    /// Store a new row under `key`, copying `source` into it line by line
    ///
    /// Nothing is persisted unless the whole source could be read.
    /// Returns the number of characters written.
    pub async fn write_from_source<R>(&self, key: &str, mut source: R) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut writer = ClobWriter::create(self, key).await?;
        let mut line = String::new();
        loop {
            line.clear();
            if source.read_line(&mut line).await? == 0 {
                break;
            }
            tracing::debug!(key, "Writing: {}", line.trim_end());
            writer.write(&line).await?;
        }

        let written = writer.finish().await?;
        tracing::info!(key, chars = written, "Stored Clob");
        Ok(written)
    }

    /// [`write_from_source`](Self::write_from_source) reading from a file
    pub async fn write_from_file(&self, key: &str, path: &Path) -> Result<usize> {
        let file = tokio::fs::File::open(path).await?;
        self.write_from_source(key, BufReader::new(file)).await
    }
}

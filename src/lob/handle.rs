//! Scoped handles onto a stored text value
//!
//! A [`ClobReader`] owns a pooled connection and a [`ClobWriter`] owns a
//! transaction. Dropping either releases it: the connection goes back to the
//! pool and an unfinished write is rolled back.

use sqlx::pool::PoolConnection;
use sqlx::{Any, Transaction};

use super::ClobStore;
use crate::error::{Error, Result};

/// Incremental reader over one stored value
pub struct ClobReader {
    conn: PoolConnection<Any>,
    key: String,
    /// Character count of the stored value
    length: usize,
    /// Characters consumed so far
    offset: usize,
    chunk_chars: usize,
    chunk_sql: String,
}

impl ClobReader {
    pub(crate) async fn open(store: &ClobStore, key: &str) -> Result<Self> {
        let mut conn = store.db.pool().acquire().await.map_err(Error::SourceUnavailable)?;
        let dialect = store.db.dialect();
        let table = &store.table;

        let length_sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            dialect.char_length(&table.value_column),
            table.name,
            table.key_column,
            dialect.placeholder(1)
        );
        let row: Option<(Option<i64>,)> = sqlx::query_as(&length_sql)
            .bind(key.to_string())
            .fetch_optional(&mut *conn)
            .await?;
        let Some((length,)) = row else {
            return Err(Error::NotFound(key.to_string()));
        };

        let chunk_sql = format!(
            "SELECT substr({}, {}, {}) FROM {} WHERE {} = {}",
            table.value_column,
            dialect.int_placeholder(1),
            dialect.int_placeholder(2),
            table.name,
            table.key_column,
            dialect.placeholder(3)
        );

        Ok(Self {
            conn,
            key: key.to_string(),
            length: length.unwrap_or_default().max(0) as usize,
            offset: 0,
            chunk_chars: store.chunk_chars,
            chunk_sql,
        })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn remaining(&self) -> usize {
        self.length - self.offset
    }

    /// Read the next window of at most `max_chars` characters; empty at the end
    pub async fn read_chunk(&mut self, max_chars: usize) -> Result<String> {
        let take = max_chars.min(self.chunk_chars).min(self.remaining());
        if take == 0 {
            return Ok(String::new());
        }

        let (chunk,): (Option<String>,) = sqlx::query_as(&self.chunk_sql)
            .bind((self.offset + 1) as i64)
            .bind(take as i64)
            .bind(self.key.clone())
            .fetch_one(&mut *self.conn)
            .await?;
        let chunk = chunk.unwrap_or_default();

        // The value may have shrunk since the length was read
        let read = chunk.chars().count();
        if read < take {
            self.length = self.offset + read;
        }
        self.offset += read;
        Ok(chunk)
    }

    /// Read up to `max_chars` characters from the current position
    pub async fn read_chars(&mut self, max_chars: usize) -> Result<String> {
        let mut text = String::new();
        let mut wanted = max_chars;
        while wanted > 0 {
            let chunk = self.read_chunk(wanted).await?;
            if chunk.is_empty() {
                break;
            }
            wanted -= chunk.chars().count();
            text.push_str(&chunk);
        }
        Ok(text)
    }
}

/// Incremental writer filling a freshly inserted row
pub struct ClobWriter {
    tx: Transaction<'static, Any>,
    key: String,
    written: usize,
    append_sql: String,
}

impl ClobWriter {
    pub(crate) async fn create(store: &ClobStore, key: &str) -> Result<Self> {
        let mut tx = store.db.pool().begin().await.map_err(Error::SourceUnavailable)?;
        let dialect = store.db.dialect();
        let table = &store.table;

        let insert_sql = format!(
            "INSERT INTO {} ({}, {}) VALUES ({}, {})",
            table.name,
            table.key_column,
            table.value_column,
            dialect.placeholder(1),
            dialect.placeholder(2)
        );
        sqlx::query(&insert_sql)
            .bind(key.to_string())
            .bind(String::new())
            .execute(&mut *tx)
            .await?;

        let append_sql = format!(
            "UPDATE {} SET {} = {} WHERE {} = {}",
            table.name,
            table.value_column,
            dialect.concat(&table.value_column, &dialect.placeholder(1)),
            table.key_column,
            dialect.placeholder(2)
        );

        Ok(Self {
            tx,
            key: key.to_string(),
            written: 0,
            append_sql,
        })
    }

    /// Append a chunk of text to the value
    pub async fn write(&mut self, chunk: &str) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        sqlx::query(&self.append_sql)
            .bind(chunk.to_string())
            .bind(self.key.clone())
            .execute(&mut *self.tx)
            .await?;
        self.written += chunk.chars().count();
        Ok(())
    }

    /// Characters written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Commit the row; returns the characters written
    pub async fn finish(self) -> Result<usize> {
        self.tx.commit().await?;
        Ok(self.written)
    }
}

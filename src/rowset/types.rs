//! Rowset data types
//!
//! Defines the command a rowset is opened with, the rows it caches,
//! the mutations it buffers and the conflicts a sync pass reports.

use std::collections::BTreeMap;
use std::fmt;

use crate::db::Value;

/// Query plus the information needed to write changes back
#[derive(Debug, Clone)]
pub struct RowSetCommand {
    /// Query producing the rows
    pub query: String,
    /// Table receiving updates and inserts
    pub table: String,
    /// Columns identifying a row in `table`; every column when empty
    pub key_columns: Vec<String>,
    /// Ordering applied to the query for stable paging
    pub order_by: Option<String>,
}

impl RowSetCommand {
    pub fn new(query: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            table: table.into(),
            key_columns: Vec::new(),
            order_by: None,
        }
    }

    /// Add a key column
    pub fn key(mut self, column: impl Into<String>) -> Self {
        self.key_columns.push(column.into());
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }
}

/// Local state of a cached row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    /// Identical to the source as of the last read or sync
    Clean,
    /// Carries buffered column changes
    Updated,
    /// Buffered for insertion
    Inserted,
}

/// A row of the current page
#[derive(Debug, Clone)]
pub struct CachedRow {
    pub(crate) values: Vec<Value>,
    pub(crate) state: RowState,
    pub(crate) pending_id: Option<u64>,
}

impl CachedRow {
    pub(crate) fn clean(values: Vec<Value>) -> Self {
        Self {
            values,
            state: RowState::Clean,
            pending_id: None,
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn state(&self) -> RowState {
        self.state
    }
}

/// A buffered mutation awaiting reconciliation
#[derive(Debug, Clone)]
pub(crate) struct PendingChange {
    pub id: u64,
    pub kind: PendingKind,
}

#[derive(Debug, Clone)]
pub(crate) enum PendingKind {
    Update {
        /// Key of the row as last read
        key: Vec<Value>,
        /// Every column as last read from the source
        original: Vec<Value>,
        /// Column index -> new value
        changed: BTreeMap<usize, Value>,
        /// Page the row was read from
        page: usize,
    },
    Insert {
        values: Vec<Value>,
        /// Page the row was inserted on
        page: usize,
    },
}

/// Kind of divergence found for a buffered row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStatus {
    /// The source changed a column that was updated locally
    Update,
    /// A row with the inserted key already exists with different values
    Insert,
    /// The updated row no longer exists at the source
    Delete,
}

/// One divergent cell found during a sync pass
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictEntry {
    /// Key column values of the row
    pub row_key: Vec<Value>,
    /// Index of the column in the rowset
    pub column_index: usize,
    pub column: String,
    /// Value buffered locally
    pub local: Value,
    /// Value found at the source
    pub source: Value,
    pub status: ConflictStatus,
}

impl fmt::Display for ConflictEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key: Vec<String> = self.row_key.iter().map(Value::to_string).collect();
        write!(
            f,
            "{:?} conflict on row [{}] column {}: local={} source={}",
            self.status,
            key.join(", "),
            self.column,
            self.local,
            self.source
        )
    }
}

/// Outcome of a successful reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: usize,
    pub inserted: usize,
    /// Conflicting cells settled by a resolver before the final pass
    pub resolved: usize,
}

impl SyncReport {
    pub(crate) fn merge(&mut self, other: SyncReport) {
        self.updated += other.updated;
        self.inserted += other.inserted;
        self.resolved += other.resolved;
    }

    pub fn is_empty(&self) -> bool {
        self.updated == 0 && self.inserted == 0
    }
}

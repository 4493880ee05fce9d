//! Disconnected paged rowset
//!
//! A [`PagedRowSet`] holds one page of a query result in memory. Rows can be
//! updated and inserted while no connection is held; the buffered changes are
//! written back by [`PagedRowSet::accept_changes`], which checks each changed
//! cell against the source and reports write-write conflicts.

mod conflict;
mod listener;
mod types;

pub use conflict::ConflictPolicy;
pub use listener::{LoggingListener, RowSetEvent, RowSetListener};
pub use types::{
    CachedRow, ConflictEntry, ConflictStatus, RowSetCommand, RowState, SyncReport,
};

use std::collections::BTreeMap;

use sqlx::any::AnyRow;
use sqlx::{Column, Executor, Row};

use crate::db::{bind_values, decode_row, Database, Value};
use crate::error::{Error, Result};

use conflict::{apply_resolutions, key_of};
use types::{PendingChange, PendingKind};

/// Result of reconciling one buffered change
enum Outcome {
    Updated,
    Inserted,
    Conflict(Vec<ConflictEntry>),
}

/// In-memory page of a query result with buffered changes
pub struct PagedRowSet {
    db: Database,
    command: RowSetCommand,
    page_size: usize,
    page_index: usize,
    columns: Vec<String>,
    key_indexes: Vec<usize>,
    rows: Vec<CachedRow>,
    /// 0 before the first row, otherwise the 1-based row under the cursor
    position: usize,
    pending: Vec<PendingChange>,
    next_pending_id: u64,
    listeners: Vec<Box<dyn RowSetListener>>,
}

impl PagedRowSet {
    /// Run the command and load its first page
    pub async fn open(db: &Database, command: RowSetCommand, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::InvalidPageSize(page_size));
        }

        let mut rowset = Self {
            db: db.clone(),
            command,
            page_size,
            page_index: 0,
            columns: Vec::new(),
            key_indexes: Vec::new(),
            rows: Vec::new(),
            position: 0,
            pending: Vec::new(),
            next_pending_id: 1,
            listeners: Vec::new(),
        };

        let rows = rowset.fetch_page(0).await?;
        rowset.columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => rowset.describe_columns().await?,
        };
        rowset.key_indexes = if rowset.command.key_columns.is_empty() {
            // Without declared keys a row is matched on all of its columns
            (0..rowset.columns.len()).collect()
        } else {
            rowset
                .command
                .key_columns
                .iter()
                .map(|name| rowset.column_index(name))
                .collect::<Result<_>>()?
        };
        rowset.load_page(0, &rows)?;

        tracing::debug!(
            table = %rowset.command.table,
            page_size,
            columns = rowset.columns.len(),
            rows = rowset.rows.len(),
            "Opened rowset"
        );
        Ok(rowset)
    }

    pub fn add_listener(&mut self, listener: impl RowSetListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 1-based number of the loaded page
    pub fn page_number(&self) -> usize {
        self.page_index + 1
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows of the loaded page, including locally inserted ones
    pub fn rows(&self) -> &[CachedRow] {
        &self.rows
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    /// Move to the next row of the page; `false` once the page is exhausted
    pub fn next(&mut self) -> bool {
        if self.position >= self.rows.len() {
            return false;
        }
        self.position += 1;
        self.notify(|l, e| l.cursor_moved(e));
        true
    }

    /// Place the cursor on the 1-based `row` of the page
    pub fn absolute(&mut self, row: usize) -> bool {
        if row == 0 || row > self.rows.len() {
            return false;
        }
        self.position = row;
        self.notify(|l, e| l.cursor_moved(e));
        true
    }

    /// Put the cursor back before the first row
    pub fn before_first(&mut self) {
        self.position = 0;
    }

    pub fn current_row(&self) -> Option<&CachedRow> {
        self.position.checked_sub(1).and_then(|i| self.rows.get(i))
    }

    /// Value of `column` in the row under the cursor
    pub fn get(&self, column: &str) -> Result<&Value> {
        let index = self.column_index(column)?;
        let row = self.current_row().ok_or(Error::NoCurrentRow)?;
        Ok(&row.values[index])
    }

    // ------------------------------------------------------------------
    // Paging
    // ------------------------------------------------------------------

    /// Load the following page; `false` when there is none
    pub async fn next_page(&mut self) -> Result<bool> {
        let index = self.page_index + 1;
        let rows = self.fetch_page(index).await?;
        if rows.is_empty() {
            tracing::debug!(page = self.page_number(), "No page after current");
            return Ok(false);
        }
        self.load_page(index, &rows)?;
        Ok(true)
    }

    /// Load the preceding page; `false` when already on the first one
    pub async fn previous_page(&mut self) -> Result<bool> {
        let Some(index) = self.page_index.checked_sub(1) else {
            return Ok(false);
        };
        let rows = self.fetch_page(index).await?;
        if rows.is_empty() {
            return Ok(false);
        }
        self.load_page(index, &rows)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Local changes
    // ------------------------------------------------------------------

    /// Buffer new values for columns of the row under the cursor
    pub fn update_current_row<I, K, V>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let row_index = self
            .position
            .checked_sub(1)
            .filter(|i| *i < self.rows.len())
            .ok_or(Error::NoCurrentRow)?;
        let changes = self.resolve_fields(fields)?;

        let pending_id = match self.rows[row_index].pending_id {
            Some(id) => id,
            None => {
                let row = &self.rows[row_index];
                let change = PendingKind::Update {
                    key: key_of(&row.values, &self.key_indexes),
                    original: row.values.clone(),
                    changed: BTreeMap::new(),
                    page: self.page_index,
                };
                self.push_pending(change)
            }
        };

        if let Some(change) = self.pending.iter_mut().find(|c| c.id == pending_id) {
            match &mut change.kind {
                PendingKind::Update { changed, .. } => {
                    changed.extend(changes.iter().cloned());
                }
                PendingKind::Insert { values, .. } => {
                    for (index, value) in &changes {
                        values[*index] = value.clone();
                    }
                }
            }
        }

        let row = &mut self.rows[row_index];
        for (index, value) in changes {
            row.values[index] = value;
        }
        if row.state == RowState::Clean {
            row.state = RowState::Updated;
        }
        row.pending_id = Some(pending_id);

        self.notify(|l, e| l.row_changed(e));
        Ok(())
    }

    /// Buffer a new row; columns not named are NULL
    ///
    /// The row is appended to the loaded page and shows up when iterating it.
    pub fn insert_row<I, K, V>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let changes = self.resolve_fields(fields)?;
        let mut values = vec![Value::Null; self.columns.len()];
        for (index, value) in changes {
            values[index] = value;
        }

        let id = self.push_pending(PendingKind::Insert {
            values: values.clone(),
            page: self.page_index,
        });
        self.rows.push(CachedRow {
            values,
            state: RowState::Inserted,
            pending_id: Some(id),
        });

        self.notify(|l, e| l.row_changed(e));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    /// Write every buffered change back to the source
    ///
    /// Rows are applied one transaction at a time. When a changed cell no
    /// longer matches the source the pass stops writing, keeps checking the
    /// remaining rows, and fails with [`Error::SyncConflict`] listing every
    /// divergent cell. Rows written before the conflict stay committed.
    pub async fn accept_changes(&mut self) -> Result<SyncReport> {
        let (report, conflicts) = self.sync_pass().await?;
        if !conflicts.is_empty() {
            return Err(Error::SyncConflict { conflicts });
        }
        Ok(report)
    }

    /// [`accept_changes`](Self::accept_changes), settling conflicts with `resolver` and retrying once
    pub async fn accept_changes_with<F>(&mut self, mut resolver: F) -> Result<SyncReport>
    where
        F: FnMut(&ConflictEntry) -> Value,
    {
        let (mut report, conflicts) = self.sync_pass().await?;
        if conflicts.is_empty() {
            return Ok(report);
        }

        report.resolved = self.resolve_conflicts(&conflicts, &mut resolver);

        let (second, remaining) = self.sync_pass().await?;
        report.merge(second);
        if !remaining.is_empty() {
            return Err(Error::SyncConflict {
                conflicts: remaining,
            });
        }
        Ok(report)
    }

    /// Fold the values chosen by `resolver` into the buffered changes
    ///
    /// The next [`accept_changes`](Self::accept_changes) persists them.
    /// Returns the number of cells resolved.
    pub fn resolve_conflicts<F>(&mut self, conflicts: &[ConflictEntry], mut resolver: F) -> usize
    where
        F: FnMut(&ConflictEntry) -> Value,
    {
        let resolved = apply_resolutions(
            &mut self.pending,
            &self.key_indexes,
            conflicts,
            &mut resolver,
        );

        // Keep the local view in line with what will be written
        for row in &mut self.rows {
            let Some(id) = row.pending_id else { continue };
            match self.pending.iter().find(|c| c.id == id) {
                Some(change) => {
                    row.values = effective_values(&change.kind);
                    row.state = match change.kind {
                        PendingKind::Update { .. } => RowState::Updated,
                        PendingKind::Insert { .. } => RowState::Inserted,
                    };
                }
                None => {
                    row.pending_id = None;
                    row.state = RowState::Clean;
                }
            }
        }

        tracing::info!(cells = resolved, "Resolved sync conflicts");
        resolved
    }

    async fn sync_pass(&mut self) -> Result<(SyncReport, Vec<ConflictEntry>)> {
        let mut report = SyncReport::default();
        let mut applied = Vec::new();
        let result = self.reconcile(&mut report, &mut applied).await;

        // Committed rows stop being pending even when the pass fails later on
        self.pending.retain(|c| !applied.contains(&c.id));
        for row in &mut self.rows {
            if row.pending_id.is_some_and(|id| applied.contains(&id)) {
                row.pending_id = None;
                row.state = RowState::Clean;
            }
        }

        let conflicts = result?;
        if conflicts.is_empty() {
            tracing::info!(
                updated = report.updated,
                inserted = report.inserted,
                "Changes accepted"
            );
            self.notify(|l, e| l.rowset_changed(e));
        } else {
            for conflict in &conflicts {
                tracing::warn!("Conflict detected: {}", conflict);
            }
        }
        Ok((report, conflicts))
    }

    async fn reconcile(
        &self,
        report: &mut SyncReport,
        applied: &mut Vec<u64>,
    ) -> Result<Vec<ConflictEntry>> {
        let mut conflicts = Vec::new();
        for change in &self.pending {
            // After the first conflict, later rows are only checked
            let write = conflicts.is_empty();
            match self.reconcile_one(change, write).await? {
                Outcome::Updated => {
                    if write {
                        report.updated += 1;
                        applied.push(change.id);
                    }
                }
                Outcome::Inserted => {
                    if write {
                        report.inserted += 1;
                        applied.push(change.id);
                    }
                }
                Outcome::Conflict(found) => conflicts.extend(found),
            }
        }
        Ok(conflicts)
    }

    async fn reconcile_one(&self, change: &PendingChange, write: bool) -> Result<Outcome> {
        let mut tx = self.db.pool().begin().await?;

        let outcome = match &change.kind {
            PendingKind::Update {
                key,
                original,
                changed,
                ..
            } => match self.select_by_key(&mut tx, key).await? {
                None => Outcome::Conflict(
                    changed
                        .iter()
                        .map(|(&index, local)| self.conflict(key, index, local, Value::Null, ConflictStatus::Delete))
                        .collect(),
                ),
                Some(source) => {
                    let conflicts: Vec<_> = changed
                        .iter()
                        .filter(|(index, _)| source[**index] != original[**index])
                        .map(|(&index, local)| {
                            self.conflict(key, index, local, source[index].clone(), ConflictStatus::Update)
                        })
                        .collect();
                    if !conflicts.is_empty() {
                        Outcome::Conflict(conflicts)
                    } else {
                        if write {
                            self.update_row(&mut tx, key, changed).await?;
                        }
                        Outcome::Updated
                    }
                }
            },
            PendingKind::Insert { values, .. } => {
                let key = key_of(values, &self.key_indexes);
                match self.select_by_key(&mut tx, &key).await? {
                    Some(source) => {
                        let conflicts: Vec<_> = values
                            .iter()
                            .enumerate()
                            .filter(|(index, local)| source[*index] != **local)
                            .map(|(index, local)| {
                                self.conflict(&key, index, local, source[index].clone(), ConflictStatus::Insert)
                            })
                            .collect();
                        // An identical row already there counts as inserted
                        if conflicts.is_empty() {
                            Outcome::Inserted
                        } else {
                            Outcome::Conflict(conflicts)
                        }
                    }
                    None => {
                        if write {
                            self.insert_values(&mut tx, values).await?;
                        }
                        Outcome::Inserted
                    }
                }
            }
        };

        if write && !matches!(outcome, Outcome::Conflict(_)) {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(outcome)
    }

    fn conflict(
        &self,
        key: &[Value],
        index: usize,
        local: &Value,
        source: Value,
        status: ConflictStatus,
    ) -> ConflictEntry {
        ConflictEntry {
            row_key: key.to_vec(),
            column_index: index,
            column: self.columns[index].clone(),
            local: local.clone(),
            source,
            status,
        }
    }

    // ------------------------------------------------------------------
    // SQL
    // ------------------------------------------------------------------

    fn page_sql(&self, index: usize) -> String {
        let query = self.command.query.trim().trim_end_matches(';');
        let mut sql = format!("SELECT * FROM ({}) AS page_src", query);
        if let Some(order) = &self.command.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        sql.push_str(&format!(
            " LIMIT {} OFFSET {}",
            self.page_size,
            index * self.page_size
        ));
        sql
    }

    async fn fetch_page(&self, index: usize) -> Result<Vec<AnyRow>> {
        let sql = self.page_sql(index);
        tracing::trace!(%sql, "Fetching page");
        sqlx::query(&sql)
            .fetch_all(self.db.pool())
            .await
            .map_err(Error::SourceUnavailable)
    }

    async fn describe_columns(&self) -> Result<Vec<String>> {
        let sql = self.page_sql(0);
        let description = self
            .db
            .pool()
            .describe(&sql)
            .await
            .map_err(Error::SourceUnavailable)?;
        Ok(description
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }

    fn key_columns(&self) -> Vec<&str> {
        self.key_indexes
            .iter()
            .map(|&i| self.columns[i].as_str())
            .collect()
    }

    async fn select_by_key(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Any>,
        key: &[Value],
    ) -> Result<Option<Vec<Value>>> {
        let mut next = 1;
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            self.columns.join(", "),
            self.command.table,
            self.db.dialect().key_predicate(&self.key_columns(), key, &mut next)
        );
        let row = bind_values(sqlx::query(&sql), key)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.map(|r| decode_row(&r)).transpose()?)
    }

    async fn update_row(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Any>,
        key: &[Value],
        changed: &BTreeMap<usize, Value>,
    ) -> Result<()> {
        if changed.is_empty() {
            return Ok(());
        }
        let dialect = self.db.dialect();
        let mut next = 1;
        let assignments: Vec<String> = changed
            .iter()
            .map(|(&index, value)| {
                format!("{} = {}", self.columns[index], dialect.value_marker(value, &mut next))
            })
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.command.table,
            assignments.join(", "),
            dialect.key_predicate(&self.key_columns(), key, &mut next)
        );

        bind_values(sqlx::query(&sql), changed.values().chain(key.iter()))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn insert_values(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Any>,
        values: &[Value],
    ) -> Result<()> {
        let dialect = self.db.dialect();
        let mut next = 1;
        let markers: Vec<String> = values
            .iter()
            .map(|value| dialect.value_marker(value, &mut next))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.command.table,
            self.columns.join(", "),
            markers.join(", ")
        );

        bind_values(sqlx::query(&sql), values)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownColumn(name.to_string()))
    }

    fn resolve_fields<I, K, V>(&self, fields: I) -> Result<Vec<(usize, Value)>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        fields
            .into_iter()
            .map(|(name, value)| Ok((self.column_index(name.as_ref())?, value.into())))
            .collect()
    }

    fn push_pending(&mut self, kind: PendingKind) -> u64 {
        let id = self.next_pending_id;
        self.next_pending_id += 1;
        self.pending.push(PendingChange { id, kind });
        id
    }

    /// Replace the loaded rows, overlaying buffered changes
    fn load_page(&mut self, index: usize, rows: &[AnyRow]) -> Result<()> {
        let mut cached = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cached_row = CachedRow::clean(decode_row(row)?);
            let key = key_of(&cached_row.values, &self.key_indexes);
            let buffered = self.pending.iter().find(|c| match &c.kind {
                PendingKind::Update { key: k, .. } => *k == key,
                PendingKind::Insert { .. } => false,
            });
            if let Some(change) = buffered {
                if let PendingKind::Update { changed, .. } = &change.kind {
                    for (index, value) in changed {
                        cached_row.values[*index] = value.clone();
                    }
                }
                cached_row.state = RowState::Updated;
                cached_row.pending_id = Some(change.id);
            }
            cached.push(cached_row);
        }

        for change in &self.pending {
            if let PendingKind::Insert { values, page } = &change.kind {
                if *page == index {
                    cached.push(CachedRow {
                        values: values.clone(),
                        state: RowState::Inserted,
                        pending_id: Some(change.id),
                    });
                }
            }
        }

        self.page_index = index;
        self.rows = cached;
        self.position = 0;
        self.notify(|l, e| l.rowset_changed(e));
        Ok(())
    }

    fn notify(&mut self, event: impl Fn(&mut dyn RowSetListener, &RowSetEvent)) {
        if self.listeners.is_empty() {
            return;
        }
        let snapshot = RowSetEvent {
            page: self.page_number(),
            position: self.position,
        };
        for listener in &mut self.listeners {
            event(listener.as_mut(), &snapshot);
        }
    }
}

/// Full row as it will look once the change is applied
fn effective_values(kind: &PendingKind) -> Vec<Value> {
    match kind {
        PendingKind::Update {
            original, changed, ..
        } => {
            let mut values = original.clone();
            for (index, value) in changed {
                values[*index] = value.clone();
            }
            values
        }
        PendingKind::Insert { values, .. } => values.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::temp_database;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn inventory(rows: i64) -> (tempfile::TempDir, Database) {
        let (dir, db) = temp_database().await;
        for id in 1..=rows {
            sqlx::query(
                "INSERT INTO MERCH_INVENTORY (ITEM_ID, ITEM_NAME, SUP_ID, QUAN, DATE_VAL) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(format!("Item{}", id))
            .bind(456_i64)
            .bind(id * 10)
            .bind("2006-04-01 00:00:00".to_string())
            .execute(db.pool())
            .await
            .unwrap();
        }
        (dir, db)
    }

    fn command() -> RowSetCommand {
        RowSetCommand::new("select * from MERCH_INVENTORY", "MERCH_INVENTORY")
            .key("ITEM_ID")
            .order_by("ITEM_ID")
    }

    async fn source_quantity(db: &Database, id: i64) -> Option<i64> {
        sqlx::query_as::<_, (i64,)>("SELECT QUAN FROM MERCH_INVENTORY WHERE ITEM_ID = ?")
            .bind(id)
            .fetch_optional(db.pool())
            .await
            .unwrap()
            .map(|(q,)| q)
    }

    async fn set_source_quantity(db: &Database, id: i64, quantity: i64) {
        sqlx::query("UPDATE MERCH_INVENTORY SET QUAN = ? WHERE ITEM_ID = ?")
            .bind(quantity)
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();
    }

    /// Move the cursor onto the row with `id` in the loaded page
    fn seek(rowset: &mut PagedRowSet, id: i64) {
        rowset.before_first();
        while rowset.next() {
            if rowset.get("ITEM_ID").unwrap().as_i64() == Some(id) {
                return;
            }
        }
        panic!("item {} not on page", id);
    }

    #[tokio::test]
    async fn test_page_size_eight_with_ten_rows() {
        let (_dir, db) = inventory(10).await;
        let mut rowset = PagedRowSet::open(&db, command(), 8).await.unwrap();

        assert_eq!(rowset.page_number(), 1);
        assert_eq!(rowset.rows().len(), 8);

        assert!(rowset.next_page().await.unwrap());
        assert_eq!(rowset.page_number(), 2);
        assert_eq!(rowset.rows().len(), 2);

        assert!(!rowset.next_page().await.unwrap());
        assert_eq!(rowset.page_number(), 2);
    }

    #[tokio::test]
    async fn test_paging_visits_every_row_once_in_order() {
        let (_dir, db) = inventory(10).await;
        for page_size in 1..=11 {
            let mut rowset = PagedRowSet::open(&db, command(), page_size).await.unwrap();
            let mut seen = Vec::new();
            loop {
                while rowset.next() {
                    seen.push(rowset.get("ITEM_ID").unwrap().as_i64().unwrap());
                }
                if !rowset.next_page().await.unwrap() {
                    break;
                }
            }
            assert_eq!(seen, (1..=10).collect::<Vec<_>>(), "page size {}", page_size);
        }
    }

    #[tokio::test]
    async fn test_previous_page() {
        let (_dir, db) = inventory(5).await;
        let mut rowset = PagedRowSet::open(&db, command(), 2).await.unwrap();

        assert!(!rowset.previous_page().await.unwrap());
        assert!(rowset.next_page().await.unwrap());
        assert!(rowset.next_page().await.unwrap());
        assert_eq!(rowset.rows().len(), 1);

        assert!(rowset.previous_page().await.unwrap());
        assert_eq!(rowset.page_number(), 2);
        assert!(rowset.next());
        assert_eq!(rowset.get("ITEM_ID").unwrap(), &Value::Integer(3));
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let (_dir, db) = inventory(3).await;
        assert!(matches!(
            PagedRowSet::open(&db, command(), 0).await,
            Err(Error::InvalidPageSize(0))
        ));

        let bad_query = RowSetCommand::new("select * from NO_SUCH_TABLE", "NO_SUCH_TABLE");
        assert!(matches!(
            PagedRowSet::open(&db, bad_query, 4).await,
            Err(Error::SourceUnavailable(_))
        ));

        let mut rowset = PagedRowSet::open(&db, command(), 4).await.unwrap();
        assert!(matches!(
            rowset.update_current_row([("QUAN", 1)]),
            Err(Error::NoCurrentRow)
        ));
        assert!(rowset.next());
        assert!(matches!(
            rowset.update_current_row([("NOPE", 1)]),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[tokio::test]
    async fn test_accept_changes_without_conflict() {
        let (_dir, db) = inventory(10).await;
        let mut rowset = PagedRowSet::open(&db, command(), 4).await.unwrap();

        seek(&mut rowset, 3);
        rowset.update_current_row([("QUAN", 31)]).unwrap();
        assert_eq!(rowset.current_row().unwrap().state(), RowState::Updated);
        assert_eq!(source_quantity(&db, 3).await, Some(30));

        let report = rowset.accept_changes().await.unwrap();
        assert_eq!(report.updated, 1);
        assert!(!rowset.has_pending_changes());
        assert_eq!(rowset.current_row().unwrap().state(), RowState::Clean);
        assert_eq!(source_quantity(&db, 3).await, Some(31));
        assert_eq!(rowset.get("QUAN").unwrap(), &Value::Integer(31));
    }

    #[tokio::test]
    async fn test_changes_survive_paging() {
        let (_dir, db) = inventory(10).await;
        let mut rowset = PagedRowSet::open(&db, command(), 4).await.unwrap();

        seek(&mut rowset, 2);
        rowset.update_current_row([("ITEM_NAME", "Renamed")]).unwrap();
        assert!(rowset.next_page().await.unwrap());
        assert!(rowset.previous_page().await.unwrap());

        seek(&mut rowset, 2);
        assert_eq!(rowset.get("ITEM_NAME").unwrap(), &Value::from("Renamed"));
        assert_eq!(rowset.current_row().unwrap().state(), RowState::Updated);
        assert_eq!(rowset.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_conflict_reports_one_entry_per_divergent_column() {
        let (_dir, db) = inventory(10).await;
        let mut rowset = PagedRowSet::open(&db, command(), 8).await.unwrap();

        seek(&mut rowset, 5);
        rowset
            .update_current_row([("QUAN", Value::Integer(51)), ("ITEM_NAME", Value::from("Local"))])
            .unwrap();
        set_source_quantity(&db, 5, 99).await;

        let err = rowset.accept_changes().await.unwrap_err();
        let conflicts = err.conflicts().unwrap().to_vec();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].column, "QUAN");
        assert_eq!(conflicts[0].local, Value::Integer(51));
        assert_eq!(conflicts[0].source, Value::Integer(99));
        assert_eq!(conflicts[0].status, ConflictStatus::Update);
        assert_eq!(conflicts[0].row_key, vec![Value::Integer(5)]);
        assert_eq!(source_quantity(&db, 5).await, Some(99));
        assert_eq!(rowset.pending_count(), 1);

        assert_eq!(rowset.resolve_conflicts(&conflicts, ConflictPolicy::KeepLocal.resolver()), 1);
        rowset.accept_changes().await.unwrap();
        assert_eq!(source_quantity(&db, 5).await, Some(51));

        let mut reread = PagedRowSet::open(&db, command(), 8).await.unwrap();
        seek(&mut reread, 5);
        assert_eq!(reread.get("QUAN").unwrap(), &Value::Integer(51));
        assert_eq!(reread.get("ITEM_NAME").unwrap(), &Value::from("Local"));
    }

    #[tokio::test]
    async fn test_keep_source_resolution() {
        let (_dir, db) = inventory(3).await;
        let mut rowset = PagedRowSet::open(&db, command(), 8).await.unwrap();

        seek(&mut rowset, 1);
        rowset.update_current_row([("QUAN", 11)]).unwrap();
        set_source_quantity(&db, 1, 77).await;

        let report = rowset
            .accept_changes_with(ConflictPolicy::KeepSource.resolver())
            .await
            .unwrap();
        assert_eq!(report.resolved, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(source_quantity(&db, 1).await, Some(77));
        assert_eq!(rowset.get("QUAN").unwrap(), &Value::Integer(77));
    }

    #[tokio::test]
    async fn test_rows_before_conflict_stay_committed() {
        let (_dir, db) = inventory(6).await;
        let mut rowset = PagedRowSet::open(&db, command(), 6).await.unwrap();

        seek(&mut rowset, 1);
        rowset.update_current_row([("QUAN", 1)]).unwrap();
        seek(&mut rowset, 2);
        rowset.update_current_row([("QUAN", 2)]).unwrap();
        seek(&mut rowset, 3);
        rowset.update_current_row([("QUAN", 3)]).unwrap();
        seek(&mut rowset, 4);
        rowset.update_current_row([("QUAN", 4)]).unwrap();
        set_source_quantity(&db, 2, 200).await;
        set_source_quantity(&db, 4, 400).await;

        let err = rowset.accept_changes().await.unwrap_err();
        let conflicts = err.conflicts().unwrap();
        assert_eq!(conflicts.len(), 2);

        assert_eq!(source_quantity(&db, 1).await, Some(1));
        assert_eq!(source_quantity(&db, 2).await, Some(200));
        // Row 3 came after the first conflict, so it is still waiting
        assert_eq!(source_quantity(&db, 3).await, Some(30));
        assert_eq!(rowset.pending_count(), 3);

        let report = rowset
            .accept_changes_with(ConflictPolicy::KeepLocal.resolver())
            .await
            .unwrap();
        assert_eq!(report.updated, 3);
        assert_eq!(source_quantity(&db, 2).await, Some(2));
        assert_eq!(source_quantity(&db, 3).await, Some(3));
        assert_eq!(source_quantity(&db, 4).await, Some(4));
    }

    #[tokio::test]
    async fn test_insert_row_is_visible_and_synced() {
        let (_dir, db) = inventory(3).await;
        let mut rowset = PagedRowSet::open(&db, command(), 8).await.unwrap();

        rowset
            .insert_row([
                ("ITEM_ID", Value::Integer(123456)),
                ("ITEM_NAME", Value::from("TableCloth")),
                ("SUP_ID", Value::Integer(927)),
                ("QUAN", Value::Integer(14)),
            ])
            .unwrap();
        assert_eq!(rowset.rows().len(), 4);
        assert_eq!(rowset.rows()[3].state(), RowState::Inserted);
        assert_eq!(rowset.rows()[3].values()[4], Value::Null);
        assert_eq!(source_quantity(&db, 123456).await, None);

        let report = rowset.accept_changes().await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(source_quantity(&db, 123456).await, Some(14));
        assert_eq!(rowset.rows()[3].state(), RowState::Clean);
    }

    #[tokio::test]
    async fn test_insert_over_existing_key_keeps_local_values() {
        let (_dir, db) = inventory(3).await;
        let mut rowset = PagedRowSet::open(&db, command(), 8).await.unwrap();

        rowset
            .insert_row([
                ("ITEM_ID", Value::Integer(2)),
                ("ITEM_NAME", Value::from("Item2")),
                ("SUP_ID", Value::Integer(456)),
                ("QUAN", Value::Integer(5)),
                ("DATE_VAL", Value::from("2006-04-01 00:00:00")),
            ])
            .unwrap();

        let err = rowset.accept_changes().await.unwrap_err();
        let conflicts = err.conflicts().unwrap().to_vec();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].status, ConflictStatus::Insert);
        assert_eq!(conflicts[0].column, "QUAN");

        rowset.resolve_conflicts(&conflicts, ConflictPolicy::KeepLocal.resolver());
        let report = rowset.accept_changes().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(source_quantity(&db, 2).await, Some(5));
    }

    #[tokio::test]
    async fn test_row_deleted_at_source() {
        let (_dir, db) = inventory(3).await;
        let mut rowset = PagedRowSet::open(&db, command(), 8).await.unwrap();

        seek(&mut rowset, 3);
        rowset.update_current_row([("QUAN", 33)]).unwrap();
        sqlx::query("DELETE FROM MERCH_INVENTORY WHERE ITEM_ID = 3")
            .execute(db.pool())
            .await
            .unwrap();

        let err = rowset.accept_changes().await.unwrap_err();
        let conflicts = err.conflicts().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].status, ConflictStatus::Delete);
        assert_eq!(conflicts[0].source, Value::Null);

        let report = rowset
            .accept_changes_with(ConflictPolicy::KeepLocal.resolver())
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(source_quantity(&db, 3).await, Some(33));
    }

    #[tokio::test]
    async fn test_empty_result_still_knows_columns() {
        let (_dir, db) = inventory(0).await;
        let mut rowset = PagedRowSet::open(&db, command(), 8).await.unwrap();

        assert!(rowset.rows().is_empty());
        assert_eq!(rowset.columns().len(), 5);
        assert!(!rowset.next());
        assert!(!rowset.next_page().await.unwrap());

        rowset.insert_row([("ITEM_ID", 1), ("QUAN", 2)]).unwrap();
        rowset.accept_changes().await.unwrap();
        assert_eq!(source_quantity(&db, 1).await, Some(2));
    }

    #[tokio::test]
    async fn test_keyless_command_matches_on_every_column() {
        let (_dir, db) = inventory(4).await;
        let keyless = RowSetCommand::new("select * from MERCH_INVENTORY", "MERCH_INVENTORY")
            .order_by("ITEM_ID");
        let mut rowset = PagedRowSet::open(&db, keyless, 2).await.unwrap();

        seek(&mut rowset, 1);
        rowset.update_current_row([("QUAN", 999)]).unwrap();

        assert!(rowset.next_page().await.unwrap());
        let quantities: Vec<_> = rowset.rows().iter().map(|r| r.values()[3].clone()).collect();
        assert_eq!(quantities, vec![Value::Integer(30), Value::Integer(40)]);
        assert!(rowset.rows().iter().all(|r| r.state() == RowState::Clean));

        assert!(rowset.previous_page().await.unwrap());
        seek(&mut rowset, 1);
        assert_eq!(rowset.get("QUAN").unwrap(), &Value::Integer(999));
        seek(&mut rowset, 2);
        assert_eq!(rowset.current_row().unwrap().state(), RowState::Clean);

        let report = rowset.accept_changes().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(source_quantity(&db, 1).await, Some(999));
        assert_eq!(source_quantity(&db, 2).await, Some(20));
        assert_eq!(source_quantity(&db, 4).await, Some(40));
    }

    #[tokio::test]
    async fn test_null_cells_are_read_and_written() {
        let (_dir, db) = inventory(2).await;
        sqlx::query("INSERT INTO MERCH_INVENTORY (ITEM_ID, QUAN) VALUES (3, 30)")
            .execute(db.pool())
            .await
            .unwrap();

        let mut rowset = PagedRowSet::open(&db, command(), 8).await.unwrap();
        seek(&mut rowset, 3);
        assert_eq!(rowset.get("ITEM_NAME").unwrap(), &Value::Null);
        assert_eq!(rowset.get("DATE_VAL").unwrap(), &Value::Null);

        rowset.insert_row([("ITEM_ID", 5), ("QUAN", 2)]).unwrap();
        rowset.accept_changes().await.unwrap();

        let mut reread = PagedRowSet::open(&db, command(), 8).await.unwrap();
        assert_eq!(reread.rows().len(), 4);
        seek(&mut reread, 5);
        assert_eq!(reread.get("ITEM_NAME").unwrap(), &Value::Null);
        assert_eq!(reread.get("QUAN").unwrap(), &Value::Integer(2));

        // NULL key cells are matched with IS NULL
        let keyless = RowSetCommand::new("select * from MERCH_INVENTORY", "MERCH_INVENTORY")
            .order_by("ITEM_ID");
        let mut rowset = PagedRowSet::open(&db, keyless, 8).await.unwrap();
        seek(&mut rowset, 3);
        rowset
            .update_current_row([("ITEM_NAME", Value::from("Filter")), ("DATE_VAL", Value::Null)])
            .unwrap();
        rowset.accept_changes().await.unwrap();

        let (name,): (String,) =
            sqlx::query_as("SELECT ITEM_NAME FROM MERCH_INVENTORY WHERE ITEM_ID = 3")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(name, "Filter");
    }

    #[tokio::test]
    async fn test_reinserted_row_returns_to_its_own_page() {
        let (_dir, db) = inventory(5).await;
        let mut rowset = PagedRowSet::open(&db, command(), 2).await.unwrap();

        assert!(rowset.next_page().await.unwrap());
        seek(&mut rowset, 3);
        rowset.update_current_row([("QUAN", 33)]).unwrap();
        assert!(rowset.previous_page().await.unwrap());
        sqlx::query("DELETE FROM MERCH_INVENTORY WHERE ITEM_ID = 3")
            .execute(db.pool())
            .await
            .unwrap();

        let err = rowset.accept_changes().await.unwrap_err();
        let conflicts = err.conflicts().unwrap().to_vec();
        assert_eq!(conflicts[0].status, ConflictStatus::Delete);
        rowset.resolve_conflicts(&conflicts, ConflictPolicy::KeepLocal.resolver());

        assert_eq!(rowset.page_number(), 1);
        assert!(rowset.rows().iter().all(|r| r.state() == RowState::Clean));

        assert!(rowset.next_page().await.unwrap());
        let ids: Vec<_> = rowset.rows().iter().map(|r| r.values()[0].clone()).collect();
        assert_eq!(ids, vec![Value::Integer(4), Value::Integer(5), Value::Integer(3)]);
        assert_eq!(rowset.rows()[2].state(), RowState::Inserted);

        rowset.accept_changes().await.unwrap();
        assert_eq!(source_quantity(&db, 3).await, Some(33));
    }

    #[derive(Clone, Default)]
    struct CountingListener {
        cursor: Arc<AtomicUsize>,
        row: Arc<AtomicUsize>,
        rowset: Arc<AtomicUsize>,
    }

    impl RowSetListener for CountingListener {
        fn cursor_moved(&mut self, _event: &RowSetEvent) {
            self.cursor.fetch_add(1, Ordering::SeqCst);
        }

        fn row_changed(&mut self, _event: &RowSetEvent) {
            self.row.fetch_add(1, Ordering::SeqCst);
        }

        fn rowset_changed(&mut self, _event: &RowSetEvent) {
            self.rowset.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_listener_notifications() {
        let (_dir, db) = inventory(5).await;
        let mut rowset = PagedRowSet::open(&db, command(), 4).await.unwrap();
        let listener = CountingListener::default();
        rowset.add_listener(listener.clone());
        rowset.add_listener(LoggingListener);

        while rowset.next() {}
        assert!(rowset.absolute(1));
        rowset.update_current_row([("QUAN", 1)]).unwrap();
        rowset.accept_changes().await.unwrap();
        assert!(rowset.next_page().await.unwrap());

        assert_eq!(listener.cursor.load(Ordering::SeqCst), 5);
        assert_eq!(listener.row.load(Ordering::SeqCst), 1);
        assert_eq!(listener.rowset.load(Ordering::SeqCst), 2);
    }
}

//! Tutorial workflows
//!
//! The console programs: list the inventory, page through it while updating
//! and inserting rows, and move a coffee description in and out of a CLOB.

use std::path::Path;

use chrono::NaiveDate;
use futures::TryStreamExt;

use crate::db::{decode_row, Database, Value, MERCH_INVENTORY};
use crate::error::Result;
use crate::lob::{ClobStore, ClobTable};
use crate::rowset::{ConflictPolicy, LoggingListener, PagedRowSet, RowSetCommand};

/// Item whose quantity the paging workflow bumps
pub const RESTOCKED_ITEM: i64 = 1235;

/// Item the paging workflow inserts
pub const NEW_ITEM: i64 = 123456;

/// Coffee whose description the CLOB workflow stores
pub const SAMPLE_COFFEE: &str = "Colombian";

/// What the paging workflow did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagingSummary {
    pub pages: usize,
    pub rows_seen: usize,
    pub rows_updated: usize,
    pub rows_inserted: usize,
}

/// Print every inventory row
pub async fn view_table(db: &Database) -> Result<usize> {
    let sql = format!(
        "SELECT ITEM_ID, ITEM_NAME, QUAN FROM {} ORDER BY ITEM_ID",
        MERCH_INVENTORY
    );
    let mut rows = sqlx::query(&sql).fetch(db.pool());
    let mut count = 0;
    while let Some(row) = rows.try_next().await? {
        let values = decode_row(&row)?;
        println!("Found item {}: {} ({})", values[0], values[1], values[2]);
        count += 1;
    }
    Ok(count)
}

/// Whether the inventory holds `item_id`
pub async fn item_exists(db: &Database, item_id: i64) -> Result<bool> {
    let sql = format!(
        "SELECT ITEM_ID FROM {} WHERE ITEM_ID = {}",
        MERCH_INVENTORY,
        db.dialect().placeholder(1)
    );
    let row = sqlx::query(&sql)
        .bind(item_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(row.is_some())
}

/// Page through the inventory, bump one quantity, then add a new item
pub async fn run_paging(db: &Database, page_size: usize) -> Result<PagingSummary> {
    let command = RowSetCommand::new(format!("select * from {}", MERCH_INVENTORY), MERCH_INVENTORY)
        .key("ITEM_ID")
        .order_by("ITEM_ID");
    let mut rowset = PagedRowSet::open(db, command, page_size).await?;
    rowset.add_listener(LoggingListener);

    let mut summary = PagingSummary::default();
    loop {
        summary.pages += 1;
        println!("Page number: {}", rowset.page_number());
        while rowset.next() {
            summary.rows_seen += 1;
            let id = rowset.get("ITEM_ID")?.as_i64().unwrap_or_default();
            println!("Found item {}: {}", id, rowset.get("ITEM_NAME")?);

            if id == RESTOCKED_ITEM {
                let quantity = rowset.get("QUAN")?.as_i64().unwrap_or_default() + 1;
                println!("Updating quantity to {}", quantity);
                rowset.update_current_row([("QUAN", quantity)])?;
                let report = rowset
                    .accept_changes_with(ConflictPolicy::KeepLocal.resolver())
                    .await?;
                summary.rows_updated += report.updated;
            }
        }
        if !rowset.next_page().await? {
            break;
        }
    }

    if item_exists(db, NEW_ITEM).await? {
        println!("Item ID {} already exists", NEW_ITEM);
        return Ok(summary);
    }

    let date_val = NaiveDate::from_ymd_opt(2006, 5, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string());
    rowset.insert_row([
        ("ITEM_ID", Value::Integer(NEW_ITEM)),
        ("ITEM_NAME", Value::from("TableCloth")),
        ("SUP_ID", Value::Integer(927)),
        ("QUAN", Value::Integer(14)),
        ("DATE_VAL", Value::from(date_val)),
    ])?;

    println!("About to add a new row...");
    let report = rowset
        .accept_changes_with(ConflictPolicy::KeepLocal.resolver())
        .await?;
    summary.rows_inserted += report.inserted;
    summary.rows_updated += report.updated;
    println!("Added a row...");

    view_table(db).await?;
    Ok(summary)
}

/// Store the sample description from `sample_file` unless present, then print an excerpt
pub async fn run_clob(db: &Database, sample_file: &Path, excerpt_chars: usize) -> Result<String> {
    let store = ClobStore::new(db, ClobTable::default());

    match store.length(SAMPLE_COFFEE).await {
        Ok(length) => {
            tracing::info!(coffee = SAMPLE_COFFEE, length, "Description already stored");
        }
        Err(crate::Error::NotFound(_)) => {
            let written = store.write_from_file(SAMPLE_COFFEE, sample_file).await?;
            println!("Length of Clob: {}", written);
        }
        Err(e) => return Err(e),
    }

    let description = store.read_excerpt(SAMPLE_COFFEE, excerpt_chars).await?;
    println!("{}", description);
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::temp_database;
    use crate::db::seed_sample_data;

    #[tokio::test]
    async fn test_paging_workflow_updates_and_inserts() {
        let (_dir, db) = temp_database().await;
        seed_sample_data(&db).await.unwrap();

        let summary = run_paging(&db, 8).await.unwrap();
        assert_eq!(
            summary,
            PagingSummary {
                pages: 2,
                rows_seen: 12,
                rows_updated: 1,
                rows_inserted: 1,
            }
        );
        assert!(item_exists(&db, NEW_ITEM).await.unwrap());
        assert_eq!(view_table(&db).await.unwrap(), 13);

        sqlx::query("INSERT INTO MERCH_INVENTORY (ITEM_ID) VALUES (7000)")
            .execute(db.pool())
            .await
            .unwrap();
        assert_eq!(view_table(&db).await.unwrap(), 14);

        let (quantity,): (i64,) =
            sqlx::query_as("SELECT QUAN FROM MERCH_INVENTORY WHERE ITEM_ID = 1235")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(quantity, 37);

        // Second run finds the new item and leaves it alone
        let again = run_paging(&db, 8).await.unwrap();
        assert_eq!(again.rows_seen, 14);
        assert_eq!(again.rows_inserted, 0);
    }

    #[tokio::test]
    async fn test_clob_workflow_is_repeatable() {
        let (dir, db) = temp_database().await;
        let path = dir.path().join("colombian-description.txt");
        std::fs::write(&path, "Colombian coffee, mild and balanced.\n").unwrap();

        assert_eq!(run_clob(&db, &path, 10).await.unwrap(), "Colombian ");
        assert_eq!(run_clob(&db, &path, 9).await.unwrap(), "Colombian");
    }
}

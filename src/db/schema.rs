//! Tutorial schema and sample data

use super::{Database, Dialect};
use crate::error::Result;

/// Table holding the merchandise used by the paging workflow
pub const MERCH_INVENTORY: &str = "MERCH_INVENTORY";

/// Table holding the large text descriptions used by the CLOB workflow
pub const COFFEE_DESCRIPTIONS: &str = "COFFEE_DESCRIPTIONS";

/// Create the tutorial tables if they are missing
pub async fn initialize_schema(db: &Database) -> Result<()> {
    for statement in schema_sql(db.dialect()) {
        sqlx::query(&statement).execute(db.pool()).await?;
    }
    Ok(())
}

fn schema_sql(dialect: Dialect) -> [String; 2] {
    let varchar = dialect.varchar_type();
    [
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                ITEM_ID INTEGER NOT NULL PRIMARY KEY,
                ITEM_NAME {varchar},
                SUP_ID INTEGER,
                QUAN INTEGER,
                DATE_VAL {varchar}
            )",
            MERCH_INVENTORY
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                COF_NAME {varchar} NOT NULL PRIMARY KEY,
                COF_DESC {}
            )",
            COFFEE_DESCRIPTIONS,
            dialect.clob_type()
        ),
    ]
}

/// Sample merchandise rows: item id, name, supplier id, quantity, date
const SAMPLE_INVENTORY: &[(i64, &str, i64, i64, &str)] = &[
    (1234, "Cup_Large", 456, 28, "2006-04-01 00:00:00"),
    (1235, "Cup_Small", 456, 36, "2006-04-01 00:00:00"),
    (1236, "Saucer", 456, 64, "2006-04-01 00:00:00"),
    (1287, "Carafe", 456, 12, "2006-04-01 00:00:00"),
    (6931, "Carafe", 927, 3, "2006-04-01 00:00:00"),
    (6935, "PotHolder", 927, 88, "2006-04-01 00:00:00"),
    (6977, "Napkin", 927, 108, "2006-04-01 00:00:00"),
    (6979, "Towel", 927, 24, "2006-04-01 00:00:00"),
    (4488, "CofMaker", 8372, 5, "2006-04-01 00:00:00"),
    (4490, "CofGrinder", 8732, 9, "2006-04-01 00:00:00"),
    (4495, "EspMaker", 8732, 4, "2006-04-01 00:00:00"),
    (6914, "Cookbook", 927, 12, "2006-04-01 00:00:00"),
];

/// Populate the merchandise table when it is empty
///
/// Returns the number of rows inserted.
pub async fn seed_sample_data(db: &Database) -> Result<usize> {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", MERCH_INVENTORY))
        .fetch_one(db.pool())
        .await?;
    if count > 0 {
        tracing::debug!(rows = count, "Inventory already populated");
        return Ok(0);
    }

    let dialect = db.dialect();
    let sql = format!(
        "INSERT INTO {} (ITEM_ID, ITEM_NAME, SUP_ID, QUAN, DATE_VAL) VALUES ({}, {}, {}, {}, {})",
        MERCH_INVENTORY,
        dialect.placeholder(1),
        dialect.placeholder(2),
        dialect.placeholder(3),
        dialect.placeholder(4),
        dialect.placeholder(5),
    );

    let mut tx = db.pool().begin().await?;
    for (item_id, name, sup_id, quantity, date) in SAMPLE_INVENTORY {
        sqlx::query(&sql)
            .bind(*item_id)
            .bind(name.to_string())
            .bind(*sup_id)
            .bind(*quantity)
            .bind(date.to_string())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    tracing::info!(rows = SAMPLE_INVENTORY.len(), "Seeded sample inventory");
    Ok(SAMPLE_INVENTORY.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::temp_database;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let (_dir, db) = temp_database().await;
        initialize_schema(&db).await.unwrap();

        assert_eq!(seed_sample_data(&db).await.unwrap(), SAMPLE_INVENTORY.len());
        assert_eq!(seed_sample_data(&db).await.unwrap(), 0);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM MERCH_INVENTORY")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 12);
    }
}

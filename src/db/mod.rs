//! Database access through the sqlx `Any` driver
//!
//! Handles connecting to the configured data source, the SQL dialect
//! differences between backends, and the tutorial schema.

mod dialect;
mod schema;
mod value;

pub use dialect::Dialect;
pub use schema::*;
pub use value::Value;

pub(crate) use value::{bind_values, decode_row};

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::datasource::{DataSourceKind, DataSourceProfile};
use crate::error::{Error, Result};

/// Pooled connection to one data source
#[derive(Clone, Debug)]
pub struct Database {
    pool: AnyPool,
    dialect: Dialect,
}

impl Database {
    /// Connect using a registry profile
    pub async fn connect(profile: &DataSourceProfile) -> Result<Self> {
        Self::connect_url(&profile.connection_url(), profile.kind()).await
    }

    /// Connect to an explicit sqlx URL
    pub async fn connect_url(url: &str, kind: DataSourceKind) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(Error::SourceUnavailable)?;

        tracing::info!(data_source = %kind, "Connected to database");

        Ok(Self {
            pool,
            dialect: Dialect::from(kind),
        })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_source_is_reported() {
        let err = Database::connect_url(
            "sqlite:///nonexistent-dir/never/tutorial.db?mode=ro",
            DataSourceKind::Sqlite,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }
}

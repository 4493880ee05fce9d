//! Paged Rowset tutorial runner
//!
//! Connects to a named data source and runs the paging and CLOB workflows
//! against it.

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paged_rowset::config::Config;
use paged_rowset::datasource::DataSourceRegistry;
use paged_rowset::db::{initialize_schema, seed_sample_data, Database};
use paged_rowset::lob::DEFAULT_CHUNK_CHARS;
use paged_rowset::workflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Workflow {
    RowSet,
    Clob,
    All,
}

impl Workflow {
    fn parse(arg: Option<&str>) -> anyhow::Result<Self> {
        match arg.map(str::to_ascii_lowercase).as_deref() {
            None | Some("all") => Ok(Workflow::All),
            Some("rowset") => Ok(Workflow::RowSet),
            Some("clob") => Ok(Workflow::Clob),
            Some(other) => bail!("Unknown workflow '{}', expected rowset, clob or all", other),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paged_rowset=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    let mut args = std::env::args().skip(1);
    let Some(identifier) = args.next() else {
        bail!("Usage: paged-rowset <sqlite|mysql|postgresql> [rowset|clob|all]");
    };
    let selected = Workflow::parse(args.next().as_deref())?;

    tracing::info!("Starting Paged Rowset v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data source properties: {}", config.config_dir.display());

    let registry = DataSourceRegistry::load(&config.config_dir)
        .context("Failed to load data source profiles")?;
    let profile = registry.lookup(&identifier)?;

    let db = Database::connect(profile)
        .await
        .with_context(|| format!("Failed to connect to '{}'", identifier))?;
    initialize_schema(&db).await?;
    let seeded = seed_sample_data(&db).await?;
    if seeded > 0 {
        tracing::info!(rows = seeded, "Seeded sample inventory");
    }

    if matches!(selected, Workflow::RowSet | Workflow::All) {
        let summary = workflow::run_paging(&db, config.page_size).await?;
        tracing::info!(?summary, "Paging workflow finished");
    }

    if matches!(selected, Workflow::Clob | Workflow::All) {
        workflow::run_clob(&db, &config.sample_file, DEFAULT_CHUNK_CHARS)
            .await
            .context("CLOB workflow failed")?;
    }

    db.close().await;
    tracing::info!("Done");
    Ok(())
}

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use envconfig::Envconfig;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use listing_facts_infra::dimensions::PostgresDimensions;
use listing_facts_infra::fact_store::{FactStore, PostgresFactStore, audit_schema, fact_columns};
use listing_facts_infra::source::PostgresSourceCatalog;
use listing_facts_infra::{BatchPipeline, LastExecution, PipelineConfig, RunOptions};
use listing_facts_runner::{RetryPolicy, run_with_retry};

#[derive(Parser, Debug)]
#[command(name = "listing-facts", version, about = "Incremental listing fact batches")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one batch against the configured database.
    Run {
        /// Ignore the watermark and reprocess every listing.
        #[arg(long)]
        full_refresh: bool,
    },
    /// Compare the target table with the columns the batch writes.
    Audit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    listing_facts_observability::init();

    let cli = Cli::parse();
    let config = PipelineConfig::init_from_env().context("reading LISTING_FACTS_* environment")?;
    config.validate()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url()?)
        .await
        .context("connecting to Postgres")?;

    match cli.command {
        Command::Run { full_refresh } => run(&config, pool, full_refresh).await,
        Command::Audit => audit(&config, pool).await,
    }
}

async fn run(config: &PipelineConfig, pool: sqlx::PgPool, full_refresh: bool) -> anyhow::Result<()> {
    let store = Arc::new(PostgresFactStore::new(pool.clone(), config.target_table.clone())?);
    let pipeline = BatchPipeline::new(
        Arc::new(PostgresSourceCatalog::new(pool.clone())),
        Arc::new(PostgresDimensions::new(pool)),
        store,
        config.rule_chain()?,
    );

    let options = RunOptions {
        watermark: None,
        full_refresh: full_refresh || config.full_refresh,
    };
    info!(
        table = %config.target_table,
        rule_order = %config.rule_order,
        full_refresh = options.full_refresh,
        "starting listing fact batch"
    );

    let last = LastExecution::new();
    let result = run_with_retry(RetryPolicy::from_config(config), &last, |_| pipeline.run(options)).await;

    let record = last.snapshot();
    println!("{}", serde_json::to_string_pretty(&record)?);

    result.map(|_| ()).map_err(Into::into)
}

async fn audit(config: &PipelineConfig, pool: sqlx::PgPool) -> anyhow::Result<()> {
    let store = PostgresFactStore::new(pool, config.target_table.clone())?;
    let columns = store.columns().await?;
    let audit = audit_schema(&columns, &fact_columns());

    for warning in &audit.warnings {
        warn!(table = %config.target_table, "{warning}");
    }
    println!("{}", serde_json::to_string_pretty(&audit)?);

    if !audit.is_ok() {
        anyhow::bail!(
            "schema audit of '{}' found {} problem(s)",
            config.target_table,
            audit.problems.len()
        );
    }
    info!(table = %config.target_table, "schema audit passed");
    Ok(())
}

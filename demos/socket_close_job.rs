use std::time::Duration;

use log::info;
use paging_batch_rs::{
    core::{
        item::PassThroughProcessor,
        job::{Job, JobBuilder},
        step::StepBuilder,
    },
    item::{
        delay::DelayItemProcessor,
        logger::LoggerWriter,
        paging::PagingItemReaderBuilder,
        rdbc::{sqlite_query, DatabaseItemBinder, SqliteItemWriter, SqliteQueryContextFactory},
    },
};
use serde::Serialize;
use sqlx::{
    query_builder::Separated,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    FromRow, Sqlite, SqlitePool,
};

#[derive(Debug, Clone, Serialize, FromRow)]
struct Store {
    id: i64,
    name: String,
}

struct StoreBinder;

impl DatabaseItemBinder<Store, Sqlite> for StoreBinder {
    fn bind(&self, item: &Store, mut query_builder: Separated<Sqlite, &str>) {
        query_builder.push_bind(item.id);
        query_builder.push_bind(item.name.clone());
    }
}

async fn seed(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query("CREATE TABLE store (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE TABLE store_backup (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .execute(pool)
        .await?;

    for id in 1..=3 {
        sqlx::query("INSERT INTO store (id, name) VALUES (?, 'jojoldu')")
            .bind(id)
            .execute(pool)
            .await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Prepare database
    let directory = tempfile::tempdir()?;
    let options = SqliteConnectOptions::new()
        .filename(directory.path().join("stores.db"))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?;
    seed(&pool).await?;

    // Prepare reader: one row per page, connection held for the whole step
    let reader = PagingItemReaderBuilder::<Store>::new()
        .name("store-reader")
        .page_size(1)
        .context_factory(SqliteQueryContextFactory::new(pool.clone()))
        .query(sqlite_query(
            "SELECT id, name FROM store WHERE name = 'jojoldu' ORDER BY id",
        ))
        .build()?;

    // Keep the reader's connection idle between pages
    let processor = DelayItemProcessor::new(Duration::from_secs(2));

    // Prepare writer
    let binder = StoreBinder;
    let writer = SqliteItemWriter::<Store>::new()
        .pool(&pool)
        .table("store_backup")
        .add_column("id")
        .add_column("name")
        .item_binder(&binder);

    let backup_step = StepBuilder::new("backup-stores")
        .chunk(1)
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .build();

    // Log what landed in the backup table
    let backup_reader = PagingItemReaderBuilder::<Store>::new()
        .name("store-backup-reader")
        .page_size(10)
        .context_factory(SqliteQueryContextFactory::new(pool.clone()))
        .query(sqlite_query("SELECT id, name FROM store_backup ORDER BY id"))
        .build()?;
    let logger = LoggerWriter;

    let log_step = StepBuilder::new("log-backups")
        .chunk(10)
        .reader(&backup_reader)
        .processor(&PassThroughProcessor)
        .writer(&logger)
        .build();

    let job = JobBuilder::new()
        .name("socket-close".to_string())
        .start(&backup_step)
        .next(&log_step)
        .build();
    let execution = job.run()?;

    for step in &execution.step_executions {
        info!(
            "Step {}: {:?}, read: {}, written: {}",
            step.name, step.status, step.read_count, step.write_count
        );
    }
    info!("Job finished in {:?}", execution.duration);

    Ok(())
}

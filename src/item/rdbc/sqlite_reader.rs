use std::marker::PhantomData;

use log::debug;
use sqlx::{pool::PoolConnection, sqlite::SqliteRow, FromRow, Pool, QueryBuilder, Sqlite};

use crate::item::paging::{PageRequest, QueryContext, QueryContextFactory, QueryExecutor};
use crate::BatchError;

use super::block_on;

/// Hands out one dedicated SQLite connection per reader open.
///
/// The connection is taken from the pool on `open()` and held until the
/// reader is closed, across every page fetch and every slow chunk in between.
#[derive(Clone)]
pub struct SqliteQueryContextFactory {
    pool: Pool<Sqlite>,
}

impl SqliteQueryContextFactory {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

impl QueryContextFactory for SqliteQueryContextFactory {
    type Context = SqliteQueryContext;

    fn create_context(&self) -> Result<SqliteQueryContext, BatchError> {
        let connection = block_on(self.pool.acquire())?.map_err(|err| {
            BatchError::ResourceUnavailable(format!("unable to acquire a SQLite connection: {}", err))
        })?;

        debug!("Acquired SQLite connection for paging reader");

        Ok(SqliteQueryContext {
            connection: Some(connection),
        })
    }
}

/// A pooled SQLite connection owned by one paging reader.
///
/// Rows are mapped into owned values, so there is no cached state to clear
/// and nothing to detach.
pub struct SqliteQueryContext {
    connection: Option<PoolConnection<Sqlite>>,
}

impl SqliteQueryContext {
    /// Runs `{query} LIMIT ? OFFSET ?` for the requested page.
    ///
    /// `query` must not contain its own LIMIT/OFFSET clause and should be
    /// ordered on a unique key, otherwise pages may overlap.
    pub fn fetch<I>(&mut self, query: &str, request: &PageRequest) -> Result<Vec<I>, BatchError>
    where
        for<'r> I: FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let connection = self.connection.as_mut().ok_or_else(|| {
            BatchError::InvalidState("SQLite connection already released".to_string())
        })?;

        let mut query_builder = QueryBuilder::<Sqlite>::new(query);
        query_builder
            .push(" LIMIT ")
            .push_bind(request.limit as i64)
            .push(" OFFSET ")
            .push_bind(request.offset as i64);

        let rows = block_on(
            query_builder
                .build_query_as::<I>()
                .fetch_all(&mut **connection),
        )?
        .map_err(|err| BatchError::FetchFailure(err.to_string()))?;

        Ok(rows)
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }
}

impl<I> QueryContext<I> for SqliteQueryContext {
    /// Returns the connection to the pool.
    fn close(&mut self) -> Result<(), BatchError> {
        if let Some(connection) = self.connection.take() {
            // returning a connection spawns on the runtime
            block_on(async move { drop(connection) })?;
            debug!("Released SQLite connection of paging reader");
        }
        Ok(())
    }
}

/// Paging query over a SQLite context, mapping rows with `FromRow`.
pub struct SqlitePagingQuery<I> {
    sql: String,
    _phantom: PhantomData<fn() -> I>,
}

impl<I> SqlitePagingQuery<I> {
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Creates the paging query for `sql`, a SELECT without LIMIT/OFFSET.
///
/// ```no_run
/// use paging_batch_rs::item::paging::PagingItemReaderBuilder;
/// use paging_batch_rs::item::rdbc::{sqlite_query, SqliteQueryContextFactory};
/// use sqlx::SqlitePool;
///
/// #[derive(sqlx::FromRow, Clone, Debug)]
/// struct Store {
///     id: i64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = SqlitePool::connect("sqlite://stores.db").await?;
///
/// let reader = PagingItemReaderBuilder::<Store>::new()
///     .name("store-reader")
///     .page_size(100)
///     .context_factory(SqliteQueryContextFactory::new(pool))
///     .query(sqlite_query("SELECT id, name FROM store WHERE name = 'jojoldu' ORDER BY id"))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub fn sqlite_query<I>(sql: &str) -> SqlitePagingQuery<I> {
    SqlitePagingQuery {
        sql: sql.to_string(),
        _phantom: PhantomData,
    }
}

impl<I> QueryExecutor<SqliteQueryContext, I> for SqlitePagingQuery<I>
where
    for<'r> I: FromRow<'r, SqliteRow> + Send + Unpin,
{
    fn fetch_page(
        &self,
        context: &mut SqliteQueryContext,
        request: &PageRequest,
    ) -> Result<Vec<I>, BatchError> {
        context.fetch(&self.sql, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::item::ItemReader;
    use crate::item::paging::{PagingItemReaderBuilder, ReaderState};
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    #[derive(Debug, Clone, PartialEq, FromRow)]
    struct Store {
        id: i64,
        name: String,
    }

    async fn setup_test_pool(
        rows: i64,
    ) -> Result<(Pool<Sqlite>, tempfile::TempDir), Box<dyn std::error::Error>> {
        let directory = tempfile::tempdir()?;
        let options = SqliteConnectOptions::new()
            .filename(directory.path().join("stores.db"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        sqlx::query("CREATE TABLE store (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(&pool)
            .await?;

        for id in 1..=rows {
            sqlx::query("INSERT INTO store (id, name) VALUES (?, ?)")
                .bind(id)
                .bind(format!("store-{}", id))
                .execute(&pool)
                .await?;
        }

        Ok((pool, directory))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn should_fetch_requested_window() -> Result<(), Box<dyn std::error::Error>> {
        let (pool, _directory) = setup_test_pool(5).await?;
        let factory = SqliteQueryContextFactory::new(pool);

        let mut context = factory.create_context()?;
        let stores: Vec<Store> =
            context.fetch("SELECT id, name FROM store ORDER BY id", &PageRequest::new(1, 2))?;

        assert_eq!(
            stores,
            vec![
                Store {
                    id: 3,
                    name: "store-3".to_string()
                },
                Store {
                    id: 4,
                    name: "store-4".to_string()
                },
            ]
        );

        QueryContext::<Store>::close(&mut context)?;
        assert!(!context.is_open());

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn should_fail_fetch_after_close() -> Result<(), Box<dyn std::error::Error>> {
        let (pool, _directory) = setup_test_pool(1).await?;
        let mut context = SqliteQueryContextFactory::new(pool).create_context()?;

        QueryContext::<Store>::close(&mut context)?;
        QueryContext::<Store>::close(&mut context)?;

        let result = context.fetch::<Store>("SELECT id, name FROM store", &PageRequest::new(0, 1));
        assert!(matches!(result, Err(BatchError::InvalidState(_))));

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn should_report_sql_errors_as_fetch_failures() -> Result<(), Box<dyn std::error::Error>>
    {
        let (pool, _directory) = setup_test_pool(1).await?;
        let mut context = SqliteQueryContextFactory::new(pool).create_context()?;

        let result = context.fetch::<Store>("SELECT id, name FROM missing", &PageRequest::new(0, 1));

        assert!(matches!(result, Err(BatchError::FetchFailure(_))));

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn should_report_closed_pool_as_resource_unavailable(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (pool, _directory) = setup_test_pool(0).await?;
        pool.close().await;

        let result = SqliteQueryContextFactory::new(pool).create_context();

        assert!(matches!(result, Err(BatchError::ResourceUnavailable(_))));

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn paging_reader_should_read_all_rows() -> Result<(), Box<dyn std::error::Error>> {
        let (pool, _directory) = setup_test_pool(10).await?;

        let reader = PagingItemReaderBuilder::<Store>::new()
            .page_size(3)
            .context_factory(SqliteQueryContextFactory::new(pool))
            .query(sqlite_query("SELECT id, name FROM store ORDER BY id"))
            .build()?;

        reader.open()?;
        let mut ids = Vec::new();
        while let Some(store) = reader.read()? {
            ids.push(store.id);
        }
        reader.close()?;

        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
        assert_eq!(reader.page(), 0);
        assert_eq!(reader.state(), ReaderState::Closed);

        Ok(())
    }
}

use sqlx::{Pool, QueryBuilder, Sqlite};

use crate::core::item::{ItemWriter, ItemWriterResult};
use crate::item::rdbc::{block_on, DatabaseItemBinder};
use crate::BatchError;

// SQLITE_MAX_VARIABLE_NUMBER since SQLite 3.32
const BIND_LIMIT: usize = 32766;

/// A writer for inserting items into a SQLite table using SQLx.
///
/// Each chunk becomes one multi-row `INSERT` (split further if the chunk
/// would exceed SQLite's bound parameter limit). Values are bound through a
/// [`DatabaseItemBinder`].
pub struct SqliteItemWriter<'a, O> {
    pool: Option<&'a Pool<Sqlite>>,
    table: Option<&'a str>,
    columns: Vec<&'a str>,
    item_binder: Option<&'a dyn DatabaseItemBinder<O, Sqlite>>,
}

impl<O> Default for SqliteItemWriter<'_, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, O> SqliteItemWriter<'a, O> {
    /// Creates an unconfigured writer. Pool, table, columns and binder must be
    /// set before the first write.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use paging_batch_rs::item::rdbc::{DatabaseItemBinder, SqliteItemWriter};
    /// use sqlx::{query_builder::Separated, Sqlite, SqlitePool};
    ///
    /// struct Store {
    ///     id: i64,
    ///     name: String,
    /// }
    ///
    /// struct StoreBinder;
    ///
    /// impl DatabaseItemBinder<Store, Sqlite> for StoreBinder {
    ///     fn bind(&self, item: &Store, mut query_builder: Separated<Sqlite, &str>) {
    ///         query_builder.push_bind(item.id);
    ///         query_builder.push_bind(item.name.clone());
    ///     }
    /// }
    ///
    /// # async fn example() -> Result<(), sqlx::Error> {
    /// let pool = SqlitePool::connect("sqlite://stores.db").await?;
    /// let binder = StoreBinder;
    ///
    /// let writer = SqliteItemWriter::<Store>::new()
    ///     .pool(&pool)
    ///     .table("store_backup")
    ///     .add_column("id")
    ///     .add_column("name")
    ///     .item_binder(&binder);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new() -> Self {
        Self {
            pool: None,
            table: None,
            columns: Vec::new(),
            item_binder: None,
        }
    }

    /// Sets the connection pool used for inserts.
    ///
    /// Each chunk takes a connection from the pool for the duration of its
    /// `INSERT`, so a pool shared with a paging reader needs at least two
    /// connections.
    ///
    /// # Arguments
    ///
    /// * `pool` - The SQLite connection pool
    pub fn pool(mut self, pool: &'a Pool<Sqlite>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Sets the table to insert into.
    ///
    /// # Arguments
    ///
    /// * `table` - Name of the target table, written into the SQL as is
    pub fn table(mut self, table: &'a str) -> Self {
        self.table = Some(table);
        self
    }

    /// Adds a column. Columns are bound in the order they are added.
    ///
    /// # Arguments
    ///
    /// * `column` - Name of the column; the binder must push one value per column
    pub fn add_column(mut self, column: &'a str) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the binder that turns an item into the values of one row.
    ///
    /// # Arguments
    ///
    /// * `item_binder` - Binder pushing the item's values in column order
    pub fn item_binder(mut self, item_binder: &'a dyn DatabaseItemBinder<O, Sqlite>) -> Self {
        self.item_binder = Some(item_binder);
        self
    }

    fn configuration(
        &self,
    ) -> Result<(&'a Pool<Sqlite>, &'a str, &'a dyn DatabaseItemBinder<O, Sqlite>), BatchError> {
        match (self.pool, self.table, self.item_binder) {
            (Some(pool), Some(table), Some(item_binder)) if !self.columns.is_empty() => {
                Ok((pool, table, item_binder))
            }
            _ => Err(BatchError::Configuration(
                "SQLite writer needs a pool, a table, columns and an item binder".to_string(),
            )),
        }
    }
}

impl<O> ItemWriter<O> for SqliteItemWriter<'_, O> {
    /// Inserts the chunk into the configured table.
    ///
    /// # Errors
    ///
    /// - `BatchError::Configuration` if the writer is incomplete
    /// - `BatchError::ItemWriter` for database errors (constraint violations,
    ///   missing table...)
    fn write(&self, items: &[O]) -> ItemWriterResult {
        if items.is_empty() {
            return Ok(());
        }

        let (pool, table, item_binder) = self.configuration()?;

        for batch in items.chunks(BIND_LIMIT / self.columns.len()) {
            let mut query_builder = QueryBuilder::new("INSERT INTO ");
            query_builder.push(table);
            query_builder.push(" (");
            query_builder.push(self.columns.join(","));
            query_builder.push(") ");

            query_builder.push_values(batch, |b, item| {
                item_binder.bind(item, b);
            });

            let query = query_builder.build();

            match block_on(query.execute(pool))? {
                Ok(_) => {
                    log::debug!(
                        "Successfully wrote {} items to SQLite table {}",
                        batch.len(),
                        table
                    );
                }
                Err(e) => {
                    log::error!("Failed to write items to SQLite table {}: {}", table, e);
                    return Err(BatchError::ItemWriter(format!(
                        "SQLite write failed: {}",
                        e
                    )));
                }
            }
        }

        Ok(())
    }
}

use std::future::Future;

use sqlx::{query_builder::Separated, Database};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::BatchError;

#[cfg(feature = "rdbc-sqlite")]
/// SQLite query-execution context and paging query for the paging reader.
pub mod sqlite_reader;

#[cfg(feature = "rdbc-sqlite")]
/// SQLite batch insert writer.
pub mod sqlite_writer;

/// Trait for binding item data to database query parameters.
///
/// Generic over the SQLx database type so the same binder shape works for
/// every backend writer.
///
/// ```
/// use paging_batch_rs::item::rdbc::DatabaseItemBinder;
/// use sqlx::{query_builder::Separated, Sqlite};
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
/// ```
pub trait DatabaseItemBinder<O, DB: Database> {
    /// Binds the properties of an item to a separated query builder.
    ///
    /// # Arguments
    ///
    /// * `item` - The item whose properties should be bound.
    /// * `query_builder` - The separated query builder to bind parameters to.
    fn bind(&self, item: &O, query_builder: Separated<DB, &str>);
}

/// Runs a SQLx future from synchronous item code.
///
/// The current worker is handed over with `block_in_place` while the future
/// runs, so only a multi-threaded tokio runtime can drive it.
///
/// # Errors
///
/// `BatchError::InvalidState` when called outside a tokio runtime or on a
/// current-thread runtime.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output, BatchError> {
    let handle = Handle::try_current()
        .map_err(|err| BatchError::InvalidState(format!("no tokio runtime available: {}", err)))?;

    if handle.runtime_flavor() != RuntimeFlavor::MultiThread {
        return Err(BatchError::InvalidState(format!(
            "database access requires a multi-threaded tokio runtime, found {:?}",
            handle.runtime_flavor()
        )));
    }

    Ok(tokio::task::block_in_place(|| handle.block_on(future)))
}

#[cfg(feature = "rdbc-sqlite")]
pub use sqlite_reader::{
    sqlite_query, SqlitePagingQuery, SqliteQueryContext, SqliteQueryContextFactory,
};
#[cfg(feature = "rdbc-sqlite")]
pub use sqlite_writer::SqliteItemWriter;

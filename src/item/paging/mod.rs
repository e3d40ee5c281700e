//! Generic paging item reader.
//!
//! The reader pulls records from a backing store one page at a time through
//! three collaborators supplied by the application:
//!
//! - a [`QueryContextFactory`] that acquires a fresh query-execution context
//!   (a connection, a session...) each time the reader is opened,
//! - the [`QueryContext`] itself, which the reader clears before each fetch
//!   in transacted mode or uses to detach every fetched record otherwise,
//! - a [`QueryExecutor`] that turns a [`PageRequest`] into records.
//!
//! Closures implement both [`QueryContextFactory`] (`Fn() -> Result<C, BatchError>`)
//! and [`QueryExecutor`] (`Fn(&mut C, &PageRequest) -> Result<Vec<I>, BatchError>`).
//!
//! # Examples
//!
//! ```
//! use paging_batch_rs::core::item::ItemReader;
//! use paging_batch_rs::item::paging::{
//!     PageRequest, PagingItemReaderBuilder, QueryContext, QueryContextFactory,
//! };
//! use paging_batch_rs::BatchError;
//!
//! struct Session {
//!     rows: Vec<String>,
//! }
//!
//! impl QueryContext<String> for Session {}
//!
//! struct Sessions(Vec<String>);
//!
//! impl QueryContextFactory for Sessions {
//!     type Context = Session;
//!
//!     fn create_context(&self) -> Result<Session, BatchError> {
//!         Ok(Session { rows: self.0.clone() })
//!     }
//! }
//!
//! let stores = vec!["north".to_string(), "south".to_string(), "east".to_string()];
//!
//! let reader = PagingItemReaderBuilder::<String>::new()
//!     .page_size(2)
//!     .context_factory(Sessions(stores))
//!     .query(
//!         |session: &mut Session, request: &PageRequest| -> Result<Vec<String>, BatchError> {
//!             Ok(session
//!                 .rows
//!                 .iter()
//!                 .skip(request.offset)
//!                 .take(request.limit)
//!                 .cloned()
//!                 .collect())
//!         },
//!     )
//!     .build()?;
//!
//! reader.open()?;
//! let mut names = Vec::new();
//! while let Some(name) = reader.read()? {
//!     names.push(name);
//! }
//! reader.close()?;
//!
//! assert_eq!(names, vec!["north", "south", "east"]);
//! # Ok::<(), BatchError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::BatchError;

/// Paging item reader implementation.
pub mod paging_reader;

pub use paging_reader::{PagingItemReader, PagingItemReaderBuilder, ReaderState};

/// One page fetch: the page index and the matching offset/limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Zero-based index of the requested page
    pub page: usize,
    /// Number of records to skip, always `page * limit`
    pub offset: usize,
    /// Maximum number of records to return (the page size)
    pub limit: usize,
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page,
            offset: page * page_size,
            limit: page_size,
        }
    }
}

/// Live connection to the backing store, owned by one reader for one
/// open/close cycle.
///
/// All methods default to no-ops, which suits contexts whose records are
/// plain owned values.
pub trait QueryContext<I> {
    /// Drops any state cached by the context. Called immediately before each
    /// page fetch when the reader is transacted.
    fn clear(&mut self) {}

    /// Returns a copy of `item` that no longer depends on this context.
    /// Called for every fetched record when the reader is not transacted.
    fn detach(&mut self, item: I) -> I {
        item
    }

    /// Releases the underlying resource.
    fn close(&mut self) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Acquires a new query-execution context when a reader is opened.
pub trait QueryContextFactory {
    type Context;

    fn create_context(&self) -> Result<Self::Context, BatchError>;
}

impl<C, F> QueryContextFactory for F
where
    F: Fn() -> Result<C, BatchError>,
{
    type Context = C;

    fn create_context(&self) -> Result<C, BatchError> {
        self()
    }
}

/// Turns a page request into the records of that page, in a stable order.
pub trait QueryExecutor<C, I> {
    fn fetch_page(&self, context: &mut C, request: &PageRequest) -> Result<Vec<I>, BatchError>;
}

impl<C, I, F> QueryExecutor<C, I> for F
where
    F: Fn(&mut C, &PageRequest) -> Result<Vec<I>, BatchError>,
{
    fn fetch_page(&self, context: &mut C, request: &PageRequest) -> Result<Vec<I>, BatchError> {
        self(context, request)
    }
}

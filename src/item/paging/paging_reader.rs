use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

use crate::core::build_name;
use crate::core::item::{ItemReader, ItemReaderResult};
use crate::BatchError;

use super::{PageRequest, QueryContext, QueryContextFactory, QueryExecutor};

/// Lifecycle of a paging reader.
///
/// `Closed → Opened → Exhausted → Closed`. Fetching a page and serving items
/// from the buffer both happen while `Opened`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Closed,
    Opened,
    Exhausted,
}

/// Mutable part of the reader, guarded by a single lock.
struct PagingState<C, I> {
    status: ReaderState,
    context: Option<C>,
    /// Index of the next page to fetch
    page: usize,
    /// Remaining records of the most recently fetched page
    buffer: VecDeque<I>,
    /// False once a page came back shorter than the page size
    more_pages: bool,
    item_count: usize,
}

impl<C, I> PagingState<C, I> {
    fn closed() -> Self {
        Self {
            status: ReaderState::Closed,
            context: None,
            page: 0,
            buffer: VecDeque::new(),
            more_pages: true,
            item_count: 0,
        }
    }

    fn opened(context: C) -> Self {
        Self {
            status: ReaderState::Opened,
            context: Some(context),
            ..Self::closed()
        }
    }
}

/// Item reader that fetches records page by page through a [`QueryExecutor`].
///
/// # How pagination works
///
/// - `open()` acquires a query-execution context from the factory and resets
///   the page cursor to 0.
/// - `read()` serves records from the current page. When the page is drained,
///   page N is fetched with `offset = N * page_size` and `limit = page_size`,
///   and the cursor moves to N + 1.
/// - A page shorter than `page_size` is the last one: once it is drained the
///   reader reports end of data without another fetch. An empty page also
///   ends the data, so a store holding an exact multiple of `page_size`
///   records costs one extra, empty fetch.
/// - `close()` releases the context. It is idempotent.
///
/// # Transacted and detached reads
///
/// In transacted mode (the default) the context is cleared immediately before
/// every fetch and records are handed out as fetched. Otherwise each record is
/// passed through [`QueryContext::detach`] right after the fetch so it stays
/// valid once the context is closed.
///
/// # Thread Safety
///
/// The cursor, buffer and context live behind one mutex. Consecutive calls may
/// come from different threads; a freshly fetched page always replaces the
/// buffer instead of refilling it in place.
pub struct PagingItemReader<I, F, Q>
where
    F: QueryContextFactory,
{
    name: String,
    context_factory: F,
    query: Q,
    page_size: usize,
    transacted: bool,
    max_item_count: Option<usize>,
    state: Mutex<PagingState<F::Context, I>>,
}

impl<I, F, Q> PagingItemReader<I, F, Q>
where
    F: QueryContextFactory,
    F::Context: QueryContext<I>,
    Q: QueryExecutor<F::Context, I>,
{
    pub fn builder() -> PagingItemReaderBuilder<I> {
        PagingItemReaderBuilder::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn is_transacted(&self) -> bool {
        self.transacted
    }

    pub fn state(&self) -> ReaderState {
        self.lock_unpoisoned().status
    }

    /// Index of the next page to fetch.
    pub fn page(&self) -> usize {
        self.lock_unpoisoned().page
    }

    /// Number of items served since the last open.
    pub fn item_count(&self) -> usize {
        self.lock_unpoisoned().item_count
    }

    /// Seeking is not supported: restarting a step replays from page 0.
    pub fn jump_to_page(&self, page: usize) {
        debug!(
            "Reader {}: ignoring jump to page {}, seeking is not supported",
            self.name, page
        );
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, PagingState<F::Context, I>>, BatchError> {
        self.state.lock().map_err(|_| {
            BatchError::InvalidState(format!("reader {} state lock is poisoned", self.name))
        })
    }

    /// Open, close and the getters stay usable after a panic in another caller.
    fn lock_unpoisoned(&self) -> MutexGuard<'_, PagingState<F::Context, I>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches the page under the cursor and swaps it in as the new buffer.
    ///
    /// Nothing is changed when the fetch fails: the cursor stays on the same
    /// page and the buffer stays empty.
    fn read_page(&self, state: &mut PagingState<F::Context, I>) -> Result<(), BatchError> {
        let request = PageRequest::new(state.page, self.page_size);

        let context = state.context.as_mut().ok_or_else(|| {
            BatchError::InvalidState(format!("reader {} has no open context", self.name))
        })?;

        if self.transacted {
            context.clear();
        }

        debug!(
            "Reader {}: fetching page {} (offset {}, limit {})",
            self.name, request.page, request.offset, request.limit
        );

        let mut records = self
            .query
            .fetch_page(context, &request)
            .map_err(|err| {
                error!("Reader {}: page {} fetch failed: {}", self.name, request.page, err);
                into_fetch_failure(err)
            })?;

        if records.len() > self.page_size {
            warn!(
                "Reader {}: page {} returned {} records, keeping the first {}",
                self.name,
                request.page,
                records.len(),
                self.page_size
            );
            records.truncate(self.page_size);
        }

        let page: VecDeque<I> = if self.transacted {
            records.into()
        } else {
            records
                .into_iter()
                .map(|record| context.detach(record))
                .collect()
        };

        state.more_pages = page.len() == self.page_size;
        state.page += 1;
        state.buffer = page;

        Ok(())
    }
}

impl<I, F, Q> ItemReader<I> for PagingItemReader<I, F, Q>
where
    F: QueryContextFactory,
    F::Context: QueryContext<I>,
    Q: QueryExecutor<F::Context, I>,
{
    /// Acquires a new context and rewinds the reader to page 0.
    ///
    /// An already open reader releases its previous context first.
    ///
    /// # Errors
    ///
    /// `BatchError::ResourceUnavailable` when the factory cannot provide a
    /// context. The reader is left closed.
    fn open(&self) -> Result<(), BatchError> {
        let mut state = self.lock_unpoisoned();

        if let Some(mut previous) = state.context.take() {
            warn!("Reader {}: reopened while open, releasing previous context", self.name);
            if let Err(err) = previous.close() {
                warn!("Reader {}: previous context close failed: {}", self.name, err);
            }
        }
        *state = PagingState::closed();

        let context = self.context_factory.create_context().map_err(|err| {
            error!("Reader {}: unable to obtain a query context: {}", self.name, err);
            into_resource_unavailable(err)
        })?;

        *state = PagingState::opened(context);

        info!(
            "Reader {} opened (page size: {}, transacted: {})",
            self.name, self.page_size, self.transacted
        );

        Ok(())
    }

    /// Reads the next record.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(item))` for the next record in store order
    /// - `Ok(None)` once the store is exhausted (or `max_item_count` is reached)
    /// - `Err(BatchError::FetchFailure)` when fetching a page failed
    /// - `Err(BatchError::InvalidState)` when the reader is not open
    fn read(&self) -> ItemReaderResult<I> {
        let mut state = self.lock_state()?;

        match state.status {
            ReaderState::Closed => {
                return Err(BatchError::InvalidState(format!(
                    "reader {} is not open",
                    self.name
                )));
            }
            ReaderState::Exhausted => return Ok(None),
            ReaderState::Opened => {}
        }

        if self
            .max_item_count
            .is_some_and(|max_item_count| state.item_count >= max_item_count)
        {
            debug!("Reader {}: max item count reached", self.name);
            state.status = ReaderState::Exhausted;
            return Ok(None);
        }

        if state.buffer.is_empty() {
            if state.more_pages {
                self.read_page(&mut state)?;
            }

            if state.buffer.is_empty() {
                debug!(
                    "Reader {}: end of data after {} items and {} pages",
                    self.name, state.item_count, state.page
                );
                state.status = ReaderState::Exhausted;
                return Ok(None);
            }
        }

        let item = state.buffer.pop_front();
        if item.is_some() {
            state.item_count += 1;
        }

        Ok(item)
    }

    /// Releases the context. Closing a closed or never opened reader is a no-op.
    fn close(&self) -> Result<(), BatchError> {
        let mut state = self.lock_unpoisoned();

        let context = state.context.take();
        *state = PagingState::closed();

        match context {
            Some(mut context) => {
                context.close()?;
                info!("Reader {} closed", self.name);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn into_fetch_failure(err: BatchError) -> BatchError {
    match err {
        BatchError::FetchFailure(_) => err,
        other => BatchError::FetchFailure(other.to_string()),
    }
}

fn into_resource_unavailable(err: BatchError) -> BatchError {
    match err {
        BatchError::ResourceUnavailable(_) => err,
        other => BatchError::ResourceUnavailable(other.to_string()),
    }
}

/// Builder for [`PagingItemReader`].
///
/// The context factory and the query are tracked in the builder's type, so a
/// reader cannot be built without them.
pub struct PagingItemReaderBuilder<I, F = (), Q = ()> {
    name: Option<String>,
    context_factory: F,
    query: Q,
    page_size: usize,
    transacted: bool,
    max_item_count: Option<usize>,
    _phantom: PhantomData<fn() -> I>,
}

impl<I> Default for PagingItemReaderBuilder<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> PagingItemReaderBuilder<I> {
    /// Creates a builder with a page size of 10, transacted reads and no
    /// item limit.
    pub fn new() -> Self {
        Self {
            name: None,
            context_factory: (),
            query: (),
            page_size: 10,
            transacted: true,
            max_item_count: None,
            _phantom: PhantomData,
        }
    }
}

impl<I, F, Q> PagingItemReaderBuilder<I, F, Q> {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Number of records fetched per round trip. Must be positive.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Selects transacted (`true`, default) or detached (`false`) reads.
    pub fn transacted(mut self, transacted: bool) -> Self {
        self.transacted = transacted;
        self
    }

    /// Stops the reader after `max_item_count` items.
    pub fn max_item_count(mut self, max_item_count: usize) -> Self {
        self.max_item_count = Some(max_item_count);
        self
    }

    pub fn context_factory<F2>(self, context_factory: F2) -> PagingItemReaderBuilder<I, F2, Q> {
        PagingItemReaderBuilder {
            name: self.name,
            context_factory,
            query: self.query,
            page_size: self.page_size,
            transacted: self.transacted,
            max_item_count: self.max_item_count,
            _phantom: PhantomData,
        }
    }

    pub fn query<Q2>(self, query: Q2) -> PagingItemReaderBuilder<I, F, Q2> {
        PagingItemReaderBuilder {
            name: self.name,
            context_factory: self.context_factory,
            query,
            page_size: self.page_size,
            transacted: self.transacted,
            max_item_count: self.max_item_count,
            _phantom: PhantomData,
        }
    }
}

impl<I, F, Q> PagingItemReaderBuilder<I, F, Q>
where
    F: QueryContextFactory,
    F::Context: QueryContext<I>,
    Q: QueryExecutor<F::Context, I>,
{
    /// Builds the reader in the `Closed` state.
    ///
    /// # Errors
    ///
    /// `BatchError::Configuration` when the page size is zero.
    pub fn build(self) -> Result<PagingItemReader<I, F, Q>, BatchError> {
        if self.page_size == 0 {
            return Err(BatchError::Configuration(
                "page size must be greater than zero".to_string(),
            ));
        }

        Ok(PagingItemReader {
            name: self.name.unwrap_or_else(build_name),
            context_factory: self.context_factory,
            query: self.query,
            page_size: self.page_size,
            transacted: self.transacted,
            max_item_count: self.max_item_count,
            state: Mutex::new(PagingState::closed()),
        })
    }
}

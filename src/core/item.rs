use crate::error::BatchError;

/// Result of a single read: `Ok(Some(item))`, `Ok(None)` at end of data, or an error.
pub type ItemReaderResult<I> = Result<Option<I>, BatchError>;

/// Result of processing one item.
pub type ItemProcessorResult<O> = Result<O, BatchError>;

/// Result of writing a chunk of items.
pub type ItemWriterResult = Result<(), BatchError>;

/// Pull-based source of items for a chunk-oriented step.
///
/// The step calls `open` once before any read, `read` until it returns
/// `Ok(None)` (or fails), and `close` exactly once afterwards, including when
/// the step aborts. Readers without resources can rely on the default
/// `open`/`close` implementations.
pub trait ItemReader<I> {
    /// Reads the next item, or `Ok(None)` when the source is exhausted.
    fn read(&self) -> ItemReaderResult<I>;

    /// Acquires whatever the reader needs before the first read.
    fn open(&self) -> Result<(), BatchError> {
        Ok(())
    }

    /// Releases the reader's resources. Must be safe to call more than once.
    fn close(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Business logic applied to each item between read and write.
pub trait ItemProcessor<I, O> {
    fn process(&self, item: &I) -> ItemProcessorResult<O>;
}

/// Output side of a chunk-oriented step, invoked once per chunk.
pub trait ItemWriter<O> {
    fn write(&self, items: &[O]) -> ItemWriterResult;

    fn flush(&self) -> ItemWriterResult {
        Ok(())
    }

    fn open(&self) -> ItemWriterResult {
        Ok(())
    }

    fn close(&self) -> ItemWriterResult {
        Ok(())
    }
}

/// Processor that hands every item through unchanged.
#[derive(Default)]
pub struct PassThroughProcessor;

impl<I: Clone> ItemProcessor<I, I> for PassThroughProcessor {
    fn process(&self, item: &I) -> ItemProcessorResult<I> {
        Ok(item.clone())
    }
}

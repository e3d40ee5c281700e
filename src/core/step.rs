use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::BatchError;

use super::{
    build_name,
    item::{ItemProcessor, ItemReader, ItemWriter},
};

/// Outcome of reading one chunk.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ChunkStatus {
    /// The chunk holds `chunk_size` items and the reader may have more.
    Full,
    /// The reader signalled end of data while filling this chunk.
    Finished,
}

/// Status of a step execution.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum StepStatus {
    Starting,
    Started,
    Success,
    ReadError,
    ProcessorError,
    WriteError,
}

/// Runtime details of one step execution: status, timing and item counters.
#[derive(Debug)]
pub struct StepExecution {
    /// Unique identifier for this step execution
    pub id: Uuid,
    /// Name of the executed step
    pub name: String,
    /// Current status of the step execution
    pub status: StepStatus,
    pub start_time: Instant,
    pub end_time: Instant,
    pub duration: Duration,
    /// Number of items successfully read
    pub read_count: usize,
    /// Number of items successfully written
    pub write_count: usize,
    /// Number of errors encountered during reading
    pub read_error_count: usize,
    /// Number of errors encountered during processing
    pub process_error_count: usize,
    /// Number of items whose write failed
    pub write_error_count: usize,
}

impl StepExecution {
    pub fn new(name: &str) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: StepStatus::Starting,
            start_time: now,
            end_time: now,
            duration: Duration::ZERO,
            read_count: 0,
            write_count: 0,
            read_error_count: 0,
            process_error_count: 0,
            write_error_count: 0,
        }
    }
}

/// A unit of work inside a job.
pub trait Step {
    /// Name used in logs and in the error reported when the step fails.
    fn get_name(&self) -> &str;

    /// Executes the step, recording its progress in `step_execution`.
    ///
    /// # Returns
    /// - `Ok(())` when the step completed successfully
    /// - `Err(BatchError::Step)` when the step failed; the cause is logged and
    ///   the failing phase is reflected in `step_execution.status`
    fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError>;
}

/// Step that reads items one at a time, groups them into chunks, and
/// processes and writes each chunk.
///
/// Every failure is fatal to the step: nothing is skipped or retried. The
/// reader and the writer are closed on every exit path.
pub struct ChunkOrientedStep<'a, I, O> {
    name: String,
    /// Component responsible for reading items from the source
    reader: &'a dyn ItemReader<I>,
    /// Component responsible for processing items
    processor: &'a dyn ItemProcessor<I, O>,
    /// Component responsible for writing items to the destination
    writer: &'a dyn ItemWriter<O>,
    /// Number of items to process in each chunk
    chunk_size: usize,
}

impl<I, O> Step for ChunkOrientedStep<'_, I, O> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
        let start_time = Instant::now();
        step_execution.status = StepStatus::Started;

        info!(
            "Start of step: {}, id: {}",
            step_execution.name, step_execution.id
        );

        let result = self.run_chunks(step_execution);

        // Closed whatever happened above, including a failed open
        Self::manage_error(self.reader.close());
        Self::manage_error(self.writer.close());

        step_execution.start_time = start_time;
        step_execution.end_time = Instant::now();
        step_execution.duration = start_time.elapsed();

        if result.is_ok() {
            step_execution.status = StepStatus::Success;
        }

        info!(
            "End of step: {}, id: {}, status: {:?}",
            step_execution.name, step_execution.id, step_execution.status
        );

        result.map_err(|err| {
            error!("Step {} failed: {}", step_execution.name, err);
            BatchError::Step(step_execution.name.clone())
        })
    }
}

impl<I, O> ChunkOrientedStep<'_, I, O> {
    fn run_chunks(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
        if let Err(err) = self.reader.open() {
            step_execution.status = StepStatus::ReadError;
            return Err(err);
        }

        if let Err(err) = self.writer.open() {
            step_execution.status = StepStatus::WriteError;
            return Err(err);
        }

        loop {
            let (read_items, chunk_status) = self.read_chunk(step_execution)?;

            let processed_items = self.process_chunk(step_execution, &read_items)?;

            self.write_chunk(step_execution, &processed_items)?;

            if chunk_status == ChunkStatus::Finished {
                return Ok(());
            }
        }
    }

    /// Reads up to `chunk_size` items.
    ///
    /// # Returns
    /// - `Ok((items, ChunkStatus::Full))`: the chunk is full
    /// - `Ok((items, ChunkStatus::Finished))`: the reader is exhausted
    /// - `Err(BatchError)`: the reader failed
    fn read_chunk(
        &self,
        step_execution: &mut StepExecution,
    ) -> Result<(Vec<I>, ChunkStatus), BatchError> {
        debug!("Start reading chunk");

        let mut read_items = Vec::with_capacity(self.chunk_size);

        loop {
            match self.reader.read() {
                Ok(Some(item)) => {
                    read_items.push(item);
                    step_execution.read_count += 1;

                    if read_items.len() >= self.chunk_size {
                        debug!("End reading chunk: FULL");
                        return Ok((read_items, ChunkStatus::Full));
                    }
                }
                Ok(None) => {
                    debug!("End reading chunk: FINISHED");
                    return Ok((read_items, ChunkStatus::Finished));
                }
                Err(err) => {
                    warn!("Error reading item: {}", err);
                    step_execution.read_error_count += 1;
                    step_execution.status = StepStatus::ReadError;
                    return Err(err);
                }
            }
        }
    }

    fn process_chunk(
        &self,
        step_execution: &mut StepExecution,
        read_items: &[I],
    ) -> Result<Vec<O>, BatchError> {
        debug!("Processing chunk of {} items", read_items.len());
        let mut result = Vec::with_capacity(read_items.len());

        for item in read_items {
            match self.processor.process(item) {
                Ok(processed_item) => result.push(processed_item),
                Err(err) => {
                    warn!("Error processing item: {}", err);
                    step_execution.process_error_count += 1;
                    step_execution.status = StepStatus::ProcessorError;
                    return Err(err);
                }
            }
        }

        Ok(result)
    }

    fn write_chunk(
        &self,
        step_execution: &mut StepExecution,
        processed_items: &[O],
    ) -> Result<(), BatchError> {
        if processed_items.is_empty() {
            debug!("No items to write, skipping write call");
            return Ok(());
        }

        debug!("Writing chunk of {} items", processed_items.len());

        let result = self
            .writer
            .write(processed_items)
            .and_then(|()| self.writer.flush());

        match result {
            Ok(()) => {
                step_execution.write_count += processed_items.len();
                Ok(())
            }
            Err(err) => {
                warn!("Error writing items: {}", err);
                step_execution.write_error_count += processed_items.len();
                step_execution.status = StepStatus::WriteError;
                Err(err)
            }
        }
    }

    /// Logs errors from operations that must not change the step outcome.
    fn manage_error(result: Result<(), BatchError>) {
        if let Err(err) = result {
            warn!("Non-fatal error: {}", err);
        }
    }
}

pub struct ChunkOrientedStepBuilder<'a, I, O> {
    name: String,
    reader: Option<&'a dyn ItemReader<I>>,
    processor: Option<&'a dyn ItemProcessor<I, O>>,
    writer: Option<&'a dyn ItemWriter<O>>,
    chunk_size: usize,
}

impl<'a, I, O> ChunkOrientedStepBuilder<'a, I, O> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reader: None,
            processor: None,
            writer: None,
            chunk_size: 10,
        }
    }

    pub fn reader(mut self, reader: &'a dyn ItemReader<I>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn processor(mut self, processor: &'a dyn ItemProcessor<I, O>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn writer(mut self, writer: &'a dyn ItemWriter<O>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Sets the commit interval. A size of zero is treated as one.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn build(self) -> ChunkOrientedStep<'a, I, O> {
        ChunkOrientedStep {
            name: self.name,
            reader: self.reader.expect("Reader is required for building a step"),
            processor: self
                .processor
                .expect("Processor is required for building a step"),
            writer: self.writer.expect("Writer is required for building a step"),
            chunk_size: self.chunk_size,
        }
    }
}

/// Entry point for building steps.
///
/// ```
/// use paging_batch_rs::core::item::{ItemReader, ItemReaderResult, ItemWriter, PassThroughProcessor};
/// use paging_batch_rs::core::step::{Step, StepBuilder, StepExecution, StepStatus};
/// use paging_batch_rs::BatchError;
/// use std::cell::RefCell;
///
/// struct Countdown(RefCell<u32>);
///
/// impl ItemReader<u32> for Countdown {
///     fn read(&self) -> ItemReaderResult<u32> {
///         let mut left = self.0.borrow_mut();
///         if *left == 0 {
///             return Ok(None);
///         }
///         *left -= 1;
///         Ok(Some(*left))
///     }
/// }
///
/// struct Discard;
///
/// impl ItemWriter<u32> for Discard {
///     fn write(&self, _items: &[u32]) -> Result<(), BatchError> {
///         Ok(())
///     }
/// }
///
/// let reader = Countdown(RefCell::new(3));
/// let step = StepBuilder::new("countdown")
///     .chunk(2)
///     .reader(&reader)
///     .processor(&PassThroughProcessor)
///     .writer(&Discard)
///     .build();
///
/// let mut execution = StepExecution::new(step.get_name());
/// step.execute(&mut execution).unwrap();
/// assert_eq!(execution.status, StepStatus::Success);
/// assert_eq!(execution.write_count, 3);
/// ```
pub struct StepBuilder {
    name: String,
}

impl StepBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Creates a builder whose step gets a random name.
    pub fn unnamed() -> Self {
        Self::new(&build_name())
    }

    pub fn chunk<'a, I, O>(self, chunk_size: usize) -> ChunkOrientedStepBuilder<'a, I, O> {
        ChunkOrientedStepBuilder::new(&self.name).chunk_size(chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::sync::{Mutex, Once};

    use super::*;
    use crate::core::item::{ItemReaderResult, ItemWriterResult, PassThroughProcessor};

    struct VecReader {
        items: RefCell<Vec<u32>>,
        fail_at: Option<usize>,
        reads: Cell<usize>,
        closed: Cell<bool>,
    }

    impl VecReader {
        fn new(items: Vec<u32>, fail_at: Option<usize>) -> Self {
            Self {
                items: RefCell::new(items.into_iter().rev().collect()),
                fail_at,
                reads: Cell::new(0),
                closed: Cell::new(false),
            }
        }
    }

    impl ItemReader<u32> for VecReader {
        fn read(&self) -> ItemReaderResult<u32> {
            let reads = self.reads.get();
            self.reads.set(reads + 1);
            if self.fail_at == Some(reads) {
                return Err(BatchError::FetchFailure("store unreachable".to_string()));
            }
            Ok(self.items.borrow_mut().pop())
        }

        fn close(&self) -> Result<(), BatchError> {
            self.closed.set(true);
            Ok(())
        }
    }

    #[derive(Default)]
    struct ChunkRecorder {
        chunks: RefCell<Vec<Vec<u32>>>,
    }

    impl ItemWriter<u32> for ChunkRecorder {
        fn write(&self, items: &[u32]) -> ItemWriterResult {
            self.chunks.borrow_mut().push(items.to_vec());
            Ok(())
        }
    }

    struct RejectOdd;

    impl ItemProcessor<u32, u32> for RejectOdd {
        fn process(&self, item: &u32) -> Result<u32, BatchError> {
            if item % 2 == 1 {
                Err(BatchError::ItemProcessor(format!("odd item {}", item)))
            } else {
                Ok(*item)
            }
        }
    }

    #[test]
    fn should_write_items_in_chunks() {
        let reader = VecReader::new(vec![1, 2, 3, 4, 5], None);
        let writer = ChunkRecorder::default();

        let step = StepBuilder::new("chunks")
            .chunk(2)
            .reader(&reader)
            .processor(&PassThroughProcessor)
            .writer(&writer)
            .build();

        let mut execution = StepExecution::new(step.get_name());
        let result = step.execute(&mut execution);

        assert!(result.is_ok());
        assert_eq!(execution.status, StepStatus::Success);
        assert_eq!(execution.read_count, 5);
        assert_eq!(execution.write_count, 5);
        assert_eq!(
            *writer.chunks.borrow(),
            vec![vec![1, 2], vec![3, 4], vec![5]]
        );
        assert!(reader.closed.get());
    }

    struct RecordingLogger {
        lines: Mutex<Vec<String>>,
    }

    impl log::Log for RecordingLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            self.lines.lock().unwrap().push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    static LOGGER: RecordingLogger = RecordingLogger {
        lines: Mutex::new(Vec::new()),
    };

    fn logged_lines(needle: &str) -> Vec<String> {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| {
            log::set_logger(&LOGGER).unwrap();
            log::set_max_level(log::LevelFilter::Info);
        });
        LOGGER
            .lines
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.contains(needle))
            .cloned()
            .collect()
    }

    #[test]
    fn should_log_final_status_at_end_of_step() {
        logged_lines("");
        let reader = VecReader::new(vec![1, 2], None);
        let writer = ChunkRecorder::default();

        let step = StepBuilder::new("logged-status")
            .chunk(2)
            .reader(&reader)
            .processor(&PassThroughProcessor)
            .writer(&writer)
            .build();

        let mut execution = StepExecution::new(step.get_name());
        step.execute(&mut execution).unwrap();

        let end_lines = logged_lines("End of step: logged-status");
        assert_eq!(end_lines.len(), 1);
        assert!(end_lines[0].ends_with("status: Success"), "{}", end_lines[0]);
    }

    #[test]
    fn should_not_call_writer_for_empty_last_chunk() {
        let reader = VecReader::new(vec![1, 2], None);
        let writer = ChunkRecorder::default();

        let step = StepBuilder::new("exact")
            .chunk(2)
            .reader(&reader)
            .processor(&PassThroughProcessor)
            .writer(&writer)
            .build();

        let mut execution = StepExecution::new(step.get_name());
        step.execute(&mut execution).unwrap();

        assert_eq!(*writer.chunks.borrow(), vec![vec![1, 2]]);
    }

    #[test]
    fn should_fail_step_and_close_reader_on_read_error() {
        let reader = VecReader::new(vec![1, 2, 3], Some(2));
        let writer = ChunkRecorder::default();

        let step = StepBuilder::new("broken-read")
            .chunk(1)
            .reader(&reader)
            .processor(&PassThroughProcessor)
            .writer(&writer)
            .build();

        let mut execution = StepExecution::new(step.get_name());
        let result = step.execute(&mut execution);

        assert_eq!(result, Err(BatchError::Step("broken-read".to_string())));
        assert_eq!(execution.status, StepStatus::ReadError);
        assert_eq!(execution.read_count, 2);
        assert_eq!(execution.write_count, 2);
        assert_eq!(execution.read_error_count, 1);
        assert!(reader.closed.get());
    }

    #[test]
    fn should_fail_step_on_processor_error() {
        let reader = VecReader::new(vec![2, 3], None);
        let writer = ChunkRecorder::default();

        let step = StepBuilder::new("broken-process")
            .chunk(5)
            .reader(&reader)
            .processor(&RejectOdd)
            .writer(&writer)
            .build();

        let mut execution = StepExecution::new(step.get_name());
        assert!(step.execute(&mut execution).is_err());

        assert_eq!(execution.status, StepStatus::ProcessorError);
        assert_eq!(execution.process_error_count, 1);
        assert!(writer.chunks.borrow().is_empty());
    }

    #[test]
    fn unnamed_builder_should_generate_a_name() {
        let reader = VecReader::new(vec![], None);
        let writer = ChunkRecorder::default();

        let step = StepBuilder::unnamed()
            .chunk(0)
            .reader(&reader)
            .processor(&PassThroughProcessor)
            .writer(&writer)
            .build();

        assert_eq!(step.get_name().len(), 8);
        assert_eq!(step.chunk_size, 1);
    }
}

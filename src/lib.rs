#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
 # Paging Batch for Rust

 Chunk-oriented batch processing built around a **generic paging item reader**:
 records are fetched from a backing store one page at a time, on demand, and
 handed to a step one item at a time.

 ## Core Concepts

- **Job:** the entire batch process, composed of one or more `Step`s run in order.
- **Step:** a chunk-oriented phase that reads items, processes them and writes them
  out one chunk (commit interval) at a time.
- **ItemReader:** pull-based source of items with an `open` / `read` / `close` lifecycle.
- **ItemProcessor:** business logic applied to each item.
- **ItemWriter:** output of a step, invoked once per chunk.
- **PagingItemReader:** an `ItemReader` that fetches pages through a caller-supplied
  query, owns a query-execution context between `open` and `close`, and either
  clears that context before every fetch (transacted) or detaches every record
  from it (detached).

 ## Features

| **Feature**   | **Description**                                                   |
|---------------|-------------------------------------------------------------------|
| rdbc-sqlite   | SQLite query-execution context for the paging reader, SQLite writer |
| logger        | Enables a logger `ItemWriter`, useful for debugging purposes      |
| full          | Enables all available features                                    |

 ## Getting Started

```rust
use paging_batch_rs::{
    core::{
        item::{ItemWriter, PassThroughProcessor},
        job::{Job, JobBuilder},
        step::StepBuilder,
    },
    item::paging::{PageRequest, PagingItemReaderBuilder, QueryContext},
    BatchError,
};

struct Session;

impl QueryContext<u32> for Session {}

struct Sum(std::cell::Cell<u32>);

impl ItemWriter<u32> for Sum {
    fn write(&self, items: &[u32]) -> Result<(), BatchError> {
        self.0.set(self.0.get() + items.iter().sum::<u32>());
        Ok(())
    }
}

fn main() -> Result<(), BatchError> {
    let reader = PagingItemReaderBuilder::<u32>::new()
        .page_size(4)
        .context_factory(|| -> Result<Session, BatchError> { Ok(Session) })
        .query(|_session: &mut Session, request: &PageRequest| -> Result<Vec<u32>, BatchError> {
            let end = (request.offset + request.limit).min(10) as u32;
            Ok((request.offset as u32..end).collect())
        })
        .build()?;

    let writer = Sum(std::cell::Cell::new(0));

    let step = StepBuilder::new("sum")
        .chunk(3)
        .reader(&reader)
        .processor(&PassThroughProcessor)
        .writer(&writer)
        .build();

    let job = JobBuilder::new().start(&step).build();
    job.run()?;

    assert_eq!(writer.0.get(), 45);
    Ok(())
}
```

 ## License
 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.
 */

/// Core module for batch operations
pub mod core;

/// Error types for batch operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Item readers, processors and writers
pub mod item;

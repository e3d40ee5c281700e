use std::{thread, time::Duration};

use log::info;

use crate::core::item::{ItemProcessor, ItemProcessorResult};

/// Processor that returns every item unchanged after sleeping for `delay`.
///
/// Used to keep a reader's connection idle for longer than a server-side
/// timeout while a chunk is being processed.
pub struct DelayItemProcessor {
    delay: Duration,
}

impl DelayItemProcessor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<I: Clone> ItemProcessor<I, I> for DelayItemProcessor {
    fn process(&self, item: &I) -> ItemProcessorResult<I> {
        info!("processor start");
        thread::sleep(self.delay);
        info!("processor end");
        Ok(item.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn should_return_item_after_delay() {
        let processor = DelayItemProcessor::new(Duration::from_millis(20));
        let start = Instant::now();

        let item = processor.process(&"store".to_string()).unwrap();

        assert_eq!(item, "store");
        assert!(start.elapsed() >= processor.delay());
    }
}

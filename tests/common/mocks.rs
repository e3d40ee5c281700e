//! Mock versions of the item stages used by the integration tests.
use mockall::mock;

use paging_batch_rs::{core::item::ItemWriter, BatchError};

use super::Store;

mock! {
    pub StoreWriter {}
    impl ItemWriter<Store> for StoreWriter {
        fn write(&self, items: &[Store]) -> Result<(), BatchError>;
        fn close(&self) -> Result<(), BatchError>;
    }
}

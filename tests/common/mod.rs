#![allow(dead_code)]

mod mocks;

pub use mocks::MockStoreWriter;

use std::sync::{Arc, Mutex};

use paging_batch_rs::{
    item::paging::{PageRequest, QueryContext},
    BatchError,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    pub id: usize,
    pub name: String,
}

/// In-memory stand-in for a database session over the `store` table.
pub struct MemorySession {
    rows: Arc<Vec<Store>>,
    fetches: Arc<Mutex<Vec<usize>>>,
}

impl QueryContext<Store> for MemorySession {}

/// Backing store shared by every session it opens.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Vec<Store>>,
    fetches: Arc<Mutex<Vec<usize>>>,
}

impl MemoryStore {
    pub fn with_names(names: &[&str]) -> Self {
        let rows = names
            .iter()
            .enumerate()
            .map(|(id, name)| Store {
                id,
                name: name.to_string(),
            })
            .collect();
        Self {
            rows: Arc::new(rows),
            fetches: Arc::default(),
        }
    }

    pub fn with_rows(count: usize) -> Self {
        let names: Vec<String> = (0..count).map(|id| format!("store-{}", id)).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        Self::with_names(&names)
    }

    pub fn open_session(&self) -> Result<MemorySession, BatchError> {
        Ok(MemorySession {
            rows: self.rows.clone(),
            fetches: self.fetches.clone(),
        })
    }

    /// Offsets of every page fetched so far, in call order.
    pub fn fetch_offsets(&self) -> Vec<usize> {
        self.fetches.lock().unwrap().clone()
    }
}

pub fn select_stores(
    session: &mut MemorySession,
    request: &PageRequest,
) -> Result<Vec<Store>, BatchError> {
    session.fetches.lock().unwrap().push(request.offset);
    Ok(session
        .rows
        .iter()
        .skip(request.offset)
        .take(request.limit)
        .cloned()
        .collect())
}

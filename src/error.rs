use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
/// Batch error
pub enum BatchError {
    #[error("ItemWriter from: {0}")]
    ItemWriter(String),

    #[error("ItemReader from: {0}")]
    ItemReader(String),

    #[error("ItemProcessor from: {0}")]
    ItemProcessor(String),

    #[error("Error occurred in step: {0}")]
    Step(String),

    /// The query-execution context could not be acquired when opening a reader.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// The query executor failed while fetching a page.
    #[error("Fetch failure: {0}")]
    FetchFailure(String),

    /// An operation was invoked out of order (e.g. read before open).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

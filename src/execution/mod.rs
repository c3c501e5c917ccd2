pub mod fetch;
pub mod handler;
pub mod worker_pool;

pub use fetch::{FetchClient, FetchRequest, FetchResponse, FetchTaskHandler};
pub use handler::{FailureDisposition, HandlerError, NoopHandler, TaskHandler};
pub use worker_pool::WorkerPool;

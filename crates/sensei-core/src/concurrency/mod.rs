//! Threads, queues and pools used by the data and optimizer passes.

mod object_pool;
mod semaphore;
mod wait_queue;
mod worker_pool;

pub use object_pool::ObjectPool;
pub use semaphore::{SemaphoreGuard, WeightedSemaphore};
pub use wait_queue::WaitQueue;
pub use worker_pool::{split_evenly, WorkerPool, THREAD_COUNT};

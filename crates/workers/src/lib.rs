//! Background workers for Hearth.
//!
//! The [`WorkerRuntime`] owns the job list and runs jobs on registered
//! [`Worker`]s. Compaction is the built-in workload: a policy watches
//! conversation growth and queues summarization jobs.

pub mod compaction;
pub mod runtime;
pub mod worker;

pub use compaction::{COMPACTION_WORKER, MemoryCompactionWorker, MessageCountPolicy};
pub use runtime::WorkerRuntime;
pub use worker::{Worker, WorkerInfo, WorkerPriority};

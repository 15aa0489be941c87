//! Copy/paste pipeline (§4.1-§4.6): stream a source collection into a
//! target collection under a chosen conflict strategy, with keep-alive
//! read watchdogging, adaptive batch sizing, retry-with-backoff, and a
//! task supervisor for concurrent operations.

pub mod batch_adapter;
pub mod driver;
pub mod keep_alive;
pub mod mongo_wire;
pub mod retry;
pub mod strategy;
pub mod task_supervisor;
pub mod writer;

pub use batch_adapter::{BatchSizeAdapter, BufferConstraints, Mode};
pub use driver::{DriverAdapter, EnsureTargetResult};
pub use keep_alive::{KeepAliveConfig, KeepAliveOrchestrator, KeepAliveStats};
pub use mongo_wire::{wire_error, MongoWireAdapter, WireConnection, WireErrorEnvelope};
pub use retry::{AttemptOutcome, RetryConfig};
pub use strategy::{BatchResult, ConflictError, ConflictStrategy, PartialProgress, WriteStats};
pub use task_supervisor::{ResourceDescriptor, Task, TaskState, TaskStatus, TaskSupervisor};
pub use writer::{write_all, StreamingWriter, WriterOutcome};

pub mod cache;
pub mod execution;

pub use cache::{
    CancelSignalStore, ExecutionCache, InterruptEventQueue, LatestExecutionStore, NodeOutputCache,
};
pub use execution::ExecutionRecordStore;

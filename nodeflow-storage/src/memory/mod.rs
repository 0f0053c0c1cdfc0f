mod cache;
mod execution_store;

pub use cache::MemoryCache;
pub use execution_store::MemoryExecutionStore;

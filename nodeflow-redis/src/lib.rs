pub mod cache;
pub mod keys;

pub use cache::RedisExecutionCache;

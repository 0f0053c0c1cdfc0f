pub mod entities;
pub mod error;
pub mod memory;
pub mod queue_policy;
pub mod streaming;
pub mod traits;

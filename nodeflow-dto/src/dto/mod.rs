pub mod status;
pub mod execution;
pub mod node_execution;
pub mod interrupt;
pub mod node_meta;
pub mod engine_event;
pub mod message;

pub use status::*;
pub use execution::*;
pub use node_execution::*;
pub use interrupt::*;
pub use node_meta::{NodeCapabilities, NodeType};
pub use node_meta::{ENTRY_NODE_KEY, EXIT_NODE_KEY};
pub use engine_event::*;
pub use message::*;

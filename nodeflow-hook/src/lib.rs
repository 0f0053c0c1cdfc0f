pub mod dispatcher;
pub mod handler;

pub use dispatcher::ExecutionEventDispatcher;
pub use handler::ExecutionEventHandler;

pub mod impls {
    pub mod log_hook;
}

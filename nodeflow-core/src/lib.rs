pub mod app_state;
pub mod builder;
pub mod error;
pub mod service;

pub use app_state::AppState;
pub use error::{ExecError, ExecResult};
pub use service::{CancelOutcome, ExecutableService, ExecutableSvc};

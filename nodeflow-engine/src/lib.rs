pub mod context;
pub mod error;
pub mod event_handle;
pub mod id_gen;
pub mod input;
pub mod merge;
pub mod runner;
pub mod scripted;
pub mod stream;
pub mod traits;

pub use context::{ResumeContext, RunContext};
pub use error::EngineError;
pub use event_handle::{EventStores, ExecuteEventLoop};
pub use id_gen::LocalIdGenerator;
pub use runner::{
    append_answer, PreparedRun, RunCompletion, RunRequest, RunnerSettings, WorkflowRunner,
};
pub use scripted::{ScriptedCompiler, StaticWorkflowRepository};
pub use stream::{pipe, ExecutionStream, StreamWriter};
pub use traits::{
    ExecutableGraph, GetPolicy, GraphCompiler, IdGenerator, InputField, InputKind,
    WorkflowEntity, WorkflowRepository,
};

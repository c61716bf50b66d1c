pub mod error;
pub mod types;
pub mod exit;
pub mod transformer;
pub mod streamer;
pub mod process;
pub mod command;
pub mod config;
pub mod executor;
pub mod results;
pub mod timing;
pub mod workflow;
pub mod utils;


pub use error::AnsibleError;
pub use types::{
    ExitOutcome, ResultDocument, Play, PlayInfo, Task, TaskInfo, HostTaskResult, HostStats,
};
pub use exit::{ErrorEnricher, ExitCodeInterpreter, ExitErrorKind};
pub use transformer::{Clock, SystemClock, TransformerChain, TransformerFn};
pub use streamer::{LineStreamer, MemorySink};
pub use process::{OsProcessBackend, ProcessBackend, ProcessSpec, RunningProcess};
pub use command::{AdhocCommand, AnsibleCommand, Commander, PlaybookCommand};
pub use config::{AnsibleSettings, ExecutionConfig, StdoutCallback};
pub use executor::{AnsibleExecutor, Executor};
pub use results::{decode_documents, decode_one, decode_stream, merge_documents, resolve_outcome};
pub use timing::TimedExecutor;
pub use workflow::WorkflowExecutor;

// 便捷的重新导出
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, AnsibleError>;

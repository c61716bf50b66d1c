use crate::exit::ExitErrorKind;
use crate::types::ExitOutcome;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnsibleError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Executable not found: {0}")]
    BinaryNotFound(String),

    #[error("Failed to open {stream} pipe for '{command}'")]
    PipeError { stream: &'static str, command: String },

    #[error("Failed to start '{command}': {source}")]
    StartError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stream {stream}: {source}")]
    StreamError {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Execution of '{0}' was cancelled")]
    Cancelled(String),

    #[error("{message}")]
    CommandFailed { outcome: ExitOutcome, message: String },

    #[error("{message}: {source}")]
    Classified {
        kind: ExitErrorKind,
        message: String,
        #[source]
        source: Box<AnsibleError>,
    },

    #[error("Failed to decode ansible JSON results: {0}")]
    DecodeError(#[from] serde_json::Error),

    #[error("{}", hosts_failed_message(.failed, .unreachable))]
    HostsFailed {
        failed: Vec<String>,
        unreachable: Vec<String>,
    },

    #[error("{source} (execution took {secs:.3}s)", secs = .elapsed.as_secs_f64())]
    Timed {
        elapsed: Duration,
        #[source]
        source: Box<AnsibleError>,
    },

    #[error("Workflow failed:\n{}", join_messages(.0))]
    WorkflowError(Vec<AnsibleError>),

    #[error("File operation failed: {0}")]
    FileOperationError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl AnsibleError {
    /// 穿透包装层，返回进程退出码（如果存在）
    pub fn exit_code(&self) -> Option<i32> {
        self.outcome().map(|outcome| outcome.exit_code)
    }

    /// 返回分类后的 Ansible 错误类型
    pub fn kind(&self) -> Option<ExitErrorKind> {
        match self {
            AnsibleError::Classified { kind, .. } => Some(*kind),
            AnsibleError::Timed { source, .. } => source.kind(),
            _ => None,
        }
    }

    /// 返回进程结束时记录的 `ExitOutcome`
    pub fn outcome(&self) -> Option<&ExitOutcome> {
        match self {
            AnsibleError::CommandFailed { outcome, .. } => Some(outcome),
            AnsibleError::Classified { source, .. } | AnsibleError::Timed { source, .. } => {
                source.outcome()
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            AnsibleError::Cancelled(_) => true,
            AnsibleError::Timed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

fn hosts_failed_message(failed: &[String], unreachable: &[String]) -> String {
    let mut parts = Vec::new();
    if !failed.is_empty() {
        parts.push(format!("failed hosts: {}", failed.join(", ")));
    }
    if !unreachable.is_empty() {
        parts.push(format!("unreachable hosts: {}", unreachable.join(", ")));
    }
    format!("Playbook stats report failures ({})", parts.join("; "))
}

fn join_messages(errors: &[AnsibleError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<std::io::Error> for AnsibleError {
    fn from(error: std::io::Error) -> Self {
        AnsibleError::IoError(error.to_string())
    }
}

impl From<regex::Error> for AnsibleError {
    fn from(error: regex::Error) -> Self {
        AnsibleError::ValidationError(format!("invalid pattern: {}", error))
    }
}

use crate::error::AnsibleError;
use crate::types::ExitOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ansible 进程退出码对应的错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitErrorKind {
    GeneralError,
    OneOrMoreHostFailed,
    OneOrMoreHostUnreachable,
    ParserError,
    BadOrIncompleteOptions,
    UserInterruptedExecution,
    UnexpectedError,
}

pub const EXIT_GENERAL_ERROR: i32 = 1;
pub const EXIT_HOST_FAILED: i32 = 2;
pub const EXIT_HOST_UNREACHABLE: i32 = 3;
pub const EXIT_PARSER_ERROR: i32 = 4;
pub const EXIT_BAD_OPTIONS: i32 = 5;
pub const EXIT_USER_INTERRUPTED: i32 = 99;
pub const EXIT_UNEXPECTED_ERROR: i32 = 250;

impl ExitErrorKind {
    /// 根据退出码分类，未知退出码（包括 0 和负数）返回 None
    pub fn classify(exit_code: i32) -> Option<Self> {
        match exit_code {
            EXIT_GENERAL_ERROR => Some(ExitErrorKind::GeneralError),
            EXIT_HOST_FAILED => Some(ExitErrorKind::OneOrMoreHostFailed),
            EXIT_HOST_UNREACHABLE => Some(ExitErrorKind::OneOrMoreHostUnreachable),
            EXIT_PARSER_ERROR => Some(ExitErrorKind::ParserError),
            EXIT_BAD_OPTIONS => Some(ExitErrorKind::BadOrIncompleteOptions),
            EXIT_USER_INTERRUPTED => Some(ExitErrorKind::UserInterruptedExecution),
            EXIT_UNEXPECTED_ERROR => Some(ExitErrorKind::UnexpectedError),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ExitErrorKind::GeneralError => EXIT_GENERAL_ERROR,
            ExitErrorKind::OneOrMoreHostFailed => EXIT_HOST_FAILED,
            ExitErrorKind::OneOrMoreHostUnreachable => EXIT_HOST_UNREACHABLE,
            ExitErrorKind::ParserError => EXIT_PARSER_ERROR,
            ExitErrorKind::BadOrIncompleteOptions => EXIT_BAD_OPTIONS,
            ExitErrorKind::UserInterruptedExecution => EXIT_USER_INTERRUPTED,
            ExitErrorKind::UnexpectedError => EXIT_UNEXPECTED_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ExitErrorKind::GeneralError => "ansible general error",
            ExitErrorKind::OneOrMoreHostFailed => "one or more host failed",
            ExitErrorKind::OneOrMoreHostUnreachable => "one or more host unreachable",
            ExitErrorKind::ParserError => "ansible parser error",
            ExitErrorKind::BadOrIncompleteOptions => "bad or incomplete options",
            ExitErrorKind::UserInterruptedExecution => "user interrupted execution",
            ExitErrorKind::UnexpectedError => "unexpected error",
        }
    }
}

impl fmt::Display for ExitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// 进程非零退出时对错误进行分类和补充
pub trait ErrorEnricher: Send + Sync {
    fn enrich(&self, outcome: &ExitOutcome, error: AnsibleError) -> AnsibleError;
}

/// 按 ansible 退出码表分类的默认实现
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitCodeInterpreter;

impl ErrorEnricher for ExitCodeInterpreter {
    fn enrich(&self, outcome: &ExitOutcome, error: AnsibleError) -> AnsibleError {
        match outcome.classified_kind {
            Some(kind) => AnsibleError::Classified {
                kind,
                message: format!("Error: {}", kind.message()),
                source: Box::new(error),
            },
            None => error,
        }
    }
}

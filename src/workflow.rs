use crate::error::AnsibleError;
use crate::executor::Executor;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 按顺序执行多个执行单元
///
/// 默认遇到第一个错误即停止并返回该错误；`continue_on_error` 模式下全部执行，
/// 最后把所有错误按执行顺序合并返回。
#[derive(Default)]
pub struct WorkflowExecutor {
    executors: Vec<Box<dyn Executor>>,
    continue_on_error: bool,
}

impl WorkflowExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, executor: impl Executor + 'static) -> Self {
        self.executors.push(Box::new(executor));
        self
    }

    pub fn add_boxed(mut self, executor: Box<dyn Executor>) -> Self {
        self.executors.push(executor);
        self
    }

    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[async_trait]
impl Executor for WorkflowExecutor {
    async fn execute(&mut self, cancel: &CancellationToken) -> Result<(), AnsibleError> {
        let total = self.executors.len();
        let mut errors = Vec::new();

        for (index, executor) in self.executors.iter_mut().enumerate() {
            if cancel.is_cancelled() {
                let cancelled =
                    AnsibleError::Cancelled(format!("workflow step {}/{}", index + 1, total));
                // 已收集的成员错误随取消一起返回
                if errors.is_empty() {
                    return Err(cancelled);
                }
                errors.push(cancelled);
                return Err(AnsibleError::WorkflowError(errors));
            }

            info!("Running workflow step {}/{}", index + 1, total);
            if let Err(e) = executor.execute(cancel).await {
                if !self.continue_on_error {
                    return Err(e);
                }
                warn!("Workflow step {}/{} failed, continuing: {}", index + 1, total, e);
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AnsibleError::WorkflowError(errors))
        }
    }
}

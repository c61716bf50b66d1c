use crate::error::AnsibleError;
use crate::executor::Executor;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 记录被包装执行单元的耗时
pub struct TimedExecutor<E> {
    inner: E,
    duration: Option<Duration>,
}

impl<E: Executor> TimedExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            duration: None,
        }
    }

    /// 最近一次执行的耗时，尚未执行时为 None
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

#[async_trait]
impl<E: Executor> Executor for TimedExecutor<E> {
    async fn execute(&mut self, cancel: &CancellationToken) -> Result<(), AnsibleError> {
        let start = Instant::now();
        let result = self.inner.execute(cancel).await;
        let elapsed = start.elapsed();
        self.duration = Some(elapsed);

        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            success = result.is_ok(),
            "execution finished"
        );

        result.map_err(|source| AnsibleError::Timed {
            elapsed,
            source: Box::new(source),
        })
    }
}

use crate::config::ExecutionConfig;
use crate::error::AnsibleError;
use crate::process::{OsProcessBackend, ProcessBackend, ProcessSpec};
use crate::streamer::LineStreamer;
use crate::types::ExitOutcome;
use crate::utils::{failure_message, strip_verbosity_flags};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 保留的 stderr 行数，用于错误信息
pub const STDERR_TAIL_LINES: usize = 20;

pub type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;

/// 可执行的单元：单条命令、计时包装或工作流
#[async_trait]
pub trait Executor: Send {
    async fn execute(&mut self, cancel: &CancellationToken) -> Result<(), AnsibleError>;
}

/// 启动 ansible 进程并把 stdout/stderr 逐行转发到 sink
///
/// 两个输出流同时读取，全部转发完成后才检查退出码，
/// 因此 `execute` 返回后不会再有输出写入 sink。
pub struct AnsibleExecutor {
    config: ExecutionConfig,
    backend: Arc<dyn ProcessBackend>,
    stdout: OutputSink,
    stderr: OutputSink,
}

impl AnsibleExecutor {
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            backend: Arc::new(OsProcessBackend),
            stdout: Box::new(tokio::io::stdout()),
            stderr: Box::new(tokio::io::stderr()),
        }
    }

    pub fn with_stdout(mut self, sink: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Box::new(sink);
        self
    }

    pub fn with_stderr(mut self, sink: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Box::new(sink);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn ProcessBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// 解析最终要执行的 argv（quiet 模式下去掉 verbosity 参数）
    pub fn resolve_argv(&self) -> Result<Vec<String>, AnsibleError> {
        let mut argv = self.config.commander.command()?;
        if self.config.quiet {
            argv = strip_verbosity_flags(argv);
        }
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err(AnsibleError::ValidationError(
                "command produced an empty argv".to_string(),
            ));
        }
        Ok(argv)
    }

    fn build_spec(&self, mut argv: Vec<String>) -> ProcessSpec {
        let program = argv.remove(0);
        ProcessSpec {
            program,
            args: argv,
            env: self
                .config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            working_dir: self.config.working_dir.clone(),
            kill_on_drop: self.config.kill_on_cancel,
        }
    }
}

#[async_trait]
impl Executor for AnsibleExecutor {
    async fn execute(&mut self, cancel: &CancellationToken) -> Result<(), AnsibleError> {
        let argv = self.resolve_argv()?;
        let spec = self.build_spec(argv);
        let command = spec.display();

        info!(command = %command, "starting ansible process");
        let mut process = self.backend.spawn(&spec)?;

        let stdout_pipe = process.take_stdout().ok_or_else(|| AnsibleError::PipeError {
            stream: "stdout",
            command: command.clone(),
        })?;
        let stderr_pipe = process.take_stderr().ok_or_else(|| AnsibleError::PipeError {
            stream: "stderr",
            command: command.clone(),
        })?;

        let mut stdout_streamer = LineStreamer::new("stdout", &self.config.transformers);
        let mut stderr_streamer =
            LineStreamer::new("stderr", self.config.stderr_chain()).with_tail(STDERR_TAIL_LINES);

        // 两个流都结束（或取消）后才等待进程
        let (stdout_result, stderr_result) = tokio::join!(
            stdout_streamer.stream(stdout_pipe, &mut *self.stdout, cancel),
            stderr_streamer.stream(stderr_pipe, &mut *self.stderr, cancel),
        );

        let exit_code = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if self.config.kill_on_cancel {
                    if let Err(e) = process.kill().await {
                        warn!(command = %command, error = %e, "failed to kill cancelled process");
                    }
                }
                debug!(command = %command, "execution cancelled");
                return Err(AnsibleError::Cancelled(command));
            }
            status = process.wait() => status.map_err(AnsibleError::from)?,
        };

        info!(command = %command, exit_code, "ansible process exited");

        stdout_result?;
        stderr_result?;

        if exit_code == 0 {
            return Ok(());
        }

        let raw_stderr = stderr_streamer.tail();
        let message = failure_message(
            &command,
            exit_code,
            &self.config.env,
            &raw_stderr,
        );
        let outcome = ExitOutcome::new(exit_code, raw_stderr);
        let error = AnsibleError::CommandFailed {
            outcome: outcome.clone(),
            message,
        };

        Err(match self.config.error_enricher {
            Some(ref enricher) => enricher.enrich(&outcome, error),
            None => error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::AnsibleCommand;
    use crate::exit::ExitErrorKind;
    use crate::process::{BoxedReader, RunningProcess};
    use crate::streamer::MemorySink;
    use crate::transformer::prepend;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::task::{Context, Poll};

    /// 返回预设输出和退出码的假进程后端
    #[derive(Default)]
    struct ScriptedBackend {
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        exit_code: i32,
        omit_stdout: bool,
        spawned: Mutex<Vec<ProcessSpec>>,
        waited: Arc<AtomicBool>,
    }

    struct ScriptedProcess {
        stdout: Option<BoxedReader>,
        stderr: Option<BoxedReader>,
        exit_code: i32,
        waited: Arc<AtomicBool>,
    }

    /// 写入总是失败的 sink
    struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "terminal closed",
            )))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[async_trait]
    impl RunningProcess for ScriptedProcess {
        fn take_stdout(&mut self) -> Option<BoxedReader> {
            self.stdout.take()
        }

        fn take_stderr(&mut self) -> Option<BoxedReader> {
            self.stderr.take()
        }

        async fn wait(&mut self) -> std::io::Result<i32> {
            self.waited.store(true, Ordering::SeqCst);
            Ok(self.exit_code)
        }

        async fn kill(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl ProcessBackend for ScriptedBackend {
        fn spawn(&self, spec: &ProcessSpec) -> Result<Box<dyn RunningProcess>, AnsibleError> {
            self.spawned.lock().unwrap().push(spec.clone());
            let stdout: Option<BoxedReader> = if self.omit_stdout {
                None
            } else {
                Some(Box::new(Cursor::new(self.stdout.clone())))
            };
            Ok(Box::new(ScriptedProcess {
                stdout,
                stderr: Some(Box::new(Cursor::new(self.stderr.clone()))),
                exit_code: self.exit_code,
                waited: self.waited.clone(),
            }))
        }
    }

    fn playbook_config() -> ExecutionConfig {
        ExecutionConfig::new(
            AnsibleCommand::new("ansible-playbook").args(["-vvv", "-i", "hosts", "site.yml", "--verbose"]),
        )
    }

    #[tokio::test]
    async fn test_execute_forwards_both_streams() {
        let backend = Arc::new(ScriptedBackend {
            stdout: b"PLAY [all]\nok: [web1]\n".to_vec(),
            stderr: b"[WARNING]: no inventory\n".to_vec(),
            ..Default::default()
        });
        let mut config = playbook_config();
        config.transformers = config.transformers.with(prepend("|"));

        let out = MemorySink::new();
        let err = MemorySink::new();
        let mut executor = AnsibleExecutor::new(config)
            .with_backend(backend.clone())
            .with_stdout(out.clone())
            .with_stderr(err.clone());

        executor.execute(&CancellationToken::new()).await.unwrap();

        assert_eq!(out.contents_string(), "| PLAY [all]\n| ok: [web1]\n");
        assert_eq!(err.contents_string(), "| [WARNING]: no inventory\n");
    }

    #[tokio::test]
    async fn test_execute_uses_separate_stderr_chain() {
        let backend = Arc::new(ScriptedBackend {
            stdout: b"out\n".to_vec(),
            stderr: b"err\n".to_vec(),
            ..Default::default()
        });
        let mut config = playbook_config();
        config.transformers = config.transformers.with(prepend("[out]"));
        config.stderr_transformers = Some(crate::transformer::TransformerChain::new());

        let out = MemorySink::new();
        let err = MemorySink::new();
        AnsibleExecutor::new(config)
            .with_backend(backend)
            .with_stdout(out.clone())
            .with_stderr(err.clone())
            .execute(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.contents_string(), "[out] out\n");
        assert_eq!(err.contents_string(), "err\n");
    }

    #[tokio::test]
    async fn test_quiet_strips_verbosity_and_passes_env() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut config = playbook_config();
        config.quiet = true;
        config.env.insert("ANSIBLE_STDOUT_CALLBACK".to_string(), "json".to_string());
        config.working_dir = Some("/srv/ansible".into());

        AnsibleExecutor::new(config)
            .with_backend(backend.clone())
            .with_stdout(MemorySink::new())
            .with_stderr(MemorySink::new())
            .execute(&CancellationToken::new())
            .await
            .unwrap();

        let spawned = backend.spawned.lock().unwrap();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].program, "ansible-playbook");
        assert_eq!(spawned[0].args, vec!["-i", "hosts", "site.yml"]);
        assert_eq!(
            spawned[0].env,
            vec![("ANSIBLE_STDOUT_CALLBACK".to_string(), "json".to_string())]
        );
        assert_eq!(spawned[0].working_dir, Some("/srv/ansible".into()));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_classified_and_enriched() {
        let backend = Arc::new(ScriptedBackend {
            stderr: b"fatal: [web1]: UNREACHABLE!\n".to_vec(),
            exit_code: 3,
            ..Default::default()
        });
        let mut config = playbook_config();
        config.env.insert("ANSIBLE_FORCE_COLOR".to_string(), "true".to_string());

        let err = AnsibleExecutor::new(config)
            .with_backend(backend)
            .with_stdout(MemorySink::new())
            .with_stderr(MemorySink::new())
            .execute(&CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ExitErrorKind::OneOrMoreHostUnreachable));
        assert_eq!(err.exit_code(), Some(3));
        let message = err.to_string();
        assert!(message.contains("one or more host unreachable"));
        assert!(message.contains("ansible-playbook -vvv -i hosts site.yml --verbose"));
        assert!(message.contains("ANSIBLE_FORCE_COLOR=true"));
        assert!(message.contains("fatal: [web1]: UNREACHABLE!"));

        let outcome = err.outcome().unwrap();
        assert_eq!(outcome.raw_stderr, "fatal: [web1]: UNREACHABLE!");
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_failure_message_names_the_executed_argv() {
        let backend = Arc::new(ScriptedBackend {
            exit_code: 2,
            ..Default::default()
        });
        let mut config = playbook_config();
        config.quiet = true;

        let err = AnsibleExecutor::new(config)
            .with_backend(backend)
            .with_stdout(MemorySink::new())
            .with_stderr(MemorySink::new())
            .execute(&CancellationToken::new())
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("Command 'ansible-playbook -i hosts site.yml' failed"));
        assert!(!message.contains("-vvv"));
        assert!(!message.contains("--verbose"));
    }

    #[tokio::test]
    async fn test_stdout_write_error_still_drains_stderr_and_reaps() {
        let backend = Arc::new(ScriptedBackend {
            stdout: b"PLAY [all]\n".to_vec(),
            stderr: b"[WARNING]: one\n[WARNING]: two\n".to_vec(),
            exit_code: 2,
            ..Default::default()
        });
        let err_sink = MemorySink::new();

        let err = AnsibleExecutor::new(playbook_config())
            .with_backend(backend.clone())
            .with_stdout(BrokenSink)
            .with_stderr(err_sink.clone())
            .execute(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AnsibleError::StreamError { stream: "stdout", .. }));
        assert_eq!(err_sink.contents_string(), "[WARNING]: one\n[WARNING]: two\n");
        assert!(backend.waited.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_non_zero_exit_without_enricher() {
        let backend = Arc::new(ScriptedBackend {
            exit_code: 2,
            ..Default::default()
        });
        let mut config = playbook_config();
        config.error_enricher = None;

        let err = AnsibleExecutor::new(config)
            .with_backend(backend)
            .with_stdout(MemorySink::new())
            .with_stderr(MemorySink::new())
            .execute(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AnsibleError::CommandFailed { .. }));
        assert_eq!(err.kind(), None);
        assert_eq!(
            err.outcome().and_then(|o| o.classified_kind),
            Some(ExitErrorKind::OneOrMoreHostFailed)
        );
    }

    #[tokio::test]
    async fn test_missing_pipe_fails_fast() {
        let backend = Arc::new(ScriptedBackend {
            omit_stdout: true,
            ..Default::default()
        });
        let err = AnsibleExecutor::new(playbook_config())
            .with_backend(backend)
            .execute(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AnsibleError::PipeError { stream: "stdout", .. }));
    }

    #[tokio::test]
    async fn test_empty_argv_is_rejected_before_spawn() {
        let backend = Arc::new(ScriptedBackend::default());
        let mut config = ExecutionConfig::new(AnsibleCommand::new("-v"));
        config.quiet = true;

        let err = AnsibleExecutor::new(config)
            .with_backend(backend.clone())
            .execute(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AnsibleError::ValidationError(_)));
        assert!(backend.spawned.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_already_cancelled_token_reports_cancellation() {
        let backend = Arc::new(ScriptedBackend {
            stdout: b"never forwarded\n".to_vec(),
            exit_code: 2,
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = MemorySink::new();
        let err = AnsibleExecutor::new(playbook_config())
            .with_backend(backend)
            .with_stdout(out.clone())
            .with_stderr(MemorySink::new())
            .execute(&cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(err.exit_code().is_none());
        assert!(out.contents_string().is_empty());
    }
}

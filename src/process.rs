use crate::error::AnsibleError;
use crate::utils::{find_executable, render_command};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::debug;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// 启动子进程所需的全部信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    /// 合并进继承的环境，同名覆盖
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    pub kill_on_drop: bool,
}

impl ProcessSpec {
    pub fn display(&self) -> String {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        render_command(&argv)
    }
}

/// 运行中的进程
#[async_trait]
pub trait RunningProcess: Send {
    fn take_stdout(&mut self) -> Option<BoxedReader>;

    fn take_stderr(&mut self) -> Option<BoxedReader>;

    /// 等待退出，被信号终止时返回 -1
    async fn wait(&mut self) -> std::io::Result<i32>;

    async fn kill(&mut self) -> std::io::Result<()>;
}

/// 启动进程的后端，生产环境使用 [`OsProcessBackend`]，测试中可替换
pub trait ProcessBackend: Send + Sync {
    fn spawn(&self, spec: &ProcessSpec) -> Result<Box<dyn RunningProcess>, AnsibleError>;
}

/// 基于 `tokio::process::Command` 的本地进程后端
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessBackend;

impl ProcessBackend for OsProcessBackend {
    fn spawn(&self, spec: &ProcessSpec) -> Result<Box<dyn RunningProcess>, AnsibleError> {
        let program = find_executable(&spec.program)
            .ok_or_else(|| AnsibleError::BinaryNotFound(spec.program.clone()))?;

        let mut cmd = Command::new(&program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(spec.kill_on_drop);

        if let Some(ref dir) = spec.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| AnsibleError::StartError {
            command: spec.display(),
            source,
        })?;

        debug!(program = %program.display(), pid = ?child.id(), "spawned process");
        Ok(Box::new(OsProcess { child }))
    }
}

struct OsProcess {
    child: Child,
}

#[async_trait]
impl RunningProcess for OsProcess {
    fn take_stdout(&mut self) -> Option<BoxedReader> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as BoxedReader)
    }

    fn take_stderr(&mut self) -> Option<BoxedReader> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as BoxedReader)
    }

    async fn wait(&mut self) -> std::io::Result<i32> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}

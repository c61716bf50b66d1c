use crate::command::Commander;
use crate::error::AnsibleError;
use crate::exit::{ErrorEnricher, ExitCodeInterpreter};
use crate::transformer::TransformerChain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

pub const ANSIBLE_STDOUT_CALLBACK: &str = "ANSIBLE_STDOUT_CALLBACK";
pub const ANSIBLE_FORCE_COLOR: &str = "ANSIBLE_FORCE_COLOR";
pub const ANSIBLE_HOST_KEY_CHECKING: &str = "ANSIBLE_HOST_KEY_CHECKING";

/// 单次执行的完整配置
///
/// 只属于一次执行调用，不要在并发执行之间共享。
pub struct ExecutionConfig {
    pub commander: Box<dyn Commander>,
    pub working_dir: Option<PathBuf>,
    /// 只合并进子进程环境，键冲突时覆盖父进程的值
    pub env: BTreeMap<String, String>,
    pub transformers: TransformerChain,
    /// 为 None 时 stderr 使用 `transformers`
    pub stderr_transformers: Option<TransformerChain>,
    /// 执行前去掉 `-v`/`--verbose` 等参数
    pub quiet: bool,
    pub error_enricher: Option<Arc<dyn ErrorEnricher>>,
    /// 观察到取消时是否杀掉子进程
    pub kill_on_cancel: bool,
}

impl ExecutionConfig {
    pub fn new(commander: impl Commander + 'static) -> Self {
        Self {
            commander: Box::new(commander),
            working_dir: None,
            env: BTreeMap::new(),
            transformers: TransformerChain::new(),
            stderr_transformers: None,
            quiet: false,
            error_enricher: Some(Arc::new(ExitCodeInterpreter)),
            kill_on_cancel: false,
        }
    }

    pub fn stderr_chain(&self) -> &TransformerChain {
        self.stderr_transformers.as_ref().unwrap_or(&self.transformers)
    }
}

impl fmt::Debug for ExecutionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionConfig")
            .field("command", &self.commander.display_string())
            .field("working_dir", &self.working_dir)
            .field("env", &self.env)
            .field("transformers", &self.transformers)
            .field("stderr_transformers", &self.stderr_transformers)
            .field("quiet", &self.quiet)
            .field("error_enricher", &self.error_enricher.is_some())
            .field("kill_on_cancel", &self.kill_on_cancel)
            .finish()
    }
}

/// `ANSIBLE_STDOUT_CALLBACK` 的可选值
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StdoutCallback {
    #[default]
    Default,
    Json,
    Oneline,
    Yaml,
    Debug,
    Dense,
    Minimal,
    Null,
    Stderr,
    Timer,
}

impl StdoutCallback {
    pub fn as_str(&self) -> &'static str {
        match self {
            StdoutCallback::Default => "default",
            StdoutCallback::Json => "json",
            StdoutCallback::Oneline => "oneline",
            StdoutCallback::Yaml => "yaml",
            StdoutCallback::Debug => "debug",
            StdoutCallback::Dense => "dense",
            StdoutCallback::Minimal => "minimal",
            StdoutCallback::Null => "null",
            StdoutCallback::Stderr => "stderr",
            StdoutCallback::Timer => "timer",
        }
    }
}

impl fmt::Display for StdoutCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 无法识别的名称回退为 `default`
impl FromStr for StdoutCallback {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "json" => StdoutCallback::Json,
            "oneline" => StdoutCallback::Oneline,
            "yaml" => StdoutCallback::Yaml,
            "debug" => StdoutCallback::Debug,
            "dense" => StdoutCallback::Dense,
            "minimal" => StdoutCallback::Minimal,
            "null" => StdoutCallback::Null,
            "stderr" => StdoutCallback::Stderr,
            "timer" => StdoutCallback::Timer,
            _ => StdoutCallback::Default,
        })
    }
}

impl From<String> for StdoutCallback {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(callback) => callback,
            Err(never) => match never {},
        }
    }
}

impl From<StdoutCallback> for String {
    fn from(value: StdoutCallback) -> Self {
        value.as_str().to_string()
    }
}

/// 可从 YAML/JSON 文件加载的执行设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnsibleSettings {
    #[serde(default)]
    pub stdout_callback: StdoutCallback,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_color: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key_checking: Option<bool>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub quiet: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl AnsibleSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从YAML文件加载配置
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, AnsibleError> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| AnsibleError::FileOperationError(format!("Failed to read settings file: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| AnsibleError::FileOperationError(format!("Failed to parse YAML: {}", e)))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, AnsibleError> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| AnsibleError::FileOperationError(format!("Failed to read settings file: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| AnsibleError::FileOperationError(format!("Failed to parse JSON: {}", e)))
    }

    /// 保存配置到YAML文件
    pub fn save_to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), AnsibleError> {
        let yaml_content = serde_yaml::to_string(self)
            .map_err(|e| AnsibleError::FileOperationError(format!("Failed to serialize to YAML: {}", e)))?;

        std::fs::write(path, yaml_content)
            .map_err(|e| AnsibleError::FileOperationError(format!("Failed to write file: {}", e)))
    }

    /// 渲染为子进程的环境变量；`env` 中的同名项优先
    pub fn to_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(
            ANSIBLE_STDOUT_CALLBACK.to_string(),
            self.stdout_callback.to_string(),
        );
        if let Some(force_color) = self.force_color {
            env.insert(ANSIBLE_FORCE_COLOR.to_string(), force_color.to_string());
        }
        if let Some(host_key_checking) = self.host_key_checking {
            env.insert(
                ANSIBLE_HOST_KEY_CHECKING.to_string(),
                host_key_checking.to_string(),
            );
        }
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// 合并进执行配置，不会修改当前进程的环境变量
    pub fn apply(&self, config: &mut ExecutionConfig) {
        config.env.extend(self.to_env());
        config.quiet |= self.quiet;
        if self.working_dir.is_some() {
            config.working_dir = self.working_dir.clone();
        }
    }
}

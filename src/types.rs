use crate::exit::ExitErrorKind;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// 进程结束时的结果记录，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitOutcome {
    pub exit_code: i32,
    /// 保留字段，`AnsibleExecutor` 总是写入 false
    ///
    /// 执行器没有独立的超时机制，截止时间通过取消令牌表达，触发时返回
    /// `AnsibleError::Cancelled` 而不会产生 `ExitOutcome`。自定义后端或
    /// enricher 可以自行设置。
    pub timed_out: bool,
    pub raw_stderr: String,
    pub classified_kind: Option<ExitErrorKind>,
}

impl ExitOutcome {
    pub fn new(exit_code: i32, raw_stderr: String) -> Self {
        Self {
            exit_code,
            timed_out: false,
            raw_stderr,
            classified_kind: ExitErrorKind::classify(exit_code),
        }
    }
}

/// JSON 回调插件输出的根文档
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    pub custom_stats: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub global_custom_stats: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub plays: Vec<Play>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stats: HashMap<String, HostStats>,
}

impl ResultDocument {
    /// failures > 0 的主机，按名称排序
    pub fn failed_hosts(&self) -> Vec<String> {
        self.hosts_where(|s| s.failures > 0)
    }

    /// unreachable > 0 的主机，按名称排序
    pub fn unreachable_hosts(&self) -> Vec<String> {
        self.hosts_where(|s| s.unreachable > 0)
    }

    pub fn has_failures(&self) -> bool {
        self.stats.values().any(HostStats::is_failure)
    }

    fn hosts_where(&self, predicate: impl Fn(&HostStats) -> bool) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .stats
            .iter()
            .filter(|(_, s)| predicate(s))
            .map(|(h, _)| h.clone())
            .collect();
        hosts.sort();
        hosts
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Play {
    #[serde(default)]
    pub play: PlayInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default)]
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub task: TaskInfo,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hosts: HashMap<String, HostTaskResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default)]
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    #[serde(default, deserialize_with = "null_as_default")]
    pub start: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub end: String,
}

impl Duration {
    /// 解析 RFC 3339 时间戳并计算耗时；任务仍在运行时 end 为空
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let start: DateTime<FixedOffset> = DateTime::parse_from_rfc3339(&self.start).ok()?;
        let end: DateTime<FixedOffset> = DateTime::parse_from_rfc3339(&self.end).ok()?;
        Some(end - start)
    }
}

/// 单个主机上某个任务的执行结果
///
/// `msg` 和 `cmd` 可能是字符串也可能是列表，因此保留为原始 JSON 值。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostTaskResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub changed: bool,
    #[serde(default)]
    pub msg: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stdout: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stdout_lines: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stderr: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stderr_lines: Vec<String>,
    #[serde(default)]
    pub cmd: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub failed: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub failed_when_result: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub skipped: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub skip_reason: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unreachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ansible_facts: Option<Map<String, Value>>,
}

impl HostTaskResult {
    /// 将 msg 渲染为字符串，列表按行拼接
    pub fn message(&self) -> String {
        match &self.msg {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStats {
    #[serde(default)]
    pub changed: u32,
    #[serde(default)]
    pub failures: u32,
    #[serde(default)]
    pub ignored: u32,
    #[serde(default)]
    pub ok: u32,
    #[serde(default)]
    pub rescued: u32,
    #[serde(default)]
    pub skipped: u32,
    #[serde(default)]
    pub unreachable: u32,
}

impl HostStats {
    pub fn is_failure(&self) -> bool {
        self.failures > 0 || self.unreachable > 0
    }
}

// JSON 回调偶尔输出 null，统一按默认值处理
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_outcome_new() {
        let outcome = ExitOutcome::new(4, "ERROR! bad yaml".to_string());
        assert_eq!(outcome.classified_kind, Some(ExitErrorKind::ParserError));
        assert!(!outcome.timed_out);

        let unknown = ExitOutcome::new(-1, String::new());
        assert_eq!(unknown.classified_kind, None);
        assert!(!unknown.timed_out);
    }
}

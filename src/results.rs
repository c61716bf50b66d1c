use crate::error::AnsibleError;
use crate::types::ResultDocument;
use regex::Regex;
use std::sync::LazyLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

/// 解析前需要丢弃的非 JSON 行
static NOISE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\s*Playbook run took \d+ days, \d+ hours, \d+ minutes, \d+ seconds$",
        r"^\[(DEPRECATION )?WARNING\]:.*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("noise pattern must compile"))
    .collect()
});

pub fn is_noise_line(line: &str) -> bool {
    let line = line.trim_end_matches(['\r', '\n']);
    NOISE_PATTERNS.iter().any(|re| re.is_match(line))
}

/// 去掉噪声行，其余内容保持原样
pub fn strip_noise(input: &[u8]) -> Vec<u8> {
    let mut cleaned = Vec::with_capacity(input.len());
    for line in input.split_inclusive(|b| *b == b'\n') {
        if !is_noise_line(&String::from_utf8_lossy(line)) {
            cleaned.extend_from_slice(line);
        }
    }
    cleaned
}

/// 解析单个 JSON 文档
pub fn decode_one(input: &[u8]) -> Result<ResultDocument, AnsibleError> {
    Ok(serde_json::from_slice(&strip_noise(input))?)
}

/// 逐个解析首尾相接的多个 JSON 文档，保留每个文档
pub fn decode_documents(input: &[u8]) -> Result<Vec<ResultDocument>, AnsibleError> {
    let cleaned = strip_noise(input);
    let documents = serde_json::Deserializer::from_slice(&cleaned)
        .into_iter::<ResultDocument>()
        .collect::<Result<Vec<_>, _>>()?;
    debug!(documents = documents.len(), "decoded ansible JSON results");
    Ok(documents)
}

/// 从异步输入流读取直到 EOF，合并所有文档
///
/// 合并规则：plays 依次追加；stats 与 custom stats 按键后写覆盖。
pub async fn decode_stream<R>(reader: R) -> Result<ResultDocument, AnsibleError>
where
    R: AsyncBufRead + Unpin,
{
    let mut reader = reader;
    let mut cleaned = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        if !is_noise_line(&String::from_utf8_lossy(&line)) {
            cleaned.extend_from_slice(&line);
        }
    }

    let documents = decode_documents(&cleaned)?;
    Ok(merge_documents(documents))
}

pub fn merge_documents(documents: Vec<ResultDocument>) -> ResultDocument {
    documents
        .into_iter()
        .fold(ResultDocument::default(), |mut merged, doc| {
            merged.custom_stats.extend(doc.custom_stats);
            merged.global_custom_stats.extend(doc.global_custom_stats);
            merged.plays.extend(doc.plays);
            merged.stats.extend(doc.stats);
            merged
        })
}

impl ResultDocument {
    /// 任一主机 failures > 0 或 unreachable > 0 时返回错误
    pub fn check_stats(&self) -> Result<(), AnsibleError> {
        if !self.has_failures() {
            return Ok(());
        }
        Err(AnsibleError::HostsFailed {
            failed: self.failed_hosts(),
            unreachable: self.unreachable_hosts(),
        })
    }
}

/// 同时考虑进程退出结果和 stats
///
/// 进程错误优先返回；进程成功但 stats 报告失败时返回 `HostsFailed`。
pub fn resolve_outcome(
    execution: Result<(), AnsibleError>,
    document: Option<&ResultDocument>,
) -> Result<(), AnsibleError> {
    execution?;
    match document {
        Some(doc) => doc.check_stats(),
        None => Ok(()),
    }
}

use crate::error::AnsibleError;
use chrono::{DateTime, Local};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// 单行输出转换函数，返回 None 表示丢弃该行
pub type TransformerFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// 默认的时间戳格式
pub const DEFAULT_LOG_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 按顺序组合的转换链，后面的转换函数接收前一个的输出
#[derive(Clone, Default)]
pub struct TransformerChain {
    transformers: Vec<TransformerFn>,
}

impl TransformerChain {
    pub fn new() -> Self {
        Self {
            transformers: Vec::new(),
        }
    }

    pub fn from_transformers(transformers: Vec<TransformerFn>) -> Self {
        Self { transformers }
    }

    /// 在链尾追加转换函数
    pub fn with(mut self, transformer: TransformerFn) -> Self {
        self.transformers.push(transformer);
        self
    }

    pub fn push(&mut self, transformer: TransformerFn) {
        self.transformers.push(transformer);
    }

    /// 依次应用转换函数；任一函数丢弃该行时返回 None，后续函数不再执行
    pub fn apply(&self, line: &str) -> Option<String> {
        let mut current = line.to_string();
        for transformer in &self.transformers {
            current = transformer(&current)?;
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

impl fmt::Debug for TransformerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerChain")
            .field("transformers", &self.transformers.len())
            .finish()
    }
}

/// 提供当前时间，测试中可替换为固定时间
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// `"{token} {line}"`
pub fn prepend(token: &str) -> TransformerFn {
    let token = token.to_string();
    Arc::new(move |line: &str| Some(format!("{} {}", token, line)))
}

/// `"{line} {token}"`
pub fn append(token: &str) -> TransformerFn {
    let token = token.to_string();
    Arc::new(move |line: &str| Some(format!("{} {}", line, token)))
}

/// 在行首加上格式化后的当前时间，以制表符分隔
///
/// `layout` 使用 chrono 的 strftime 语法，例如 [`DEFAULT_LOG_FORMAT`]。
pub fn log_format(layout: &str, clock: Arc<dyn Clock>) -> TransformerFn {
    let layout = layout.to_string();
    Arc::new(move |line: &str| Some(format!("{}\t{}", clock.now().format(&layout), line)))
}

/// 整行匹配任一模式时丢弃该行（包括空行），否则原样返回
pub fn ignore_message(patterns: &[&str]) -> Result<TransformerFn, AnsibleError> {
    let regexes = patterns
        .iter()
        .map(|p| Regex::new(&format!("^(?:{})$", p)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Arc::new(move |line: &str| {
        if regexes.iter().any(|re| re.is_match(line)) {
            None
        } else {
            Some(line.to_string())
        }
    }))
}

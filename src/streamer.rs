use crate::error::AnsibleError;
use crate::transformer::TransformerChain;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 逐行读取输出流，经转换链处理后写入 sink
///
/// 行长度不设上限；不会关闭 reader 或 sink。
pub struct LineStreamer<'a> {
    name: &'static str,
    chain: &'a TransformerChain,
    tail: Option<LineTail>,
}

impl<'a> LineStreamer<'a> {
    pub fn new(name: &'static str, chain: &'a TransformerChain) -> Self {
        Self {
            name,
            chain,
            tail: None,
        }
    }

    /// 额外保留最近 `capacity` 行原始输出
    pub fn with_tail(mut self, capacity: usize) -> Self {
        self.tail = Some(LineTail::new(capacity));
        self
    }

    pub fn tail(&self) -> String {
        self.tail.as_ref().map(LineTail::render).unwrap_or_default()
    }

    /// 读到 EOF 正常结束；读写出错返回错误；取消时立即返回 Ok，剩余数据不再读取
    pub async fn stream<R, W>(
        &mut self,
        reader: R,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<(), AnsibleError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut lines = 0u64;

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(stream = self.name, lines, "stream cancelled");
                    return Ok(());
                }
                res = reader.read_until(b'\n', &mut buf) => res.map_err(|source| AnsibleError::StreamError {
                    stream: self.name,
                    source,
                })?,
            };

            if read == 0 {
                break;
            }

            let raw = String::from_utf8_lossy(strip_line_ending(&buf));
            if let Some(tail) = self.tail.as_mut() {
                tail.push(&raw);
            }

            let Some(line) = self.chain.apply(&raw) else {
                continue;
            };

            self.write_line(sink, &line).await?;
            lines += 1;
        }

        sink.flush().await.map_err(|source| AnsibleError::StreamError {
            stream: self.name,
            source,
        })?;
        debug!(stream = self.name, lines, "stream reached EOF");

        Ok(())
    }

    async fn write_line<W>(&self, sink: &mut W, line: &str) -> Result<(), AnsibleError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let map_err = |source: io::Error| AnsibleError::StreamError {
            stream: self.name,
            source,
        };
        sink.write_all(line.as_bytes()).await.map_err(map_err)?;
        sink.write_all(b"\n").await.map_err(map_err)
    }
}

fn strip_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

/// 环形缓冲，保留最近若干行
#[derive(Debug, Clone)]
pub struct LineTail {
    capacity: usize,
    lines: VecDeque<String>,
}

impl LineTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub fn render(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// 可克隆的内存 sink，所有克隆共享同一缓冲区
///
/// 用于捕获子进程输出，例如把 JSON 回调输出交给结果解析。
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        // 缓冲区只存字节，锁中毒时数据仍然可用
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AsyncWrite for MemorySink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

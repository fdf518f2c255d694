//! 操作日志输出 - 每个成功的同步动作写入一行

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// 只追加的文本日志接口
#[async_trait]
pub trait LogSink: Send + Sync {
    /// 追加一行
    async fn append(&self, line: &str) -> io::Result<()>;

    /// 检查日志目标是否仍然可用
    async fn check(&self) -> io::Result<()>;

    /// 名称（用于日志）
    fn name(&self) -> &str;
}

/// 写入本地文件的操作日志
pub struct FileSink {
    path: PathBuf,
    name: String,
}

impl FileSink {
    /// 打开日志文件，父目录或文件不存在时创建
    pub async fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(Self {
            path: path.to_path_buf(),
            name: format!("file:{}", path.display()),
        })
    }
}

#[async_trait]
impl LogSink for FileSink {
    async fn append(&self, line: &str) -> io::Result<()> {
        // 文件被移走后不再重建，交由周期前的检查报告
        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await?;
        info!("{}", line);
        Ok(())
    }

    async fn check(&self) -> io::Result<()> {
        let metadata = fs::metadata(&self.path).await?;
        if metadata.is_file() {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::InvalidInput, "日志路径不是文件"))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 内存中的操作日志，嵌入使用或测试时替代文件
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn append(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .map_err(|_| io::Error::other("日志缓冲区锁已损坏"))?
            .push(line.to_string());
        Ok(())
    }

    async fn check(&self) -> io::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

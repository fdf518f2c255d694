//! 内容哈希 - 用 BLAKE3 判断文件内容是否相同

use std::io;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// 读取缓冲区大小
const BUF_SIZE: usize = 64 * 1024;

/// 计算内存数据的 hash（64 个小写十六进制字符）
pub fn calculate_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// 流式计算文件内容的 hash，不会把整个文件读入内存
///
/// 文件句柄在函数返回时释放（包括读取失败的情况）。
pub async fn calculate_file_hash(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

pub mod local;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use local::LocalStorage;

/// 文件信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub modified_time: i64,
}

/// 文件元数据（用于快速检查）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub size: u64,
    /// 修改时间（秒）
    pub modified_time: i64,
    /// 修改时间（纳秒），用于更精确的变化判断
    pub modified_ns: i64,
}

/// 存储抽象接口
///
/// 所有路径都是相对根目录、以 `/` 分隔的字符串。
pub trait Storage {
    /// 递归列出所有文件（不含目录）
    fn list_files(&self) -> Result<Vec<FileInfo>>;

    /// 获取文件元数据，不存在时返回 None
    fn stat(&self, path: &str) -> Result<Option<FileMeta>>;

    /// 读取整个文件
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// 写入整个文件（自动创建父目录）
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// 检查文件是否存在
    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.stat(path)?.is_some())
    }

    /// 根目录
    fn root(&self) -> &Path;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

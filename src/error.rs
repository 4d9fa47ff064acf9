//! 错误类型

use crate::crypto::CryptoError;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 备份/恢复过程中的错误
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("加密错误: {0}")]
    Crypto(#[from] CryptoError),

    /// 密钥与存储库初始化时使用的密钥不一致
    #[error("密钥校验失败: {0}")]
    KeyMismatch(String),

    #[error("文件操作失败 {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 元数据文件存在但无法解析
    #[error("元数据文件已损坏 {}: {source}", path.display())]
    LedgerCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("无效的路径匹配规则 {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("遍历目录失败: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;

/// 为 io::Error 附加出错的路径
pub(crate) trait IoContext<T> {
    fn with_path(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn with_path(self, path: &Path) -> Result<T> {
        self.map_err(|source| BackupError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

//! 文件内容指纹

use sha2::{Digest, Sha256};

/// 计算文件内容的 SHA-256，返回 64 位小写十六进制
pub fn calculate_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

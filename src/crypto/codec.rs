//! 存储库编解码器
//!
//! 存储库打开时根据配置选定一次，之后所有写入/读取都经过同一个编解码器。

use super::{decrypt, encrypt, EncryptionKey, Result};

/// 数据块编解码接口
pub trait BlobCodec {
    /// 写入存储前的编码
    fn encode(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// 从存储读取后的解码
    fn decode(&self, blob: &[u8]) -> Result<Vec<u8>>;

    /// 是否加密（用于日志）
    fn is_encrypted(&self) -> bool;
}

/// AES-256-GCM 编解码器
#[derive(Debug)]
pub struct AesGcmCodec {
    key: EncryptionKey,
}

impl AesGcmCodec {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }
}

impl BlobCodec for AesGcmCodec {
    fn encode(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        encrypt(plaintext, self.key.as_bytes())
    }

    fn decode(&self, blob: &[u8]) -> Result<Vec<u8>> {
        decrypt(blob, self.key.as_bytes())
    }

    fn is_encrypted(&self) -> bool {
        true
    }
}

/// 直通编解码器（不加密）
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCodec;

impl BlobCodec for PassthroughCodec {
    fn encode(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decode(&self, blob: &[u8]) -> Result<Vec<u8>> {
        Ok(blob.to_vec())
    }

    fn is_encrypted(&self) -> bool {
        false
    }
}

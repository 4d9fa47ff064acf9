//! 加密模块
//!
//! - AES-256-GCM 加解密（随机 12 字节 nonce，16 字节认证标签）
//! - 32 字节密钥，释放时清零
//! - 存储库使用的编解码器（加密 / 直通）

pub mod cipher;
pub mod codec;

pub use cipher::{decrypt, encrypt};
pub use codec::{AesGcmCodec, BlobCodec, PassthroughCodec};

use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

/// 密钥长度（字节）
pub const KEY_LEN: usize = 32;
/// nonce 长度（字节）
pub const NONCE_LEN: usize = 12;
/// 认证标签长度（字节）
pub const TAG_LEN: usize = 16;

/// 加解密错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("密钥长度无效: 需要 {expected} 字节, 实际 {got} 字节")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("密文长度不足: {len} 字节")]
    Truncated { len: usize },

    #[error("认证失败 - 密钥错误或数据已被篡改")]
    AuthenticationFailed,

    #[error("加密失败")]
    EncryptionFailed,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// 32 字节加密密钥
#[derive(Clone)]
pub struct EncryptionKey {
    key: [u8; KEY_LEN],
}

impl EncryptionKey {
    /// 从任意字节构造，长度必须为 32
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            got: bytes.len(),
        })?;
        Ok(Self { key })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_length_validation() {
        assert!(EncryptionKey::from_slice(&[7u8; 32]).is_ok());

        let err = EncryptionKey::from_slice(b"too short").unwrap_err();
        assert_eq!(
            err,
            CryptoError::InvalidKeyLength {
                expected: 32,
                got: 9
            }
        );
        assert!(EncryptionKey::from_slice(&[0u8; 33]).is_err());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = EncryptionKey::from_slice(&[b'x'; 32]).unwrap();
        assert_eq!(format!("{:?}", key), "EncryptionKey(***)");
    }
}

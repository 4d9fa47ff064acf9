//! 密钥一致性校验
//!
//! 存储库第一次使用时写入一个用密钥加密的 keyfile；之后每次同步或恢复前
//! 都用当前密钥解密并校验其中的已知字段，保证存储库整个生命周期只使用同一个密钥。

use crate::crypto::{decrypt, encrypt, EncryptionKey};
use crate::error::{BackupError, Result};
use crate::storage::Storage;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// keyfile 文件名（位于存储库根目录）
pub const KEYFILE_NAME: &str = "keyfile.encr";

const KNOWN_VALUE: &str = "known_value";
const RANDOM_LEN: usize = 2048;

/// keyfile 内容
#[derive(Debug, Serialize, Deserialize)]
struct KeyfileRecord {
    known_property: String,
    #[serde(default)]
    random_property: String,
}

impl KeyfileRecord {
    fn generate() -> Self {
        Self {
            known_property: KNOWN_VALUE.to_string(),
            random_property: random_string(RANDOM_LEN),
        }
    }
}

/// 校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyfileStatus {
    /// 新建了 keyfile
    Created,
    /// 已有 keyfile 校验通过
    Verified,
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// 初始化或校验存储库的 keyfile
pub fn ensure_keyfile(storage: &dyn Storage, key: &EncryptionKey) -> Result<KeyfileStatus> {
    if !storage.exists(KEYFILE_NAME)? {
        let record = KeyfileRecord::generate();
        let data = serde_json::to_vec(&record)?;
        let blob = encrypt(&data, key.as_bytes())?;
        storage.write(KEYFILE_NAME, &blob)?;
        info!("已创建 keyfile: {}", storage.name());
        return Ok(KeyfileStatus::Created);
    }

    let blob = storage.read(KEYFILE_NAME)?;
    let data = decrypt(&blob, key.as_bytes()).map_err(|e| {
        warn!("keyfile 解密失败: {}", e);
        BackupError::KeyMismatch(format!("无法用当前密钥解密 keyfile: {}", e))
    })?;

    let record: KeyfileRecord = serde_json::from_slice(&data)
        .map_err(|e| BackupError::KeyMismatch(format!("keyfile 内容无法解析: {}", e)))?;

    if record.known_property != KNOWN_VALUE {
        return Err(BackupError::KeyMismatch("keyfile 校验字段不匹配".to_string()));
    }

    info!("keyfile 校验通过");
    Ok(KeyfileStatus::Verified)
}

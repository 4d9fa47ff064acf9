//! 存储库 - 持有存储目录与编解码器
//!
//! 同步和恢复都必须先通过 [`BackupStore::open`] 打开存储库；加密的存储库在打开时会
//! 校验 keyfile，因此密钥不一致时不会发生任何同步/恢复文件操作。

use crate::core::keyfile::{ensure_keyfile, KeyfileStatus, KEYFILE_NAME};
use crate::core::ledger::{Ledger, LEDGER_FILE};
use crate::crypto::{AesGcmCodec, BlobCodec, EncryptionKey, PassthroughCodec};
use crate::error::{BackupError, Result};
use crate::storage::{LocalStorage, Storage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 存储库保护方式
#[derive(Debug)]
pub enum Protection {
    /// AES-256-GCM 加密
    Encrypted(EncryptionKey),
    /// 不加密，原样存储
    Plain,
}

/// 已打开的存储库
pub struct BackupStore {
    storage: LocalStorage,
    codec: Box<dyn BlobCodec>,
    keyfile: Option<KeyfileStatus>,
}

impl BackupStore {
    /// 打开（必要时创建）存储库
    pub fn open(root: impl AsRef<Path>, protection: Protection) -> Result<Self> {
        let storage = LocalStorage::new(root)?;

        let has_keyfile = storage.exists(KEYFILE_NAME)?;

        let (codec, keyfile) = match protection {
            Protection::Encrypted(key) => {
                if !has_keyfile && storage.exists(LEDGER_FILE)? {
                    return Err(BackupError::KeyMismatch(
                        "存储库未加密，不能以加密方式打开".to_string(),
                    ));
                }
                let status = ensure_keyfile(&storage, &key)?;
                let codec: Box<dyn BlobCodec> = Box::new(AesGcmCodec::new(key));
                (codec, Some(status))
            }
            Protection::Plain => {
                if has_keyfile {
                    return Err(BackupError::KeyMismatch(
                        "存储库已启用加密，不能以未加密方式打开".to_string(),
                    ));
                }
                debug!("存储库未启用加密: {}", storage.name());
                let codec: Box<dyn BlobCodec> = Box::new(PassthroughCodec);
                (codec, None)
            }
        };

        info!(
            "已打开存储库: {} (加密: {})",
            storage.name(),
            codec.is_encrypted()
        );

        Ok(Self {
            storage,
            codec,
            keyfile,
        })
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    pub fn codec(&self) -> &dyn BlobCodec {
        self.codec.as_ref()
    }

    pub fn root(&self) -> &Path {
        self.storage.root()
    }

    /// 打开时 keyfile 的状态（未加密时为 None）
    pub fn keyfile_status(&self) -> Option<KeyfileStatus> {
        self.keyfile
    }

    pub fn ledger_path(&self) -> PathBuf {
        ledger_path(self.root())
    }

    pub fn load_ledger(&self) -> Result<Ledger> {
        Ledger::load(&self.ledger_path())
    }

    /// 整体重写账本
    pub fn save_ledger(&self, ledger: &Ledger) -> Result<()> {
        self.storage.write(LEDGER_FILE, &ledger.to_json()?)?;
        debug!("已保存账本: {} 条记录", ledger.len());
        Ok(())
    }
}

/// 存储库账本文件路径
pub fn ledger_path(store_root: &Path) -> PathBuf {
    store_root.join(LEDGER_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::LedgerEntry;

    fn key(byte: u8) -> EncryptionKey {
        EncryptionKey::from_slice(&[byte; 32]).unwrap()
    }

    #[test]
    fn test_open_encrypted_initializes_keyfile() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::open(dir.path(), Protection::Encrypted(key(b'x'))).unwrap();
        assert_eq!(store.keyfile_status(), Some(KeyfileStatus::Created));
        assert!(dir.path().join(KEYFILE_NAME).exists());
        assert!(store.codec().is_encrypted());

        let reopened = BackupStore::open(dir.path(), Protection::Encrypted(key(b'x'))).unwrap();
        assert_eq!(reopened.keyfile_status(), Some(KeyfileStatus::Verified));
    }

    #[test]
    fn test_open_with_other_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        BackupStore::open(dir.path(), Protection::Encrypted(key(1))).unwrap();
        assert!(matches!(
            BackupStore::open(dir.path(), Protection::Encrypted(key(2))),
            Err(BackupError::KeyMismatch(_))
        ));
    }

    #[test]
    fn test_plain_store_has_no_keyfile() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::open(dir.path(), Protection::Plain).unwrap();
        assert_eq!(store.keyfile_status(), None);
        assert!(!dir.path().join(KEYFILE_NAME).exists());
    }

    #[test]
    fn test_encrypted_store_refuses_plain_open() {
        let dir = tempfile::tempdir().unwrap();
        BackupStore::open(dir.path(), Protection::Encrypted(key(b'x'))).unwrap();

        assert!(matches!(
            BackupStore::open(dir.path(), Protection::Plain),
            Err(BackupError::KeyMismatch(_))
        ));
        // 没有写入任何数据
        assert!(!dir.path().join(LEDGER_FILE).exists());
        assert!(BackupStore::open(dir.path(), Protection::Encrypted(key(b'x'))).is_ok());
    }

    #[test]
    fn test_plain_store_with_ledger_refuses_encrypted_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::open(dir.path(), Protection::Plain).unwrap();
        store
            .save_ledger(&Ledger::from_entries(vec![LedgerEntry::new("a.jpg", "h", 1)]))
            .unwrap();

        assert!(matches!(
            BackupStore::open(dir.path(), Protection::Encrypted(key(b'x'))),
            Err(BackupError::KeyMismatch(_))
        ));
        assert!(!dir.path().join(KEYFILE_NAME).exists());
    }

    #[test]
    fn test_empty_plain_store_can_become_encrypted() {
        let dir = tempfile::tempdir().unwrap();
        BackupStore::open(dir.path(), Protection::Plain).unwrap();
        let store = BackupStore::open(dir.path(), Protection::Encrypted(key(b'x'))).unwrap();
        assert_eq!(store.keyfile_status(), Some(KeyfileStatus::Created));
    }

    #[test]
    fn test_ledger_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::open(dir.path(), Protection::Plain).unwrap();
        assert!(store.load_ledger().unwrap().is_empty());

        let ledger = Ledger::from_entries(vec![LedgerEntry::new("a.jpg", "h", 1)]);
        store.save_ledger(&ledger).unwrap();
        assert_eq!(store.load_ledger().unwrap(), ledger);
        assert!(dir.path().join("metadata.json").exists());
    }
}

//! 恢复 - 从存储库重建源目录

use crate::core::ledger::{LedgerEntry, BLOB_SUFFIX};
use crate::core::store::BackupStore;
use crate::crypto::{decrypt, EncryptionKey};
use crate::error::{IoContext, Result};
use crate::storage::local::PARTIAL_SUFFIX;
use crate::storage::{LocalStorage, Storage};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::fs;
use std::path::{Component, Path};
use tracing::{debug, info, warn};

/// 单个文件的恢复失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreFailure {
    pub path: String,
    pub reason: String,
}

/// 恢复报告
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub restored: u32,
    pub failures: Vec<RestoreFailure>,
    /// 原样复制的未跟踪文件数
    pub mirrored_other: u32,
    /// 抽样模式下选中的路径
    pub sampled: Option<String>,
}

impl RestoreReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct RestoreEngine<'a> {
    store: &'a BackupStore,
}

impl<'a> RestoreEngine<'a> {
    pub fn new(store: &'a BackupStore) -> Self {
        Self { store }
    }

    /// 恢复到 `dest_root`
    ///
    /// 每个路径恢复修改时间最新的版本。单个文件失败只记录，不中断恢复。
    /// `sample` 为 true 时只随机恢复一个文件，并跳过未跟踪文件。
    pub fn run_restore(&self, dest_root: &Path, sample: bool) -> Result<RestoreReport> {
        info!(
            "开始恢复: {} -> {:?}",
            self.store.storage().name(),
            dest_root
        );

        let ledger = self.store.load_ledger()?;
        let latest = ledger.latest_by_path();

        let mut paths: Vec<&str> = latest.keys().copied().collect();
        paths.sort_unstable();

        let mut report = RestoreReport::default();

        if sample {
            let picked = paths.choose(&mut rand::thread_rng()).copied();
            match picked {
                Some(path) => {
                    info!("抽样恢复: {}", path);
                    report.sampled = Some(path.to_string());
                    paths = vec![path];
                }
                None => {
                    info!("账本为空，没有可抽样的文件");
                    paths.clear();
                }
            }
        }

        let dest = LocalStorage::new(dest_root)?;

        for path in paths {
            let entry = latest[path];
            match self.restore_entry(&dest, entry) {
                Ok(size) => {
                    debug!("已恢复: {} ({} 字节)", path, size);
                    report.restored += 1;
                }
                Err(reason) => {
                    warn!("恢复失败: {} - {}", path, reason);
                    report.failures.push(RestoreFailure {
                        path: path.to_string(),
                        reason,
                    });
                }
            }
        }

        if sample {
            info!("抽样模式，不恢复未跟踪的文件");
        } else {
            report.mirrored_other = self.mirror_untracked(&dest)?;
        }

        info!(
            "恢复完成: {} 个文件, {} 个失败, {} 个未跟踪文件",
            report.restored,
            report.failures.len(),
            report.mirrored_other
        );

        Ok(report)
    }

    /// 恢复单条记录，返回写入的字节数；失败时返回原因
    fn restore_entry(
        &self,
        dest: &LocalStorage,
        entry: &LedgerEntry,
    ) -> std::result::Result<usize, String> {
        if !is_safe_relative(&entry.original_path) {
            return Err("路径不安全，拒绝写出目标目录".to_string());
        }

        let blob = self
            .store
            .storage()
            .read(&entry.blob_path())
            .map_err(|e| e.to_string())?;
        let data = self
            .store
            .codec()
            .decode(&blob)
            .map_err(|e| e.to_string())?;
        dest.write(&entry.original_path, &data)
            .map_err(|e| e.to_string())?;

        Ok(data.len())
    }

    /// 原样复制存储库中所有非数据块文件（未完成写入的临时文件除外）
    fn mirror_untracked(&self, dest: &LocalStorage) -> Result<u32> {
        let storage = self.store.storage();
        let mut copied = 0;

        for file in storage.list_files()? {
            if file.path.ends_with(BLOB_SUFFIX) {
                continue;
            }
            if file.path.ends_with(PARTIAL_SUFFIX) {
                warn!("跳过未完成的写入: {}", file.path);
                continue;
            }
            let data = storage.read(&file.path)?;
            dest.write(&file.path, &data)?;
            debug!("已复制未跟踪文件: {}", file.path);
            copied += 1;
        }

        Ok(copied)
    }
}

/// 解密单个数据块文件并写到 `output`（自动创建父目录），返回明文字节数
///
/// 不需要打开存储库，也不校验 keyfile；用于手动取回单个文件。
pub fn decrypt_blob_file(blob_path: &Path, output: &Path, key: &EncryptionKey) -> Result<usize> {
    let blob = fs::read(blob_path).with_path(blob_path)?;
    let data = decrypt(&blob, key.as_bytes())?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    fs::write(output, &data).with_path(output)?;

    info!("已解密: {:?} -> {:?} ({} 字节)", blob_path, output, data.len());
    Ok(data.len())
}

/// 只允许普通的相对路径
fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

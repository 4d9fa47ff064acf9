//! 账本诊断与修复
//!
//! 不需要密钥：只比对账本记录与存储库中数据块是否存在。

use crate::core::ledger::{Ledger, LedgerEntry, LEDGER_FILE};
use crate::core::store::ledger_path;
use crate::error::Result;
use crate::storage::local::PARTIAL_SUFFIX;
use crate::storage::{LocalStorage, Storage};
use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 单个版本
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// 缩写形式 `abcd...wxyz`
    pub short_hash: String,
    pub hash: String,
    pub mod_time: i64,
    /// RFC 3339 (UTC)
    pub timestamp: String,
}

impl VersionInfo {
    fn from_entry(entry: &LedgerEntry) -> Self {
        Self {
            short_hash: short_hash(&entry.hash),
            hash: entry.hash.clone(),
            mod_time: entry.mod_time,
            timestamp: format_timestamp(entry.mod_time),
        }
    }
}

/// 有多个版本的路径
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionHistory {
    pub path: String,
    /// 按账本顺序
    pub versions: Vec<VersionInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub ledger_path: PathBuf,
    pub entry_count: usize,
    pub multi_version: Vec<VersionHistory>,
    /// 数据块缺失的记录
    pub missing: Vec<LedgerEntry>,
    /// 中断的写入留下的临时文件
    pub partial_files: Vec<String>,
}

pub struct MetadataAudit {
    storage: LocalStorage,
}

impl MetadataAudit {
    pub fn new(store_root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            storage: LocalStorage::open_existing(store_root)?,
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        ledger_path(self.storage.root())
    }

    /// 生成诊断报告，不修改任何文件
    pub fn report(&self) -> Result<AuditReport> {
        let ledger_path = self.ledger_path();
        let ledger = Ledger::load(&ledger_path)?;

        let mut multi_version: Vec<VersionHistory> = ledger
            .version_counts()
            .into_iter()
            .filter(|&(_, count)| count > 1)
            .map(|(path, _)| VersionHistory {
                path: path.to_string(),
                versions: ledger
                    .entries()
                    .iter()
                    .filter(|e| e.original_path == path)
                    .map(VersionInfo::from_entry)
                    .collect(),
            })
            .collect();
        multi_version.sort_by(|a, b| a.path.cmp(&b.path));

        let missing = self.missing_entries(&ledger)?;
        let partial_files: Vec<String> = self
            .storage
            .list_files()?
            .into_iter()
            .map(|f| f.path)
            .filter(|path| path.ends_with(PARTIAL_SUFFIX))
            .collect();

        info!(
            "账本检查完成: {} 条记录, {} 条缺失数据块, {} 个未完成的写入",
            ledger.len(),
            missing.len(),
            partial_files.len()
        );

        Ok(AuditReport {
            ledger_path,
            entry_count: ledger.len(),
            multi_version,
            missing,
            partial_files,
        })
    }

    /// 从账本中删除数据块缺失的记录并保存，返回被删除的记录
    ///
    /// 按 (路径, hash) 匹配，同一路径的其他有效版本保留。
    pub fn repair(&self) -> Result<Vec<LedgerEntry>> {
        let mut ledger = Ledger::load(&self.ledger_path())?;
        let missing = self.missing_entries(&ledger)?;

        if missing.is_empty() {
            info!("没有缺失的数据块，账本无需修复");
            return Ok(Vec::new());
        }

        let removed = ledger.retain(|entry| {
            !missing
                .iter()
                .any(|m| m.original_path == entry.original_path && m.hash == entry.hash)
        });
        for entry in &removed {
            warn!("移除记录: {} ({})", entry.original_path, short_hash(&entry.hash));
        }

        self.storage.write(LEDGER_FILE, &ledger.to_json()?)?;
        info!("账本已修复: 移除 {} 条记录", removed.len());

        Ok(removed)
    }

    fn missing_entries(&self, ledger: &Ledger) -> Result<Vec<LedgerEntry>> {
        let mut missing = Vec::new();
        for entry in ledger.entries() {
            if !self.storage.exists(&entry.blob_path())? {
                missing.push(entry.clone());
            }
        }
        Ok(missing)
    }
}

/// `abcd...wxyz`，过短的 hash 原样返回
pub fn short_hash(hash: &str) -> String {
    if hash.len() <= 8 || !hash.is_ascii() {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..4], &hash[hash.len() - 4..])
}

fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| secs.to_string())
}

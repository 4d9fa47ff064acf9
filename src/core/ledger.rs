//! 元数据账本 - 记录每个媒体文件的历史版本
//!
//! 账本是只追加的序列，同一路径可以出现多次，每条记录对应同步时观察到的一个内容版本。
//! 整体加载到内存，保存时整体重写。

use crate::error::{BackupError, IoContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// 账本文件名（位于存储库根目录）
pub const LEDGER_FILE: &str = "metadata.json";

/// 数据块后缀
pub const BLOB_SUFFIX: &str = ".encr";

/// 账本记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// 相对源目录的路径（`/` 分隔）
    pub original_path: String,
    /// 内容 SHA-256（十六进制）
    pub hash: String,
    /// 文件修改时间（Unix 秒）
    pub mod_time: i64,
}

impl LedgerEntry {
    pub fn new(original_path: impl Into<String>, hash: impl Into<String>, mod_time: i64) -> Self {
        Self {
            original_path: original_path.into(),
            hash: hash.into(),
            mod_time,
        }
    }

    /// 该版本在存储库中的数据块路径
    pub fn blob_path(&self) -> String {
        blob_name(&self.original_path, &self.hash)
    }
}

/// 内容寻址的数据块名: `<相对路径>-<hash>.encr`
pub fn blob_name(original_path: &str, hash: &str) -> String {
    format!("{}-{}{}", original_path, hash, BLOB_SUFFIX)
}

/// 元数据账本
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }

    /// 加载账本
    ///
    /// 文件不存在时返回空账本（新的存储库）；文件存在但无法解析时返回 `LedgerCorrupt`。
    pub fn load(path: &Path) -> Result<Self> {
        let data = match fs::read(path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("账本文件不存在，视为新存储库: {:?}", path);
                return Ok(Self::new());
            }
            Err(e) => return Err(e).with_path(path),
        };

        let entries: Vec<LedgerEntry> =
            serde_json::from_slice(&data).map_err(|source| BackupError::LedgerCorrupt {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("已加载账本: {} 条记录", entries.len());
        Ok(Self { entries })
    }

    /// 序列化为 JSON（整体重写用）
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.entries)?)
    }

    pub fn append(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 仅保留满足条件的记录，返回被移除的记录（只用于手动修复）
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<LedgerEntry>
    where
        F: FnMut(&LedgerEntry) -> bool,
    {
        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| keep(e));
        self.entries = kept;
        removed
    }

    /// 每个路径修改时间最大的版本；修改时间相同时后追加的记录优先
    pub fn latest_by_path(&self) -> HashMap<&str, &LedgerEntry> {
        let mut latest: HashMap<&str, &LedgerEntry> = HashMap::new();
        for entry in &self.entries {
            match latest.get(entry.original_path.as_str()) {
                Some(current) if current.mod_time > entry.mod_time => {}
                _ => {
                    latest.insert(entry.original_path.as_str(), entry);
                }
            }
        }
        latest
    }

    /// 每个路径最后追加的记录，不考虑修改时间
    pub fn last_appended_by_path(&self) -> HashMap<&str, &LedgerEntry> {
        self.entries
            .iter()
            .map(|e| (e.original_path.as_str(), e))
            .collect()
    }

    /// 统计每个路径的版本数
    pub fn version_counts(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for entry in &self.entries {
            *counts.entry(entry.original_path.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

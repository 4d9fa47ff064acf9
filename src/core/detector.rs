//! 非媒体文件的变化检测
//!
//! 非媒体文件不做内容哈希，是否需要重新复制完全取决于这里的信号。
//! 没有可靠信号的平台使用 [`AlwaysChanged`]（每次都重新复制）。

use crate::error::{IoContext, Result};
use crate::storage::local::file_meta;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 变化检测接口
pub trait ChangeDetector {
    /// 自上次镜像后文件是否发生变化
    fn has_changed_since_mirror(&mut self, path: &Path) -> Result<bool>;

    /// 文件已镜像，清除变化标记
    fn mark_mirrored(&mut self, path: &Path) -> Result<()>;

    /// 同步结束时持久化状态
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 总是报告已变化
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysChanged;

impl ChangeDetector for AlwaysChanged {
    fn has_changed_since_mirror(&mut self, _path: &Path) -> Result<bool> {
        Ok(true)
    }

    fn mark_mirrored(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// 镜像时记录的文件状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct MirrorState {
    size: u64,
    modified_ns: i64,
}

/// 基于大小和修改时间的变化检测
///
/// 状态保存在存储库之外的 JSON 文件中，键为源文件路径。
pub struct MirrorStateDetector {
    state_file: PathBuf,
    states: HashMap<String, MirrorState>,
    dirty: bool,
}

impl MirrorStateDetector {
    /// 按 (源目录, 存储库) 组合打开状态文件
    pub fn open(state_dir: &Path, source_root: &Path, store_root: &Path) -> Result<Self> {
        let file_name = format!("{}.json", Self::hash_roots(source_root, store_root));
        Self::load(state_dir.join(file_name))
    }

    /// 从指定文件加载状态，文件不存在或损坏时从空状态开始
    pub fn load(state_file: PathBuf) -> Result<Self> {
        let states = match fs::read(&state_file) {
            Ok(data) => match serde_json::from_slice(&data) {
                Ok(states) => states,
                Err(e) => {
                    // 状态丢失只会导致多复制一次
                    warn!("镜像状态文件损坏，重新开始记录: {:?} ({})", state_file, e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e).with_path(&state_file),
        };

        debug!("已加载 {} 条镜像状态: {:?}", states.len(), state_file);

        Ok(Self {
            state_file,
            states,
            dirty: false,
        })
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    fn hash_roots(source_root: &Path, store_root: &Path) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(source_root.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        hasher.update(store_root.to_string_lossy().as_bytes());
        hasher.finalize().to_hex()[..16].to_string()
    }

    fn key(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    fn current_state(path: &Path) -> Result<Option<MirrorState>> {
        match fs::metadata(path) {
            Ok(metadata) => {
                let meta = file_meta(&metadata).with_path(path)?;
                Ok(Some(MirrorState {
                    size: meta.size,
                    modified_ns: meta.modified_ns,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_path(path),
        }
    }
}

impl ChangeDetector for MirrorStateDetector {
    fn has_changed_since_mirror(&mut self, path: &Path) -> Result<bool> {
        let recorded = self.states.get(&Self::key(path)).copied();
        let current = Self::current_state(path)?;
        Ok(match (recorded, current) {
            (Some(recorded), Some(current)) => recorded != current,
            _ => true,
        })
    }

    fn mark_mirrored(&mut self, path: &Path) -> Result<()> {
        if let Some(state) = Self::current_state(path)? {
            self.states.insert(Self::key(path), state);
            self.dirty = true;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.state_file.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        let data = serde_json::to_vec(&self.states)?;
        fs::write(&self.state_file, data).with_path(&self.state_file)?;
        self.dirty = false;

        info!("已保存 {} 条镜像状态", self.states.len());
        Ok(())
    }
}

//! 测试辅助

use crate::core::detector::ChangeDetector;
use crate::error::{BackupError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

pub const KEY_X: [u8; 32] = [b'x'; 32];

/// 写入文件并设置修改时间（Unix 秒）
pub fn write_file(root: &Path, rel: &str, data: &[u8], mtime: u64) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, data).unwrap();
    let file = fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime))
        .unwrap();
    path
}

/// 目录下所有文件的 相对路径 -> 内容
pub fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

/// 可控的变化检测器
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    pub changed: bool,
    pub fail_on: Option<String>,
    pub marked: Vec<PathBuf>,
    pub flushed: bool,
}

impl ChangeDetector for ScriptedDetector {
    fn has_changed_since_mirror(&mut self, path: &Path) -> Result<bool> {
        if let Some(name) = &self.fail_on {
            if path.ends_with(name) {
                return Err(BackupError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                });
            }
        }
        Ok(self.changed)
    }

    fn mark_mirrored(&mut self, path: &Path) -> Result<()> {
        self.marked.push(path.to_path_buf());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushed = true;
        Ok(())
    }
}

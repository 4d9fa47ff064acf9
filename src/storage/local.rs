use super::{FileInfo, FileMeta, Storage};
use crate::error::{IoContext, Result};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

/// 写入时使用的临时文件后缀
pub(crate) const PARTIAL_SUFFIX: &str = ".partial";

pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
}

impl LocalStorage {
    /// 打开本地目录，不存在时自动创建
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).with_path(&base_path)?;
        }
        let name = format!("local:{}", base_path.display());
        Ok(Self { base_path, name })
    }

    /// 打开已存在的目录（不创建）
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::metadata(&base_path).with_path(&base_path)?;
        let name = format!("local:{}", base_path.display());
        Ok(Self { base_path, name })
    }

    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    /// 规范化路径分隔符（统一使用 /）
    pub fn normalize_path(path: &str) -> String {
        path.replace('\\', "/")
    }

    /// 计算相对根目录的规范化路径
    pub fn relative_path(&self, full_path: &Path) -> Option<String> {
        let relative = full_path.strip_prefix(&self.base_path).ok()?.to_str()?;
        Some(Self::normalize_path(relative))
    }

    fn partial_path(full_path: &Path) -> PathBuf {
        let mut name = full_path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(PARTIAL_SUFFIX);
        full_path.with_file_name(name)
    }
}

/// 从 fs::Metadata 提取元数据
pub(crate) fn file_meta(metadata: &fs::Metadata) -> io::Result<FileMeta> {
    let (modified_time, modified_ns) = unix_times(metadata.modified()?);
    Ok(FileMeta {
        size: metadata.len(),
        modified_time,
        modified_ns,
    })
}

/// 转换为有符号的 Unix 时间 (秒, 纳秒)，1970 年之前为负数，秒向下取整
fn unix_times(time: SystemTime) -> (i64, i64) {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => (after.as_secs() as i64, after.as_nanos() as i64),
        Err(e) => {
            let before = e.duration();
            let secs = before.as_secs() as i64 + i64::from(before.subsec_nanos() > 0);
            (-secs, -(before.as_nanos() as i64))
        }
    }
}

impl Storage for LocalStorage {
    fn list_files(&self) -> Result<Vec<FileInfo>> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.base_path)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(relative_path) = self.relative_path(entry.path()) else {
                continue;
            };
            let metadata = entry.metadata()?;
            let meta = file_meta(&metadata).with_path(entry.path())?;

            files.push(FileInfo {
                path: relative_path,
                size: meta.size,
                modified_time: meta.modified_time,
            });
        }

        Ok(files)
    }

    fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        let full_path = self.resolve_path(path);

        match fs::metadata(&full_path) {
            Ok(metadata) if metadata.is_dir() => Ok(None),
            Ok(metadata) => Ok(Some(file_meta(&metadata).with_path(&full_path)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_path(&full_path),
        }
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(path);
        fs::read(&full_path).with_path(&full_path)
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.resolve_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }

        // 使用临时文件写入，然后原子重命名
        let temp_path = Self::partial_path(&full_path);
        fs::write(&temp_path, data).with_path(&temp_path)?;
        fs::rename(&temp_path, &full_path).with_path(&full_path)?;

        Ok(())
    }

    fn root(&self) -> &Path {
        &self.base_path
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_parents_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();

        storage.write("2024/trip/a.jpg", b"img").unwrap();
        assert_eq!(storage.read("2024/trip/a.jpg").unwrap(), b"img");
        assert!(storage.exists("2024/trip/a.jpg").unwrap());
        assert!(!storage.exists("2024/trip/b.jpg").unwrap());
        // 目录不算文件
        assert!(!storage.exists("2024/trip").unwrap());
        // 没有残留临时文件
        assert!(!dir.path().join("2024/trip/a.jpg.partial").exists());
    }

    #[test]
    fn test_list_files_is_sorted_and_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        storage.write("b/2.txt", b"2").unwrap();
        storage.write("a.txt", b"1").unwrap();
        storage.write("b/1.txt", b"11").unwrap();

        let files = storage.list_files().unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b/1.txt", "b/2.txt"]);
        assert_eq!(files[1].size, 2);
    }

    #[test]
    fn test_unix_times_before_epoch() {
        use std::time::Duration;

        let after = UNIX_EPOCH + Duration::new(1_000, 500);
        assert_eq!(unix_times(after), (1_000, 1_000_000_000_500));

        let before = UNIX_EPOCH - Duration::from_secs(100);
        assert_eq!(unix_times(before), (-100, -100_000_000_000));

        // 与 Unix 秒的向下取整一致
        let fractional = UNIX_EPOCH - Duration::from_millis(1_500);
        assert_eq!(unix_times(fractional), (-2, -1_500_000_000));
    }

    #[test]
    fn test_new_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/store");
        LocalStorage::new(&root).unwrap();
        assert!(root.is_dir());
        assert!(LocalStorage::open_existing(dir.path().join("nope")).is_err());
    }
}

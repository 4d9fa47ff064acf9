use crate::error::{BackupError, Result};
use crate::storage::LocalStorage;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 路径匹配规则（正则，对相对路径做非锚定匹配）
#[derive(Debug, Clone)]
pub struct PathFilter {
    regex: Regex,
}

impl PathFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| BackupError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }

    pub fn matches(&self, relative_path: &str) -> bool {
        self.regex.is_match(relative_path)
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

/// 扫描到的文件
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// 相对根目录的路径（`/` 分隔）
    pub relative_path: String,
    pub full_path: PathBuf,
}

impl ScannedFile {
    /// 小写扩展名（不含点），没有扩展名时为空
    ///
    /// 取文件名最后一个点之后的部分，`.JPG` 这类点开头的文件名也算作有扩展名。
    pub fn extension(&self) -> String {
        let name = self.relative_path.rsplit('/').next().unwrap_or_default();
        name.rfind('.')
            .map(|dot| name[dot + 1..].to_lowercase())
            .unwrap_or_default()
    }
}

/// 扫描统计
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanStats {
    pub matched: u32,
    pub excluded: u32,
}

/// 文件扫描器
///
/// 深度优先、按文件名排序遍历；路径匹配在任何文件读取之前完成。
pub struct FileScanner {
    filter: PathFilter,
}

impl FileScanner {
    pub fn new(filter: PathFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// 遍历目录，对每个匹配的普通文件调用 `visit`
    ///
    /// `visit` 或遍历本身出错时立即停止并返回错误。
    pub fn walk<F>(&self, root: &Path, mut visit: F) -> Result<ScanStats>
    where
        F: FnMut(ScannedFile) -> Result<()>,
    {
        info!("开始扫描: {:?}, 匹配规则: {}", root, self.filter.pattern());

        // 只用来计算相对路径，不创建目录
        let base = LocalStorage::open_existing(root)?;
        let mut stats = ScanStats::default();

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(relative_path) = base.relative_path(entry.path()) else {
                warn!("跳过无法识别的路径: {:?}", entry.path());
                continue;
            };

            if !self.filter.matches(&relative_path) {
                debug!("排除文件: {}", relative_path);
                stats.excluded += 1;
                continue;
            }

            stats.matched += 1;
            visit(ScannedFile {
                relative_path,
                full_path: entry.into_path(),
            })?;
        }

        info!(
            "扫描完成: {} 个文件匹配, {} 个被排除",
            stats.matched, stats.excluded
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel.as_bytes()).unwrap();
    }

    #[test]
    fn test_filter_is_unanchored_regex() {
        let filter = PathFilter::new("2024/").unwrap();
        assert!(filter.matches("photos/2024/a.jpg"));
        assert!(!filter.matches("photos/2023/a.jpg"));

        let anchored = PathFilter::new(r"^raw/.*\.cr2$").unwrap();
        assert!(anchored.matches("raw/x.cr2"));
        assert!(!anchored.matches("old/raw/x.cr2"));
    }

    #[test]
    fn test_extension_of_last_component() {
        let ext = |path: &str| {
            ScannedFile {
                relative_path: path.to_string(),
                full_path: PathBuf::from(path),
            }
            .extension()
        };
        assert_eq!(ext("a/photo.CR2"), "cr2");
        assert_eq!(ext(".JPG"), "jpg");
        assert_eq!(ext("trip/.mov"), "mov");
        assert_eq!(ext("archive.tar.GZ"), "gz");
        assert_eq!(ext("dir.d/README"), "");
        assert_eq!(ext("Makefile"), "");
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            PathFilter::new("(unclosed"),
            Err(BackupError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_walk_order_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b/2.jpg");
        touch(dir.path(), "a.txt");
        touch(dir.path(), "b/1.JPG");
        touch(dir.path(), "c/skip.mov");

        let scanner = FileScanner::new(PathFilter::new("^(a|b)").unwrap());
        let mut seen = Vec::new();
        let stats = scanner
            .walk(dir.path(), |file| {
                seen.push((file.relative_path.clone(), file.extension()));
                Ok(())
            })
            .unwrap();

        assert_eq!(
            seen,
            vec![
                ("a.txt".to_string(), "txt".to_string()),
                ("b/1.JPG".to_string(), "jpg".to_string()),
                ("b/2.jpg".to_string(), "jpg".to_string()),
            ]
        );
        assert_eq!(stats.matched, 3);
        assert_eq!(stats.excluded, 1);
    }

    #[test]
    fn test_walk_stops_on_visit_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.txt");
        touch(dir.path(), "b.txt");

        let scanner = FileScanner::new(PathFilter::new(".*").unwrap());
        let mut calls = 0;
        let result = scanner.walk(dir.path(), |file| {
            calls += 1;
            Err(BackupError::KeyMismatch(file.relative_path))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_walk_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = FileScanner::new(PathFilter::new(".*").unwrap());
        assert!(scanner.walk(&dir.path().join("missing"), |_| Ok(())).is_err());
    }
}

use crate::core::detector::ChangeDetector;
use crate::core::hash::calculate_hash;
use crate::core::keyfile::KEYFILE_NAME;
use crate::core::ledger::{blob_name, Ledger, LedgerEntry, LEDGER_FILE};
use crate::core::scanner::{FileScanner, PathFilter, ScanStats, ScannedFile};
use crate::core::store::BackupStore;
use crate::error::{IoContext, Result};
use crate::storage::local::file_meta;
use crate::storage::Storage;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 按内容哈希跟踪版本的媒体扩展名（小写）
pub const MEDIA_EXTENSIONS: [&str; 4] = ["cr2", "jpg", "mov", "avi"];

/// 同步摘要文件名前缀
pub const SUMMARY_PREFIX: &str = "sync-summary-";

/// 存储库根目录下保留的文件名，源目录中的同名文件不会被镜像
const RESERVED_NAMES: [&str; 2] = [LEDGER_FILE, KEYFILE_NAME];

/// 文件分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// 媒体文件：按内容哈希判断变化，加密存储并记录版本
    Media,
    /// 其他文件：依赖变化检测，原样镜像
    Other,
}

impl FileClass {
    /// 按扩展名分类（不区分大小写）
    pub fn classify(extension: &str) -> Self {
        let ext = extension.to_lowercase();
        if MEDIA_EXTENSIONS.contains(&ext.as_str()) {
            FileClass::Media
        } else {
            FileClass::Other
        }
    }
}

/// 单个媒体文件的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaOutcome {
    New,
    Updated,
    Skipped,
}

/// 内容发生变化的媒体文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedMedia {
    pub path: String,
    pub hash: String,
}

/// 同步报告
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub files_scanned: u32,
    pub files_excluded: u32,
    pub new_media: u32,
    pub updated_media: Vec<UpdatedMedia>,
    pub skipped_media: u32,
    pub copied_other: u32,
    pub skipped_other: u32,
    /// 按扩展名统计复制的其他文件（如 ".txt"）
    pub other_by_extension: BTreeMap<String, u32>,
    pub entries_appended: u32,
    pub duration_ms: u64,
    /// 新增/更新媒体文件花费的总时间
    pub media_processing_ms: u64,
    pub path_pattern: String,
}

impl SyncReport {
    /// 每个新增/更新媒体文件的平均耗时（毫秒）
    pub fn average_media_ms(&self) -> f64 {
        let processed = self.new_media as usize + self.updated_media.len();
        if processed == 0 {
            0.0
        } else {
            self.media_processing_ms as f64 / processed as f64
        }
    }

    /// 可读的同步摘要
    pub fn summary_text(&self) -> String {
        const RULE: &str = "------------------------------------------\n";

        let mut text = String::from(RULE);
        text.push_str(&format!("新增媒体文件: {}\n", self.new_media));
        text.push_str(&format!("更新媒体文件: {}\n", self.updated_media.len()));
        text.push_str(&format!("跳过媒体文件: {}\n", self.skipped_media));
        text.push_str(RULE);
        text.push_str(&format!("复制其他文件: {}\n", self.copied_other));
        text.push_str("类型:\n");
        for (ext, count) in &self.other_by_extension {
            let ext = if ext.is_empty() { "(无扩展名)" } else { ext.as_str() };
            text.push_str(&format!("  {}: {}\n", ext, count));
        }

        if !self.updated_media.is_empty() {
            text.push_str(RULE);
            text.push_str("已更新的媒体文件:\n");
            for media in &self.updated_media {
                text.push_str(&format!("  {} (新 hash: {})\n", media.path, media.hash));
            }
        }

        text.push_str(RULE);
        text.push_str(&format!(
            "总耗时: {:.2} 秒\n",
            self.duration_ms as f64 / 1000.0
        ));
        text.push_str(&format!(
            "新增/更新媒体文件平均耗时: {:.2} 秒\n",
            self.average_media_ms() / 1000.0
        ));
        text.push_str(&format!("匹配规则: {}\n", self.path_pattern));
        text
    }
}

/// 同步摘要文件名: `sync-summary-<YYYYMMDD-HHMMSS>.txt`
pub fn summary_file_name(at: &NaiveDateTime) -> String {
    format!("{}{}.txt", SUMMARY_PREFIX, at.format("%Y%m%d-%H%M%S"))
}

/// 将同步摘要写入存储库根目录，返回文件名
///
/// 摘要不是数据块，恢复时会作为未跟踪文件复制出来。
pub fn write_summary(store: &BackupStore, report: &SyncReport, at: &NaiveDateTime) -> Result<String> {
    let name = summary_file_name(at);
    store.storage().write(&name, report.summary_text().as_bytes())?;
    info!("已写入同步摘要: {}", name);
    Ok(name)
}

/// 一次同步运行中的可变状态
struct SyncRun<'r> {
    ledger: Ledger,
    /// 路径 -> 最后追加记录的 hash
    tracked: HashMap<String, String>,
    report: SyncReport,
    media_time: Duration,
    detector: &'r mut dyn ChangeDetector,
}

/// 同步引擎
///
/// 单线程、顺序处理。账本在遍历结束后只保存一次。
pub struct SyncEngine<'a> {
    store: &'a BackupStore,
    scanner: FileScanner,
}

impl<'a> SyncEngine<'a> {
    pub fn new(store: &'a BackupStore, filter: PathFilter) -> Self {
        Self {
            store,
            scanner: FileScanner::new(filter),
        }
    }

    /// 运行同步
    ///
    /// 遍历出错时，已追加的账本记录仍会保存（不回滚已写入的数据块），然后返回错误。
    pub fn run_sync(
        &self,
        source_root: &Path,
        detector: &mut dyn ChangeDetector,
    ) -> Result<SyncReport> {
        let start = Instant::now();
        info!(
            "开始同步: {:?} -> {}",
            source_root,
            self.store.storage().name()
        );

        let ledger = self.store.load_ledger()?;
        let tracked = ledger
            .last_appended_by_path()
            .into_iter()
            .map(|(path, entry)| (path.to_string(), entry.hash.clone()))
            .collect();
        let entries_before = ledger.len();

        let mut run = SyncRun {
            ledger,
            tracked,
            report: SyncReport {
                path_pattern: self.scanner.filter().pattern().to_string(),
                ..Default::default()
            },
            media_time: Duration::ZERO,
            detector,
        };

        let walk_result = self
            .scanner
            .walk(source_root, |file| self.process_file(&mut run, &file));

        let appended = run.ledger.len() - entries_before;
        let persist_result = self.persist(&mut run, appended);

        let stats: ScanStats = match (walk_result, persist_result) {
            (Ok(stats), Ok(())) => stats,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), persist) => {
                if let Err(persist_err) = persist {
                    error!("保存同步进度失败: {}", persist_err);
                }
                error!("同步中断: {} (已保存 {} 条新记录)", e, appended);
                return Err(e);
            }
        };

        let mut report = run.report;
        report.files_scanned = stats.matched;
        report.files_excluded = stats.excluded;
        report.entries_appended = appended as u32;
        report.media_processing_ms = run.media_time.as_millis() as u64;
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "同步完成: 新增媒体 {}, 更新媒体 {}, 跳过媒体 {}, 复制其他文件 {}",
            report.new_media,
            report.updated_media.len(),
            report.skipped_media,
            report.copied_other
        );

        Ok(report)
    }

    /// 保存账本（仅在有新记录时）并持久化变化检测状态
    fn persist(&self, run: &mut SyncRun<'_>, appended: usize) -> Result<()> {
        let saved = if appended > 0 {
            self.store.save_ledger(&run.ledger)
        } else {
            debug!("账本无变化，不重写");
            Ok(())
        };
        let flushed = run.detector.flush();
        saved.and(flushed)
    }

    fn process_file(&self, run: &mut SyncRun<'_>, file: &ScannedFile) -> Result<()> {
        let extension = file.extension();
        match FileClass::classify(&extension) {
            FileClass::Media => self.sync_media(run, file),
            FileClass::Other => self.sync_other(run, file, &extension),
        }
    }

    /// 媒体文件：按内容哈希判断新增/更新/跳过
    fn sync_media(&self, run: &mut SyncRun<'_>, file: &ScannedFile) -> Result<()> {
        let started = Instant::now();
        let path = &file.relative_path;

        let data = fs::read(&file.full_path).with_path(&file.full_path)?;
        let hash = calculate_hash(&data);

        let outcome = match run.tracked.get(path) {
            None => MediaOutcome::New,
            Some(stored) if *stored != hash => MediaOutcome::Updated,
            Some(_) => MediaOutcome::Skipped,
        };

        if outcome == MediaOutcome::Skipped {
            debug!("媒体文件未变化，跳过: {}", path);
            run.report.skipped_media += 1;
            return Ok(());
        }

        let metadata = fs::metadata(&file.full_path).with_path(&file.full_path)?;
        let mod_time = file_meta(&metadata)
            .with_path(&file.full_path)?
            .modified_time;

        let blob = self.store.codec().encode(&data)?;
        self.store.storage().write(&blob_name(path, &hash), &blob)?;

        run.ledger
            .append(LedgerEntry::new(path.clone(), hash.clone(), mod_time));
        run.tracked.insert(path.clone(), hash.clone());

        match outcome {
            MediaOutcome::New => {
                debug!("新增媒体文件: {}", path);
                run.report.new_media += 1;
            }
            _ => {
                debug!("媒体文件已更新: {} (新 hash: {})", path, hash);
                run.report.updated_media.push(UpdatedMedia {
                    path: path.clone(),
                    hash,
                });
            }
        }
        run.media_time += started.elapsed();

        Ok(())
    }

    /// 其他文件：目标不存在或检测到变化时原样复制
    fn sync_other(&self, run: &mut SyncRun<'_>, file: &ScannedFile, extension: &str) -> Result<()> {
        let path = &file.relative_path;

        if RESERVED_NAMES.contains(&path.as_str()) {
            warn!("跳过与存储库保留文件同名的文件: {}", path);
            run.report.skipped_other += 1;
            return Ok(());
        }

        let storage = self.store.storage();
        let changed = run.detector.has_changed_since_mirror(&file.full_path)?;

        if !changed && storage.exists(path)? {
            debug!("文件未变化，跳过: {}", path);
            run.report.skipped_other += 1;
            return Ok(());
        }

        let data = fs::read(&file.full_path).with_path(&file.full_path)?;
        let permissions = fs::metadata(&file.full_path)
            .with_path(&file.full_path)?
            .permissions();
        storage.write(path, &data)?;
        let mirrored = storage.resolve_path(path);
        fs::set_permissions(&mirrored, permissions).with_path(&mirrored)?;
        run.detector.mark_mirrored(&file.full_path)?;

        debug!("已复制: {} ({} 字节)", path, data.len());
        run.report.copied_other += 1;
        let key = if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension)
        };
        *run.report.other_by_extension.entry(key).or_insert(0) += 1;

        Ok(())
    }
}

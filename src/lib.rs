pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod storage;

pub use core::{
    AlwaysChanged, AuditReport, BackupStore, ChangeDetector, MetadataAudit, MirrorStateDetector,
    PathFilter, Protection, RestoreEngine, RestoreReport, SyncEngine, SyncReport,
};
pub use crypto::EncryptionKey;
pub use error::{BackupError, Result};

/// 应用数据目录
pub mod dirs {
    use std::path::PathBuf;

    const APP_DIR: &str = "photovault";

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        }
    }

    /// 配置、日志和镜像状态所在目录，取不到系统目录时使用当前目录下的 `.photovault`
    pub fn data_dir() -> PathBuf {
        config_dir()
            .map(|p| p.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR)))
    }

    /// 变化检测状态目录
    pub fn mirror_state_dir() -> PathBuf {
        data_dir().join("mirror_state")
    }
}

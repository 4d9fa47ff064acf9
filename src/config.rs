//! 应用配置模块
//!
//! 所有配置保存在数据目录下的同一个 `config.json` 中，每个模块读写自己的段。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";

/// 读取配置段，文件不存在或内容无效时返回 None
pub(crate) fn load_section<T: DeserializeOwned>(config_dir: &Path, section: &str) -> Option<T> {
    let content = fs::read_to_string(config_dir.join(CONFIG_FILE)).ok()?;
    let config = serde_json::from_str::<serde_json::Value>(&content).ok()?;
    serde_json::from_value(config.get(section)?.clone()).ok()
}

/// 写入配置段，保留其他段
pub(crate) fn save_section<T: Serialize>(config_dir: &Path, section: &str, value: &T) -> io::Result<()> {
    let config_file = config_dir.join(CONFIG_FILE);

    let mut config: serde_json::Value = match fs::read_to_string(&config_file) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({})),
        Err(e) if e.kind() == io::ErrorKind::NotFound => serde_json::json!({}),
        Err(e) => return Err(e),
    };
    if !config.is_object() {
        config = serde_json::json!({});
    }

    config[section] = serde_json::to_value(value)?;

    fs::create_dir_all(config_dir)?;
    fs::write(&config_file, serde_json::to_string_pretty(&config)?)
}

/// 备份配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    /// 源目录（命令行未指定时使用）
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
    /// 存储库目录
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    /// 是否加密数据块
    #[serde(default = "default_encrypt")]
    pub encrypt: bool,
    /// 相对路径的匹配规则（正则）
    #[serde(default = "default_path_pattern")]
    pub path_pattern: String,
}

fn default_encrypt() -> bool {
    true
}

fn default_path_pattern() -> String {
    ".*".to_string()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            store_dir: None,
            encrypt: default_encrypt(),
            path_pattern: default_path_pattern(),
        }
    }
}

impl BackupConfig {
    /// 从配置文件加载备份配置
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "backup").unwrap_or_default()
    }

    /// 保存备份配置
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        save_section(config_dir, "backup", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackupConfig::load(dir.path());
        assert!(config.encrypt);
        assert_eq!(config.path_pattern, ".*");
        assert!(config.source_dir.is_none());
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"backup":{"storeDir":"/mnt/backup","encrypt":false}}"#,
        )
        .unwrap();

        let config = BackupConfig::load(dir.path());
        assert_eq!(config.store_dir, Some(PathBuf::from("/mnt/backup")));
        assert!(!config.encrypt);
        assert_eq!(config.path_pattern, ".*");
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "not json").unwrap();
        assert!(BackupConfig::load(dir.path()).encrypt);
    }

    #[test]
    fn test_save_keeps_other_sections() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{"log":{"level":"debug"}}"#).unwrap();

        let config = BackupConfig {
            source_dir: Some(PathBuf::from("/photos")),
            path_pattern: "2024".to_string(),
            ..Default::default()
        };
        config.save(dir.path()).unwrap();

        let loaded = BackupConfig::load(dir.path());
        assert_eq!(loaded.source_dir, Some(PathBuf::from("/photos")));
        assert_eq!(loaded.path_pattern, "2024");

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw["log"]["level"], "debug");
    }
}

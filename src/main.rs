use anyhow::{anyhow, bail, Context};
use photovault_lib::config::BackupConfig;
use photovault_lib::core::{decrypt_blob_file, write_summary, KeyfileStatus};
use photovault_lib::logging::{get_log_dir, LogConfig, SizeRotatingWriter};
use photovault_lib::{
    dirs, BackupStore, EncryptionKey, MetadataAudit, MirrorStateDetector, PathFilter, Protection,
    RestoreEngine, SyncEngine,
};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;
use zeroize::Zeroizing;

const USAGE: &str = "用法:
  photovault sync [源目录] [存储库目录]
  photovault restore <目标目录> [存储库目录] [--sample]
  photovault audit [存储库目录]
  photovault repair [存储库目录]
  photovault decrypt <数据块文件> <输出文件>

未指定的目录从 config.json 的 backup 段读取。
密钥从 ENCRYPTION_KEY 环境变量读取（32 字节），未设置时从标准输入读取。";

/// 初始化日志系统
fn init_logging() {
    let log_dir = get_log_dir();
    let _ = std::fs::create_dir_all(&log_dir);

    let config = LogConfig::load(&log_dir);

    if !config.enabled {
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return;
    }

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(config.tracing_level().into())
        .from_env_lossy();

    match SizeRotatingWriter::new(&log_dir, config.max_size_mb) {
        Ok(file_writer) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(false);

            // debug 模式下同时输出到控制台
            #[cfg(debug_assertions)]
            {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(false);

                let subscriber = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer)
                    .with(console_layer);
                let _ = tracing::subscriber::set_global_default(subscriber);
            }

            #[cfg(not(debug_assertions))]
            {
                let subscriber = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer);
                let _ = tracing::subscriber::set_global_default(subscriber);
            }
        }
        Err(e) => {
            // 文件日志创建失败，回退到控制台
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(io::stderr)
                .init();
            tracing::warn!("无法创建日志文件 {:?}: {}", log_dir, e);
        }
    }
}

/// 读取密钥：先读环境变量，长度不对时提示从标准输入输入
fn read_key() -> anyhow::Result<EncryptionKey> {
    if let Ok(value) = std::env::var("ENCRYPTION_KEY") {
        let value = Zeroizing::new(value);
        if let Ok(key) = EncryptionKey::from_slice(value.as_bytes()) {
            return Ok(key);
        }
        tracing::warn!("ENCRYPTION_KEY 长度不正确，改为从标准输入读取");
    }

    eprintln!("请输入加密密钥（32 字节）:");
    io::stderr().flush()?;

    let mut line = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut line)?;
    let key = EncryptionKey::from_slice(line.trim().as_bytes()).context("加密密钥无效")?;
    Ok(key)
}

fn protection(config: &BackupConfig) -> anyhow::Result<Protection> {
    if config.encrypt {
        Ok(Protection::Encrypted(read_key()?))
    } else {
        Ok(Protection::Plain)
    }
}

fn open_store(config: &BackupConfig, store_dir: &Path) -> anyhow::Result<BackupStore> {
    let store = BackupStore::open(store_dir, protection(config)?)
        .with_context(|| format!("无法打开存储库: {:?}", store_dir))?;
    if store.keyfile_status() == Some(KeyfileStatus::Created) {
        tracing::info!("新的加密存储库，已写入 keyfile: {:?}", store_dir);
    }
    Ok(store)
}

fn dir_arg(arg: Option<&String>, fallback: &Option<PathBuf>, what: &str) -> anyhow::Result<PathBuf> {
    arg.map(PathBuf::from)
        .or_else(|| fallback.clone())
        .ok_or_else(|| anyhow!("未指定{}\n\n{}", what, USAGE))
}

fn print_report<T: Serialize>(report: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn run_sync(config: &BackupConfig, source: &Path, store_dir: &Path) -> anyhow::Result<()> {
    let filter = PathFilter::new(&config.path_pattern)?;
    let store = open_store(config, store_dir)?;
    let mut detector = MirrorStateDetector::open(&dirs::mirror_state_dir(), source, store.root())?;

    let report = SyncEngine::new(&store, filter)
        .run_sync(source, &mut detector)
        .with_context(|| format!("同步失败: {:?}", source))?;

    tracing::info!(
        "本次同步耗时 {} ms, 媒体文件平均 {:.1} ms",
        report.duration_ms,
        report.average_media_ms()
    );
    print!("{}", report.summary_text());

    let now = chrono::Local::now().naive_local();
    if let Err(e) = write_summary(&store, &report, &now) {
        tracing::warn!("写入同步摘要失败: {}", e);
    }
    Ok(())
}

fn run_restore(
    config: &BackupConfig,
    dest: &Path,
    store_dir: &Path,
    sample: bool,
) -> anyhow::Result<()> {
    let store = open_store(config, store_dir)?;
    let report = RestoreEngine::new(&store).run_restore(dest, sample)?;
    print_report(&report)?;

    if report.has_failures() {
        bail!("{} 个文件恢复失败", report.failures.len());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let config = BackupConfig::load(&dirs::data_dir());

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let sample = args.iter().any(|a| a == "--sample");
    args.retain(|a| a != "--sample");

    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    match command.as_str() {
        "sync" => {
            let source = dir_arg(args.get(1), &config.source_dir, "源目录")?;
            let store_dir = dir_arg(args.get(2), &config.store_dir, "存储库目录")?;
            run_sync(&config, &source, &store_dir)
        }
        "restore" => {
            let dest = dir_arg(args.get(1), &None, "目标目录")?;
            let store_dir = dir_arg(args.get(2), &config.store_dir, "存储库目录")?;
            run_restore(&config, &dest, &store_dir, sample)
        }
        "audit" => {
            let store_dir = dir_arg(args.get(1), &config.store_dir, "存储库目录")?;
            print_report(&MetadataAudit::new(&store_dir)?.report()?)
        }
        "repair" => {
            let store_dir = dir_arg(args.get(1), &config.store_dir, "存储库目录")?;
            let removed = MetadataAudit::new(&store_dir)?.repair()?;
            tracing::info!("已从账本移除 {} 条记录", removed.len());
            print_report(&removed)
        }
        "decrypt" => {
            let blob = dir_arg(args.get(1), &None, "数据块文件")?;
            let output = dir_arg(args.get(2), &None, "输出文件")?;
            let size = decrypt_blob_file(&blob, &output, &read_key()?)?;
            println!("已解密 {} 字节: {:?}", size, output);
            Ok(())
        }
        other => bail!("未知命令: {}\n\n{}", other, USAGE),
    }
}

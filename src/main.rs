use anyhow::{Context, Result};
use clap::Parser;
use foldersync_lib::config::{FileConfig, SyncConfig};
use foldersync_lib::core::{SyncDriver, SyncEngine};
use foldersync_lib::logging::{init_logging, LogConfig};
use foldersync_lib::sink::{FileSink, LogSink};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "foldersync",
    version,
    about = "One-way folder mirroring: keeps a backup folder identical to a source folder"
)]
struct Cli {
    /// Source folder (read only)
    #[arg(long, alias = "sourceFolder")]
    source: Option<PathBuf>,

    /// Backup folder, mirrored from the source
    #[arg(long, alias = "destFolder")]
    backup: Option<PathBuf>,

    /// Minutes between sync cycles [default: 60]
    #[arg(long, alias = "syncPeriod")]
    interval: Option<u64>,

    /// Directory for the SyncLog_<date>.log action log [default: current directory]
    #[arg(long)]
    log: Option<PathBuf>,

    /// JSON config file; command line flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase diagnostic verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write diagnostics to this file
    #[arg(long)]
    diag_log: Option<PathBuf>,

    /// Run a single sync, print the report as JSON and exit
    #[arg(long)]
    once: bool,
}

impl Cli {
    fn overrides(&self) -> FileConfig {
        FileConfig {
            source_folder: self.source.clone(),
            dest_folder: self.backup.clone(),
            sync_period: self.interval,
            log: self.log.clone(),
            diagnostics: None,
        }
    }

    fn log_config(&self, from_file: Option<&LogConfig>) -> LogConfig {
        let mut config = match from_file {
            Some(config) if self.verbose == 0 => config.clone(),
            Some(config) => LogConfig {
                level: LogConfig::from_verbosity(self.verbose).level,
                ..config.clone()
            },
            None => LogConfig::from_verbosity(self.verbose),
        };
        if let Some(path) = &self.diag_log {
            config.file = Some(path.clone());
        }
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("加载配置文件失败: {}", path.display()))?,
        None => FileConfig::default(),
    };

    let _guard = init_logging(&cli.log_config(file_config.diagnostics.as_ref()));

    let merged = file_config.merge(cli.overrides());
    let config = SyncConfig::from_file_config(&merged).context("配置无效")?;

    info!(
        source = %config.source_root.display(),
        backup = %config.backup_root.display(),
        interval_minutes = config.sync_interval_minutes,
        log = %config.log_file.display(),
        "foldersync 启动"
    );

    let sink: Arc<dyn LogSink> = Arc::new(
        FileSink::open(&config.log_file)
            .await
            .with_context(|| format!("无法打开操作日志: {}", config.log_file.display()))?,
    );

    if cli.once {
        let report = foldersync_lib::run_initial_sync(&config, sink.as_ref()).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("收到 Ctrl-C，当前周期结束后退出");
            ctrl_c_cancel.cancel();
        }
    });

    let driver = SyncDriver::with_interval(SyncEngine::new(config), sink);
    match driver.run(cancel).await {
        Ok(cycles) => {
            info!("foldersync 停止，共完成 {} 个同步周期", cycles);
            Ok(())
        }
        Err(e) => {
            error!("同步终止: {}", e);
            Err(e.into())
        }
    }
}

use blobsync_lib::config::AppConfig;
use blobsync_lib::core::{FolderMarkers, SyncEngine, SyncReport};
use blobsync_lib::logging::init_logging;
use blobsync_lib::models::{StorageConfig, SyncProgress, SyncStatus};
use blobsync_lib::scheduler::{run_scheduled, Stopped};
use blobsync_lib::storage::create_storage;
use blobsync_lib::SyncError;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "blobsync")]
#[command(about = "Mirror a local folder or a blob container into another blob container")]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config dir>/blobsync/config.json)
    #[arg(long, short, global = true, env = "BLOBSYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synchronize source into target, once or on the configured schedule
    Run {
        #[command(flatten)]
        endpoints: EndpointArgs,

        #[command(flatten)]
        policy: PolicyArgs,

        /// Run once even if a schedule is configured
        #[arg(long)]
        once: bool,
    },

    /// Show what a run would create, update and delete
    Analyze {
        #[command(flatten)]
        endpoints: EndpointArgs,

        /// Only consider names starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Remove all folder placeholder objects from the target
    CleanMarkers {
        #[command(flatten)]
        endpoints: EndpointArgs,

        /// Only remove placeholders under this prefix
        #[arg(long)]
        prefix: Option<String>,

        /// List the placeholders without deleting them
        #[arg(long)]
        dry_run: bool,
    },
}

/// 源 / 目标覆盖参数
#[derive(Args, Debug, Default)]
struct EndpointArgs {
    /// Local source folder
    #[arg(long, env = "LOCAL_CONTAINER_PATH")]
    source_path: Option<String>,

    /// Source Azure storage account url
    #[arg(long, env = "SOURCE_AZURE_STORAGE_ACCOUNT_URL")]
    source_account_url: Option<String>,

    /// Source container name
    #[arg(long, env = "SOURCE_AZURE_STORAGE_CONTAINER_NAME")]
    source_container: Option<String>,

    /// Source SAS token
    #[arg(long, env = "SOURCE_AZURE_STORAGE_SAS_TOKEN", hide_env_values = true)]
    source_sas_token: Option<String>,

    /// Target Azure storage account url
    #[arg(long, env = "TARGET_AZURE_STORAGE_ACCOUNT_URL")]
    target_account_url: Option<String>,

    /// Target container name
    #[arg(long, env = "TARGET_AZURE_STORAGE_CONTAINER_NAME")]
    target_container: Option<String>,

    /// Target SAS token
    #[arg(long, env = "TARGET_AZURE_STORAGE_SAS_TOKEN", hide_env_values = true)]
    target_sas_token: Option<String>,
}

/// 同步策略覆盖参数
#[derive(Args, Debug, Default)]
struct PolicyArgs {
    /// Only synchronize names starting with this prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Do not upload names missing from the target
    #[arg(long)]
    skip_create: bool,

    /// Do not re-upload names that are newer in the source
    #[arg(long)]
    skip_update: bool,

    /// Keep names that exist only in the target
    #[arg(long)]
    skip_delete: bool,

    /// Leave existing target objects untouched on update
    #[arg(long)]
    no_overwrite: bool,

    /// Do not create folder placeholder objects
    #[arg(long)]
    no_create_folders: bool,

    /// Remove all folder placeholders after the run
    #[arg(long)]
    cleanup_markers: bool,

    /// Only report what would change
    #[arg(long)]
    dry_run: bool,

    /// Attach `url = <base>/<name>` metadata to every upload
    #[arg(long)]
    metadata_url_base: Option<String>,

    /// Exclude names matching this glob (repeatable)
    #[arg(long = "exclude")]
    exclude: Vec<String>,
}

impl PolicyArgs {
    fn apply(self, config: &mut AppConfig) {
        let policy = &mut config.policy;
        if self.prefix.is_some() {
            policy.prefix = self.prefix;
        }
        policy.skip_create |= self.skip_create;
        policy.skip_update |= self.skip_update;
        policy.skip_delete |= self.skip_delete;
        policy.overwrite &= !self.no_overwrite;
        policy.create_folders &= !self.no_create_folders;
        policy.cleanup_markers |= self.cleanup_markers;
        policy.dry_run |= self.dry_run;
        if self.metadata_url_base.is_some() {
            policy.metadata_url_base = self.metadata_url_base;
        }
        policy.scan.exclude_patterns.extend(self.exclude);
    }
}

/// 源 / 目标的命令行覆盖值，优先级高于配置文件
fn endpoint_overrides(args: EndpointArgs) -> (Option<StorageConfig>, Option<StorageConfig>) {
    let source = match (args.source_path, args.source_account_url) {
        (Some(path), _) => Some(StorageConfig::local(path)),
        (None, Some(url)) => Some(StorageConfig {
            sas_token: args.source_sas_token,
            ..StorageConfig::azblob(url, args.source_container.unwrap_or_default())
        }),
        (None, None) => None,
    };

    let target = args.target_account_url.map(|url| StorageConfig {
        sas_token: args.target_sas_token,
        ..StorageConfig::azblob(url, args.target_container.unwrap_or_default())
    });

    (source, target)
}

/// 合并配置文件与命令行参数
///
/// 显式指定的配置文件必须存在；默认位置的配置文件可以缺省，此时源和目标都必须由参数给出。
fn resolve_config(path: Option<PathBuf>, endpoints: EndpointArgs) -> Result<AppConfig, SyncError> {
    let file = match path {
        Some(p) => Some(AppConfig::load(&p)?),
        None => {
            let default = AppConfig::default_path();
            if default.exists() {
                Some(AppConfig::load(&default)?)
            } else {
                None
            }
        }
    };

    let (source, target) = endpoint_overrides(endpoints);

    match (file, source, target) {
        (Some(mut config), source, target) => {
            if let Some(source) = source {
                config.source = source;
            }
            if let Some(target) = target {
                config.target = target;
            }
            Ok(config)
        }
        (None, Some(source), Some(target)) => Ok(AppConfig::new(source, target)),
        (None, _, _) => Err(SyncError::Config(format!(
            "no config file at {} and source/target not given on the command line",
            AppConfig::default_path().display()
        ))),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("无法序列化输出: {}", e),
    }
}

/// 日志记录进度事件
fn spawn_progress_logger() -> mpsc::Sender<SyncProgress> {
    let (tx, mut rx) = mpsc::channel::<SyncProgress>(64);
    tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            debug!(
                "[{}] {:?} {} ({}/{}, 失败 {}, {} 字节)",
                p.run_id,
                p.status,
                p.phase,
                p.files_completed,
                p.files_to_sync,
                p.files_failed,
                p.bytes_transferred
            );
        }
    });
    tx
}

fn report_exit_code(report: &SyncReport) -> ExitCode {
    match report.status {
        SyncStatus::Partial => ExitCode::from(2),
        _ => ExitCode::SUCCESS,
    }
}

async fn run(cli: Cli) -> Result<ExitCode, SyncError> {
    match cli.command {
        Command::Run {
            endpoints,
            policy,
            once,
        } => {
            let mut config = resolve_config(cli.config, endpoints)?;
            policy.apply(&mut config);
            start_logging(&config);
            config.validate()?;

            let source = create_storage(&config.source).await?;
            let target = create_storage(&config.target).await?;
            let engine =
                SyncEngine::new(config.policy.clone())?.with_progress(spawn_progress_logger());

            match config.schedule.to_schedule()? {
                Some(schedule) if !once => {
                    info!(
                        "定时同步: 每 {} 分钟运行一次",
                        config.schedule.interval_minutes
                    );
                    let (engine, source, target) = (&engine, source.as_ref(), target.as_ref());
                    let stopped = run_scheduled(&schedule, move || async move {
                        match engine.run(source, target).await {
                            Ok(report) => print_json(&report),
                            // 单次运行失败不终止定时任务
                            Err(e) => error!("同步失败: {}", e),
                        }
                    })
                    .await;
                    Ok(match stopped {
                        Stopped::BetweenRuns => ExitCode::SUCCESS,
                        // 与 SIGINT 默认退出码一致
                        Stopped::DuringRun => ExitCode::from(130),
                    })
                }
                _ => {
                    let report = engine.run(source.as_ref(), target.as_ref()).await?;
                    print_json(&report);
                    Ok(report_exit_code(&report))
                }
            }
        }
        Command::Analyze { endpoints, prefix } => {
            let mut config = resolve_config(cli.config, endpoints)?;
            if prefix.is_some() {
                config.policy.prefix = prefix;
            }
            start_logging(&config);
            config.validate()?;

            let source = create_storage(&config.source).await?;
            let target = create_storage(&config.target).await?;
            let diff = SyncEngine::new(config.policy)?
                .analyze(source.as_ref(), target.as_ref())
                .await?;
            print_json(&diff);
            Ok(ExitCode::SUCCESS)
        }
        Command::CleanMarkers {
            endpoints,
            prefix,
            dry_run,
        } => {
            let config = resolve_config(cli.config, endpoints)?;
            start_logging(&config);
            config.target.validate()?;

            let target = create_storage(&config.target).await?;
            let prefix = prefix.or(config.policy.prefix);
            let removal = FolderMarkers::new(target.as_ref())
                .remove_all(prefix.as_deref(), dry_run)
                .await?;
            print_json(&removal);
            Ok(if removal.errors.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}

fn start_logging(config: &AppConfig) {
    if let Err(e) = init_logging(&config.log) {
        eprintln!("初始化日志失败: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobsync_lib::models::StorageType;

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "blobsync",
            "run",
            "--source-path",
            "/data/files",
            "--target-account-url",
            "https://acct.blob.core.windows.net",
            "--target-container",
            "mirror",
            "--skip-delete",
            "--no-overwrite",
            "--exclude",
            "*.tmp",
            "--once",
        ])
        .unwrap();

        let Command::Run {
            endpoints,
            policy,
            once,
        } = cli.command
        else {
            panic!("expected run command");
        };
        assert!(once);

        let (source, target) = endpoint_overrides(endpoints);
        let mut config = AppConfig::new(source.unwrap(), target.unwrap());
        policy.apply(&mut config);

        assert_eq!(config.source.typ, StorageType::Local);
        assert_eq!(config.target.container.as_deref(), Some("mirror"));
        assert!(config.policy.skip_delete);
        assert!(!config.policy.overwrite);
        assert!(config.policy.create_folders);
        assert_eq!(config.policy.scan.exclude_patterns, vec!["*.tmp"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve_config(
            Some(dir.path().join("missing.json")),
            EndpointArgs::default(),
        );
        assert!(matches!(result, Err(SyncError::Io(_))));
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        AppConfig::new(
            StorageConfig::local("/from/file"),
            StorageConfig::azblob("https://acct.blob.core.windows.net", "file-target"),
        )
        .save(&path)
        .unwrap();

        let config = resolve_config(
            Some(path),
            EndpointArgs {
                source_path: Some("/from/flag".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(config.source.path.as_deref(), Some("/from/flag"));
        assert_eq!(config.target.container.as_deref(), Some("file-target"));
    }
}

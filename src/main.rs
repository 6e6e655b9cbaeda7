use std::time::Duration;

use anyhow::{Context, Result};
use async_scheduler::app::{self, Application};
use async_scheduler::shutdown::ShutdownManager;
use clap::{Arg, ArgMatches, Command};
use scheduler_config::AppConfig;
use scheduler_domain::entities::NewTask;
use scheduler_observability::init_observability;
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mut config = AppConfig::load(config_path).context("加载配置失败")?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }

    match matches.subcommand() {
        Some(("submit", sub)) => submit(&config, sub).await,
        Some(("stats", sub)) => stats(&config, sub).await,
        _ => run(config).await,
    }
}

fn cli() -> Command {
    Command::new("async-scheduler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("持久化异步任务调度系统")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径（缺省时尝试默认位置）")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("覆盖配置中的日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .subcommand(Command::new("run").about("启动所有分区的调度器（默认）"))
        .subcommand(
            Command::new("submit")
                .about("提交一个任务")
                .arg(
                    Arg::new("theme")
                        .long("theme")
                        .value_name("THEME")
                        .default_value("default"),
                )
                .arg(
                    Arg::new("service")
                        .long("service")
                        .value_name("SERVICE")
                        .required(true),
                )
                .arg(
                    Arg::new("method")
                        .long("method")
                        .value_name("METHOD")
                        .required(true),
                )
                .arg(
                    Arg::new("arg")
                        .long("arg")
                        .value_name("JSON")
                        .help("任务参数（原样保存）")
                        .default_value(""),
                )
                .arg(
                    Arg::new("max-retry")
                        .long("max-retry")
                        .value_name("N")
                        .value_parser(clap::value_parser!(i32))
                        .default_value("0"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("SECONDS")
                        .value_parser(clap::value_parser!(i32)),
                ),
        )
        .subcommand(
            Command::new("stats").about("查看任务执行统计").arg(
                Arg::new("task-id")
                    .long("task-id")
                    .value_name("ID")
                    .value_parser(clap::value_parser!(i64))
                    .required(true),
            ),
        )
}

async fn run(config: AppConfig) -> Result<()> {
    init_observability(&config.observability).context("初始化日志与指标失败")?;

    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(
        host = %host,
        themes = ?config.scheduler.themes,
        "启动持久化异步任务调度系统"
    );

    let shutdown = ShutdownManager::new();
    let application = Application::new(
        config,
        app::builtin_handlers(),
        app::default_hooks(),
        &shutdown,
    )
    .await?;
    application.start();

    shutdown.wait_for_signal().await;
    info!("收到关闭信号，开始优雅关闭...");

    if application.shutdown(SHUTDOWN_TIMEOUT).await {
        info!("所有调度器已优雅关闭");
    } else {
        warn!("关闭超时，未完成的任务将由死任务检测回收");
    }
    Ok(())
}

async fn submit(config: &AppConfig, matches: &ArgMatches) -> Result<()> {
    let required = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .cloned()
            .with_context(|| format!("缺少参数 --{name}"))
    };

    let mut task = NewTask::new(
        required("theme")?,
        required("service")?,
        required("method")?,
        required("arg")?.into_bytes(),
    )
    .with_max_retry_time(matches.get_one::<i32>("max-retry").copied().unwrap_or(0));
    if let Some(timeout) = matches.get_one::<i32>("timeout") {
        task = task.with_timeout_seconds(*timeout);
    }

    let (database, store) = app::connect_store(config).await?;
    let result = store.tasks.create(&task).await;
    database.close().await;

    let created = result.context("提交任务失败")?;
    println!("{}", created.id);
    Ok(())
}

async fn stats(config: &AppConfig, matches: &ArgMatches) -> Result<()> {
    let task_id = *matches
        .get_one::<i64>("task-id")
        .context("缺少参数 --task-id")?;

    let (database, store) = app::connect_store(config).await?;
    let report = async {
        let task = store
            .tasks
            .get_by_id(task_id)
            .await?
            .ok_or_else(|| scheduler_errors::SchedulerError::task_not_found(task_id))?;
        let stats = store.executions.get_execution_stats(task_id).await?;
        let recent = store.executions.list_by_task(task_id, 10).await?;
        Ok::<_, scheduler_errors::SchedulerError>(serde_json::json!({
            "task_id": task.id,
            "theme": task.theme,
            "status": task.status,
            "retry_time": task.retry_time,
            "max_retry_time": task.max_retry_time,
            "stats": stats,
            "recent_runs": recent,
        }))
    }
    .await;
    database.close().await;

    match report {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!(task_id, "查询执行统计失败: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn test_submit_arguments_parse() {
        let matches = cli()
            .try_get_matches_from([
                "async-scheduler",
                "submit",
                "--service",
                "system",
                "--method",
                "echo",
                "--arg",
                r#"{"a":1}"#,
                "--max-retry",
                "2",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "submit");
        assert_eq!(sub.get_one::<String>("theme").unwrap(), "default");
        assert_eq!(*sub.get_one::<i32>("max-retry").unwrap(), 2);
        assert!(sub.get_one::<i32>("timeout").is_none());
    }

    #[test]
    fn test_stats_requires_task_id() {
        assert!(cli()
            .try_get_matches_from(["async-scheduler", "stats"])
            .is_err());
    }
}

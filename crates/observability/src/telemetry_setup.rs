use std::net::SocketAddr;

use anyhow::{Context, Result};
use scheduler_config::{LogFormat, ObservabilityConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::structured_logger::LoggingConfig;

/// 安装全局 tracing 订阅者；`RUST_LOG` 优先于配置中的级别
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.level))
        .context("解析日志级别失败")?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_thread_ids(config.include_thread_id)
                    .with_thread_names(config.include_thread_name),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_thread_ids(config.include_thread_id)
                    .with_thread_names(config.include_thread_name),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_thread_ids(config.include_thread_id)
                    .with_thread_names(config.include_thread_name),
            )
            .try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("初始化日志失败: {}", e))?;

    info!(
        logging.format = ?config.format,
        logging.level = %config.level,
        logging.location = config.include_location,
        "日志系统初始化完成"
    );

    Ok(())
}

/// 安装 Prometheus 记录器并在 `bind_address` 上暴露抓取端点，需要在 tokio 运行时内调用
pub fn init_metrics(bind_address: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(bind_address)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    info!(metrics.bind_address = %bind_address, "Prometheus 指标导出已启动");
    Ok(())
}

pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(&LoggingConfig::from(config))?;

    if config.metrics_enabled {
        let bind_address: SocketAddr = config
            .metrics_bind_address
            .parse()
            .context("observability.metrics_bind_address 格式无效")?;
        init_metrics(bind_address)?;
    }
    Ok(())
}

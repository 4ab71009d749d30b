//! 主应用程序入口
//!
//! 加载配置，按配置组装存储、事件总线和限流，启动 Axum Web API 服务。

use std::sync::Arc;

use anyhow::Context;
use application::{ChatService, ChatSettings, SystemClock};
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load().context("加载配置失败")?;
    tracing::info!(
        storage = ?config.storage.backend,
        bus = ?config.bus.backend,
        rate_limit = ?config.rate_limit.backend,
        "配置已加载"
    );

    let infra = Infrastructure::connect(&config)
        .await
        .context("初始化基础设施失败")?;

    let chat_service = ChatService::new(infra.chat_dependencies(
        Arc::new(SystemClock),
        ChatSettings::from(&config.chat),
    ));
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let state = AppState::new(Arc::new(chat_service), jwt_service, infra.bus.clone());

    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {addr}"))?;

    tracing::info!("服务器启动在 http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    infra.shutdown();
    tracing::info!("服务器已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，开始关闭");
}

mod collectors;
mod config;
mod http;
mod metrics;
mod model;
mod snapshot;

use axum::serve;
use clap::Parser;
use collectors::system::SysinfoProvider;
use config::Config;
use http::HttpAppState;
use metrics::Telemetry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostpulse")]
#[command(version)]
struct Cli {
    /// YAML config; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<String>,
    /// Overrides `listen` from the config.
    #[arg(long)]
    listen: Option<String>,
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "не удалось загрузить конфигурацию");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(listen) = cli.listen {
        cfg.listen = listen;
    }
    if let Err(err) = cfg.validate() {
        error!(error = %err, "некорректная конфигурация");
        std::process::exit(1);
    }

    let (options, cors_allow_origin) = match (cfg.snapshot_options(), cfg.cors_origin()) {
        (Ok(options), Ok(origin)) => (options, origin),
        (Err(err), _) | (_, Err(err)) => {
            error!(error = %err, "некорректная конфигурация");
            std::process::exit(1);
        }
    };

    let telemetry = match Telemetry::new() {
        Ok(t) => t,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики агента");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = match cfg.listen.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "некорректный адрес listen");
            std::process::exit(1);
        }
    };

    info!(
        listen = %addr,
        root_path = %options.root_path.display(),
        observation_window_ms = options.observation_window.as_millis() as u64,
        cpu_window_ms = options.cpu_window.as_millis() as u64,
        overlap_windows = options.overlap_windows,
        "запуск hostpulse"
    );

    let app = http::build_router(HttpAppState {
        provider: Arc::new(SysinfoProvider::new()),
        options: Arc::new(options),
        telemetry,
        cors_allow_origin,
    });

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, "не удалось запустить HTTP-сервер");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let http_task = tokio::spawn(async move {
        let server = serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        if let Err(err) = server.await {
            error!(error = %err, "ошибка HTTP-сервера");
        }
    });

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    let _ = shutdown_tx.send(true);
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;

use powerwatch_core::aggregation::Aggregator;
use powerwatch_core::host;
use powerwatch_events::Broker;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use powerwatch_api::background::{publish, sampling};
use powerwatch_api::collector::{LikwidCollector, PowerSource};
use powerwatch_api::config::ServerConfig;
use powerwatch_api::router::build_app_router;
use powerwatch_api::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "powerwatch_api=info,powerwatch_events=info,tower_http=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let ip: IpAddr = match config.host.parse() {
        Ok(ip) => ip,
        Err(e) => {
            tracing::error!(host = %config.host, error = %e, "Invalid HOST address");
            return ExitCode::FAILURE;
        }
    };
    let addr = SocketAddr::new(ip, config.port);

    // --- Host address ---
    let host_address: Arc<str> = match &config.host_address {
        Some(address) => address.as_str().into(),
        None => host::host_address_string().into(),
    };
    if host_address.is_empty() {
        tracing::warn!("No non-loopback IPv4 address found, responses will carry an empty HostAddress");
    } else {
        tracing::info!(host_address = %host_address, "Resolved host address");
    }

    // --- Aggregator ---
    let aggregator = match Aggregator::new(config.window_size) {
        Ok(aggregator) => Arc::new(aggregator),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create aggregator");
            return ExitCode::FAILURE;
        }
    };

    // --- Broker ---
    let (broker, broker_handle) = Broker::start(config.broker_config());
    tracing::info!(
        queue_capacity = config.subscriber_queue_capacity,
        max_missed = config.subscriber_max_missed,
        "Event broker started"
    );

    // --- Background tasks ---
    let cancel = CancellationToken::new();

    let source: Arc<dyn PowerSource> = Arc::new(LikwidCollector::new(
        config.power_tool.clone(),
        config.power_tool_args.clone(),
        config.power_tool_timeout(),
    ));
    let sampling_handle = tokio::spawn(sampling::run(
        source,
        Arc::clone(&aggregator),
        config.sample_interval(),
        cancel.clone(),
    ));

    let publish_ctx = publish::PublishContext {
        broker: broker.clone(),
        aggregator: Arc::clone(&aggregator),
        host_address: Arc::clone(&host_address),
        thermal_zone_path: config.thermal_zone_path.clone(),
    };
    let publish_handle = tokio::spawn(publish::run(
        publish_ctx,
        config.publish_interval(),
        cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        aggregator,
        broker: broker.clone(),
        host_address,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    tracing::info!(%addr, "Starting server");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind to address");
            return ExitCode::FAILURE;
        }
    };

    // Streams only end when the broker closes them, so the broker is shut
    // down as soon as a signal arrives rather than after serve returns.
    let shutdown_broker = broker.clone();
    let shutdown_cancel = cancel.clone();
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_cancel.cancel();
            shutdown_broker.shutdown();
        })
        .await;
    if let Err(e) = &serve_result {
        tracing::error!(error = %e, "Server error");
    }

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let timeout = config.shutdown_timeout();
    if tokio::time::timeout(timeout, sampling_handle).await.is_err() {
        tracing::warn!("Power sampling did not stop in time");
    }
    if tokio::time::timeout(timeout, publish_handle).await.is_err() {
        tracing::warn!("Telemetry publishing did not stop in time");
    }
    tracing::info!("Background tasks stopped");

    broker.shutdown();
    drop(broker);
    if tokio::time::timeout(timeout, broker_handle).await.is_err() {
        tracing::warn!("Event broker did not stop in time");
    }
    tracing::info!("Event broker shut down");

    tracing::info!("Graceful shutdown complete");
    if serve_result.is_err() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

use avatar_staging::config::StagingConfig;
use avatar_staging::services::temp_avatar::TempAvatarStore;
use avatar_staging::{AppState, create_app};
use clap::Parser;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Use the short-lived development profile instead of the environment
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avatar_staging=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting avatar staging service...");

    // 2. Configuration
    let config = if args.dev {
        StagingConfig::development()
    } else {
        StagingConfig::from_env()
    };
    info!(
        "🛡️  Staging Config: Dir={}, TTL={:?}, Sweep={:?}, Max Size={}MB",
        config.staging_dir.display(),
        config.ttl,
        config.sweep_interval,
        config.max_file_size / 1024 / 1024
    );

    // 3. Store + background sweep. A staging dir we cannot create is fatal.
    let store = Arc::new(TempAvatarStore::with_system_clock(config));
    let sweeper = store.initialize().await?;

    // 4. API Service
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(AppState::new(store.clone())).layer(trace_layer);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    // 5. Stop the sweeper once no more requests can reach the store
    info!("🛑 Shutting down temp avatar sweeper...");
    sweeper.shutdown().await;

    let stats = store.stats();
    info!(
        "👋 Exited cleanly, dropping {} pending staged uploads.",
        stats.total
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chapterhouse::notification::{AlertSink, NullAlerter, WebhookAlerter};
use chapterhouse::store::redis::RedisStore;
use chapterhouse::{api, chapters, config, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "chapterhouse=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => run_server(cfg, port).await,
        Some(cli::Commands::Token) => {
            let state = build_state(cfg).await?;
            let token = state.broker.access_token().await?;
            let remaining = token.expires_at.saturating_duration_since(std::time::Instant::now());
            println!(
                "access token minted, usable for {}s (margin applied)",
                remaining.as_secs()
            );
            Ok(())
        }
        Some(cli::Commands::Chapters) => {
            println!("{:<18} {:<10} {:<8} {:<6}", "NAME", "CSID", "PREFIX", "MEMCAT");
            for c in chapters::all_chapters() {
                println!(
                    "{:<18} {:<10} {:<8} {:<6}",
                    c.display_name, c.constituent_id, c.record_prefix, c.membership_category_id
                );
            }
            Ok(())
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn build_state(cfg: config::Config) -> anyhow::Result<Arc<AppState>> {
    tracing::info!("Connecting to Redis...");
    let store = Arc::new(RedisStore::connect(&cfg.redis_url).await?);

    let alerts: Arc<dyn AlertSink> = if cfg.alert_webhook_urls.is_empty() {
        Arc::new(NullAlerter)
    } else {
        Arc::new(WebhookAlerter::new(
            cfg.alert_webhook_urls.clone(),
            cfg.alert_signing_secret.clone(),
        ))
    };

    Ok(Arc::new(AppState::new(cfg, store, alerts)))
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    let state = build_state(cfg).await?;

    let app = axum::Router::new()
        // Health endpoints (no auth)
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .route("/readyz", axum::routing::get(|| async { "ok" }))
        // Relay boundary consumed by the UI
        .nest("/api", api::api_router())
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_id_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("chapterhouse relay listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Middleware: injects a unique X-Request-Id into every response so the
/// UI can correlate errors with relay logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

mod gateway;
mod http;
mod presence;
mod router;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use banter_store::store::ChatStore;
use clap::Parser;
use router::ServerState;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Parser, Debug)]
#[command(author, version, about = "banter chat server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// State directory for the message database and uploads.
    #[arg(long, default_value = "./data")]
    state_dir: PathBuf,

    /// Allowed CORS origin(s) (can be repeated). `*` allows any origin.
    #[arg(long = "allow-origin", default_value = "*")]
    allow_origin: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banter=info".into()),
        )
        .init();

    let args = Args::parse();

    let upload_dir = args.state_dir.join("uploads");
    std::fs::create_dir_all(&upload_dir).with_context(|| {
        format!("failed to create upload directory {}", upload_dir.display())
    })?;

    let store = ChatStore::load(&args.state_dir).context("failed to load message database")?;
    let state = ServerState::new(store, upload_dir);

    let cors = build_cors(&args.allow_origin)?;
    let app = http::build_router(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind listener on {}", args.listen))?;

    tracing::info!("banter-server listening on http://{}", args.listen);

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            result.context("server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
    }

    tracing::info!("banter-server shut down");
    Ok(())
}

fn build_cors(origins: &[String]) -> Result<CorsLayer> {
    if origins.iter().any(|o| o == "*") {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any));
    }

    let mut headers = Vec::with_capacity(origins.len());
    for origin in origins {
        headers.push(
            HeaderValue::from_str(origin)
                .with_context(|| format!("invalid --allow-origin value: {origin}"))?,
        );
    }

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(headers))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any))
}

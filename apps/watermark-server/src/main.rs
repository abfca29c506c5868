//! Watermark Server
//!
//! Stamps a translucent image watermark onto every page of an uploaded PDF.
//!
//! ## Endpoints
//!
//! - `POST /watermark/pdf` - multipart upload of `pdf` and `watermark`,
//!   responds with the watermarked PDF as an attachment
//! - `GET /health` - liveness check
//!
//! Requests are independent and nothing is kept between them.

use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;

use api::{handle_health, handle_watermark_pdf};

/// Command-line arguments for the watermark server
#[derive(Parser, Debug)]
#[command(name = "watermark-server")]
#[command(about = "Stamp a translucent image watermark onto every page of a PDF")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Largest accepted request body in megabytes
    #[arg(long, default_value = "50")]
    max_upload_mb: usize,

    /// Watermarking timeout in milliseconds
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Watermarking timeout in milliseconds
    pub timeout_ms: u64,
}

/// Build the router with all routes and middleware
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/watermark/pdf", post(handle_watermark_pdf))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting watermark server on {}:{}", args.host, args.port);

    let state = AppState {
        timeout_ms: args.timeout_ms,
    };
    let router = app(state, args.max_upload_mb * 1024 * 1024);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Upload limit: {} MB", args.max_upload_mb);
    info!("Watermark timeout: {}ms", args.timeout_ms);

    axum::serve(listener, router).await?;

    Ok(())
}

use clap::Parser; // for cli
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use photo_curator::auth::SupabaseIdentity;
use photo_curator::config::Args;
use photo_curator::gateway::{GeminiConfig, GeminiGateway};
use photo_curator::rate_limit::RateLimiter;
use photo_curator::{AppState, create_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("photo_curator=info,tower_http=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // parse cli arguments
    let args = Args::parse();
    let timeout = Duration::from_secs(args.upstream_timeout);

    let identity = SupabaseIdentity::new(&args.supabase_url, &args.supabase_anon_key, timeout)?;
    let gateway = GeminiGateway::new(GeminiConfig {
        api_key: args.gemini_api_key.clone(),
        base_url: args.gemini_base_url.clone(),
        model: args.gemini_model.clone(),
        timeout,
    })?;

    if args.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY is not set, recommend requests will fail with 502");
    }

    // creating shared state
    let state = Arc::new(AppState {
        identity: Arc::new(identity),
        rate_limiter: RateLimiter::new(args.rate_limit, Duration::from_secs(args.rate_window)),
        gateway,
        max_body_bytes: args.max_body_bytes,
    });

    let app = create_app(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(port = args.port, "Curator running on http://localhost:{}", args.port);
    info!(model = %args.gemini_model, "Forwarding to Gemini");
    info!(
        "Rate limit: {} requests per {} seconds per user",
        args.rate_limit, args.rate_window
    );
    axum::serve(listener, app).await?;
    Ok(())
}

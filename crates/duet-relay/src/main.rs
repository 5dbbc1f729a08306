//! duet-relay binary: loads config, starts the relay loop, the WebSocket
//! listener and the HTTP control API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use duet_relay::api::{self, ApiState};
use duet_relay::auth::{Authorizer, JwtAuthorizer};
use duet_relay::{runtime, serve_ws};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "duet-relay", about = "Coordination relay for paired betting agents")]
struct Args {
    /// Config file (defaults to the platform config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP control API port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Agent/observer WebSocket port.
    #[arg(long)]
    ws_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = duet_config::load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(port) = args.ws_port {
        config.server.ws_port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.default_directive().into()),
        )
        .init();

    let relay = runtime::spawn(&config);
    let authorizer: Arc<dyn Authorizer> = Arc::new(JwtAuthorizer::new(&config.auth));

    let ws_listener = TcpListener::bind(config.server.ws_bind_addr()).await?;
    tracing::info!("WebSocket listening on {}", config.server.ws_bind_addr());
    let ws_relay = relay.clone();
    let ws_auth = authorizer.clone();
    let ws_config = config.clone();
    tokio::spawn(async move { serve_ws(ws_listener, ws_relay, ws_auth, &ws_config).await });

    let http_listener = TcpListener::bind(config.server.bind_addr()).await?;
    tracing::info!("HTTP API listening on {}", config.server.bind_addr());
    let app = api::router(ApiState { relay, authorizer });
    axum::serve(http_listener, app).await?;
    Ok(())
}

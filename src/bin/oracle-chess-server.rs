//! HTTP server for playing chess against a language model.
//!
//! The oracle endpoint is configured from `OPENAI_API_KEY`, `OPENAI_MODEL` and `OPENAI_BASE_URL`;
//! the flags below override the model and base URL.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use oracle_chess::{
    config::{NegotiationConfig, OpenAiConfig, DEFAULT_MAX_ROUNDS},
    openai::OpenAiOracle,
    server::serve_games,
    GameRegistry, Negotiator,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "oracle-chess-server")]
#[command(about = "Play chess against a language model over HTTP")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8086")]
    bind: SocketAddr,

    /// Model name, overriding OPENAI_MODEL
    #[arg(long)]
    model: Option<String>,

    /// Chat completions base URL, overriding OPENAI_BASE_URL
    #[arg(long)]
    base_url: Option<String>,

    /// Oracle answers judged per AI move before giving up
    #[arg(long, env = "ORACLE_MAX_ROUNDS", default_value_t = DEFAULT_MAX_ROUNDS)]
    max_rounds: u32,

    /// Deadline for a single oracle call, in seconds (0 disables it)
    #[arg(long, env = "ORACLE_TIMEOUT_SECS", default_value_t = 120)]
    request_timeout_secs: u64,

    /// Drop games untouched for this many seconds; games are kept forever if unset
    #[arg(long, env = "GAME_IDLE_TIMEOUT_SECS")]
    idle_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut openai = OpenAiConfig::from_env()?;
    if let Some(model) = args.model {
        openai = openai.with_model(model);
    }
    if let Some(base_url) = args.base_url {
        openai.base_url = base_url;
    }
    let base_url = openai.base_url.clone();
    let oracle = OpenAiOracle::new(openai);

    let negotiation = NegotiationConfig {
        max_rounds: args.max_rounds,
        request_timeout: (args.request_timeout_secs > 0)
            .then(|| Duration::from_secs(args.request_timeout_secs)),
        ..NegotiationConfig::default()
    };
    info!(
        model = oracle.model(),
        base_url = %base_url,
        "using oracle"
    );
    let negotiator = Arc::new(Negotiator::new(Arc::new(oracle), negotiation));
    info!(
        max_rounds = negotiator.config().max_rounds,
        request_timeout = ?negotiator.config().request_timeout,
        "negotiation budget"
    );
    let registry = Arc::new(GameRegistry::new(negotiator));

    if let Some(secs) = args.idle_timeout_secs {
        let max_idle = Duration::from_secs(secs.max(1));
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval((max_idle / 4).max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                registry.evict_idle(max_idle);
            }
        });
    }

    info!(addr = %args.bind, "listening");
    axum::Server::bind(&args.bind)
        .serve(serve_games(registry).into_make_service())
        .await?;
    Ok(())
}

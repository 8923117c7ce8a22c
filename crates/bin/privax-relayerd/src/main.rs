//! privax-relayerd - serve the relayer state engine over http
//!
//! usage:
//!   privax-relayerd                                  # sled store in ./data
//!   privax-relayerd --store json --data-dir /srv/r   # plain json files
//!   privax-relayerd --hasher blake3 --port 9000
//!   privax-relayerd --store json --hasher sha256-hex  # legacy data directory
//!
//! every flag can also be set through the environment (HOST, PORT, DATA_DIR,
//! RELAYER_STORE, RELAYER_HASHER).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use privax_relayer::{
    Blake3Hasher, DigestHasher, HexSha256Hasher, JsonDirStore, RelayerEngine, Sha256Hasher,
    SledStore, StateStore,
};
use tracing::{error, info, warn};

mod api;

/// persistence backend selection
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum StoreKind {
    /// embedded sled database (<data-dir>/relayer.sled)
    Sled,
    /// one json file per record in <data-dir>
    Json,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Sled => write!(f, "sled"),
            StoreKind::Json => write!(f, "json"),
        }
    }
}

/// merkle hash function selection
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum HasherKind {
    Sha256,
    Blake3,
    /// sha-256 over concatenated hex, for data written by the earlier relayer
    Sha256Hex,
}

impl fmt::Display for HasherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HasherKind::Sha256 => write!(f, "sha256"),
            HasherKind::Blake3 => write!(f, "blake3"),
            HasherKind::Sha256Hex => write!(f, "sha256-hex"),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "privax-relayerd")]
#[command(about = "privax relayer - commitment tree and nullifier ledger over http")]
#[command(version)]
struct Args {
    /// bind address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// directory holding the persisted state
    #[arg(short, long, env = "DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// persistence backend
    #[arg(long, value_enum, env = "RELAYER_STORE", default_value_t = StoreKind::Sled)]
    store: StoreKind,

    /// hash function for the commitment tree (must match the persisted state)
    #[arg(long, value_enum, env = "RELAYER_HASHER", default_value_t = HasherKind::Sha256)]
    hasher: HasherKind,
}

fn open_store(kind: StoreKind, data_dir: &std::path::Path) -> Result<Box<dyn StateStore>> {
    let store: Box<dyn StateStore> = match kind {
        StoreKind::Sled => Box::new(
            SledStore::open(data_dir.join("relayer.sled")).context("failed to open sled store")?,
        ),
        StoreKind::Json => {
            Box::new(JsonDirStore::open(data_dir).context("failed to open json store")?)
        }
    };
    Ok(store)
}

fn make_hasher(kind: HasherKind) -> Box<dyn DigestHasher> {
    match kind {
        HasherKind::Sha256 => Box::new(Sha256Hasher),
        HasherKind::Blake3 => Box::new(Blake3Hasher),
        HasherKind::Sha256Hex => Box::new(HexSha256Hasher),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
        // keep serving rather than exiting on a broken signal handler
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "privax_relayerd=info,privax_relayer=info".into()),
        )
        .init();

    let args = Args::parse();

    info!("privax-relayerd v{}", env!("CARGO_PKG_VERSION"));
    info!("  store: {}", args.store);
    info!("  hasher: {}", args.hasher);
    info!("  data: {}", args.data_dir.display());
    info!("  bind: {}:{}", args.host, args.port);

    let store = open_store(args.store, &args.data_dir)?;
    let engine = Arc::new(
        RelayerEngine::open(store, make_hasher(args.hasher))
            .context("failed to restore relayer state")?,
    );

    let app = api::router(engine.clone());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // last chance for records whose save failed earlier
    if let Err(e) = engine.persist() {
        warn!("state not fully persisted on shutdown: {}", e);
    }
    info!("stopped");
    Ok(())
}

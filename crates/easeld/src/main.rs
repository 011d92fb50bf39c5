//! # easeld
//!
//! The whiteboard daemon. Opens the op log, assembles the sync core, and
//! serves HTTP + WebSocket traffic until ctrl-c.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use easel_server::config::ServerConfig;
use easel_server::server::EaselServer;
use easel_store::{ConnectionConfig, OpStore};
use easel_sync::{
    FanoutBus, FlushConfig, FlushScheduler, MemoryRelay, PendingBuffer, Relay, RelayBridge,
    SessionRegistry,
};

/// Collaborative whiteboard daemon.
#[derive(Parser, Debug)]
#[command(name = "easeld", version, about)]
struct Cli {
    /// Interface to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// TCP port (0 picks a free one).
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Op log location. Defaults to `~/.easel/database/easel.db`.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// `EnvFilter` fallback when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Cap on simultaneous WebSocket connections.
    #[arg(long)]
    max_connections: Option<usize>,

    /// Flush sweep period in milliseconds.
    #[arg(long)]
    flush_interval_ms: Option<u64>,

    /// Minimum gap between flush cycles in milliseconds.
    #[arg(long)]
    flush_cooldown_ms: Option<u64>,
}

impl Cli {
    fn database_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }

    fn server_config(&self) -> ServerConfig {
        let mut cfg = ServerConfig {
            host: self.host.clone(),
            port: self.port,
            ..ServerConfig::default()
        };
        if let Some(cap) = self.max_connections {
            cfg.max_connections = cap;
        }
        cfg
    }

    fn flush_config(&self) -> FlushConfig {
        let mut cfg = FlushConfig::default();
        if let Some(ms) = self.flush_interval_ms {
            cfg.wake_interval_ms = ms;
        }
        if let Some(ms) = self.flush_cooldown_ms {
            cfg.cooldown_ms = ms;
        }
        cfg
    }
}

/// `~/.easel/database/easel.db`, with `/tmp` standing in when HOME is unset.
fn default_db_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(".easel")
        .join("database")
        .join("easel.db")
}

/// Open the op log (creating directories and the file as needed) and bring
/// its schema current.
fn open_store(path: &Path) -> Result<Arc<OpStore>> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let pool = easel_store::new_file(&path.to_string_lossy(), &ConnectionConfig::default())
        .with_context(|| format!("failed to open {}", path.display()))?;
    let applied = {
        let conn = pool.get().context("pool handed out no connection")?;
        easel_store::run_migrations(&conn)?
    };
    tracing::debug!(applied, db = %path.display(), "op log ready");

    Ok(Arc::new(OpStore::new(pool)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    easel_core::logging::init_subscriber(&args.log_level);

    let db_path = args.database_path();
    let store = open_store(&db_path)?;

    // One registry feeds both the bus (who is in the room) and the handlers.
    let registry = Arc::new(SessionRegistry::new());
    let relay: Arc<dyn Relay> = Arc::new(MemoryRelay::default());
    let bus = Arc::new(FanoutBus::new(registry, Arc::clone(&relay)));
    let bridge = Arc::new(RelayBridge::new(relay, Arc::clone(&bus)));
    let buffer = Arc::new(PendingBuffer::new());

    let metrics = easel_server::metrics::install_recorder();
    let server = EaselServer::new(
        args.server_config(),
        bus,
        bridge,
        Arc::clone(&buffer),
        Arc::clone(&store),
        metrics,
    );

    // The scheduler owns draining the buffer; it flushes once more on cancel.
    let scheduler =
        FlushScheduler::new(buffer, store, args.flush_config(), server.shutdown().token());
    let flush_handle = tokio::spawn(scheduler.run());

    let (addr, serve_handle) = server.listen().await.context("failed to bind listener")?;
    tracing::info!(%addr, db = %db_path.display(), "easeld up, WebSocket endpoint at /ws");

    tokio::signal::ctrl_c()
        .await
        .context("failed to install ctrl-c handler")?;

    tracing::info!("ctrl-c received, draining");
    server
        .shutdown()
        .graceful_shutdown(vec![serve_handle, flush_handle], None)
        .await;
    tracing::info!("shutdown complete");

    Ok(())
}

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use stowage_daemon::{spawn_service, ServiceConfig};

/// Multi-tenant file-sharing and storage-gateway daemon.
#[derive(Debug, Parser)]
#[command(name = "stowaged", version, about)]
struct Cli {
    /// Address for the HTTP server (API + WebDAV).
    #[arg(long, env = "STOWAGE_LISTEN_ADDR", default_value = "0.0.0.0:8686")]
    listen_addr: SocketAddr,

    /// SQLite URL for the metadata store.
    #[arg(long, env = "STOWAGE_DATABASE_URL", default_value = "sqlite://stowage.db")]
    database_url: String,

    /// Passphrase used to derive the credential-sealing key.
    #[arg(long, env = "ENCRYPTION_SECRET", hide_env_values = true)]
    encryption_secret: String,

    /// Admin Basic username.
    #[arg(long, env = "STOWAGE_ADMIN_USERNAME", default_value = "admin")]
    admin_username: String,

    /// Admin bearer token (doubles as the admin Basic password).
    #[arg(long, env = "STOWAGE_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "STOWAGE_LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,

    /// Directory for rolling log files; stdout only when unset.
    #[arg(long, env = "STOWAGE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Max body size (bytes) taking the buffered direct upload path.
    #[arg(long, env = "STOWAGE_DIRECT_THRESHOLD", default_value_t = 5 * 1024 * 1024)]
    direct_threshold: u64,

    /// Ready parts in the streaming upload pipeline (1-3).
    #[arg(long, env = "STOWAGE_QUEUE_DEPTH", default_value_t = 2)]
    queue_depth: usize,

    /// Request body cap for the API surface, in bytes.
    #[arg(long, env = "STOWAGE_BODY_LIMIT", default_value_t = 512 * 1024 * 1024)]
    body_limit: usize,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = ServiceConfig {
        listen_addr: cli.listen_addr,
        database_url: cli.database_url,
        encryption_secret: cli.encryption_secret,
        admin_username: cli.admin_username,
        admin_token: cli.admin_token,
        log_level: cli.log_level,
        log_dir: cli.log_dir,
        direct_upload_threshold: cli.direct_threshold,
        streaming_queue_depth: cli.queue_depth,
        body_limit: cli.body_limit,
    };

    spawn_service(&config).await;
}

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use worldgrid_server::config;

#[derive(Debug, Parser)]
#[command(name = "worldgrid-server", version, about = "Local grid provisioning service for world maps")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    host: IpAddr,

    /// Port to bind. Falls back to WORLDGRID_PORT, then 39333.
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database file. Falls back to WORLDGRID_DB, then ~/.worldgrid/worldgrid.db.
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let port = args
        .port
        .or_else(config::port)
        .unwrap_or(config::DEFAULT_PORT);
    let db_path = args
        .db
        .or_else(config::db_path)
        .unwrap_or_else(config::default_db_path);
    let server_config = worldgrid_server::ServerConfig::from_env();

    let addr = SocketAddr::new(args.host, port);
    tracing::info!(
        %addr,
        db = %db_path.display(),
        default_width = server_config.default_width,
        default_height = server_config.default_height,
        "starting worldgrid server"
    );
    worldgrid_server::serve(addr, db_path, server_config).await
}

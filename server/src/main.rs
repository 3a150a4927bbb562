use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Milliseconds between simulation ticks
    #[arg(short, long, default_value = "50")]
    tick_ms: u64,

    /// Maximum number of concurrent connections
    #[arg(short, long, default_value = "8")]
    max_clients: usize,

    /// Board rows (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "21")]
    height: usize,

    /// Board columns; rows times columns must stay within one snapshot frame
    #[arg(long, default_value = "51")]
    width: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    info!(
        "Starting arena server on {} ({}x{} board, {}ms ticks, max {} clients)",
        address, args.height, args.width, args.tick_ms, args.max_clients
    );

    let config = ServerConfig {
        tick_duration: Duration::from_millis(args.tick_ms.max(1)),
        max_clients: args.max_clients,
        height: args.height,
        width: args.width,
    };

    let mut server = Server::new(&address, config).await?;
    server.run().await?;

    Ok(())
}

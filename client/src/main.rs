use clap::Parser;
use client::network::Client;
use client::terminal::TerminalGuard;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Log updates instead of drawing the board
    #[arg(long)]
    no_render: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Controls: W/A/S/D to move, Space to dash, J to freeze, Q or Esc to quit");

    let render = !args.no_render;
    let mut client = Client::connect(&args.server, render).await?;

    let mut terminal = TerminalGuard::enter(render)?;
    let outcome = client.run().await;
    terminal.restore()?;

    outcome
}

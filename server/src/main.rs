use clap::Parser;
use log::info;
use server::ai::AiClient;
use server::engine::Engine;
use server::repo::Repository;
use server::{network, timer};
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;

// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port shared by the TCP control stream and the UDP stroke socket
    #[clap(short, long, default_value = "1234")]
    port: u16,

    /// AI scoring service host
    #[clap(long, default_value = "127.0.0.1")]
    ai_host: String,

    /// AI scoring service port
    #[clap(long, default_value = "5000")]
    ai_port: u16,

    /// SQLite database file
    #[clap(long, default_value = "game_data.db")]
    db: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Warning: RUST_LOG environment variable not set. Set it to display logs!");
        eprintln!("Recommended: RUST_LOG=info cargo run");
    }

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let repo = Repository::open(&args.db).await?;
    info!("Opened database {}", args.db);

    let ai = AiClient::new(&args.ai_host, args.ai_port);
    let engine = Arc::new(Engine::new(repo, ai));

    // One port, bound twice: control stream and stroke datagrams.
    let tcp_listener = TcpListener::bind(&addr).await?;
    let udp_socket = Arc::new(UdpSocket::bind(&addr).await?);
    info!("Listening on {} (TCP control, UDP strokes)", addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(network::run_udp(
        Arc::clone(&udp_socket),
        Arc::clone(&engine),
        shutdown_rx.clone(),
    ));
    tokio::spawn(timer::run_timer(Arc::clone(&engine), shutdown_rx.clone()));

    tokio::select! {
        _ = network::run_tcp_listener(tcp_listener, Arc::clone(&engine), shutdown_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, closing");
            let _ = shutdown_tx.send(true);
        }
    }

    Ok(())
}

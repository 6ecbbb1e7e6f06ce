use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::ServerNetworkManager;
use server::simulation::WaveSpawnPolicy;
use shared::{SystemClock, UdpTransport};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Seconds of silence before a session is dropped
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Maximum number of concurrent sessions
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Worker threads for entity jobs (defaults to available cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Datagrams processed per tick before the rest waits for the next one
    #[arg(long, default_value = "1024")]
    max_messages: usize,

    /// Seed of the enemy wave generator
    #[arg(long, default_value = "7")]
    seed: u64,

    /// Ticks between enemy spawns, 0 disables enemies
    #[arg(long, default_value = "120")]
    enemy_interval: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = ServerConfig {
        tick_rate: args.tick_rate,
        session_timeout: Duration::from_secs(args.timeout),
        max_messages_per_tick: args.max_messages,
        max_sessions: args.max_clients,
        ..ServerConfig::default()
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    let mut policy = WaveSpawnPolicy::new(args.seed);
    policy.spawn_interval_ticks = args.enemy_interval;

    let address = format!("{}:{}", args.host, args.port);
    let transport = UdpTransport::bind(&address).await?;

    info!("Starting server on {}", address);
    info!(
        "Tick rate {} Hz, timeout {}s, {} workers, max {} clients",
        config.tick_rate,
        args.timeout,
        config.workers,
        config.max_sessions
    );

    let mut server = ServerNetworkManager::new(
        config,
        Box::new(transport),
        Box::new(SystemClock::new()),
        Box::new(policy),
    )?;

    server.run().await?;

    Ok(())
}
